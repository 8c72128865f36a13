//! # Door Lock User Interface
//!
//! A single window with one button. The button projects the current
//! [`LockState`] (label and fill color) and a click asks the session task to
//! toggle the lock. F5 asks the actuator to report its state again.
//!
//! ## Data Flow
//!
//! ```text
//! session task ──watch<LockState>──► DoorLockUI ──mpsc<UiCommand>──► session task
//! ```
//!
//! The UI holds no lock state of its own. Every frame reads the latest value
//! from the watch channel, so what is drawn is always the client's state field
//! and never the other way round.

pub mod common;

use eframe::egui;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::config::UIConfig;
use crate::lock::{LockError, LockState};
use crate::mqtt::mqtt_handler::UiCommand;

use self::common::{button_size, create_frame, lock_button, UiColors};

pub struct DoorLockUI {
    state: watch::Receiver<LockState>,
    commands: mpsc::Sender<UiCommand>,
    /// Shown in the status line
    broker: String,
    client_id: String,
    frame_interval: Duration,
}

impl DoorLockUI {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        state: watch::Receiver<LockState>,
        commands: mpsc::Sender<UiCommand>,
        broker: String,
        client_id: String,
        ui_config: &UIConfig,
    ) -> Self {
        cc.egui_ctx.set_theme(egui::Theme::Dark);
        DoorLockUI {
            state,
            commands,
            broker,
            client_id,
            frame_interval: frame_interval(ui_config.fps),
        }
    }

    fn send(&self, command: UiCommand) {
        if let Err(e) = forward(&self.commands, command) {
            warn!("{}", e);
        }
    }
}

/// Hands a command to the session task without blocking the frame.
fn forward(commands: &mpsc::Sender<UiCommand>, command: UiCommand) -> Result<(), LockError> {
    commands
        .try_send(command)
        .map_err(|e| LockError::Channel(format!("unable to forward {:?}: {}", command, e)))
}

fn frame_interval(fps: u8) -> Duration {
    Duration::from_millis(1000 / u64::from(fps.max(1)))
}

impl eframe::App for DoorLockUI {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint_after(self.frame_interval);
        let state = *self.state.borrow();

        if ctx.input(|i| i.key_pressed(egui::Key::F5)) {
            self.send(UiCommand::RequestStatus);
        }

        egui::TopBottomPanel::bottom("status_line")
            .show_separator_line(false)
            .frame(create_frame(UiColors::EXTREME_BG, UiColors::BORDER))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(self.broker.as_str());
                    ui.separator();
                    ui.label(self.client_id.as_str());
                });
            });

        egui::CentralPanel::default()
            .frame(egui::Frame::new().fill(UiColors::MAIN_BG))
            .show(ctx, |ui| {
                let size = button_size(ui.available_size());
                ui.vertical_centered(|ui| {
                    ui.add_space(((ui.available_height() - size.y) / 2.0).max(0.0));
                    if ui.add(lock_button(state, size)).clicked() {
                        info!("Toggle requested while showing '{}'", state);
                        self.send(UiCommand::Toggle);
                    }
                });
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_reports_a_stopped_session() {
        let (tx, rx) = mpsc::channel(1);
        assert!(forward(&tx, UiCommand::Toggle).is_ok());
        assert!(matches!(
            forward(&tx, UiCommand::Toggle),
            Err(LockError::Channel(_))
        ));

        drop(rx);
        let err = forward(&tx, UiCommand::RequestStatus).unwrap_err();
        assert!(matches!(err, LockError::Channel(_)));
        assert!(err.to_string().contains("RequestStatus"));
    }

    #[test]
    fn frame_interval_follows_fps() {
        assert_eq!(frame_interval(30), Duration::from_millis(33));
        assert_eq!(frame_interval(0), Duration::from_millis(1000));
    }
}
