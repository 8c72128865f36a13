pub mod config;
pub mod lock;
pub mod mqtt;
pub mod ui;

use crate::config::AppConfig;
use crate::lock::LockState;
use crate::mqtt::config::MqttConfig;
use crate::mqtt::mqtt_handler;
use crate::ui::DoorLockUI;
use color_eyre::{eyre::eyre, Result};
use eframe::egui;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    setup()?;

    let config_path = AppConfig::default_path();
    AppConfig::ensure_default_config(&config_path).await?;
    let app_config = AppConfig::load(&config_path).await?;
    info!("Loaded config from {}", config_path.display());

    let mqtt_config = MqttConfig::new(
        app_config.broker.clone(),
        app_config.lock_topics(),
        &app_config.reconnect,
    );
    let broker = mqtt_config.broker_url();
    let client_id = mqtt_config.client_id.clone();

    let (state_tx, state_rx) = watch::channel(LockState::Unknown);
    let (command_tx, command_rx) = mpsc::channel(16);
    let shutdown = CancellationToken::new();

    let session = mqtt_handler::spawn(mqtt_config, command_rx, state_tx, shutdown.clone());

    info!("Starting UI");
    let mut native_options = eframe::NativeOptions::default();
    native_options.viewport = egui::ViewportBuilder::default()
        .with_title("Smart Door Lock")
        .with_inner_size([520.0, 360.0])
        .with_fullscreen(app_config.ui.fullscreen);

    let ui_config = app_config.ui.clone();
    let ui_result = eframe::run_native(
        "Smart Door Lock",
        native_options,
        Box::new(move |cc| {
            Ok(Box::new(DoorLockUI::new(
                cc, state_rx, command_tx, broker, client_id, &ui_config,
            )))
        }),
    );

    shutdown.cancel();
    match tokio::time::timeout(Duration::from_secs(3), session).await {
        Ok(Ok(status)) => info!(
            "Session ended: {} received, {} sent",
            status.messages_received, status.messages_sent
        ),
        Ok(Err(e)) => warn!("Session task failed: {}", e),
        Err(_) => warn!("Session did not stop in time"),
    }

    ui_result.map_err(|e| eyre!("UI terminated with error: {}", e))
}

fn setup() -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info")
    }
    setup_logging_env();
    Ok(())
}

fn setup_logging_env() {
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}
