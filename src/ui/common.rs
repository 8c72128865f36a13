//! # UI Common Components and Utilities
//!
//! Colors and widget helpers shared by the door lock window. The palette is a
//! dark theme with two status colors that double as the lock button fill.

use eframe::egui::{self, Button, Color32, Frame, RichText, Stroke, Vec2};

use crate::lock::{LockState, Tint};

/// Centralized color palette for the dark theme.
pub struct UiColors;

impl UiColors {
    /// Primary background color for main content areas (RGB: 30, 30, 30)
    pub const MAIN_BG: Color32 = Color32::from_rgb(30, 30, 30);

    /// Deepest background color for the status line (RGB: 20, 20, 20)
    pub const EXTREME_BG: Color32 = Color32::from_rgb(20, 20, 20);

    /// Border color for component separation (RGB: 60, 60, 60)
    pub const BORDER: Color32 = Color32::from_rgb(60, 60, 60);

    /// Unlocked fill (RGB: 50, 200, 20) - Green
    pub const GREEN: Color32 = Color32::from_rgb(50, 200, 20);

    /// Locked fill (RGB: 200, 50, 20) - Red
    pub const RED: Color32 = Color32::from_rgb(200, 50, 20);

    /// Fill while no status has been received yet
    pub const NEUTRAL: Color32 = Color32::from_rgb(90, 90, 90);
}

pub fn tint_color(tint: Tint) -> Color32 {
    match tint {
        Tint::Red => UiColors::RED,
        Tint::Green => UiColors::GREEN,
        Tint::Neutral => UiColors::NEUTRAL,
    }
}

/// Builds the lock button for `state`. Label and fill are a pure function of
/// the state.
pub fn lock_button(state: LockState, size: Vec2) -> Button<'static> {
    let text = RichText::new(state.label())
        .size(32.0)
        .color(Color32::WHITE)
        .strong();
    Button::new(text)
        .fill(tint_color(state.tint()))
        .stroke(Stroke::new(1.0, UiColors::BORDER))
        .min_size(size)
}

pub fn create_frame(bg_color: Color32, border_color: Color32) -> Frame {
    Frame::new()
        .stroke(Stroke::new(1.0, border_color))
        .fill(bg_color)
        .inner_margin(4)
        .outer_margin(2)
}

/// Button size that fits the available area with some breathing room.
pub fn button_size(available: Vec2) -> Vec2 {
    egui::vec2(
        (available.x * 0.6).clamp(200.0, 480.0),
        (available.y * 0.3).clamp(80.0, 160.0),
    )
}
