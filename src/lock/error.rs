//! Error definitions for the lock client

use thiserror::Error;

/// Failures surfaced by [`super::LockClient`] and the broker link.
///
/// None of these reach the user interface; callers log them and carry on.
#[derive(Debug, Error)]
pub enum LockError {
    /// Subscribing to a topic was rejected by the client
    #[error("Subscribe to '{topic}' failed: {reason}")]
    Subscribe { topic: String, reason: String },

    /// A publish request could not be queued
    #[error("Publish to '{topic}' failed: {reason}")]
    Publish { topic: String, reason: String },

    /// The disconnect request could not be queued
    #[error("Disconnect failed: {0}")]
    Disconnect(String),

    /// Communication with the UI or session task broke down
    #[error("Channel error: {0}")]
    Channel(String),

    /// Invalid or incomplete configuration
    #[error("Configuration error: {0}")]
    Config(String),
}
