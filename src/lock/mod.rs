//! # Door Lock Domain
//!
//! Everything the application knows about the lock itself lives here: the
//! three displayable states, the literal wire payloads exchanged with the
//! actuator, and the [`client::LockClient`] that mediates between UI intent
//! and broker traffic.
//!
//! ## Wire Payloads
//!
//! All payloads are UTF-8, case-sensitive and must match exactly:
//!
//! ```text
//! status_request   outbound          ask the actuator to report its state
//! locked           inbound/outbound  lock is / should be locked
//! unlocked         inbound/outbound  lock is / should be unlocked
//! ```
//!
//! Anything else is not an error. It simply carries no lock information and
//! is dropped by the client.

pub mod client;
pub mod error;

use std::fmt;

pub use client::{BrokerLink, LockClient, LockTopics};
pub use error::LockError;

/// Payload asking the actuator to republish the current state.
pub const STATUS_REQUEST: &str = "status_request";
/// Payload meaning the lock is (or should be) locked.
pub const LOCKED: &str = "locked";
/// Payload meaning the lock is (or should be) unlocked.
pub const UNLOCKED: &str = "unlocked";

/// Displayed state of the door lock.
///
/// `Unknown` only exists until the first matching status message arrives;
/// nothing ever transitions back into it.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockState {
    #[default]
    Unknown,
    Locked,
    Unlocked,
}

/// Visual tint of the lock button, mapped to concrete colors by the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tint {
    Red,
    Green,
    Neutral,
}

impl LockState {
    /// Parses an inbound payload. Only the two exact literals are recognised.
    pub fn from_payload(payload: &str) -> Option<Self> {
        match payload {
            LOCKED => Some(LockState::Locked),
            UNLOCKED => Some(LockState::Unlocked),
            _ => None,
        }
    }

    /// Payload to publish when the user asks to leave this state.
    ///
    /// An unknown state is treated like an unlocked one, so the first press
    /// before any status arrived asks for `locked`.
    pub fn toggled_payload(self) -> &'static str {
        match self {
            LockState::Locked => UNLOCKED,
            LockState::Unlocked | LockState::Unknown => LOCKED,
        }
    }

    /// Button label shown for this state.
    pub fn label(self) -> &'static str {
        match self {
            LockState::Locked => "Door Locked",
            LockState::Unlocked => "Door Unlocked",
            LockState::Unknown => "Door Status Unknown",
        }
    }

    pub fn tint(self) -> Tint {
        match self {
            LockState::Locked => Tint::Red,
            LockState::Unlocked => Tint::Green,
            LockState::Unknown => Tint::Neutral,
        }
    }
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}
