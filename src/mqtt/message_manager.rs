use chrono::NaiveDateTime;
use rumqttc::{ConnectionError, StateError};
use std::fmt;

/// Immutable envelope of an inbound broker message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockMessage {
    topic: String,
    payload: String,
    received_at: NaiveDateTime,
}

impl fmt::Display for LockMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let preview: String = self.payload.chars().take(32).collect();
        write!(f, "{} - {}: {}", self.received_at, self.topic, preview)
    }
}

impl LockMessage {
    pub fn from_topic(topic: String, payload: String) -> Self {
        LockMessage {
            topic,
            payload,
            received_at: chrono::Local::now().naive_local(),
        }
    }

    /// Builds an envelope from raw publish bytes. Payloads that are not valid
    /// UTF-8 cannot carry a lock state and yield `None`.
    pub fn from_publish(topic: &str, payload: &[u8]) -> Option<Self> {
        let payload = std::str::from_utf8(payload).ok()?;
        Some(Self::from_topic(topic.to_string(), payload.to_string()))
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn payload(&self) -> &str {
        &self.payload
    }
}

/// Numeric reason attached to a lost session. `Ok` means the session was
/// closed on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossCode {
    Ok = 0,
    ConnectTimeout = 1,
    PingTimeout = 4,
    InternalError = 5,
    ConnAckRefused = 6,
    SocketError = 7,
    SocketClose = 8,
}

impl LossCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Description of a lost broker connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionLost {
    pub code: LossCode,
    pub message: String,
}

impl ConnectionLost {
    pub fn new(code: LossCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn clean() -> Self {
        Self::new(LossCode::Ok, "session closed")
    }

    pub fn is_clean(&self) -> bool {
        self.code == LossCode::Ok
    }

    pub fn from_connection_error(err: &ConnectionError) -> Self {
        let code = match err {
            ConnectionError::RequestsDone => LossCode::Ok,
            ConnectionError::NetworkTimeout | ConnectionError::FlushTimeout => {
                LossCode::ConnectTimeout
            }
            ConnectionError::MqttState(StateError::AwaitPingResp) => LossCode::PingTimeout,
            ConnectionError::ConnectionRefused(_) | ConnectionError::NotConnAck(_) => {
                LossCode::ConnAckRefused
            }
            ConnectionError::Io(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                LossCode::SocketClose
            }
            ConnectionError::Io(_) => LossCode::SocketError,
            _ => LossCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

impl fmt::Display for ConnectionLost {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}
