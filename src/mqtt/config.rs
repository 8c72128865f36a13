use rumqttc::{MqttOptions, Transport};
use std::time::Duration;
use uuid::Uuid;

use crate::config::{BrokerSection, ReconnectSection};
use crate::lock::LockTopics;

/// Everything a session needs to reach the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct MqttConfig {
    pub broker: BrokerSection,
    pub topics: LockTopics,
    pub reconnect: ReconnectPolicy,
    pub client_id: String,
}

impl MqttConfig {
    pub fn new(broker: BrokerSection, topics: LockTopics, reconnect: &ReconnectSection) -> Self {
        let client_id = broker
            .client_id
            .clone()
            .unwrap_or_else(|| generate_client_id(&broker.client_id_prefix));
        Self {
            broker,
            topics,
            reconnect: ReconnectPolicy::from(reconnect),
            client_id,
        }
    }

    /// URL handed to rumqttc. WebSocket transports need the full URL, the
    /// others take a bare host.
    pub fn broker_url(&self) -> String {
        let b = &self.broker;
        match (&b.path, b.use_tls) {
            (Some(path), true) => format!("wss://{}:{}{}", b.host, b.port, path),
            (Some(path), false) => format!("ws://{}:{}{}", b.host, b.port, path),
            (None, _) => b.host.clone(),
        }
    }

    pub fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, self.broker_url(), self.broker.port);
        options
            .set_keep_alive(Duration::from_secs(self.broker.keep_alive_secs))
            .set_clean_session(true)
            .set_transport(self.transport());
        options
    }

    fn transport(&self) -> Transport {
        match (&self.broker.path, self.broker.use_tls) {
            (Some(_), true) => Transport::wss_with_default_config(),
            (Some(_), false) => Transport::Ws,
            (None, true) => Transport::tls_with_default_config(),
            (None, false) => Transport::Tcp,
        }
    }
}

/// `<prefix>-<12 hex digits>`, 48 random bits per session.
pub fn generate_client_id(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", prefix, &suffix[..12])
}

/// Bounded exponential backoff after a lost connection. Zero retries keeps a
/// lost session lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl From<&ReconnectSection> for ReconnectPolicy {
    fn from(section: &ReconnectSection) -> Self {
        Self {
            max_retries: section.max_retries,
            initial_delay: Duration::from_millis(section.initial_delay_ms),
            max_delay: Duration::from_millis(section.max_delay_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (zero based), or `None` once the
    /// budget is spent.
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        let factor = 2u32.saturating_pow(attempt);
        Some(self.initial_delay.saturating_mul(factor).min(self.max_delay))
    }
}
