//! # Lock Client
//!
//! Owns the lock's displayed state and mediates between the user interface and
//! the broker session. The client never talks to the network directly. Every
//! outbound request goes through a [`BrokerLink`], which keeps the dispatch
//! rules testable without a broker.
//!
//! ## Lifecycle
//!
//! ```text
//! connect ──► on_connected ──► subscribe(command) ──► subscribe(status_response)
//!                                                         │
//!                                                         ▼
//!                                                  request_status
//!                                                         │
//!      toggle ──► publish(command, complement)            ▼
//!                                   on_message_arrived ◄── broker
//! ```
//!
//! ## Single Writer
//! [`LockClient::on_message_arrived`] is the only code path that changes the
//! displayed state. `toggle` reads the state field, publishes the requested
//! value and leaves the state alone until the actuator's reply round-trips
//! back through the broker.

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use super::{LockError, LockState, STATUS_REQUEST};
use crate::mqtt::message_manager::{ConnectionLost, LockMessage};
use crate::mqtt::mqtt_handler::{ConnectionState, SessionStatus};

/// Outbound side of a broker session.
///
/// Implementations must not block: requests are queued and resolved by the
/// session's event loop.
pub trait BrokerLink {
    fn subscribe(&self, topic: &str) -> Result<(), LockError>;
    fn publish(&self, topic: &str, payload: &str) -> Result<(), LockError>;
    fn disconnect(&self) -> Result<(), LockError>;
}

/// The two channels the client listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockTopics {
    /// Commands and status echoes (`smartdoorlock` by default)
    pub command: String,
    /// Replies from the actuator
    pub status_response: String,
}

impl LockTopics {
    pub fn contains(&self, topic: &str) -> bool {
        topic == self.command || topic == self.status_response
    }
}

pub struct LockClient<L: BrokerLink> {
    link: L,
    topics: LockTopics,
    state: LockState,
    display: watch::Sender<LockState>,
    status: SessionStatus,
}

impl<L: BrokerLink> LockClient<L> {
    pub fn new(link: L, topics: LockTopics, display: watch::Sender<LockState>) -> Self {
        display.send_replace(LockState::Unknown);
        Self {
            link,
            topics,
            state: LockState::Unknown,
            display,
            status: SessionStatus::default(),
        }
    }

    pub fn state(&self) -> LockState {
        self.state
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    #[cfg(test)]
    pub fn link(&self) -> &L {
        &self.link
    }

    /// Marks the session as handshaking with the broker.
    pub fn on_connecting(&mut self) {
        self.status.connection_state = ConnectionState::Connecting;
    }

    /// Subscribes to both topics and asks the actuator for its current state.
    ///
    /// Each step is best-effort: a failed subscription is logged and the
    /// remaining steps still run.
    pub fn on_connected(&mut self) {
        info!("Connected to MQTT broker");
        self.status.connection_state = ConnectionState::Connected;
        self.status.touch();

        for topic in [&self.topics.command, &self.topics.status_response] {
            match self.link.subscribe(topic) {
                Ok(()) => debug!("Subscription to '{}' queued", topic),
                Err(e) => {
                    error!("{}", e);
                    self.status.error_messages.push(e.to_string());
                }
            }
        }

        if let Err(e) = self.request_status() {
            error!("{}", e);
        }
    }

    /// Terminal failure before the session ever came up.
    pub fn on_connection_failed(&mut self, reason: &str) {
        error!("Connection failed: {}", reason);
        self.status.connection_state = ConnectionState::Failed;
        self.status
            .error_messages
            .push(format!("Connection failed: {}", reason));
    }

    /// Applies an inbound message to the displayed state.
    ///
    /// Returns the new state when the message carried one. Messages on foreign
    /// topics or with unrecognised payloads leave the state untouched.
    pub fn on_message_arrived(&mut self, message: &LockMessage) -> Option<LockState> {
        self.status.messages_received += 1;
        self.status.touch();

        if !self.topics.contains(message.topic()) {
            debug!("Ignoring message on foreign topic '{}'", message.topic());
            return None;
        }

        let state = LockState::from_payload(message.payload())?;
        if state != self.state {
            info!("Lock state changed: {} -> {}", self.state, state);
        }
        self.state = state;
        self.display.send_replace(state);
        Some(state)
    }

    /// Records the loss of an established session. No reconnect is attempted
    /// from here.
    pub fn on_connection_lost(&mut self, info: &ConnectionLost) {
        self.status.connection_state = ConnectionState::Disconnected;
        if info.is_clean() {
            return;
        }
        error!("Connection lost: {}", info);
        self.status.error_messages.push(info.to_string());
    }

    /// Fire-and-forget request for the actuator to republish its state.
    pub fn request_status(&mut self) -> Result<(), LockError> {
        self.publish(STATUS_REQUEST)
    }

    /// Publishes the complement of the current state as the desired state.
    ///
    /// The displayed state does not change until a matching status arrives.
    pub fn toggle(&mut self) -> Result<(), LockError> {
        let payload = self.state.toggled_payload();
        info!("Requesting '{}' (currently {})", payload, self.state);
        self.publish(payload)
    }

    pub fn disconnect(&mut self) -> Result<(), LockError> {
        self.link.disconnect()
    }

    fn publish(&mut self, payload: &str) -> Result<(), LockError> {
        if self.status.connection_state != ConnectionState::Connected {
            warn!(
                "Publishing '{}' while session is {:?}",
                payload, self.status.connection_state
            );
        }
        self.link.publish(&self.topics.command, payload)?;
        self.status.messages_sent += 1;
        self.status.touch();
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::lock::{LOCKED, UNLOCKED};
    use crate::mqtt::message_manager::LossCode;
    use proptest::prelude::*;
    use std::cell::RefCell;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum Sent {
        Subscribe(String),
        Publish(String, String),
        Disconnect,
    }

    #[derive(Default)]
    pub struct RecordingLink {
        pub sent: RefCell<Vec<Sent>>,
        pub reject_publish: bool,
    }

    impl RecordingLink {
        pub fn publishes(&self) -> Vec<(String, String)> {
            self.sent
                .borrow()
                .iter()
                .filter_map(|s| match s {
                    Sent::Publish(t, p) => Some((t.clone(), p.clone())),
                    _ => None,
                })
                .collect()
        }
    }

    impl BrokerLink for RecordingLink {
        fn subscribe(&self, topic: &str) -> Result<(), LockError> {
            self.sent.borrow_mut().push(Sent::Subscribe(topic.to_string()));
            Ok(())
        }

        fn publish(&self, topic: &str, payload: &str) -> Result<(), LockError> {
            if self.reject_publish {
                return Err(LockError::Publish {
                    topic: topic.to_string(),
                    reason: "request queue full".to_string(),
                });
            }
            self.sent
                .borrow_mut()
                .push(Sent::Publish(topic.to_string(), payload.to_string()));
            Ok(())
        }

        fn disconnect(&self) -> Result<(), LockError> {
            self.sent.borrow_mut().push(Sent::Disconnect);
            Ok(())
        }
    }

    pub fn topics() -> LockTopics {
        LockTopics {
            command: "smartdoorlock".to_string(),
            status_response: "smartdoorlock/status".to_string(),
        }
    }

    fn client() -> (LockClient<RecordingLink>, watch::Receiver<LockState>) {
        let (tx, rx) = watch::channel(LockState::Unknown);
        (LockClient::new(RecordingLink::default(), topics(), tx), rx)
    }

    fn connected_client() -> (LockClient<RecordingLink>, watch::Receiver<LockState>) {
        let (mut client, rx) = client();
        client.on_connected();
        client.link().sent.borrow_mut().clear();
        (client, rx)
    }

    fn msg(topic: &str, payload: &str) -> LockMessage {
        LockMessage::from_topic(topic.to_string(), payload.to_string())
    }

    fn any_state() -> impl Strategy<Value = LockState> {
        prop_oneof![
            Just(LockState::Unknown),
            Just(LockState::Locked),
            Just(LockState::Unlocked),
        ]
    }

    fn client_in(state: LockState) -> (LockClient<RecordingLink>, watch::Receiver<LockState>) {
        let (mut client, rx) = connected_client();
        if let Some(payload) = match state {
            LockState::Locked => Some(LOCKED),
            LockState::Unlocked => Some(UNLOCKED),
            LockState::Unknown => None,
        } {
            client.on_message_arrived(&msg("smartdoorlock", payload));
        }
        (client, rx)
    }

    proptest! {
        #[test]
        fn locked_payload_always_locks(prior in any_state(), on_status in any::<bool>()) {
            let (mut client, rx) = client_in(prior);
            let topic = if on_status { "smartdoorlock/status" } else { "smartdoorlock" };
            client.on_message_arrived(&msg(topic, "locked"));
            prop_assert_eq!(client.state(), LockState::Locked);
            prop_assert_eq!(*rx.borrow(), LockState::Locked);
        }

        #[test]
        fn unlocked_payload_always_unlocks(prior in any_state(), on_status in any::<bool>()) {
            let (mut client, rx) = client_in(prior);
            let topic = if on_status { "smartdoorlock/status" } else { "smartdoorlock" };
            client.on_message_arrived(&msg(topic, "unlocked"));
            prop_assert_eq!(client.state(), LockState::Unlocked);
            prop_assert_eq!(*rx.borrow(), LockState::Unlocked);
        }

        #[test]
        fn other_payloads_leave_state_unchanged(prior in any_state(), payload in ".*") {
            prop_assume!(payload != "locked" && payload != "unlocked");
            let (mut client, rx) = client_in(prior);
            prop_assert_eq!(client.on_message_arrived(&msg("smartdoorlock", &payload)), None);
            prop_assert_eq!(client.state(), prior);
            prop_assert_eq!(*rx.borrow(), prior);
        }

        #[test]
        fn foreign_topics_leave_state_unchanged(
            prior in any_state(),
            topic in "[a-z/]{0,24}",
            locked in any::<bool>(),
        ) {
            prop_assume!(topic != "smartdoorlock" && topic != "smartdoorlock/status");
            let (mut client, _rx) = client_in(prior);
            let payload = if locked { "locked" } else { "unlocked" };
            client.on_message_arrived(&msg(&topic, payload));
            prop_assert_eq!(client.state(), prior);
        }

        #[test]
        fn toggle_publishes_complement_of_displayed_state(prior in any_state()) {
            let (mut client, _rx) = client_in(prior);
            client.link().sent.borrow_mut().clear();
            client.toggle().unwrap();
            let expected = if prior == LockState::Locked { "unlocked" } else { "locked" };
            prop_assert_eq!(
                client.link().publishes(),
                vec![("smartdoorlock".to_string(), expected.to_string())]
            );
            prop_assert_eq!(client.state(), prior);
        }
    }

    #[test]
    fn connect_subscribes_both_topics_then_requests_status_once() {
        let (mut client, _rx) = client();
        client.on_connecting();
        client.on_connected();

        assert_eq!(
            *client.link().sent.borrow(),
            vec![
                Sent::Subscribe("smartdoorlock".to_string()),
                Sent::Subscribe("smartdoorlock/status".to_string()),
                Sent::Publish("smartdoorlock".to_string(), "status_request".to_string()),
            ]
        );
        assert_eq!(client.status().connection_state, ConnectionState::Connected);
        assert_eq!(client.status().messages_sent, 1);
    }

    #[test]
    fn status_reply_after_connect_shows_locked_in_red() {
        let (mut client, rx) = client();
        assert_eq!(*rx.borrow(), LockState::Unknown);

        client.on_connected();
        let requests = client
            .link()
            .publishes()
            .into_iter()
            .filter(|(_, p)| p == "status_request")
            .count();
        assert_eq!(requests, 1);

        client.on_message_arrived(&msg("smartdoorlock/status", "locked"));

        let shown = *rx.borrow();
        assert_eq!(shown.label(), "Door Locked");
        assert_eq!(shown.tint(), crate::lock::Tint::Red);
        assert_ne!(shown.tint(), crate::lock::Tint::Green);
    }

    #[test]
    fn toggle_from_locked_publishes_unlocked_without_changing_display() {
        let (mut client, rx) = client_in(LockState::Locked);
        client.link().sent.borrow_mut().clear();

        client.toggle().unwrap();

        assert_eq!(
            client.link().publishes(),
            vec![("smartdoorlock".to_string(), "unlocked".to_string())]
        );
        assert_eq!(*rx.borrow(), LockState::Locked);
        assert_eq!(rx.borrow().label(), "Door Locked");
    }

    #[test]
    fn echoed_command_flips_the_next_toggle() {
        let (mut client, _rx) = client_in(LockState::Locked);
        client.link().sent.borrow_mut().clear();

        client.toggle().unwrap();
        // the broker echoes our own command back on the command topic
        client.on_message_arrived(&msg("smartdoorlock", "unlocked"));
        client.toggle().unwrap();

        let payloads: Vec<String> = client
            .link()
            .publishes()
            .into_iter()
            .map(|(_, p)| p)
            .collect();
        assert_eq!(payloads, vec!["unlocked", "locked"]);
    }

    #[test]
    fn status_request_echo_is_ignored() {
        let (mut client, _rx) = client_in(LockState::Unlocked);
        assert_eq!(
            client.on_message_arrived(&msg("smartdoorlock", "status_request")),
            None
        );
        assert_eq!(client.state(), LockState::Unlocked);
    }

    #[test]
    fn clean_loss_records_no_error() {
        let (mut client, rx) = client_in(LockState::Locked);
        client.on_connection_lost(&ConnectionLost::new(LossCode::Ok, "closed"));

        assert!(client.status().error_messages.is_empty());
        assert_eq!(client.status().connection_state, ConnectionState::Disconnected);
        assert_eq!(*rx.borrow(), LockState::Locked);
    }

    #[test]
    fn error_loss_records_one_error_and_sends_nothing() {
        let (mut client, rx) = client_in(LockState::Locked);
        client.link().sent.borrow_mut().clear();

        client.on_connection_lost(&ConnectionLost::new(LossCode::SocketClose, "reset by peer"));

        assert_eq!(client.status().error_messages.len(), 1);
        assert_eq!(client.status().connection_state, ConnectionState::Disconnected);
        assert!(client.link().sent.borrow().is_empty());
        assert_eq!(*rx.borrow(), LockState::Locked);
    }

    #[test]
    fn connection_failure_is_terminal() {
        let (mut client, _rx) = client();
        client.on_connecting();
        client.on_connection_failed("dns error");

        assert_eq!(client.status().connection_state, ConnectionState::Failed);
        assert_eq!(client.status().error_messages, vec!["Connection failed: dns error"]);
        assert!(client.link().sent.borrow().is_empty());
    }

    #[test]
    fn rejected_publish_is_reported_and_not_counted() {
        let (tx, _rx) = watch::channel(LockState::Unknown);
        let link = RecordingLink {
            reject_publish: true,
            ..Default::default()
        };
        let mut client = LockClient::new(link, topics(), tx);

        let err = client.toggle().unwrap_err();
        assert!(matches!(err, LockError::Publish { .. }));
        assert_eq!(client.status().messages_sent, 0);
    }
}
