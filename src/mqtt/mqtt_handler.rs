//! Broker session state machine and event loop
//!
//! ```text
//! Configured ──connect()──► Running ──run_until_closed()──► Closed
//! ```
//!
//! The running session is a single tokio task. Broker events, UI commands and
//! the shutdown signal are multiplexed with `select!`, and each handler runs to
//! completion before the next one starts, so the [`LockClient`] inside needs
//! no locking.

use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, EventLoop, Outgoing, Packet, QoS};
use statum::{machine, state};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::config::{MqttConfig, ReconnectPolicy};
use super::message_manager::{ConnectionLost, LockMessage};
use crate::lock::{BrokerLink, LockClient, LockError, LockState};

const REQUEST_CAPACITY: usize = 10;
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
}

#[derive(Clone, Debug, Default)]
pub struct SessionStatus {
    pub connection_state: ConnectionState,
    pub error_messages: Vec<String>,
    pub messages_received: usize,
    pub messages_sent: usize,
    pub last_activity: Option<chrono::DateTime<chrono::Local>>,
}

impl SessionStatus {
    pub fn touch(&mut self) {
        self.last_activity = Some(chrono::Local::now());
    }
}

/// Requests from the UI thread to the session task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UiCommand {
    Toggle,
    RequestStatus,
}

impl BrokerLink for AsyncClient {
    fn subscribe(&self, topic: &str) -> Result<(), LockError> {
        self.try_subscribe(topic, QoS::AtMostOnce)
            .map_err(|e| LockError::Subscribe {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn publish(&self, topic: &str, payload: &str) -> Result<(), LockError> {
        self.try_publish(topic, QoS::AtMostOnce, false, payload.as_bytes().to_vec())
            .map_err(|e| LockError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }

    fn disconnect(&self) -> Result<(), LockError> {
        self.try_disconnect()
            .map_err(|e| LockError::Disconnect(e.to_string()))
    }
}

/// Lifecycle of one broker session
#[state]
#[derive(Debug, Clone)]
pub enum SessionPhase {
    Configured, // options built, nothing on the wire yet
    Running,    // event loop polled by run_until_closed
    Closed,     // loop left, status final
}

#[machine]
pub struct MqttSession<S: SessionPhase> {
    config: MqttConfig,
    commands: mpsc::Receiver<UiCommand>,
    shutdown: CancellationToken,
    client: LockClient<AsyncClient>,
    eventloop: Option<EventLoop>,
}

impl MqttSession<Configured> {
    pub fn create(
        config: MqttConfig,
        commands: mpsc::Receiver<UiCommand>,
        display: watch::Sender<LockState>,
        shutdown: CancellationToken,
    ) -> Self {
        info!(
            "Configuring MQTT session {} for {}",
            config.client_id,
            config.broker_url()
        );
        let (link, eventloop) = AsyncClient::new(config.mqtt_options(), REQUEST_CAPACITY);
        let client = LockClient::new(link, config.topics.clone(), display);

        Self::new(config, commands, shutdown, client, Some(eventloop))
    }

    pub fn connect(mut self) -> MqttSession<Running> {
        info!("Connecting to {}", self.config.broker_url());
        self.client.on_connecting();
        self.transition()
    }
}

impl MqttSession<Running> {
    /// Drives the session until shutdown, connection failure, or a lost
    /// connection with no reconnect budget left.
    pub async fn run_until_closed(mut self) -> MqttSession<Closed> {
        let Some(mut eventloop) = self.eventloop.take() else {
            error!("Session {} has no event loop", self.config.client_id);
            return self.transition();
        };
        let mut reconnect = ReconnectTracker::default();

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    self.close(&mut eventloop).await;
                    break;
                }
                command = self.commands.recv() => match command {
                    Some(command) => self.dispatch(command),
                    None => {
                        debug!("UI command channel closed");
                        self.close(&mut eventloop).await;
                        break;
                    }
                },
                event = eventloop.poll() => match event {
                    Ok(event) => {
                        if handle_event(&mut self.client, event) {
                            reconnect.connected();
                        }
                    }
                    Err(e) => {
                        match reconnect.on_error(&mut self.client, &self.config.reconnect, &e) {
                            AfterError::Close => break,
                            AfterError::RetryAfter(delay) => tokio::select! {
                                _ = tokio::time::sleep(delay) => self.client.on_connecting(),
                                _ = self.shutdown.cancelled() => break,
                            },
                        }
                    }
                },
            }
        }

        info!("MQTT session {} closed", self.config.client_id);
        self.transition()
    }

    fn dispatch(&mut self, command: UiCommand) {
        let result = match command {
            UiCommand::Toggle => self.client.toggle(),
            UiCommand::RequestStatus => self.client.request_status(),
        };
        if let Err(e) = result {
            error!("{}", e);
        }
    }

    /// Sends DISCONNECT and polls until it is flushed or the timeout hits.
    async fn close(&mut self, eventloop: &mut EventLoop) {
        if let Err(e) = self.client.disconnect() {
            warn!("{}", e);
        }

        let drain = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(event) => debug!("Draining {:?}", event),
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_TIMEOUT, drain).await.is_err() {
            warn!("Disconnect not flushed within {:?}", DISCONNECT_TIMEOUT);
        }

        self.client.on_connection_lost(&ConnectionLost::clean());
    }
}

impl MqttSession<Closed> {
    pub fn into_status(self) -> SessionStatus {
        self.client.status().clone()
    }
}

/// What the run loop does after the event loop reported an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterError {
    Close,
    RetryAfter(Duration),
}

/// Reconnect bookkeeping of one session. The attempt counter is reset by
/// every completed handshake.
#[derive(Debug, Default)]
pub struct ReconnectTracker {
    attempt: u32,
    ever_connected: bool,
}

impl ReconnectTracker {
    pub fn connected(&mut self) {
        self.ever_connected = true;
        self.attempt = 0;
    }

    /// Reports the error to the client and decides whether to poll again.
    ///
    /// Errors before the first ConnAck are a terminal connection failure.
    /// Later errors are losses and are retried while the policy allows.
    pub fn on_error<L: BrokerLink>(
        &mut self,
        client: &mut LockClient<L>,
        policy: &ReconnectPolicy,
        err: &ConnectionError,
    ) -> AfterError {
        if !self.ever_connected {
            client.on_connection_failed(&err.to_string());
            return AfterError::Close;
        }

        let lost = ConnectionLost::from_connection_error(err);
        client.on_connection_lost(&lost);
        if lost.is_clean() {
            return AfterError::Close;
        }

        match policy.delay_for(self.attempt) {
            Some(delay) => {
                self.attempt += 1;
                warn!("Reconnecting in {:?} (attempt {})", delay, self.attempt);
                AfterError::RetryAfter(delay)
            }
            None => AfterError::Close,
        }
    }
}

/// Routes one broker event into the lock client. Returns `true` when the
/// event completed the connection handshake.
pub fn handle_event<L: BrokerLink>(client: &mut LockClient<L>, event: Event) -> bool {
    match event {
        Event::Incoming(Packet::ConnAck(ack)) => {
            debug!("ConnAck: {:?}", ack.code);
            client.on_connected();
            true
        }
        Event::Incoming(Packet::Publish(publish)) => {
            match LockMessage::from_publish(&publish.topic, &publish.payload) {
                Some(message) => {
                    debug!("Received {}", message);
                    client.on_message_arrived(&message);
                }
                None => debug!("Dropping non UTF-8 payload on '{}'", publish.topic),
            }
            false
        }
        Event::Incoming(Packet::SubAck(ack)) => {
            debug!("Subscription {} acknowledged", ack.pkid);
            false
        }
        Event::Outgoing(outgoing) => {
            debug!("Outgoing {:?}", outgoing);
            false
        }
        other => {
            debug!("Unhandled event: {:?}", other);
            false
        }
    }
}

/// Starts a session on its own task. The handle resolves to the final status.
pub fn spawn(
    config: MqttConfig,
    commands: mpsc::Receiver<UiCommand>,
    display: watch::Sender<LockState>,
    shutdown: CancellationToken,
) -> JoinHandle<SessionStatus> {
    tokio::spawn(async move {
        let session =
            MqttSession::<Configured>::create(config, commands, display, shutdown).connect();
        session.run_until_closed().await.into_status()
    })
}
