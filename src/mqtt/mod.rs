//! # MQTT Session Module
//!
//! Connects the lock client to a publish/subscribe broker. The public
//! Eclipse broker is reached over secure WebSockets by default, and plain
//! MQTT over TLS or TCP can be configured.
//!
//! ```text
//! mqtt/
//! ├── config.rs           - broker options, client id, reconnect policy
//! ├── message_manager.rs  - inbound message envelope and loss reasons
//! └── mqtt_handler.rs     - session state machine and event loop
//! ```
//!
//! The session owns the rumqttc client and event loop exclusively. The UI only
//! ever sees a `watch` receiver of the lock state and a command sender.

pub mod config;
pub mod message_manager;
pub mod mqtt_handler;
