//! MQTT output
//!
//! Publishes sensor descriptions and measurements below `{root}/{center}`.

pub mod context;
pub mod publisher;
pub mod types;

pub use publisher::MqttPublisher;
pub use types::*;
