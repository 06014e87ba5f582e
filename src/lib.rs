//! EMU M-Bus Center to MQTT Bridge
//!
//! Reads the meters attached to an EMU M-Bus Center, validates their register
//! dumps against known device templates and publishes the measurements to MQTT.

pub mod center;
pub mod config;
pub mod errors;
pub mod mqtt;
pub mod templates;

pub use center::CenterClient;
pub use config::Config;
pub use mqtt::publisher::MqttPublisher;
