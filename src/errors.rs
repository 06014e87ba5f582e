//! Error types for the M-Bus Center bridge
//!
//! Uses thiserror for ergonomic error definitions.
//! These errors can be converted to anyhow::Error in the main application.

use crate::templates::MeasurementKind;

/// Failures talking to the M-Bus Center or interpreting what it sent back
#[derive(Debug, thiserror::Error)]
pub enum CenterError {
    #[error("Cannot connect to M-Bus Center at {url}: {reason}")]
    CannotConnect { url: String, reason: String },

    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("Asked for sensor {expected}, center answered for {found:?}")]
    IdentityMismatch { expected: u32, found: Option<u32> },

    #[error("Sensor {sensor_id} reports unsupported medium {medium:?}")]
    UnsupportedMedium {
        sensor_id: u32,
        medium: Option<String>,
    },

    #[error(
        "No template for version {version} with {register_count} registers \
         (manufacturer {manufacturer:?}, medium {medium:?})"
    )]
    UnknownTemplate {
        version: u32,
        register_count: usize,
        manufacturer: Option<String>,
        medium: Option<String>,
    },

    #[error(
        "Sensor {sensor_id} no longer matches its template: expected version {expected_version} \
         with {expected_count} registers, got version {found_version:?} with {found_count}"
    )]
    TemplateMismatch {
        sensor_id: u32,
        expected_version: u32,
        expected_count: usize,
        found_version: Option<u32>,
        found_count: usize,
    },

    #[error(transparent)]
    Structural(#[from] StructuralError),
}

impl CenterError {
    /// Whether the next scheduled poll may succeed without anything changing on our side.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            CenterError::CannotConnect { .. } | CenterError::MalformedResponse { .. }
        )
    }
}

/// A register did not look the way the device template says it should
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StructuralError {
    #[error("Missing register at position {position} for {name}")]
    MissingRegister { name: MeasurementKind, position: u32 },

    #[error("Register {position} for {name}: expected unit {expected:?}, found {found:?}")]
    UnitMismatch {
        name: MeasurementKind,
        position: u32,
        expected: &'static str,
        found: Option<String>,
    },

    #[error("Register {position} for {name}: expected description {expected:?}, found {found:?}")]
    DescriptionMismatch {
        name: MeasurementKind,
        position: u32,
        expected: &'static str,
        found: Option<String>,
    },

    #[error("Register {position} for {name} carries no numeric value")]
    MissingValue { name: MeasurementKind, position: u32 },
}

impl StructuralError {
    /// The measurement whose register failed validation.
    pub fn measurement(&self) -> MeasurementKind {
        match self {
            StructuralError::MissingRegister { name, .. }
            | StructuralError::UnitMismatch { name, .. }
            | StructuralError::DescriptionMismatch { name, .. }
            | StructuralError::MissingValue { name, .. } => *name,
        }
    }
}

/// Inconsistencies in the compiled-in template table
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Templates {first} and {second} share version {version} with {register_count} registers")]
    DuplicateKey {
        first: &'static str,
        second: &'static str,
        version: u32,
        register_count: usize,
    },

    #[error("Template {template} maps {name} to position {position} but only has {register_count} registers")]
    PositionOutOfRange {
        template: &'static str,
        name: MeasurementKind,
        position: u32,
        register_count: usize,
    },
}

/// MQTT connection and publishing errors
#[derive(Debug, thiserror::Error)]
pub enum MqttError {
    #[error("Failed to publish message to topic '{topic}': {reason}")]
    PublishFailed { topic: String, reason: String },

    #[error("Failed to serialize data: {error:?}")]
    SerializationError { error: serde_json::Error },
}
