//! Register extraction and whole-device parsing
//!
//! Extraction is strict: a register that does not carry the unit and description
//! its template declares fails the whole device, so a confused center never
//! produces a partially wrong measurement set.

use super::types::{
    DeviceTemplate, Measurement, RawRegister, RegisterAttributes, RegisterDescriptor,
};
use crate::errors::StructuralError;

/// Extracts one named value from a meter's register dump.
pub fn extract(
    registers: &[RawRegister],
    descriptor: &RegisterDescriptor,
) -> Result<Measurement, StructuralError> {
    let name = descriptor.name;
    let position = descriptor.position;

    let raw = registers
        .iter()
        .find(|r| r.position == Some(position))
        .ok_or(StructuralError::MissingRegister { name, position })?;

    if !raw.unit_str.as_deref().is_some_and(|u| descriptor.accepts_unit(u)) {
        return Err(StructuralError::UnitMismatch {
            name,
            position,
            expected: descriptor.unit,
            found: raw.unit_str.clone(),
        });
    }

    if let Some(expected) = descriptor.description {
        if raw.description_str.as_deref() != Some(expected) {
            return Err(StructuralError::DescriptionMismatch {
                name,
                position,
                expected,
                found: raw.description_str.clone(),
            });
        }
    }

    let value = raw
        .logger_last_value
        .ok_or(StructuralError::MissingValue { name, position })?;

    let value = if descriptor.scaled {
        value / divisor(raw.cfg_factor)
    } else {
        value
    };

    Ok(Measurement {
        name,
        value,
        attributes: RegisterAttributes::from_raw(raw),
    })
}

/// An absent or zero calibration factor leaves the value as reported.
fn divisor(cfg_factor: Option<f64>) -> f64 {
    match cfg_factor {
        Some(f) if f != 0.0 => f,
        _ => 1.0,
    }
}

/// Extracts every register the template declares, in declaration order.
///
/// The first failing register aborts the parse; no partial results are returned.
pub fn parse(
    registers: &[RawRegister],
    template: &DeviceTemplate,
) -> Result<Vec<Measurement>, StructuralError> {
    template
        .registers
        .iter()
        .map(|descriptor| extract(registers, descriptor))
        .collect()
}
