//! Data model shared by the template registry, the extractor and the publisher

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Unit string the center reports for volumes.
pub const VOLUME_UNIT: &str = "m³";

/// ASCII spelling of [`VOLUME_UNIT`] emitted by some firmware.
pub const VOLUME_UNIT_ASCII: &str = "m^3";

/// Identity of a device template, as persisted in the sensor configuration.
///
/// Parsing is case-insensitive on the identifier, so the enum names older
/// configurations were written with (`ALLROUNDER_v16_17val`) still load, as do
/// the human readable labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TemplateId {
    Emu140V4Values15,
    AllrounderV16Values15,
    AllrounderV16Values17,
    ProfessionalV16Values31,
    ProfessionalV16Values32,
    ProfessionalV25Values24,
    GwfWaterValues2,
}

impl TemplateId {
    pub const ALL: [TemplateId; 7] = [
        TemplateId::Emu140V4Values15,
        TemplateId::AllrounderV16Values15,
        TemplateId::AllrounderV16Values17,
        TemplateId::ProfessionalV16Values31,
        TemplateId::ProfessionalV16Values32,
        TemplateId::ProfessionalV25Values24,
        TemplateId::GwfWaterValues2,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TemplateId::Emu140V4Values15 => "emu_1_40_v4_15val",
            TemplateId::AllrounderV16Values15 => "allrounder_v16_15val",
            TemplateId::AllrounderV16Values17 => "allrounder_v16_17val",
            TemplateId::ProfessionalV16Values31 => "professional_v16_31val",
            TemplateId::ProfessionalV16Values32 => "professional_v16_32val",
            TemplateId::ProfessionalV25Values24 => "professional_v25_24val",
            TemplateId::GwfWaterValues2 => "gwf_water_2val",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TemplateId::Emu140V4Values15 => "EMU 1/40 | Firmware Version 4 | 15 Values",
            TemplateId::AllrounderV16Values15 => "EMU Allrounder | Firmware Version 16 | 15 Values",
            TemplateId::AllrounderV16Values17 => "EMU Allrounder | Firmware Version 16 | 17 Values",
            TemplateId::ProfessionalV16Values31 => {
                "EMU Professional | Firmware Version 16 | 31 Values"
            }
            TemplateId::ProfessionalV16Values32 => {
                "EMU Professional | Firmware Version 16 | 32 Values"
            }
            TemplateId::ProfessionalV25Values24 => {
                "EMU Professional | Firmware Version 25 | 24 Values"
            }
            TemplateId::GwfWaterValues2 => "GWF Water Meter | 2 Values",
        }
    }
}

impl fmt::Display for TemplateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TemplateId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateId::ALL
            .into_iter()
            .find(|id| id.as_str().eq_ignore_ascii_case(s) || id.label() == s)
            .ok_or_else(|| format!("Unknown device template {s}"))
    }
}

impl Serialize for TemplateId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TemplateId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(de::Error::custom)
    }
}

/// Physical quantity a meter measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Medium {
    Electricity,
    Water,
}

impl Medium {
    /// Media the bridge has templates for.
    pub const SUPPORTED: [Medium; 2] = [Medium::Electricity, Medium::Water];

    /// Classifies the center's `Medium` string; `None` for anything we cannot handle.
    pub fn parse(medium: &str) -> Option<Medium> {
        Medium::SUPPORTED.into_iter().find(|m| m.as_str() == medium)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Medium::Electricity => "Electricity",
            Medium::Water => "Water",
        }
    }
}

/// How a value evolves over time, as understood by home automation hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    Measurement,
    Total,
    TotalIncreasing,
}

macro_rules! measurement_kinds {
    ($($variant:ident => $name:literal, $unit:expr, $state:ident;)+) => {
        /// Every named value a template can extract.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum MeasurementKind {
            $($variant,)+
        }

        impl MeasurementKind {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(MeasurementKind::$variant => $name,)+
                }
            }

            /// Unit of the scaled value, if it has one.
            pub fn unit(&self) -> Option<&'static str> {
                match self {
                    $(MeasurementKind::$variant => $unit,)+
                }
            }

            pub fn state_class(&self) -> StateClass {
                match self {
                    $(MeasurementKind::$variant => StateClass::$state,)+
                }
            }
        }
    };
}

measurement_kinds! {
    ActiveEnergyTariff1 => "active_energy_tariff_1", Some("kWh"), TotalIncreasing;
    ActiveEnergyTariff2 => "active_energy_tariff_2", Some("kWh"), TotalIncreasing;
    ActiveEnergyImport => "active_energy_import", Some("kWh"), TotalIncreasing;
    ActiveEnergyImportResettable => "active_energy_import_resettable", Some("kWh"), Total;
    ActiveEnergyImportTariff1 => "active_energy_import_tariff_1", Some("kWh"), TotalIncreasing;
    ActiveEnergyImportTariff2 => "active_energy_import_tariff_2", Some("kWh"), TotalIncreasing;
    ActiveEnergyExportTariff1 => "active_energy_export_tariff_1", Some("kWh"), TotalIncreasing;
    ActiveEnergyExportTariff2 => "active_energy_export_tariff_2", Some("kWh"), TotalIncreasing;
    ReactiveEnergyInductiveTariff1 => "reactive_energy_inductive_tariff_1", None, Measurement;
    ReactiveEnergyInductiveTariff2 => "reactive_energy_inductive_tariff_2", None, Measurement;
    ReactiveEnergyCapacitiveTariff1 => "reactive_energy_capacitive_tariff_1", None, Measurement;
    ReactiveEnergyCapacitiveTariff2 => "reactive_energy_capacitive_tariff_2", None, Measurement;
    ActivePower => "active_power", Some("kW"), Measurement;
    ActivePowerPhase1 => "active_power_phase_1", Some("kW"), Measurement;
    ActivePowerPhase2 => "active_power_phase_2", Some("kW"), Measurement;
    ActivePowerPhase3 => "active_power_phase_3", Some("kW"), Measurement;
    ActivePowerAllPhases => "active_power_all_phases", Some("kW"), Measurement;
    ReactivePowerPhase1 => "reactive_power_phase_1", Some("VAr"), Measurement;
    ReactivePowerPhase2 => "reactive_power_phase_2", Some("VAr"), Measurement;
    ReactivePowerPhase3 => "reactive_power_phase_3", Some("VAr"), Measurement;
    ReactivePowerAllPhases => "reactive_power_all_phases", Some("VAr"), Measurement;
    ApparentPowerAllPhases => "apparent_power_all_phases", Some("VA"), Measurement;
    Voltage => "voltage", Some("V"), Measurement;
    VoltagePhase1 => "voltage_phase_1", Some("V"), Measurement;
    VoltagePhase2 => "voltage_phase_2", Some("V"), Measurement;
    VoltagePhase3 => "voltage_phase_3", Some("V"), Measurement;
    Current => "current", Some("A"), Measurement;
    CurrentPhase1 => "current_phase_1", Some("A"), Measurement;
    CurrentPhase2 => "current_phase_2", Some("A"), Measurement;
    CurrentPhase3 => "current_phase_3", Some("A"), Measurement;
    CurrentAllPhases => "current_all_phases", Some("A"), Measurement;
    FormFactor => "form_factor", None, Measurement;
    FormFactorPhase1 => "form_factor_phase_1", None, Measurement;
    FormFactorPhase2 => "form_factor_phase_2", None, Measurement;
    FormFactorPhase3 => "form_factor_phase_3", None, Measurement;
    Frequency => "frequency", Some("Hz"), Measurement;
    PowerFailures => "power_failures", None, Measurement;
    CurrentTransformerFactor => "current_transformer_factor", None, Measurement;
    ErrorFlags => "error_flags", None, Measurement;
    SerialNo => "serial_no", None, Measurement;
    Volume => "volume", Some("m³"), TotalIncreasing;
}

impl fmt::Display for MeasurementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for MeasurementKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Where a measurement lives in a meter's register dump and what it must look like.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterDescriptor {
    pub name: MeasurementKind,
    pub position: u32,
    pub unit: &'static str,
    /// `None` accepts any description.
    pub description: Option<&'static str>,
    /// Divide the raw value by the register's `CfgFactor`.
    pub scaled: bool,
}

impl RegisterDescriptor {
    pub const fn new(
        name: MeasurementKind,
        position: u32,
        unit: &'static str,
        description: Option<&'static str>,
        scaled: bool,
    ) -> Self {
        Self {
            name,
            position,
            unit,
            description,
            scaled,
        }
    }

    /// Whether a register's reported unit satisfies this descriptor.
    ///
    /// Volumes also accept the ASCII spelling.
    pub fn accepts_unit(&self, found: &str) -> bool {
        found == self.unit || (self.unit == VOLUME_UNIT && found == VOLUME_UNIT_ASCII)
    }
}

/// Register layout for one hardware/firmware combination.
#[derive(Debug, PartialEq)]
pub struct DeviceTemplate {
    pub id: TemplateId,
    pub firmware_version: u32,
    pub register_count: usize,
    pub model_name: &'static str,
    pub manufacturer_name: &'static str,
    pub registers: &'static [RegisterDescriptor],
}

impl DeviceTemplate {
    /// The `(firmware version, register count)` pair this template is looked up by.
    pub fn key(&self) -> (u32, usize) {
        (self.firmware_version, self.register_count)
    }
}

/// One entry of a device's `ValueDescs` array.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawRegister {
    #[serde(default, deserialize_with = "lenient::u32")]
    pub position: Option<u32>,
    #[serde(default)]
    pub unit_str: Option<String>,
    #[serde(default)]
    pub description_str: Option<String>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub logger_last_value: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub cfg_factor: Option<f64>,
    #[serde(default, deserialize_with = "lenient::f64")]
    pub scale_power: Option<f64>,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub scale_mantissa: Option<i64>,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub tariff: Option<i64>,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub cfg_phase: Option<i64>,
    #[serde(default, deserialize_with = "lenient::i64")]
    pub cfg_tariff: Option<i64>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub values: Vec<RawValue>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RawValue {
    /// Unix seconds
    #[serde(default, deserialize_with = "lenient::i64")]
    pub timestamp: Option<i64>,
}

/// Diagnostic fields copied from the raw register alongside each value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegisterAttributes {
    pub scale_power: Option<f64>,
    pub scale_mantissa: Option<i64>,
    pub tariff: Option<i64>,
    pub cfg_phase: Option<i64>,
    pub cfg_factor: Option<f64>,
    pub cfg_tariff: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl RegisterAttributes {
    pub fn from_raw(raw: &RawRegister) -> Self {
        Self {
            scale_power: raw.scale_power,
            scale_mantissa: raw.scale_mantissa,
            tariff: raw.tariff,
            cfg_phase: raw.cfg_phase,
            cfg_factor: raw.cfg_factor,
            cfg_tariff: raw.cfg_tariff,
            timestamp: raw
                .values
                .first()
                .and_then(|v| v.timestamp)
                .and_then(|ts| DateTime::from_timestamp(ts, 0)),
        }
    }
}

/// A validated, scaled value extracted from one register.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    pub name: MeasurementKind,
    pub value: f64,
    pub attributes: RegisterAttributes,
}

/// The center is inconsistent about numbers: serials and versions arrive as
/// strings on some firmware and as numbers on others. Values that are neither
/// read as absent.
pub(crate) mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    fn number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Value>, D::Error> {
        Ok(match Option::<Value>::deserialize(deserializer)? {
            Some(Value::String(s)) => {
                let s = s.trim();
                if let Ok(i) = s.parse::<i64>() {
                    Some(Value::from(i))
                } else if let Ok(u) = s.parse::<u64>() {
                    Some(Value::from(u))
                } else {
                    s.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                }
            }
            other => other,
        })
    }

    /// A float that is a whole number in `[min, max)`.
    fn integral(v: &Value, min: f64, max: f64) -> Option<f64> {
        v.as_f64().filter(|f| f.fract() == 0.0 && *f >= min && *f < max)
    }

    pub fn f64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<f64>, D::Error> {
        Ok(number(deserializer)?.and_then(|v| v.as_f64()))
    }

    pub fn i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
        Ok(number(deserializer)?.and_then(|v| {
            v.as_i64().or_else(|| {
                integral(&v, i64::MIN as f64, i64::MAX as f64).map(|f| f as i64)
            })
        }))
    }

    pub fn u64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
        Ok(number(deserializer)?.and_then(|v| {
            v.as_u64()
                .or_else(|| integral(&v, 0.0, u64::MAX as f64).map(|f| f as u64))
        }))
    }

    pub fn u32<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u32>, D::Error> {
        Ok(u64(deserializer)?.and_then(|v| u32::try_from(v).ok()))
    }

    /// A `null` list reads as empty.
    pub fn list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: Deserialize<'de>,
    {
        Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_id_accepts_legacy_spellings() {
        let id: TemplateId = serde_json::from_str("\"ALLROUNDER_v16_17val\"").unwrap();
        assert_eq!(id, TemplateId::AllrounderV16Values17);

        let id: TemplateId = serde_json::from_str("\"gwf_water_2val\"").unwrap();
        assert_eq!(id, TemplateId::GwfWaterValues2);

        let id: TemplateId =
            serde_json::from_str("\"EMU 1/40 | Firmware Version 4 | 15 Values\"").unwrap();
        assert_eq!(id, TemplateId::Emu140V4Values15);

        let id: TemplateId = "EMU Professional | Firmware Version 25 | 24 Values"
            .parse()
            .unwrap();
        assert_eq!(id, TemplateId::ProfessionalV25Values24);

        assert!("EMU Toaster".parse::<TemplateId>().is_err());
    }

    #[test]
    fn test_template_id_serializes_to_identifier() {
        let json = serde_json::to_string(&TemplateId::Emu140V4Values15).unwrap();
        assert_eq!(json, "\"emu_1_40_v4_15val\"");
    }

    #[test]
    fn test_medium_parse() {
        assert_eq!(Medium::parse("Electricity"), Some(Medium::Electricity));
        assert_eq!(Medium::parse("Water"), Some(Medium::Water));
        assert_eq!(Medium::parse("Heat"), None);
        assert_eq!(Medium::parse("water"), None);
    }

    #[test]
    fn test_volume_unit_tolerance() {
        let volume = RegisterDescriptor::new(MeasurementKind::Volume, 1, VOLUME_UNIT, None, false);
        assert!(volume.accepts_unit("m³"));
        assert!(volume.accepts_unit("m^3"));
        assert!(!volume.accepts_unit("m3"));
        assert!(!volume.accepts_unit("l"));

        let power = RegisterDescriptor::new(MeasurementKind::ActivePower, 3, "W", None, true);
        assert!(power.accepts_unit("W"));
        assert!(!power.accepts_unit("m^3"));
        assert!(!power.accepts_unit("kW"));
    }

    #[test]
    fn test_raw_register_lenient_numbers() {
        let raw: RawRegister = serde_json::from_str(
            r#"{
                "Position": "7",
                "UnitStr": "None",
                "LoggerLastValue": "12345678",
                "CfgFactor": 0,
                "ScaleMantissa": 1.0,
                "Tariff": null,
                "CfgPhase": "n/a",
                "Values": [{"Timestamp": 1700000000}]
            }"#,
        )
        .unwrap();

        assert_eq!(raw.position, Some(7));
        assert_eq!(raw.logger_last_value, Some(12345678.0));
        assert_eq!(raw.cfg_factor, Some(0.0));
        assert_eq!(raw.scale_mantissa, Some(1));
        assert_eq!(raw.tariff, None);
        assert_eq!(raw.cfg_phase, None);
        assert_eq!(raw.description_str, None);

        let attributes = RegisterAttributes::from_raw(&raw);
        assert_eq!(
            attributes.timestamp.map(|t| t.timestamp()),
            Some(1_700_000_000)
        );
    }

    #[test]
    fn test_lenient_integers_stay_in_range() {
        #[derive(Deserialize)]
        struct Numbers {
            #[serde(default, deserialize_with = "lenient::u64")]
            unsigned: Option<u64>,
            #[serde(default, deserialize_with = "lenient::i64")]
            signed: Option<i64>,
            #[serde(default, deserialize_with = "lenient::u32")]
            small: Option<u32>,
        }
        let read = |json: &str| serde_json::from_str::<Numbers>(json).unwrap();

        let n = read(r#"{"unsigned": "18446744073709551615", "signed": "-42", "small": "4294967295"}"#);
        assert_eq!(n.unsigned, Some(u64::MAX));
        assert_eq!(n.signed, Some(-42));
        assert_eq!(n.small, Some(u32::MAX));

        let n = read(r#"{"unsigned": 18446744073709551615, "signed": "9223372036854775807"}"#);
        assert_eq!(n.unsigned, Some(u64::MAX));
        assert_eq!(n.signed, Some(i64::MAX));

        // Out of range reads as absent, never clamped
        let n = read(r#"{"unsigned": "18446744073709551616", "signed": "9223372036854775808", "small": "4294967296"}"#);
        assert_eq!(n.unsigned, None);
        assert_eq!(n.signed, None);
        assert_eq!(n.small, None);

        let n = read(r#"{"unsigned": 1e20, "signed": 1e19, "small": -1}"#);
        assert_eq!(n.unsigned, None);
        assert_eq!(n.signed, None);
        assert_eq!(n.small, None);

        let n = read(r#"{"unsigned": "-1", "signed": 2.5, "small": "7.0"}"#);
        assert_eq!(n.unsigned, None);
        assert_eq!(n.signed, None);
        assert_eq!(n.small, Some(7));
    }

    #[test]
    fn test_raw_register_null_values() {
        let raw: RawRegister = serde_json::from_str(
            r#"{"Position": 0, "UnitStr": "V", "LoggerLastValue": 2301, "Values": null}"#,
        )
        .unwrap();

        assert!(raw.values.is_empty());
        assert_eq!(raw.logger_last_value, Some(2301.0));
        assert_eq!(RegisterAttributes::from_raw(&raw).timestamp, None);
    }

    #[test]
    fn test_measurement_kind_metadata() {
        assert_eq!(MeasurementKind::ActiveEnergyTariff1.as_str(), "active_energy_tariff_1");
        assert_eq!(MeasurementKind::ActiveEnergyTariff1.unit(), Some("kWh"));
        assert_eq!(
            MeasurementKind::ActiveEnergyImportResettable.state_class(),
            StateClass::Total
        );
        assert_eq!(MeasurementKind::ErrorFlags.unit(), None);
        assert_eq!(
            serde_json::to_string(&MeasurementKind::Volume).unwrap(),
            "\"volume\""
        );
    }
}
