//! Wire types of the M-Bus Center HTTP API and what we keep about its meters

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::templates::types::{lenient, Medium, RawRegister, TemplateId};

/// Body of `GET /app/api/id/{id}.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceResponse {
    #[serde(rename = "Device")]
    pub device: Option<DeviceInfo>,
}

/// Identity and register dump of one meter.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceInfo {
    #[serde(default, deserialize_with = "lenient::u32")]
    pub id: Option<u32>,
    #[serde(default)]
    pub medium: Option<String>,
    #[serde(default, deserialize_with = "lenient::u64")]
    pub serial: Option<u64>,
    #[serde(default, deserialize_with = "lenient::u32")]
    pub version: Option<u32>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub manufacturer_id: Option<String>,
    #[serde(default)]
    pub value_descs: Vec<RawRegister>,
}

impl DeviceInfo {
    pub fn medium(&self) -> Option<Medium> {
        self.medium.as_deref().and_then(Medium::parse)
    }

    /// `"{Name} ({Site})"`, else the name, else the serial number.
    pub fn display_name(&self) -> String {
        let name = self.name.as_deref().filter(|s| !s.is_empty());
        let site = self.site.as_deref().filter(|s| !s.is_empty());
        match (name, site) {
            (Some(name), Some(site)) => format!("{name} ({site})"),
            (Some(name), None) => name.to_string(),
            _ => self.serial.map(|s| s.to_string()).unwrap_or_default(),
        }
    }

    /// The `(firmware version, register count)` pair used for template lookup.
    pub fn signature(&self) -> (Option<u32>, usize) {
        (self.version, self.value_descs.len())
    }
}

/// A meter discovered on, or configured for, one center.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownSensor {
    pub sensor_id: u32,
    pub serial_number: u64,
    pub name: String,
    /// `None` when the meter was recognised but no template matched.
    #[serde(default, alias = "device_type", skip_serializing_if = "Option::is_none")]
    pub template: Option<TemplateId>,
}

/// Outcome of checking the center and a set of configured meters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    pub reachable: bool,
    pub all_sensors_good: bool,
    pub good_ids: BTreeSet<u32>,
    pub bad_ids: BTreeSet<u32>,
}
