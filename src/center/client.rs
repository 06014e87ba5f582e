//! M-Bus Center client
//!
//! Discovery, validation and polling of the meters behind one center. HTTP is
//! kept behind [`Transport`] so the logic can be exercised without a network.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::types::{DeviceInfo, DeviceResponse, KnownSensor, ValidationResult};
use crate::errors::CenterError;
use crate::templates::{self, DeviceTemplate, Measurement};

/// String only the center's own start page contains.
pub const CENTER_MARKER: &str = "emu_logo_128px";

/// Fetches a path from the center and returns the body.
pub trait Transport {
    /// Absolute URL of `path`, for errors and logs.
    fn url(&self, path: &str) -> String;

    /// Any failure to obtain a successful response maps to [`CenterError::CannotConnect`].
    fn get(&self, path: &str) -> Result<String, CenterError>;
}

/// Blocking HTTP transport with a per-request timeout
pub struct HttpTransport {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// `host` is `ip`, `ip:port` or a full `http://` or `https://` URL.
    pub fn new(host: &str, timeout: Duration) -> Result<Self, CenterError> {
        let host = host.trim_end_matches('/');
        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            host.to_string()
        } else {
            format!("http://{}", host)
        };

        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CenterError::CannotConnect {
                url: base_url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self { base_url, client })
    }
}

impl Transport for HttpTransport {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn get(&self, path: &str) -> Result<String, CenterError> {
        let url = self.url(path);
        let cannot_connect = |reason: String| CenterError::CannotConnect {
            url: url.clone(),
            reason,
        };

        let response = self
            .client
            .get(&url)
            .send()
            .map_err(|e| cannot_connect(e.to_string()))?;
        if !response.status().is_success() {
            return Err(cannot_connect(format!("HTTP {}", response.status())));
        }
        response.text().map_err(|e| cannot_connect(e.to_string()))
    }
}

fn device_path(sensor_id: u32) -> String {
    format!("/app/api/id/{}.json", sensor_id)
}

/// Client for one M-Bus Center
pub struct CenterClient<T: Transport = HttpTransport> {
    transport: T,
}

impl CenterClient<HttpTransport> {
    pub fn new(host: &str, timeout: Duration) -> Result<Self, CenterError> {
        Ok(Self::with_transport(HttpTransport::new(host, timeout)?))
    }
}

impl<T: Transport> CenterClient<T> {
    pub fn with_transport(transport: T) -> Self {
        Self { transport }
    }

    /// Whether the start page answers and looks like an M-Bus Center.
    pub fn center_reachable(&self) -> bool {
        match self.transport.get("/") {
            Ok(body) if body.contains(CENTER_MARKER) => true,
            Ok(_) => {
                error!(
                    "{} answered, but it is not an M-Bus Center",
                    self.transport.url("/")
                );
                false
            }
            Err(e) => {
                error!("Could not reach M-Bus Center: {}", e);
                false
            }
        }
    }

    /// Fetches identity and register dump of one meter.
    pub fn fetch_device(&self, sensor_id: u32) -> Result<DeviceInfo, CenterError> {
        let path = device_path(sensor_id);
        let body = self.transport.get(&path)?;

        let malformed = |reason: String| CenterError::MalformedResponse {
            url: self.transport.url(&path),
            reason,
        };
        let response: DeviceResponse =
            serde_json::from_str(&body).map_err(|e| malformed(e.to_string()))?;
        response
            .device
            .ok_or_else(|| malformed("response has no Device".to_string()))
    }

    /// Like [`fetch_device`](Self::fetch_device), but an unreachable ID means no meter there.
    pub fn probe(&self, sensor_id: u32) -> Result<Option<DeviceInfo>, CenterError> {
        match self.fetch_device(sensor_id) {
            Ok(device) => Ok(Some(device)),
            Err(CenterError::CannotConnect { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Walks every ID in `ids` and reports the meters that can be identified.
    ///
    /// Never fails: absent IDs, unsupported media and garbage responses are logged
    /// and skipped. Meters without a matching template are kept with `template: None`.
    pub fn scan(&self, ids: RangeInclusive<u32>) -> Vec<KnownSensor> {
        let mut sensors = Vec::new();

        for sensor_id in ids {
            let device = match self.probe(sensor_id) {
                Ok(Some(device)) => device,
                Ok(None) => {
                    debug!("No sensor on ID {}", sensor_id);
                    continue;
                }
                Err(e) => {
                    error!("Sensor {}: {}", sensor_id, e);
                    continue;
                }
            };

            if device.medium().is_none() {
                warn!(
                    "Sensor {} measures {:?}, which is not supported",
                    sensor_id, device.medium
                );
                continue;
            }

            let (serial, version) = match (device.serial, device.version) {
                (Some(serial), Some(version))
                    if serial != 0 && version != 0 && !device.value_descs.is_empty() =>
                {
                    (serial, version)
                }
                _ => {
                    warn!(
                        "Sensor {} did not supply a serial number, version and registers",
                        sensor_id
                    );
                    continue;
                }
            };

            let register_count = device.value_descs.len();
            let template = templates::resolve(version, register_count);
            match template {
                Some(t) => info!("Found sensor {} ({}): {}", sensor_id, serial, t.id.label()),
                None => warn!(
                    "No device template for sensor {} with serial {}: version {}, {} registers, \
                     manufacturer {:?}, medium {:?}",
                    sensor_id,
                    serial,
                    version,
                    register_count,
                    device.manufacturer_id,
                    device.medium
                ),
            }

            sensors.push(KnownSensor {
                sensor_id,
                serial_number: serial,
                name: device.display_name(),
                template: template.map(|t| t.id),
            });
        }

        info!("Scan finished, {} sensors found", sensors.len());
        sensors
    }

    /// The template a live device currently matches.
    pub fn resolve_device(
        &self,
        device: &DeviceInfo,
    ) -> Result<&'static DeviceTemplate, CenterError> {
        let (version, register_count) = device.signature();
        version
            .and_then(|v| templates::resolve(v, register_count))
            .ok_or_else(|| CenterError::UnknownTemplate {
                version: version.unwrap_or_default(),
                register_count,
                manufacturer: device.manufacturer_id.clone(),
                medium: device.medium.clone(),
            })
    }

    /// Why a configured sensor is unusable right now, if it is.
    fn check_sensor(&self, sensor: &KnownSensor) -> Result<(), CenterError> {
        let device = self.fetch_device(sensor.sensor_id)?;

        if device.id != Some(sensor.sensor_id) {
            return Err(CenterError::IdentityMismatch {
                expected: sensor.sensor_id,
                found: device.id,
            });
        }
        if device.medium().is_none() {
            return Err(CenterError::UnsupportedMedium {
                sensor_id: sensor.sensor_id,
                medium: device.medium,
            });
        }

        let live = self.resolve_device(&device)?;
        if let Some(configured) = sensor.template.and_then(templates::template) {
            if configured.id != live.id {
                return Err(CenterError::TemplateMismatch {
                    sensor_id: sensor.sensor_id,
                    expected_version: configured.firmware_version,
                    expected_count: configured.register_count,
                    found_version: device.version,
                    found_count: device.value_descs.len(),
                });
            }
        }
        Ok(())
    }

    /// Checks the center and, if given, every configured sensor.
    ///
    /// An unreachable center short-circuits. Each sensor is judged on its own.
    pub fn validate(&self, sensors: Option<&[KnownSensor]>) -> ValidationResult {
        if !self.center_reachable() {
            return ValidationResult::default();
        }

        let sensors = match sensors {
            Some(sensors) if !sensors.is_empty() => sensors,
            _ => {
                debug!("No sensors configured, only the center was validated");
                return ValidationResult {
                    reachable: true,
                    all_sensors_good: true,
                    ..Default::default()
                };
            }
        };

        let mut good_ids = BTreeSet::new();
        let mut bad_ids = BTreeSet::new();
        for sensor in sensors {
            match self.check_sensor(sensor) {
                Ok(()) => {
                    good_ids.insert(sensor.sensor_id);
                }
                Err(e) => {
                    warn!("Sensor {} ({}) is not usable: {}", sensor.sensor_id, sensor.name, e);
                    bad_ids.insert(sensor.sensor_id);
                }
            }
        }

        ValidationResult {
            reachable: true,
            all_sensors_good: bad_ids.is_empty(),
            good_ids,
            bad_ids,
        }
    }

    /// Reads one meter and extracts every measurement of its template.
    pub fn poll(
        &self,
        sensor_id: u32,
        template: &DeviceTemplate,
    ) -> Result<Vec<Measurement>, CenterError> {
        let device = self.fetch_device(sensor_id)?;

        if device.id != Some(sensor_id) {
            return Err(CenterError::IdentityMismatch {
                expected: sensor_id,
                found: device.id,
            });
        }
        if device.medium().is_none() {
            return Err(CenterError::UnsupportedMedium {
                sensor_id,
                medium: device.medium,
            });
        }

        let (version, register_count) = device.signature();
        if version != Some(template.firmware_version) || register_count != template.register_count
        {
            return Err(CenterError::TemplateMismatch {
                sensor_id,
                expected_version: template.firmware_version,
                expected_count: template.register_count,
                found_version: version,
                found_count: register_count,
            });
        }

        let measurements = templates::parse(&device.value_descs, template)?;
        debug!("Sensor {}: {} measurements", sensor_id, measurements.len());
        Ok(measurements)
    }
}
