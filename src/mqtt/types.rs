use serde::Serialize;

use crate::center::KnownSensor;
use crate::templates::{DeviceTemplate, MeasurementKind, StateClass, TemplateId};

/// Topic segment of one meter below the center topic.
pub fn sensor_topic(sensor_id: u32) -> String {
    format!("sensor:{}", sensor_id)
}

/// Retained description of a meter, published once at startup
#[derive(Debug, Serialize)]
pub struct SensorInfo<'a> {
    pub sensor_id: u32,
    pub serial_number: u64,
    pub name: &'a str,
    pub template: TemplateId,
    pub label: &'static str,
    pub model: &'static str,
    pub manufacturer: &'static str,
    pub firmware_version: u32,
    pub register_count: usize,
    pub measurements: Vec<MeasurementInfo>,
}

#[derive(Debug, Serialize)]
pub struct MeasurementInfo {
    pub name: MeasurementKind,
    pub unit: Option<&'static str>,
    pub state_class: StateClass,
}

impl<'a> SensorInfo<'a> {
    pub fn new(sensor: &'a KnownSensor, template: &'static DeviceTemplate) -> Self {
        SensorInfo {
            sensor_id: sensor.sensor_id,
            serial_number: sensor.serial_number,
            name: &sensor.name,
            template: template.id,
            label: template.id.label(),
            model: template.model_name,
            manufacturer: template.manufacturer_name,
            firmware_version: template.firmware_version,
            register_count: template.register_count,
            measurements: template
                .registers
                .iter()
                .map(|r| MeasurementInfo {
                    name: r.name,
                    unit: r.name.unit(),
                    state_class: r.name.state_class(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::template;
    use serde_json::json;

    #[test]
    fn test_sensor_info_json() {
        let sensor = KnownSensor {
            sensor_id: 1,
            serial_number: 4711,
            name: "Well".to_string(),
            template: Some(TemplateId::GwfWaterValues2),
        };
        let t = template(TemplateId::GwfWaterValues2).unwrap();

        let value = serde_json::to_value(SensorInfo::new(&sensor, t)).unwrap();
        assert_eq!(
            value,
            json!({
                "sensor_id": 1,
                "serial_number": 4711,
                "name": "Well",
                "template": "gwf_water_2val",
                "label": "GWF Water Meter | 2 Values",
                "model": "Water",
                "manufacturer": "GWF",
                "firmware_version": 60,
                "register_count": 2,
                "measurements": [
                    {"name": "serial_no", "unit": null, "state_class": "measurement"},
                    {"name": "volume", "unit": "m³", "state_class": "total_increasing"},
                ],
            })
        );
    }

    #[test]
    fn test_sensor_topic() {
        assert_eq!(sensor_topic(17), "sensor:17");
    }
}
