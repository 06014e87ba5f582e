//! Integration tests for emu-mbus-mqtt
//!
//! These tests drive the HTTP client against a mock M-Bus Center, no hardware required.

use chrono::{TimeZone, Utc};
use emu_mbus_mqtt::center::{CenterClient, KnownSensor};
use emu_mbus_mqtt::config::MqttConfig;
use emu_mbus_mqtt::errors::{CenterError, StructuralError};
use emu_mbus_mqtt::mqtt::context::MqttPayload;
use emu_mbus_mqtt::templates::{self, MeasurementKind, TemplateId};
use mockito::{Mock, Server, ServerGuard};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;

const START_PAGE: &str = r#"<html><body><img src="/img/emu_logo_128px.png"></body></html>"#;

fn client(server: &ServerGuard) -> CenterClient {
    CenterClient::new(&server.host_with_port(), Duration::from_secs(2)).unwrap()
}

fn mock_start_page(server: &mut ServerGuard) -> Mock {
    server
        .mock("GET", "/")
        .with_status(200)
        .with_header("content-type", "text/html")
        .with_body(START_PAGE)
        .create()
}

fn mock_device(server: &mut ServerGuard, sensor_id: u32, device: Value) -> Mock {
    server
        .mock("GET", format!("/app/api/id/{}.json", sensor_id).as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(json!({ "Device": device }).to_string())
        .create()
}

/// An EMU 1/40 as the center reports it, values in raw counter units.
fn emu_1_40(sensor_id: u32) -> Value {
    let register = |position: u32, unit: &str, description: Value, value: f64, factor: f64| {
        json!({
            "Position": position,
            "UnitStr": unit,
            "DescriptionStr": description,
            "LoggerLastValue": value,
            "CfgFactor": factor,
            "ScalePower": -1,
            "ScaleMantissa": 1,
            "Tariff": 0,
            "CfgPhase": 0,
            "CfgTariff": 0,
            "Values": [{"Timestamp": 1714564800}],
        })
    };

    let mut registers = vec![
        register(0, "V", json!("Volts (vendor specific)"), 2301.0, 10.0),
        register(1, "A", json!("Ampere (vendor specific)"), 52.0, 10.0),
        register(2, "None", json!("Special supplier information"), 98.0, 100.0),
        register(3, "W", json!("Power"), 1196.0, 1.0),
        register(4, "Hz", json!("Frequency"), 4998.0, 100.0),
        register(5, "Wh", json!("Energy"), 1234567.0, 1000.0),
        register(6, "Wh", json!("Energy"), 4567.0, 1000.0),
        register(7, "None", Value::Null, 12345678.0, 0.0),
    ];
    for position in 8..12 {
        registers.push(register(position, "None", json!("Unused"), 0.0, 1.0));
    }
    registers.push(register(12, "Bin", json!("Error flags (Device type specific)"), 0.0, 1.0));
    for position in 13..15 {
        registers.push(register(position, "None", json!("Unused"), 0.0, 1.0));
    }

    json!({
        "Id": sensor_id,
        "Medium": "Electricity",
        "Serial": "12345678",
        "Version": 4,
        "Name": "Heat pump",
        "Site": "Cellar",
        "ManufacturerId": "EMU",
        "ValueDescs": registers,
    })
}

fn gwf_water(sensor_id: u32) -> Value {
    json!({
        "Id": sensor_id,
        "Medium": "Water",
        "Serial": 87654321,
        "Version": "60",
        "ManufacturerId": "GWF",
        "ValueDescs": [
            {"Position": 0, "UnitStr": "None", "DescriptionStr": "Fabrication", "LoggerLastValue": 87654321},
            {"Position": 1, "UnitStr": "m^3", "DescriptionStr": "Volume", "LoggerLastValue": "123.456"},
        ],
    })
}

#[test]
fn test_poll_emu_1_40() {
    let mut server = Server::new();
    let device = mock_device(&mut server, 3, emu_1_40(3));

    let template = templates::template(TemplateId::Emu140V4Values15).unwrap();
    let measurements = client(&server).poll(3, template).unwrap();
    device.assert();

    let values: Vec<(MeasurementKind, f64)> =
        measurements.iter().map(|m| (m.name, m.value)).collect();
    assert_eq!(
        values,
        vec![
            (MeasurementKind::Voltage, 230.1),
            (MeasurementKind::Current, 5.2),
            (MeasurementKind::FormFactor, 0.98),
            (MeasurementKind::ActivePower, 1196.0),
            (MeasurementKind::Frequency, 49.98),
            (MeasurementKind::ActiveEnergyImport, 1234.567),
            (MeasurementKind::ActiveEnergyImportResettable, 4.567),
            (MeasurementKind::SerialNo, 12345678.0),
            (MeasurementKind::ErrorFlags, 0.0),
        ]
    );

    let attributes = &measurements[0].attributes;
    assert_eq!(attributes.scale_power, Some(-1.0));
    assert_eq!(attributes.cfg_factor, Some(10.0));
    assert_eq!(
        attributes.timestamp,
        Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
    );
}

#[test]
fn test_poll_water_meter_with_ascii_volume() {
    let mut server = Server::new();
    let _device = mock_device(&mut server, 9, gwf_water(9));

    let template = templates::template(TemplateId::GwfWaterValues2).unwrap();
    let measurements = client(&server).poll(9, template).unwrap();

    assert_eq!(measurements.len(), 2);
    assert_eq!(measurements[1].name, MeasurementKind::Volume);
    assert_eq!(measurements[1].value, 123.456);
}

#[test]
fn test_poll_structural_error_fails_whole_device() {
    let mut server = Server::new();
    let mut device = emu_1_40(3);
    device["ValueDescs"][12]["DescriptionStr"] = json!("Something else");
    let _device = mock_device(&mut server, 3, device);

    let template = templates::template(TemplateId::Emu140V4Values15).unwrap();
    let err = client(&server).poll(3, template).unwrap_err();
    assert!(matches!(
        err,
        CenterError::Structural(StructuralError::DescriptionMismatch {
            name: MeasurementKind::ErrorFlags,
            position: 12,
            ..
        })
    ));
    assert!(!err.is_transient());
}

#[test]
fn test_poll_unreachable_and_malformed() {
    let mut server = Server::new();
    let _garbage = server
        .mock("GET", "/app/api/id/4.json")
        .with_status(200)
        .with_body("{\"Device\": ")
        .create();
    let _error = server
        .mock("GET", "/app/api/id/5.json")
        .with_status(500)
        .create();

    let template = templates::template(TemplateId::Emu140V4Values15).unwrap();
    let client = client(&server);

    let err = client.poll(4, template).unwrap_err();
    assert!(matches!(err, CenterError::MalformedResponse { .. }));
    assert!(err.is_transient());

    let err = client.poll(5, template).unwrap_err();
    assert!(matches!(err, CenterError::CannotConnect { .. }));
    assert!(err.is_transient());
}

#[test]
fn test_nothing_listening() {
    // Port 9 (discard) is closed on any sane test machine
    let client = CenterClient::new("127.0.0.1:9", Duration::from_millis(500)).unwrap();
    assert!(!client.center_reachable());
    assert!(client.probe(1).unwrap().is_none());
    assert!(client.scan(0..=2).is_empty());
    assert!(!client.validate(None).reachable);
}

#[test]
fn test_scan() {
    let mut server = Server::new();
    let _emu = mock_device(&mut server, 3, emu_1_40(3));
    let _water = mock_device(&mut server, 7, gwf_water(7));

    let mut unknown = emu_1_40(11);
    unknown["Version"] = json!(5);
    let _unknown = mock_device(&mut server, 11, unknown);

    let mut gas = gwf_water(12);
    gas["Medium"] = json!("Gas");
    let _gas = mock_device(&mut server, 12, gas);

    let sensors = client(&server).scan(0..=20);
    assert_eq!(
        sensors,
        vec![
            KnownSensor {
                sensor_id: 3,
                serial_number: 12345678,
                name: "Heat pump (Cellar)".to_string(),
                template: Some(TemplateId::Emu140V4Values15),
            },
            KnownSensor {
                sensor_id: 7,
                serial_number: 87654321,
                name: "87654321".to_string(),
                template: Some(TemplateId::GwfWaterValues2),
            },
            KnownSensor {
                sensor_id: 11,
                serial_number: 12345678,
                name: "Heat pump (Cellar)".to_string(),
                template: None,
            },
        ]
    );
}

#[test]
fn test_validate() {
    let mut server = Server::new();
    let start_page = mock_start_page(&mut server);
    let _emu = mock_device(&mut server, 3, emu_1_40(3));
    let _water = mock_device(&mut server, 7, gwf_water(70));

    let mut unknown = emu_1_40(8);
    unknown["Version"] = json!(99);
    unknown["ValueDescs"] = json!((0..99).map(|p| json!({"Position": p})).collect::<Vec<_>>());
    let _unknown = mock_device(&mut server, 8, unknown);

    let sensor = |sensor_id, template| KnownSensor {
        sensor_id,
        serial_number: 1,
        name: format!("sensor {}", sensor_id),
        template,
    };
    let sensors = [
        sensor(3, Some(TemplateId::Emu140V4Values15)),
        sensor(7, Some(TemplateId::GwfWaterValues2)),
        sensor(8, None),
        sensor(15, Some(TemplateId::Emu140V4Values15)),
    ];

    let result = client(&server).validate(Some(&sensors[..]));
    start_page.assert();
    assert!(result.reachable);
    assert!(!result.all_sensors_good);
    assert_eq!(result.good_ids, BTreeSet::from([3]));
    assert_eq!(result.bad_ids, BTreeSet::from([7, 8, 15]));

    let result = client(&server).validate(Some(&sensors[..1]));
    assert!(result.all_sensors_good);
    assert_eq!(result.good_ids, BTreeSet::from([3]));
}

#[test]
fn test_validate_wrong_start_page() {
    let mut server = Server::new();
    let _page = server
        .mock("GET", "/")
        .with_status(200)
        .with_body("<html>Some router</html>")
        .create();

    let result = client(&server).validate(None);
    assert!(!result.reachable);
    assert!(!result.all_sensors_good);
}

#[test]
fn test_unresolvable_template() {
    assert!(templates::resolve(99, 99).is_none());
}

// ============================================================================
// Configuration and payload tests
// ============================================================================

#[test]
fn test_mqtt_config_debug_redacts_password() {
    let config = MqttConfig {
        root: "emu".to_string(),
        host: "mqtt.example.com".to_string(),
        port: 1883,
        username: "test-user".to_string(),
        password: "secret-password".to_string(),
    };

    let debug_output = format!("{:?}", config);

    // Password should be redacted
    assert!(!debug_output.contains("secret-password"));
    assert!(debug_output.contains("***REDACTED***"));

    // Username should still be visible
    assert!(debug_output.contains("test-user"));
}

#[test]
fn test_mqtt_payload_f64() {
    let value = 42.5_f64;
    assert_eq!(value.to_payload(), "42.5");

    let value = 0.0_f64;
    assert_eq!(value.to_payload(), "0");

    let value = -123.456_f64;
    assert_eq!(value.to_payload(), "-123.456");
}

#[test]
fn test_mqtt_payload_bool_and_time() {
    assert_eq!(true.to_payload(), "true");
    assert_eq!(false.to_payload(), "false");

    let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    assert_eq!(time.to_payload(), "2024-05-01T12:00:00+00:00");
}
