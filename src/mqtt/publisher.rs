use crate::center::KnownSensor;
use crate::config::Config;
use crate::errors::MqttError;
use crate::mqtt::context::{json_payload, PublishContext};
use crate::mqtt::types::{sensor_topic, SensorInfo};
use crate::templates::{DeviceTemplate, Measurement};
use chrono::{DateTime, Utc};
use rumqttc::{Client, Event, MqttOptions, Packet, QoS};
use std::thread;
use std::time::Duration;

pub struct MqttPublisher {
    client: Client,
    root_topic: String,
}

macro_rules! publish_if_changed {
    ($context:expr, $topic:expr, $new:expr, $old:expr) => {
        if $old.map_or(true, |o| o != $new) {
            $context.publish($topic, $new)?;
        }
    };
}

impl MqttPublisher {
    pub fn new(config: &Config) -> Result<Self, MqttError> {
        let center = &config.center.name;
        let client_id = format!("emu-mbus-mqtt-{}", center);

        tracing::info!(
            "Using MQTT TCP connection: {}:{}",
            config.mqtt.host,
            config.mqtt.port
        );
        let mut mqtt_options = MqttOptions::new(client_id, &config.mqtt.host, config.mqtt.port);

        if !config.mqtt.username.is_empty() {
            mqtt_options.set_credentials(&config.mqtt.username, &config.mqtt.password);
        }

        mqtt_options.set_keep_alive(Duration::from_secs(60));

        // Last will: the center goes offline when the bridge does
        let online_topic = format!("{}/{}/online", config.mqtt.root, center);
        mqtt_options.set_last_will(rumqttc::LastWill {
            topic: online_topic,
            message: b"false".to_vec().into(),
            qos: QoS::AtLeastOnce,
            retain: true,
        });

        let (client, mut connection) = Client::new(mqtt_options, 10);

        thread::spawn(move || {
            for notification in connection.iter() {
                match notification {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        tracing::info!("MQTT connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        // Let it crash, the service manager restarts us
                        tracing::error!("MQTT connection error: {:?}", e);
                        std::process::exit(1);
                    }
                }
            }
        });
        let root_topic = format!("{}/{}", config.mqtt.root, center);

        Ok(Self { client, root_topic })
    }

    pub fn context(&'_ self, topic: &str) -> PublishContext<'_> {
        let full_topic = if topic.is_empty() {
            self.root_topic.clone()
        } else {
            format!("{}/{}", self.root_topic, topic)
        };
        PublishContext::new(&self.client, full_topic)
    }

    pub fn publish_online_status(&self, online: bool) -> Result<(), MqttError> {
        let context = self.context("");
        context.publish("online", &online)
    }

    /// Publish the meter description as retained JSON
    pub fn publish_sensor_info(
        &self,
        sensor: &KnownSensor,
        template: &'static DeviceTemplate,
    ) -> Result<(), MqttError> {
        let context = self.context(&sensor_topic(sensor.sensor_id));
        let json = json_payload(&SensorInfo::new(sensor, template))?;
        context.publish("info", &json)
    }

    pub fn publish_sensor_available(&self, sensor_id: u32, available: bool) -> Result<(), MqttError> {
        let context = self.context(&sensor_topic(sensor_id));
        context.publish("available", &available)
    }

    /// Publish the measurements of one poll.
    /// Only values and attributes that differ from `old` are sent.
    pub fn publish_measurements(
        &self,
        sensor_id: u32,
        time: DateTime<Utc>,
        measurements: &[Measurement],
        old: Option<&[Measurement]>,
    ) -> Result<(), MqttError> {
        let context = self.context(&sensor_topic(sensor_id));
        context.publish("time", &time)?;

        for measurement in measurements {
            let previous = old.and_then(|o| o.iter().find(|p| p.name == measurement.name));
            let topic = measurement.name.as_str();

            publish_if_changed!(
                context,
                topic,
                &measurement.value,
                previous.map(|p| &p.value)
            );

            if previous.map_or(true, |p| p.attributes != measurement.attributes) {
                let json = json_payload(&measurement.attributes)?;
                context.publish(&format!("{}/attributes", topic), &json)?;
            }
        }

        Ok(())
    }
}
