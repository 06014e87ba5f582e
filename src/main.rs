use std::cmp::{max, min};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::bail;
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use emu_mbus_mqtt::center::{CenterClient, KnownSensor};
use emu_mbus_mqtt::templates::{self, DeviceTemplate, Measurement};
use emu_mbus_mqtt::{Config, MqttPublisher};

/// EMU M-Bus Center MQTT Bridge - Publishes meter readings to MQTT
#[derive(Parser)]
#[command(name = "emu-mbus-mqtt")]
#[command(version)]
#[command(about = "EMU M-Bus Center MQTT Bridge - Publishes meter readings to MQTT", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the configured sensors and publish their measurements (default)
    Run,
    /// Probe every sensor ID and print a [[sensors]] section for the configuration
    Scan {
        /// Highest sensor ID to probe (defaults to center.scan_max_id)
        #[arg(long)]
        max_id: Option<u32>,
    },
    /// Check the center and the configured sensors
    Validate,
}

#[derive(Serialize)]
struct SensorList<'a> {
    sensors: &'a [KnownSensor],
}

/// Round timestamp to next modulo seconds
/// Example: next_interval(12:00:07, 5s) -> 12:00:10
fn next_interval(time: DateTime<Utc>, interval: Duration) -> DateTime<Utc> {
    let duration_since_last_interval = Duration::seconds(time.timestamp() % interval.num_seconds());
    time - duration_since_last_interval + interval
}

fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load configuration first (to get log level)
    let config_path = cli.config;
    let config = Config::from_file(&config_path)?;

    // Logs go to stderr so `scan` output can be redirected into a config file
    let app_log_level = config.default.log_level.as_str();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("emu_mbus_mqtt={}", app_log_level).parse()?)
                .add_directive("reqwest=warn".parse()?)
                .add_directive("rumqttc=warn".parse()?),
        )
        .init();

    info!("Configuration loaded from: {}", config_path);
    info!("Log level: {}", config.default.log_level);
    debug!("Debug logging is enabled");

    templates::check_registry()?;

    let client = CenterClient::new(&config.center.host, config.center.timeout)?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, &client),
        Command::Scan { max_id } => scan(&client, max_id.unwrap_or(config.center.scan_max_id)),
        Command::Validate => validate(&config, &client),
    }
}

fn scan(client: &CenterClient, max_id: u32) -> anyhow::Result<()> {
    info!("Scanning sensor IDs 0..={}", max_id);
    let sensors = client.scan(0..=max_id);
    print!("{}", toml::to_string(&SensorList { sensors: &sensors })?);
    Ok(())
}

fn validate(config: &Config, client: &CenterClient) -> anyhow::Result<()> {
    let result = client.validate(Some(config.sensors.as_slice()));
    if !result.reachable {
        bail!("M-Bus Center at {} is not reachable", config.center.host);
    }
    println!("M-Bus Center at {} is reachable", config.center.host);
    for sensor in &config.sensors {
        let state = if result.good_ids.contains(&sensor.sensor_id) {
            "ok"
        } else {
            "BAD"
        };
        println!("  sensor {:>3} {:<4} {}", sensor.sensor_id, state, sensor.name);
    }
    if !result.all_sensors_good {
        bail!("{} sensor(s) failed validation", result.bad_ids.len());
    }
    Ok(())
}

fn run(config: &Config, client: &CenterClient) -> anyhow::Result<()> {
    let interval = Duration::from_std(config.center.interval)?;

    info!("Configuration loaded successfully!");
    info!("  Center Host: {}", config.center.host);
    info!("  Center Name: {}", config.center.name);
    info!("  MQTT Root: {}", config.mqtt.root);
    info!("  Interval: {:?}", config.center.interval);
    info!("  Sensors: {}", config.sensors.len());

    let validation = client.validate(Some(config.sensors.as_slice()));
    if !validation.reachable {
        warn!("M-Bus Center is not reachable yet, polling anyway");
    } else if !validation.all_sensors_good {
        warn!("Sensors failing validation: {:?}", validation.bad_ids);
    } else {
        info!("✓ M-Bus Center and all sensors validated");
    }

    let sensors: Vec<(&KnownSensor, &'static DeviceTemplate)> = config
        .sensors
        .iter()
        .filter_map(|sensor| match sensor.template.and_then(templates::template) {
            Some(template) => Some((sensor, template)),
            None => {
                warn!(
                    "Sensor {} ({}) has no device template, skipping",
                    sensor.sensor_id, sensor.name
                );
                None
            }
        })
        .collect();

    // Create MQTT publisher (blocking)
    info!("Creating MQTT publisher...");
    let mqtt_publisher = MqttPublisher::new(config)?;
    info!("✓ MQTT publisher created successfully!");

    // Give MQTT a moment to connect
    std::thread::sleep(std::time::Duration::from_millis(500));

    mqtt_publisher.publish_online_status(true)?;
    info!("✓ Published online status");

    for &(sensor, template) in &sensors {
        mqtt_publisher.publish_sensor_info(sensor, template)?;
    }
    info!("✓ Published info for {} sensors", sensors.len());

    let running = Arc::new(AtomicBool::new(true));
    {
        let running = running.clone();
        ctrlc::set_handler(move || running.store(false, Ordering::SeqCst))?;
    }

    let mut next_loop = Utc::now();
    let mut last_measurements: HashMap<u32, Vec<Measurement>> = HashMap::new();
    info!("Starting main loop...");

    while running.load(Ordering::SeqCst) {
        let now = Utc::now();
        if now >= next_loop {
            next_loop = next_interval(now, interval);

            for &(sensor, template) in &sensors {
                let id = sensor.sensor_id;
                match client.poll(id, template) {
                    Ok(measurements) => {
                        let old = last_measurements.get(&id).map(Vec::as_slice);
                        mqtt_publisher.publish_measurements(id, now, &measurements, old)?;
                        mqtt_publisher.publish_sensor_available(id, true)?;
                        debug!("Sensor {}: published {} values", id, measurements.len());
                        last_measurements.insert(id, measurements);
                    }
                    Err(e) => {
                        if e.is_transient() {
                            warn!("Sensor {} on {}: {}", id, config.center.host, e);
                        } else {
                            error!("Sensor {} on {}: {}", id, config.center.host, e);
                        }
                        mqtt_publisher.publish_sensor_available(id, false)?;
                    }
                }
            }
        }

        // Wake up at least once a second to notice Ctrl-C
        let sleep_duration = min(
            max(next_loop - Utc::now(), Duration::milliseconds(100)),
            Duration::seconds(1),
        );
        std::thread::sleep(sleep_duration.to_std()?);
    }

    info!("Shutting down...");
    mqtt_publisher.publish_online_status(false)?;
    // Let the event loop flush the last message
    std::thread::sleep(std::time::Duration::from_millis(500));
    Ok(())
}
