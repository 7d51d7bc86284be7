// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors
// MQTT bridge

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::Mutex;
use tokio::time::interval;
use tracing::{debug, error, info, warn};

use webbrick_lan_bridge::{Device, DriverConfig, DriverEvent, WebbrickDriver};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "webbrick2mqtt")]
#[command(about = "Bridge between Webbrick home-automation bricks and MQTT")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, default_value = "config.toml")]
    config: String,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Config {
    #[serde(default)]
    driver: DriverToml,
    mqtt: MqttToml,
}

#[derive(Debug, Deserialize)]
struct DriverToml {
    #[serde(default = "default_name")]
    name: String,
    #[serde(default = "default_udp_port")]
    udp_port: u16,
    #[serde(default = "default_http_port")]
    http_port: u16,
    #[serde(default = "default_poll_interval")]
    poll_interval_secs: u64,
    #[serde(default = "default_poll_on_discovery")]
    poll_on_discovery: bool,
    #[serde(default = "default_event_capacity")]
    event_capacity: usize,
    /// UIDs that are wired but unused - never registered, never published.
    #[serde(default)]
    denylist: Vec<String>,
    /// UIDs of digital inputs that are PIR sensors rather than buttons.
    #[serde(default)]
    pir: Vec<String>,
}

impl Default for DriverToml {
    fn default() -> Self {
        Self {
            name: default_name(),
            udp_port: default_udp_port(),
            http_port: default_http_port(),
            poll_interval_secs: default_poll_interval(),
            poll_on_discovery: default_poll_on_discovery(),
            event_capacity: default_event_capacity(),
            denylist: Vec::new(),
            pir: Vec::new(),
        }
    }
}

fn default_name() -> String {
    "webbrick".to_string()
}
fn default_udp_port() -> u16 {
    2552
}
fn default_http_port() -> u16 {
    80
}
fn default_poll_interval() -> u64 {
    30
}
fn default_poll_on_discovery() -> bool {
    true
}
fn default_event_capacity() -> usize {
    32
}

#[derive(Debug, Deserialize)]
struct MqttToml {
    url: String,
    #[serde(default = "default_client_id")]
    client_id: String,
    #[serde(default = "default_publish_prefix")]
    publish_prefix: String,
    #[serde(default = "default_subscribe_prefix")]
    subscribe_prefix: String,
    #[serde(default = "default_heartbeat_secs")]
    heartbeat_secs: u64,
    #[serde(default = "default_heartbeat_topic")]
    heartbeat_topic: String,
}

fn default_client_id() -> String {
    "webbrick-bridge".to_string()
}
fn default_publish_prefix() -> String {
    "webbrick/from".to_string()
}
fn default_subscribe_prefix() -> String {
    "webbrick/to".to_string()
}
fn default_heartbeat_secs() -> u64 {
    59
}
fn default_heartbeat_topic() -> String {
    "webbrick/bridge/heartbeat".to_string()
}

fn build_driver_config(toml: &DriverToml) -> DriverConfig {
    DriverConfig::builder()
        .name(&toml.name)
        .udp_port(toml.udp_port)
        .http_port(toml.http_port)
        .poll_interval(Duration::from_secs(toml.poll_interval_secs))
        .poll_on_discovery(toml.poll_on_discovery)
        .event_capacity(toml.event_capacity)
        .denylist(toml.denylist.iter().cloned())
        .pir_uids(toml.pir.iter().cloned())
        .build()
}

// ---------------------------------------------------------------------------
// MQTT JSON types
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct MqttDeviceEvent<'a> {
    now: u64,
    event: &'a str,
    /// The headline reading: numeric level when the device has one lit,
    /// otherwise the boolean state.
    value: serde_json::Value,
    device: &'a Device,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn now_epoch_ms() -> u64 {
    Utc::now().timestamp_millis() as u64
}

fn event_topic(prefix: &str, device: &Device) -> String {
    format!(
        "{prefix}/{}/{}/{}/{}",
        device.brick_id,
        device.category.description(),
        device.channel,
        device.uid
    )
}

fn event_value(device: &Device) -> serde_json::Value {
    if device.level > 0.0 {
        serde_json::json!(device.level)
    } else {
        serde_json::json!(device.state)
    }
}

async fn publish_event(client: &AsyncClient, prefix: &str, event: &DriverEvent) {
    let payload = MqttDeviceEvent {
        now: now_epoch_ms(),
        event: &event.name,
        value: event_value(&event.device),
        device: &event.device,
    };
    let topic = event_topic(prefix, &event.device);
    match serde_json::to_string(&payload) {
        Ok(json) => {
            if let Err(e) = client.publish(&topic, QoS::AtMostOnce, false, json).await {
                error!("Failed to publish to {topic}: {e}");
            }
        }
        Err(e) => error!("Failed to serialize event payload: {e}"),
    }
}

fn parse_bool_payload(payload: &str) -> Option<bool> {
    match payload.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "n" | "on" => Some(true),
        "false" | "0" | "f" | "off" => Some(false),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Inbound MQTT commands
// ---------------------------------------------------------------------------

/// Commands arrive on `{subscribe_prefix}/{uid}/{verb}` with the argument
/// in the payload. Verbs: `state` (bool), `level` (float 0..1), `pulse`.
async fn handle_command(
    driver: &Arc<Mutex<WebbrickDriver>>,
    subscribe_prefix: &str,
    topic: &str,
    payload: &str,
) {
    let Some(suffix) = topic.strip_prefix(subscribe_prefix).map(|s| s.trim_start_matches('/'))
    else {
        return;
    };
    let Some((uid, verb)) = suffix.rsplit_once('/') else {
        warn!("Ignoring command topic without a verb: {topic}");
        return;
    };

    let driver = driver.lock().await;
    let result = match verb {
        "state" => match parse_bool_payload(payload) {
            Some(on) => driver.set_state(uid, on).await,
            None => {
                warn!("Invalid state payload for {uid}: {payload:?}");
                return;
            }
        },
        "level" => match payload.trim().parse::<f64>() {
            Ok(level) => driver.set_level(uid, level).await,
            Err(_) => {
                warn!("Invalid level payload for {uid}: {payload:?}");
                return;
            }
        },
        "pulse" => driver.pulse(uid).await,
        "toggle" => driver.toggle_state(uid).await,
        other => {
            warn!("Unknown command verb {other:?} for {uid}");
            return;
        }
    };

    match result {
        Ok(()) => info!("Command {verb} for {uid}: sent"),
        Err(e) => error!("Command {verb} for {uid} failed: {e}"),
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG controls verbosity (e.g. RUST_LOG=debug or
    // RUST_LOG=webbrick_lan_bridge=trace). Default: info.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    // systemd journal already adds timestamps, so omit them when running under systemd
    if std::env::var_os("JOURNAL_STREAM").is_some() {
        tracing_subscriber::fmt().without_time().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let cli = Cli::parse();

    let config_text =
        std::fs::read_to_string(&cli.config).context("Failed to read config file")?;
    let config: Config = toml::from_str(&config_text).context("Failed to parse config file")?;

    let (mqtt_host, mqtt_port) = parse_mqtt_url(&config.mqtt.url)?;
    let publish_prefix = config.mqtt.publish_prefix.clone();
    let subscribe_prefix = config.mqtt.subscribe_prefix.clone();
    let subscribe_filter = format!("{subscribe_prefix}/#");

    // Start the driver
    let driver_config = build_driver_config(&config.driver);
    info!(
        "Starting webbrick driver on UDP port {}",
        driver_config.udp_port
    );
    let mut driver = WebbrickDriver::start(driver_config).await?;
    let mut events = driver
        .take_events()
        .context("Event receiver already taken")?;
    let driver = Arc::new(Mutex::new(driver));

    // Set up MQTT
    let mut mqtt_opts = MqttOptions::new(&config.mqtt.client_id, &mqtt_host, mqtt_port);
    mqtt_opts.set_keep_alive(Duration::from_secs(30));
    let (client, mut eventloop) = AsyncClient::new(mqtt_opts, 256);

    client
        .subscribe(&subscribe_filter, QoS::AtLeastOnce)
        .await
        .context("Failed to subscribe to MQTT topic")?;
    info!("MQTT: subscribed to {subscribe_filter}");

    // Task 1: driver event pump → MQTT
    let client_events = client.clone();
    let event_handle = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Event {} for {}", event.name, event.device.uid);
            publish_event(&client_events, &publish_prefix, &event).await;
        }
        info!("Event queue closed");
    });

    // Task 2: MQTT event loop (receives messages, dispatches commands)
    let driver_cmds = Arc::clone(&driver);
    let client_cmds = client.clone();
    let sub_prefix = subscribe_prefix.clone();
    let sub_filter = subscribe_filter.clone();
    let mqtt_handle = tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    // rumqttc does not auto-resubscribe; without this a
                    // broker restart silently drops our command topic.
                    info!("MQTT: connected, subscribing to {sub_filter}");
                    if let Err(e) = client_cmds.subscribe(&sub_filter, QoS::AtLeastOnce).await {
                        error!("Failed to subscribe to {sub_filter}: {e}");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(msg))) => {
                    let payload = String::from_utf8_lossy(&msg.payload).to_string();
                    info!("MQTT command on {}: {payload}", msg.topic);
                    handle_command(&driver_cmds, &sub_prefix, &msg.topic, &payload).await;
                }
                Ok(_) => {}
                Err(e) => {
                    error!("MQTT event loop error: {e}");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    // Task 3: bridge liveness heartbeat
    let client_beat = client.clone();
    let heartbeat_topic = config.mqtt.heartbeat_topic.clone();
    let heartbeat_secs = config.mqtt.heartbeat_secs;
    let beat_handle = tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(heartbeat_secs.max(1)));
        loop {
            ticker.tick().await;
            if let Err(e) = client_beat
                .publish(&heartbeat_topic, QoS::AtMostOnce, false, "Alive")
                .await
            {
                error!("Failed to publish heartbeat: {e}");
            }
        }
    });

    // Wait for a signal
    let mut sigterm = signal(SignalKind::terminate())?;
    info!("MQTT bridge running. Send SIGINT/SIGTERM to stop.");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Received SIGINT, shutting down..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
    }

    // Abort tasks and stop the driver
    event_handle.abort();
    mqtt_handle.abort();
    beat_handle.abort();
    driver.lock().await.shutdown().await;

    info!("Shutdown complete");
    Ok(())
}

/// Parse an MQTT URL like "mqtt://host:port" into (host, port).
fn parse_mqtt_url(url: &str) -> Result<(String, u16)> {
    let stripped = url
        .strip_prefix("mqtt://")
        .or_else(|| url.strip_prefix("tcp://"))
        .unwrap_or(url);

    let (host, port_str) = stripped
        .rsplit_once(':')
        .context("MQTT URL must be in format mqtt://host:port")?;

    let port: u16 = port_str.parse().context("Invalid MQTT port number")?;

    Ok((host.to_string(), port))
}
