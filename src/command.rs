// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

//! Outbound command encoding: desired state → the `hid.spi` HTTP query the
//! firmware understands.
//!
//! The registry cache is updated *before* the HTTP call is confirmed: a
//! command puts the device into its requested state immediately, and a
//! failed call leaves the cache ahead of the hardware until the next poll
//! or announcement reconciles it. That mirrors the hardware's fire-and-hope
//! command channel (there is no acknowledgement to wait for) and is a known
//! limitation, not an accident.

use std::net::IpAddr;
use std::sync::Arc;

use tracing::debug;

use crate::device::{Device, DeviceCategory};
use crate::error::{Result, WebbrickError};
use crate::event::EventQueue;
use crate::registry::DeviceRegistry;

/// Percentage used when a light is switched on with no remembered level.
/// 95 rather than 100 - the hardware's soft-start convention.
const DEFAULT_ON_PERCENT: u32 = 95;

/// Encodes and sends device commands over HTTP.
pub struct CommandSender {
    http: reqwest::Client,
    registry: Arc<DeviceRegistry>,
    events: EventQueue,
    http_port: u16,
}

impl CommandSender {
    pub fn new(
        http: reqwest::Client,
        registry: Arc<DeviceRegistry>,
        events: EventQueue,
        http_port: u16,
    ) -> Self {
        Self {
            http,
            registry,
            events,
            http_port,
        }
    }

    /// Turn a device on or off.
    ///
    /// Lights restore their last remembered level when switched on (or the
    /// soft-start default if none); state outputs get the `N`/`F` digital
    /// command; buttons degrade to a momentary pulse. Anything else is
    /// rejected without touching the network.
    pub async fn set_state(&self, uid: &str, on: bool) -> Result<()> {
        let device = self.lookup(uid).await?;
        match device.category {
            DeviceCategory::Light => {
                let percent = if on {
                    if device.level > 0.0 {
                        device.level.round() as u32
                    } else {
                        DEFAULT_ON_PERCENT
                    }
                } else {
                    0
                };
                self.send_light_level(&device, percent).await
            }
            DeviceCategory::State => {
                let message = format!(
                    "{} switched {}",
                    display_name(&device),
                    if on { "on" } else { "off" }
                );
                let updated = self
                    .registry
                    .set_cached_state(uid, on, None, message)
                    .await
                    .unwrap_or_else(|| device.clone());
                self.events
                    .emit(format!("stateset:{}", u8::from(on)), updated);
                let url = digital_state_url(device.ip, self.http_port, device.channel, on);
                self.send(&url).await
            }
            DeviceCategory::Button => self.pulse(uid).await,
            _ => Err(WebbrickError::UnsupportedOperation {
                uid: uid.to_string(),
                category: device.category.description(),
                operation: "set_state",
            }),
        }
    }

    /// Dim a light to `level` in `0.0..=1.0`.
    pub async fn set_level(&self, uid: &str, level: f64) -> Result<()> {
        let device = self.lookup(uid).await?;
        if device.category != DeviceCategory::Light {
            return Err(WebbrickError::UnsupportedOperation {
                uid: uid.to_string(),
                category: device.category.description(),
                operation: "set_level",
            });
        }
        let percent = (level.clamp(0.0, 1.0) * 100.0).round() as u32;
        self.send_light_level(&device, percent).await
    }

    /// Fire a momentary digital-input trigger (a "fake press").
    pub async fn pulse(&self, uid: &str) -> Result<()> {
        let device = self.lookup(uid).await?;
        if device.category != DeviceCategory::Button {
            return Err(WebbrickError::UnsupportedOperation {
                uid: uid.to_string(),
                category: device.category.description(),
                operation: "pulse",
            });
        }
        let message = format!("{} pulsed", display_name(&device));
        let updated = self
            .registry
            .set_cached_state(uid, true, None, message)
            .await
            .unwrap_or_else(|| device.clone());
        self.events.emit("button", updated);
        let url = pulse_url(device.ip, self.http_port, device.channel);
        self.send(&url).await
    }

    /// Read the cached state and request the opposite.
    pub async fn toggle_state(&self, uid: &str) -> Result<()> {
        let device = self.lookup(uid).await?;
        self.set_state(uid, !device.state).await
    }

    async fn send_light_level(&self, device: &Device, percent: u32) -> Result<()> {
        let message = format!("{} set to {percent}%", display_name(device));
        let updated = self
            .registry
            .set_cached_state(&device.uid, percent > 0, Some(percent as f64), message)
            .await
            .unwrap_or_else(|| device.clone());
        self.events.emit(format!("lightset:{percent}"), updated);
        let url = light_level_url(device.ip, self.http_port, device.channel, percent);
        self.send(&url).await
    }

    async fn lookup(&self, uid: &str) -> Result<Device> {
        self.registry
            .get(uid)
            .await
            .ok_or_else(|| WebbrickError::UnknownDevice {
                uid: uid.to_string(),
            })
    }

    async fn send(&self, url: &str) -> Result<()> {
        debug!(%url, "sending device command");
        self.http.get(url).send().await?.error_for_status()?;
        Ok(())
    }
}

fn display_name(device: &Device) -> &str {
    if device.name.is_empty() {
        &device.uid
    } else {
        &device.name
    }
}

// The `%3A`/`%3B` escapes (`:` and `;`) are part of the query syntax the
// firmware expects; they are emitted literally and must not be re-encoded.

fn light_level_url(ip: IpAddr, port: u16, channel: u8, percent: u32) -> String {
    format!("http://{ip}:{port}/hid.spi?com=%3A&com=AA{channel}%3B{percent}&com=%3A")
}

fn digital_state_url(ip: IpAddr, port: u16, channel: u8, on: bool) -> String {
    format!(
        "http://{ip}:{port}/hid.spi?com=%3A&com=DO{channel}%3B{}&com=%3A",
        if on { "N" } else { "F" }
    )
}

fn pulse_url(ip: IpAddr, port: u16, channel: u8) -> String {
    format!("http://{ip}:{port}/hid.spi?com=%3A&com=DI{channel}&com=%3A")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_queue;
    use crate::registry::{Observation, UpsertOrigin};
    use std::net::Ipv4Addr;

    #[test]
    fn test_command_query_strings() {
        let ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        assert_eq!(
            light_level_url(ip, 80, 3, 95),
            "http://10.0.0.7:80/hid.spi?com=%3A&com=AA3%3B95&com=%3A"
        );
        assert_eq!(
            digital_state_url(ip, 80, 1, true),
            "http://10.0.0.7:80/hid.spi?com=%3A&com=DO1%3BN&com=%3A"
        );
        assert_eq!(
            digital_state_url(ip, 80, 1, false),
            "http://10.0.0.7:80/hid.spi?com=%3A&com=DO1%3BF&com=%3A"
        );
        assert_eq!(
            pulse_url(ip, 80, 0),
            "http://10.0.0.7:80/hid.spi?com=%3A&com=DI0&com=%3A"
        );
    }

    async fn seeded_sender(category: DeviceCategory) -> (CommandSender, Arc<DeviceRegistry>) {
        let (queue, _rx) = event_queue(8);
        let registry = Arc::new(DeviceRegistry::new(queue.clone()));
        registry
            .upsert(Observation {
                uid: "3::XX::0".to_string(),
                category,
                channel: 0,
                ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7)),
                brick_id: 3,
                state: false,
                level: 0.0,
                name: None,
                message: String::new(),
                origin: UpsertOrigin::Udp,
            })
            .await;
        let sender = CommandSender::new(
            reqwest::Client::new(),
            Arc::clone(&registry),
            queue,
            80,
        );
        (sender, registry)
    }

    #[tokio::test]
    async fn test_unknown_device_rejected() {
        let (sender, _registry) = seeded_sender(DeviceCategory::Light).await;
        let err = sender.set_state("9::AO::9", true).await.unwrap_err();
        assert!(matches!(err, WebbrickError::UnknownDevice { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_categories_rejected_before_any_io() {
        let (sender, registry) = seeded_sender(DeviceCategory::Temp).await;
        let err = sender.set_state("3::XX::0", true).await.unwrap_err();
        assert!(matches!(err, WebbrickError::UnsupportedOperation { .. }));
        let err = sender.set_level("3::XX::0", 0.5).await.unwrap_err();
        assert!(matches!(err, WebbrickError::UnsupportedOperation { .. }));
        let err = sender.pulse("3::XX::0").await.unwrap_err();
        assert!(matches!(err, WebbrickError::UnsupportedOperation { .. }));

        // The cache was never touched
        let device = registry.get("3::XX::0").await.unwrap();
        assert!(!device.state);
        assert_eq!(device.level, 0.0);
    }

    #[tokio::test]
    async fn test_pir_never_accepts_commands() {
        let (sender, _registry) = seeded_sender(DeviceCategory::Pir).await;
        assert!(matches!(
            sender.set_state("3::XX::0", true).await.unwrap_err(),
            WebbrickError::UnsupportedOperation { .. }
        ));
    }
}
