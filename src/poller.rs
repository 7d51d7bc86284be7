// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

//! Periodic HTTP reconciliation of a brick's full channel list.
//!
//! UDP announcements only say that something changed; the poller pulls the
//! complete picture (`WbStatus.xml` + `WbCfg.xml`), pairs readings with
//! configured names, and folds every channel into the registry in one
//! batch. Either document failing aborts the whole cycle - a half-merged
//! brick is worse than a stale one.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::device::{device_uid, DeviceCategory};
use crate::error::{Result, WebbrickError};
use crate::registry::{DeviceRegistry, Observation, UpsertOrigin};
use crate::xml::{decode_latin1, parse_config, parse_status, BrickConfig, BrickStatus};

/// One brick's reconciled state: both documents fetched, parsed, and paired
/// by positional index, with no registry mutation yet. Consumed into a
/// batch of upserts, then discarded.
#[derive(Debug)]
pub struct PollSnapshot {
    pub brick_id: u8,
    pub ip: IpAddr,
    /// The brick's own configured name.
    pub name: String,
    /// Analog outputs (lights), with live readings.
    pub lights: Vec<ChannelReading>,
    /// Digital inputs (buttons and PIR sensors). No reading on the wire.
    pub inputs: Vec<ChannelReading>,
    /// Digital outputs tracked as state channels. No reading on the wire.
    pub outputs: Vec<ChannelReading>,
    /// Temperature channels, with raw sixteenth-degree readings.
    pub temps: Vec<ChannelReading>,
}

#[derive(Debug, Clone)]
pub struct ChannelReading {
    pub channel: u8,
    pub name: String,
    pub value: i32,
}

impl PollSnapshot {
    /// Pair status readings with config names, positionally.
    ///
    /// A family missing from either document simply pairs against empty
    /// names or zero readings; the documents are written by the same
    /// firmware and in practice always agree on counts.
    pub fn reconcile(status: &BrickStatus, config: &BrickConfig, ip: IpAddr) -> Self {
        let lights = status
            .analog_outs
            .entries
            .iter()
            .enumerate()
            .map(|(i, ao)| ChannelReading {
                channel: i as u8,
                name: config
                    .analog_names
                    .entries
                    .get(i)
                    .map(|n| n.name.clone())
                    .unwrap_or_default(),
                value: ao.value,
            })
            .collect();

        let inputs = config
            .digital_ins
            .entries
            .iter()
            .enumerate()
            .map(|(i, cd)| ChannelReading {
                channel: i as u8,
                name: cd.name.clone(),
                value: 0,
            })
            .collect();

        let outputs = config
            .output_names
            .entries
            .iter()
            .enumerate()
            .map(|(i, no)| ChannelReading {
                channel: i as u8,
                name: no.name.clone(),
                value: 0,
            })
            .collect();

        let temps = config
            .temps
            .entries
            .iter()
            .enumerate()
            .map(|(i, ct)| ChannelReading {
                channel: i as u8,
                name: ct.name.clone(),
                value: status
                    .temps
                    .entries
                    .get(i)
                    .map(|t| t.value)
                    .unwrap_or_default(),
            })
            .collect();

        Self {
            brick_id: status.brick_id,
            ip,
            name: config.name.clone(),
            lights,
            inputs,
            outputs,
            temps,
        }
    }
}

/// Per-brick HTTP status poller.
pub struct StatusPoller {
    http: reqwest::Client,
    registry: Arc<DeviceRegistry>,
    config: Arc<DriverConfig>,
}

impl StatusPoller {
    pub fn new(
        http: reqwest::Client,
        registry: Arc<DeviceRegistry>,
        config: Arc<DriverConfig>,
    ) -> Self {
        Self {
            http,
            registry,
            config,
        }
    }

    /// Run one full poll cycle against a brick.
    ///
    /// Returns the number of channels folded into the registry. Any HTTP or
    /// XML failure aborts the cycle before the first upsert; the caller (or
    /// the loop's next tick) retries from scratch.
    pub async fn poll_once(&self, brick_id: u8) -> Result<usize> {
        let ip = self
            .registry
            .brick_addr(brick_id)
            .await
            .ok_or(WebbrickError::UnknownBrick { brick_id })?;

        debug!(brick_id, %ip, "fetching status and config");
        let status_doc = self.fetch(ip, "WbStatus.xml").await?;
        let config_doc = self.fetch(ip, "WbCfg.xml").await?;
        let status = parse_status(&status_doc)?;
        let config = parse_config(&config_doc)?;

        let snapshot = PollSnapshot::reconcile(&status, &config, ip);
        info!(brick_id, name = %snapshot.name, "reconciling polled channels");
        Ok(self.ingest(&snapshot).await)
    }

    async fn fetch(&self, ip: IpAddr, document: &str) -> Result<String> {
        let url = format!("http://{}:{}/{}", ip, self.config.http_port, document);
        let bytes = self
            .http
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(decode_latin1(&bytes))
    }

    /// Fold a reconciled snapshot into the registry, one upsert per channel
    /// that survives the denylist.
    pub async fn ingest(&self, snapshot: &PollSnapshot) -> usize {
        let mut count = 0;

        for light in &snapshot.lights {
            let uid = device_uid(snapshot.brick_id, "AO", light.channel);
            if self.config.is_excluded(&uid) {
                debug!(%uid, "denylisted, skipping");
                continue;
            }
            let on = light.value != 0;
            let message = if on {
                format!("{} is on at {}%", light.name, light.value)
            } else {
                format!("{} is off", light.name)
            };
            self.registry
                .upsert(Observation {
                    uid,
                    category: DeviceCategory::Light,
                    channel: light.channel,
                    ip: snapshot.ip,
                    brick_id: snapshot.brick_id,
                    state: on,
                    level: light.value as f64,
                    name: Some(light.name.clone()),
                    message,
                    origin: UpsertOrigin::Poll,
                })
                .await;
            count += 1;
        }

        for input in &snapshot.inputs {
            let uid = device_uid(snapshot.brick_id, "TD", input.channel);
            if self.config.is_excluded(&uid) {
                debug!(%uid, "denylisted, skipping");
                continue;
            }
            let category = if self.config.is_pir(&uid) {
                DeviceCategory::Pir
            } else {
                DeviceCategory::Button
            };
            self.registry
                .upsert(Observation {
                    uid,
                    category,
                    channel: input.channel,
                    ip: snapshot.ip,
                    brick_id: snapshot.brick_id,
                    state: false,
                    level: 0.0,
                    name: Some(input.name.clone()),
                    message: format!("{} has been pressed", input.name),
                    origin: UpsertOrigin::Poll,
                })
                .await;
            count += 1;
        }

        for output in &snapshot.outputs {
            let uid = device_uid(snapshot.brick_id, "DO", output.channel);
            if self.config.is_excluded(&uid) {
                debug!(%uid, "denylisted, skipping");
                continue;
            }
            self.registry
                .upsert(Observation {
                    uid,
                    category: DeviceCategory::State,
                    channel: output.channel,
                    ip: snapshot.ip,
                    brick_id: snapshot.brick_id,
                    state: false,
                    level: 0.0,
                    name: Some(output.name.clone()),
                    message: format!("{} state has changed", output.name),
                    origin: UpsertOrigin::Poll,
                })
                .await;
            count += 1;
        }

        for temp in &snapshot.temps {
            let uid = device_uid(snapshot.brick_id, "CT", temp.channel);
            if self.config.is_excluded(&uid) {
                debug!(%uid, "denylisted, skipping");
                continue;
            }
            // Same fixed-point convention as the UDP path: sixteenths of a degree
            let level = temp.value as f64 / 16.0;
            self.registry
                .upsert(Observation {
                    uid,
                    category: DeviceCategory::Temp,
                    channel: temp.channel,
                    ip: snapshot.ip,
                    brick_id: snapshot.brick_id,
                    state: false,
                    level,
                    name: Some(temp.name.clone()),
                    message: format!("{} temperature value has changed to {level:.1}", temp.name),
                    origin: UpsertOrigin::Poll,
                })
                .await;
            count += 1;
        }

        count
    }

    /// Poll immediately, then on a fixed period until the shutdown signal
    /// flips. A failed cycle is logged and retried on the next tick; it
    /// never stops the loop.
    pub async fn poll_loop(&self, brick_id: u8, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(brick_id, interval = ?self.config.poll_interval, "poll loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.poll_once(brick_id).await {
                        Ok(count) => debug!(brick_id, count, "poll cycle complete"),
                        Err(e) => warn!(brick_id, error = %e, "poll cycle failed; retrying next tick"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!(brick_id, "poll loop stopping");
                        break;
                    }
                }
            }
        }
    }
}
