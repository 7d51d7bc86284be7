// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

use std::collections::HashSet;
use std::time::Duration;

/// Configuration for a [`WebbrickDriver`](crate::driver::WebbrickDriver).
///
/// The denylist and PIR-list are injected here rather than compiled in:
/// both exist to patch over facts the wire protocol cannot express (which
/// channels are wired but unused, and which digital inputs are motion
/// sensors rather than buttons), so they are deployment data, not code.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Friendly name for this driver instance (used in logs only).
    pub name: String,
    /// UDP port the bricks broadcast on.
    pub udp_port: u16,
    /// TCP port for the bricks' embedded HTTP server.
    pub http_port: u16,
    /// Period of the per-brick status poll loop.
    pub poll_interval: Duration,
    /// Spawn a poll loop automatically when a new brick heartbeat arrives.
    pub poll_on_discovery: bool,
    /// Timeout applied to every status/config/command HTTP request.
    pub http_timeout: Duration,
    /// Capacity of the bounded event queue.
    pub event_capacity: usize,
    /// UIDs that must never reach the registry or the event queue.
    pub denylist: HashSet<String>,
    /// UIDs of digital inputs known to be PIR sensors.
    pub pir_uids: HashSet<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: "webbrick".to_string(),
            udp_port: 2552,
            http_port: 80,
            poll_interval: Duration::from_secs(30),
            poll_on_discovery: true,
            http_timeout: Duration::from_secs(5),
            event_capacity: 32,
            denylist: HashSet::new(),
            pir_uids: HashSet::new(),
        }
    }
}

impl DriverConfig {
    /// Create a new config builder starting from defaults.
    pub fn builder() -> DriverConfigBuilder {
        DriverConfigBuilder::default()
    }

    /// Whether a UID is suppressed by the denylist.
    pub fn is_excluded(&self, uid: &str) -> bool {
        self.denylist.contains(uid)
    }

    /// Whether a digital-input UID is configured as a PIR sensor.
    pub fn is_pir(&self, uid: &str) -> bool {
        self.pir_uids.contains(uid)
    }
}

/// Builder for [`DriverConfig`].
#[derive(Debug, Clone, Default)]
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn udp_port(mut self, port: u16) -> Self {
        self.config.udp_port = port;
        self
    }

    pub fn http_port(mut self, port: u16) -> Self {
        self.config.http_port = port;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn poll_on_discovery(mut self, enabled: bool) -> Self {
        self.config.poll_on_discovery = enabled;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.config.http_timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    /// Add a single UID to the denylist.
    pub fn deny(mut self, uid: impl Into<String>) -> Self {
        self.config.denylist.insert(uid.into());
        self
    }

    /// Replace the denylist wholesale.
    pub fn denylist(mut self, uids: impl IntoIterator<Item = String>) -> Self {
        self.config.denylist = uids.into_iter().collect();
        self
    }

    /// Mark a single digital-input UID as a PIR sensor.
    pub fn pir(mut self, uid: impl Into<String>) -> Self {
        self.config.pir_uids.insert(uid.into());
        self
    }

    /// Replace the PIR-list wholesale.
    pub fn pir_uids(mut self, uids: impl IntoIterator<Item = String>) -> Self {
        self.config.pir_uids = uids.into_iter().collect();
        self
    }

    pub fn build(self) -> DriverConfig {
        self.config
    }
}
