// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::IpAddr;

use tokio::sync::RwLock;
use tracing::debug;

use crate::device::{Device, DeviceCategory};
use crate::event::EventQueue;

/// Where an observation came from. Poll-derived sightings carry the
/// channel's configured name and mark the device as queried; UDP datagrams
/// carry neither.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOrigin {
    Udp,
    Poll,
}

/// One normalized sighting of a channel, ready to be folded into the
/// registry. Built by the packet decoder and the status poller.
#[derive(Debug, Clone)]
pub struct Observation {
    pub uid: String,
    pub category: DeviceCategory,
    pub channel: u8,
    pub ip: IpAddr,
    pub brick_id: u8,
    pub state: bool,
    pub level: f64,
    /// Configured channel name; `None` for UDP sightings (the datagram
    /// carries no name).
    pub name: Option<String>,
    pub message: String,
    pub origin: UpsertOrigin,
}

/// The authoritative map of discovered devices, keyed by UID.
///
/// This is the only mutable state shared between the UDP receive path and
/// the poll loops, so every access goes through the inner lock. Entries are
/// never deleted - the registry is a last-known cache, and absence just
/// means "not seen yet". Exclusion policy (denylists) is deliberately the
/// callers' job; the registry itself is policy-free.
pub struct DeviceRegistry {
    inner: RwLock<Inner>,
    events: EventQueue,
}

#[derive(Default)]
struct Inner {
    devices: HashMap<String, Device>,
    next_id: u32,
}

impl DeviceRegistry {
    pub fn new(events: EventQueue) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    /// Create-or-update a device from an observation.
    ///
    /// First sighting allocates the next sequence id, inserts the device
    /// subscribed (and queried iff poll-derived), and emits the category's
    /// "found" event. Repeat sightings mutate `state`, `level` and
    /// `last_message` in place (plus `name` for poll-derived calls) and emit
    /// the "updated" event. Returns a value copy and whether it was new.
    pub async fn upsert(&self, obs: Observation) -> (Device, bool) {
        let mut guard = self.inner.write().await;
        let inner = &mut *guard;

        let (snapshot, is_new) = match inner.devices.entry(obs.uid.clone()) {
            Entry::Occupied(mut entry) => {
                let device = entry.get_mut();
                device.state = obs.state;
                device.level = obs.level;
                device.last_message = obs.message;
                if obs.origin == UpsertOrigin::Poll {
                    if let Some(name) = obs.name {
                        if !name.is_empty() {
                            device.name = name;
                        }
                    }
                    device.queried = true;
                }
                (device.clone(), false)
            }
            Entry::Vacant(entry) => {
                inner.next_id += 1;
                let device = Device {
                    id: inner.next_id,
                    uid: obs.uid,
                    name: obs.name.unwrap_or_default(),
                    category: obs.category,
                    channel: obs.channel,
                    ip: obs.ip,
                    brick_id: obs.brick_id,
                    subscribed: true,
                    queried: obs.origin == UpsertOrigin::Poll,
                    state: obs.state,
                    level: obs.level,
                    last_message: obs.message,
                };
                entry.insert(device.clone());
                (device, true)
            }
        };
        drop(guard);

        if is_new {
            debug!(uid = %snapshot.uid, id = snapshot.id, "registered new device");
            self.events
                .emit(snapshot.category.found_event(), snapshot.clone());
        } else {
            self.events
                .emit(snapshot.category.updated_event(), snapshot.clone());
        }
        (snapshot, is_new)
    }

    /// Look up a device by UID.
    pub async fn get(&self, uid: &str) -> Option<Device> {
        self.inner.read().await.devices.get(uid).cloned()
    }

    /// Value copies of every known device, in discovery order.
    pub async fn snapshot(&self) -> Vec<Device> {
        let inner = self.inner.read().await;
        let mut devices: Vec<Device> = inner.devices.values().cloned().collect();
        devices.sort_by_key(|d| d.id);
        devices
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.devices.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.devices.is_empty()
    }

    /// The address a brick was last seen at, preferring its heartbeat entry.
    pub async fn brick_addr(&self, brick_id: u8) -> Option<IpAddr> {
        let inner = self.inner.read().await;
        let mut fallback = None;
        for device in inner.devices.values() {
            if device.brick_id != brick_id {
                continue;
            }
            if device.category == DeviceCategory::Heartbeat {
                return Some(device.ip);
            }
            fallback = Some(device.ip);
        }
        fallback
    }

    /// Overwrite the cached `state` (and optionally `level`) of a device.
    ///
    /// Used by the command path, which records the *requested* state before
    /// the hardware confirms it. Emits nothing - the command layer emits its
    /// own `lightset:`/`stateset:` events.
    pub(crate) async fn set_cached_state(
        &self,
        uid: &str,
        state: bool,
        level: Option<f64>,
        message: String,
    ) -> Option<Device> {
        let mut inner = self.inner.write().await;
        let device = inner.devices.get_mut(uid)?;
        device.state = state;
        if let Some(level) = level {
            device.level = level;
        }
        device.last_message = message;
        Some(device.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_queue;
    use std::net::Ipv4Addr;

    fn obs(uid: &str, origin: UpsertOrigin) -> Observation {
        Observation {
            uid: uid.to_string(),
            category: DeviceCategory::Light,
            channel: 0,
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)),
            brick_id: 3,
            state: true,
            level: 85.0,
            name: None,
            message: "Light at level 85".to_string(),
            origin,
        }
    }

    #[tokio::test]
    async fn test_first_sighting_creates() {
        let (queue, mut rx) = event_queue(8);
        let registry = DeviceRegistry::new(queue);

        let (device, is_new) = registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;
        assert!(is_new);
        assert_eq!(device.id, 1);
        assert!(device.subscribed);
        assert!(!device.queried); // UDP sightings are unqueried
        assert!(device.state);
        assert_eq!(device.level, 85.0);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "newlightchannelfound");
        assert_eq!(event.device.uid, "3::AO::0");
    }

    #[tokio::test]
    async fn test_repeat_sighting_updates_in_place() {
        let (queue, mut rx) = event_queue(8);
        let registry = DeviceRegistry::new(queue);

        registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;
        let mut second = obs("3::AO::0", UpsertOrigin::Udp);
        second.state = false;
        second.level = 0.0;
        second.message = "Light at level 0".to_string();

        let (device, is_new) = registry.upsert(second).await;
        assert!(!is_new);
        assert_eq!(device.id, 1); // sequence id is stable
        assert!(!device.state);
        assert_eq!(device.level, 0.0);
        assert_eq!(registry.len().await, 1);

        rx.recv().await.unwrap(); // found
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "existinglightchannelupdated");
    }

    #[tokio::test]
    async fn test_upsert_idempotent_except_event_name() {
        let (queue, mut rx) = event_queue(8);
        let registry = DeviceRegistry::new(queue);

        let (first, _) = registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;
        let (second, is_new) = registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;
        assert!(!is_new);
        assert_eq!(first.id, second.id);
        assert_eq!(first.state, second.state);
        assert_eq!(first.level, second.level);
        assert_eq!(first.last_message, second.last_message);

        assert_eq!(rx.recv().await.unwrap().name, "newlightchannelfound");
        assert_eq!(rx.recv().await.unwrap().name, "existinglightchannelupdated");
    }

    #[tokio::test]
    async fn test_name_only_updated_by_poll() {
        let (queue, _rx) = event_queue(8);
        let registry = DeviceRegistry::new(queue);

        registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;

        // A UDP repeat carries no name and must not clear anything
        let (device, _) = registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;
        assert_eq!(device.name, "");
        assert!(!device.queried);

        let mut polled = obs("3::AO::0", UpsertOrigin::Poll);
        polled.name = Some("HallWay".to_string());
        let (device, _) = registry.upsert(polled).await;
        assert_eq!(device.name, "HallWay");
        assert!(device.queried);

        // Another nameless UDP repeat leaves the polled name alone
        let (device, _) = registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;
        assert_eq!(device.name, "HallWay");
    }

    #[tokio::test]
    async fn test_sequence_ids_monotonic() {
        let (queue, _rx) = event_queue(8);
        let registry = DeviceRegistry::new(queue);

        let (a, _) = registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;
        let (b, _) = registry.upsert(obs("3::AO::1", UpsertOrigin::Udp)).await;
        let (c, _) = registry.upsert(obs("3::AO::2", UpsertOrigin::Udp)).await;
        assert_eq!((a.id, b.id, c.id), (1, 2, 3));

        let snapshot = registry.snapshot().await;
        assert_eq!(snapshot.len(), 3);
        assert!(snapshot.windows(2).all(|w| w[0].id < w[1].id));
    }

    #[tokio::test]
    async fn test_brick_addr_prefers_heartbeat() {
        let (queue, _rx) = event_queue(8);
        let registry = DeviceRegistry::new(queue);

        let mut light = obs("3::AO::0", UpsertOrigin::Udp);
        light.ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 50));
        registry.upsert(light).await;

        let mut heartbeat = obs("3::ST::0", UpsertOrigin::Udp);
        heartbeat.category = DeviceCategory::Heartbeat;
        heartbeat.ip = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 51));
        registry.upsert(heartbeat).await;

        assert_eq!(
            registry.brick_addr(3).await,
            Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 51)))
        );
        assert_eq!(registry.brick_addr(4).await, None);
    }

    #[tokio::test]
    async fn test_set_cached_state() {
        let (queue, _rx) = event_queue(8);
        let registry = DeviceRegistry::new(queue);
        registry.upsert(obs("3::AO::0", UpsertOrigin::Udp)).await;

        let device = registry
            .set_cached_state("3::AO::0", false, Some(0.0), "Light set to 0%".to_string())
            .await
            .unwrap();
        assert!(!device.state);
        assert_eq!(device.level, 0.0);
        assert_eq!(device.last_message, "Light set to 0%");

        assert!(registry
            .set_cached_state("3::AO::9", true, None, String::new())
            .await
            .is_none());
    }
}
