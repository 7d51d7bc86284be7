// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

//! The UDP announcement listener: one blocking-read loop over the socket,
//! feeding decoded datagrams straight into the registry.

use std::net::IpAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::config::DriverConfig;
use crate::device::DeviceCategory;
use crate::error::{Result, WebbrickError};
use crate::packet::{decode, observe, DATAGRAM_LEN};
use crate::registry::DeviceRegistry;

/// Resolve the address of the interface carrying the default route.
///
/// Binds an ephemeral UDP socket and "connects" it to a well-known public
/// address; no datagram is ever sent, but the OS commits to an outbound
/// interface whose address becomes readable. Bricks rebroadcast everything
/// they hear, so without knowing our own address we would decode our own
/// traffic - failure here stops the driver from starting at all.
pub fn resolve_local_ip() -> Result<IpAddr> {
    let probe =
        std::net::UdpSocket::bind(("0.0.0.0", 0)).map_err(|_| WebbrickError::LocalIpUnavailable)?;
    probe
        .connect(("8.8.8.8", 53))
        .map_err(|_| WebbrickError::LocalIpUnavailable)?;
    let addr = probe
        .local_addr()
        .map_err(|_| WebbrickError::LocalIpUnavailable)?;
    Ok(addr.ip())
}

pub(crate) struct UdpListener {
    socket: UdpSocket,
    local_ip: IpAddr,
    registry: Arc<DeviceRegistry>,
    config: Arc<DriverConfig>,
    /// Brick ids whose heartbeat was just seen for the first time; the poll
    /// scheduler picks these up.
    new_bricks: mpsc::Sender<u8>,
}

impl UdpListener {
    pub(crate) fn new(
        socket: UdpSocket,
        local_ip: IpAddr,
        registry: Arc<DeviceRegistry>,
        config: Arc<DriverConfig>,
        new_bricks: mpsc::Sender<u8>,
    ) -> Self {
        Self {
            socket,
            local_ip,
            registry,
            config,
            new_bricks,
        }
    }

    /// Receive datagrams until the socket fails or shutdown is signalled.
    pub(crate) async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(local_ip = %self.local_ip, "listening for brick announcements");
        let mut buf = [0u8; DATAGRAM_LEN];
        loop {
            tokio::select! {
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, addr)) => self.handle_datagram(&buf[..len], addr.ip()).await,
                    Err(e) => {
                        warn!(error = %e, "UDP receive failed; listener stopping");
                        break;
                    }
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("listener stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn handle_datagram(&self, buf: &[u8], sender: IpAddr) {
        if sender == self.local_ip {
            debug!(%sender, "discarding self-origin datagram");
            return;
        }

        let packet = match decode(buf, sender) {
            Ok(packet) => packet,
            Err(e) => {
                // Unknown source types are expected on a bus shared with
                // other equipment: log and move on.
                warn!(%sender, error = %e, "ignoring undecodable datagram");
                return;
            }
        };

        let obs = observe(&packet, &self.config);
        if self.config.is_excluded(&obs.uid) {
            debug!(uid = %obs.uid, "denylisted, ignoring");
            return;
        }

        let (device, is_new) = self.registry.upsert(obs).await;
        if is_new {
            info!(uid = %device.uid, category = ?device.category, %sender, "discovered device");
            if device.category == DeviceCategory::Heartbeat && self.config.poll_on_discovery {
                // The scheduler dedupes; a full queue only delays the kick
                // until the next heartbeat.
                if self.new_bricks.try_send(device.brick_id).is_err() {
                    debug!(brick_id = device.brick_id, "poll request queue full");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::event_queue;

    #[tokio::test]
    async fn test_self_origin_and_denylist_are_filtered() {
        let config = Arc::new(DriverConfig::builder().deny("3::AO::5").build());
        let (queue, mut rx) = event_queue(8);
        let registry = Arc::new(DeviceRegistry::new(queue));
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, _poll_rx) = mpsc::channel(4);

        let local_ip: IpAddr = "10.0.0.1".parse().unwrap();
        let listener = UdpListener::new(
            socket,
            local_ip,
            Arc::clone(&registry),
            Arc::clone(&config),
            tx,
        );

        // Self-origin: dropped before decoding
        let light = [0u8, b'A', b'A', b'O', 4, 0, 0, 3, 0, 0, 0, 40];
        listener.handle_datagram(&light, local_ip).await;
        assert_eq!(registry.len().await, 0);

        // Denylisted UID: decoded but never upserted or emitted
        let denied = [0u8, b'A', b'A', b'O', 5, 0, 0, 3, 0, 0, 0, 40];
        listener
            .handle_datagram(&denied, "10.0.0.9".parse().unwrap())
            .await;
        assert_eq!(registry.len().await, 0);
        assert!(rx.try_recv().is_err());

        // A clean datagram lands
        listener
            .handle_datagram(&light, "10.0.0.9".parse().unwrap())
            .await;
        assert_eq!(registry.len().await, 1);
        assert_eq!(rx.try_recv().unwrap().name, "newlightchannelfound");
    }

    #[tokio::test]
    async fn test_new_heartbeat_requests_polling() {
        let config = Arc::new(DriverConfig::default());
        let (queue, _rx) = event_queue(8);
        let registry = Arc::new(DeviceRegistry::new(queue));
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let (tx, mut poll_rx) = mpsc::channel(4);

        let listener = UdpListener::new(
            socket,
            "10.0.0.1".parse().unwrap(),
            Arc::clone(&registry),
            config,
            tx,
        );

        let heartbeat = [0u8, b'A', b'S', b'T', 14, 30, 20, 9, 0, 4];
        listener
            .handle_datagram(&heartbeat, "10.0.0.9".parse().unwrap())
            .await;
        assert_eq!(poll_rx.recv().await, Some(9));

        // Repeat sighting of the same brick does not re-request
        listener
            .handle_datagram(&heartbeat, "10.0.0.9".parse().unwrap())
            .await;
        assert!(poll_rx.try_recv().is_err());
    }
}
