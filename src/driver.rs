// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::command::CommandSender;
use crate::config::DriverConfig;
use crate::device::Device;
use crate::error::Result;
use crate::event::{event_queue, EventQueue, EventReceiver};
use crate::listener::{resolve_local_ip, UdpListener};
use crate::poller::StatusPoller;
use crate::registry::DeviceRegistry;

/// The main public API: owns the socket, registry, event queue, and every
/// background task.
///
/// # Example
///
/// ```no_run
/// use webbrick_lan_bridge::{DriverConfig, WebbrickDriver};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = DriverConfig::builder()
///         .pir("3::TD::2")
///         .deny("3::AO::7")
///         .build();
///
///     let mut driver = WebbrickDriver::start(config).await?;
///
///     let mut events = driver.take_events().expect("events not yet taken");
///     tokio::spawn(async move {
///         while let Some(event) = events.recv().await {
///             println!("{}: {}", event.name, event.device.uid);
///         }
///     });
///
///     tokio::signal::ctrl_c().await?;
///     driver.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct WebbrickDriver {
    config: Arc<DriverConfig>,
    registry: Arc<DeviceRegistry>,
    poller: Arc<StatusPoller>,
    commands: CommandSender,
    event_queue: EventQueue,
    events: Option<EventReceiver>,
    local_ip: IpAddr,
    poll_requests: mpsc::Sender<u8>,
    shutdown_tx: watch::Sender<bool>,
    listener_handle: Option<JoinHandle<()>>,
    scheduler_handle: Option<JoinHandle<()>>,
}

impl WebbrickDriver {
    /// Resolve the local address, bind the announcement socket, and start
    /// the background tasks.
    ///
    /// Local-IP resolution failing is the only startup condition treated as
    /// fatal; everything after this point degrades per-operation.
    pub async fn start(config: DriverConfig) -> Result<Self> {
        let local_ip = resolve_local_ip()?;
        let config = Arc::new(config);

        let socket = UdpSocket::bind(("0.0.0.0", config.udp_port)).await?;
        info!(
            name = %config.name,
            port = config.udp_port,
            %local_ip,
            "webbrick driver starting"
        );

        let (event_queue, event_rx) = event_queue(config.event_capacity);
        let registry = Arc::new(DeviceRegistry::new(event_queue.clone()));

        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;
        let poller = Arc::new(StatusPoller::new(
            http.clone(),
            Arc::clone(&registry),
            Arc::clone(&config),
        ));
        let commands = CommandSender::new(
            http,
            Arc::clone(&registry),
            event_queue.clone(),
            config.http_port,
        );

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (poll_tx, poll_rx) = mpsc::channel(16);

        let listener = UdpListener::new(
            socket,
            local_ip,
            Arc::clone(&registry),
            Arc::clone(&config),
            poll_tx.clone(),
        );
        let listener_handle = tokio::spawn(listener.run(shutdown_rx.clone()));
        let scheduler_handle =
            tokio::spawn(poll_scheduler(Arc::clone(&poller), poll_rx, shutdown_rx));

        Ok(Self {
            config,
            registry,
            poller,
            commands,
            event_queue,
            events: Some(event_rx),
            local_ip,
            poll_requests: poll_tx,
            shutdown_tx,
            listener_handle: Some(listener_handle),
            scheduler_handle: Some(scheduler_handle),
        })
    }

    /// Take the event receiver. There is exactly one consumer; subsequent
    /// calls return `None`.
    pub fn take_events(&mut self) -> Option<EventReceiver> {
        self.events.take()
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    /// Handle to the registry, for read access alongside the driver.
    pub fn registry(&self) -> Arc<DeviceRegistry> {
        Arc::clone(&self.registry)
    }

    /// Value copies of every known device, in discovery order.
    pub async fn devices(&self) -> Vec<Device> {
        self.registry.snapshot().await
    }

    /// Look up one device by UID.
    pub async fn device(&self, uid: &str) -> Option<Device> {
        self.registry.get(uid).await
    }

    /// Events shed by the bounded queue so far.
    pub fn dropped_events(&self) -> u64 {
        self.event_queue.dropped()
    }

    /// Run one poll cycle against a brick right now.
    pub async fn poll_brick(&self, brick_id: u8) -> Result<usize> {
        self.poller.poll_once(brick_id).await
    }

    /// Ask the scheduler to run the periodic poll loop for a brick
    /// (idempotent - an already-polled brick is left alone).
    pub async fn start_polling(&self, brick_id: u8) {
        let _ = self.poll_requests.send(brick_id).await;
    }

    // --- Command pass-throughs ---

    pub async fn set_state(&self, uid: &str, on: bool) -> Result<()> {
        self.commands.set_state(uid, on).await
    }

    pub async fn set_level(&self, uid: &str, level: f64) -> Result<()> {
        self.commands.set_level(uid, level).await
    }

    pub async fn pulse(&self, uid: &str) -> Result<()> {
        self.commands.pulse(uid).await
    }

    pub async fn toggle_state(&self, uid: &str) -> Result<()> {
        self.commands.toggle_state(uid).await
    }

    pub fn commands(&self) -> &CommandSender {
        &self.commands
    }

    /// Stop the listener and every poll loop.
    pub async fn shutdown(&mut self) {
        info!("driver shutting down");
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.listener_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.scheduler_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for WebbrickDriver {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.listener_handle.take() {
            handle.abort();
        }
        if let Some(handle) = self.scheduler_handle.take() {
            handle.abort();
        }
    }
}

/// Owns the set of per-brick poll loops. Start requests arrive from the
/// listener (first heartbeat) and from `start_polling`; duplicates for a
/// brick whose loop is still alive are ignored.
async fn poll_scheduler(
    poller: Arc<StatusPoller>,
    mut requests: mpsc::Receiver<u8>,
    shutdown: watch::Receiver<bool>,
) {
    let mut running: HashMap<u8, JoinHandle<()>> = HashMap::new();
    let mut own_shutdown = shutdown.clone();

    loop {
        tokio::select! {
            request = requests.recv() => match request {
                Some(brick_id) => {
                    let alive = running
                        .get(&brick_id)
                        .is_some_and(|handle| !handle.is_finished());
                    if alive {
                        debug!(brick_id, "poll loop already running");
                        continue;
                    }
                    let poller = Arc::clone(&poller);
                    let loop_shutdown = shutdown.clone();
                    running.insert(
                        brick_id,
                        tokio::spawn(async move {
                            poller.poll_loop(brick_id, loop_shutdown).await;
                        }),
                    );
                }
                None => break,
            },
            changed = own_shutdown.changed() => {
                if changed.is_err() || *own_shutdown.borrow() {
                    break;
                }
            }
        }
    }

    for handle in running.into_values() {
        handle.abort();
    }
}
