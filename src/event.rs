// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use crate::device::Device;

/// A registry change, handed to whoever drains the queue (normally the
/// message-bus bridge).
///
/// `device` is a value copy taken at the moment of the change - it never
/// aliases registry storage, so a consumer can hold it as long as it likes.
#[derive(Debug, Clone)]
pub struct DriverEvent {
    pub name: String,
    pub device: Device,
}

/// Sending half of the bounded event queue.
///
/// `emit` never blocks and never fails: when the queue is full the offered
/// event is dropped on the floor. That is deliberate load shedding - the
/// UDP receive loop and the pollers must never stall on a slow consumer.
/// Drops are counted so the shedding is observable rather than silent.
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::Sender<DriverEvent>,
    dropped: Arc<AtomicU64>,
}

/// Receiving half of the event queue.
pub type EventReceiver = mpsc::Receiver<DriverEvent>;

/// Create a new bounded event queue.
pub fn event_queue(capacity: usize) -> (EventQueue, EventReceiver) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (
        EventQueue {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        },
        rx,
    )
}

impl EventQueue {
    /// Offer an event to the queue without blocking.
    ///
    /// If the queue is full (or the receiver is gone) the event is dropped
    /// and the drop counter incremented; the caller is never told.
    pub fn emit(&self, name: impl Into<String>, device: Device) {
        let event = DriverEvent {
            name: name.into(),
            device,
        };
        if let Err(err) = self.tx.try_send(event) {
            let event = match err {
                mpsc::error::TrySendError::Full(ev) => ev,
                mpsc::error::TrySendError::Closed(ev) => ev,
            };
            self.dropped.fetch_add(1, Ordering::Relaxed);
            debug!(event = %event.name, uid = %event.device.uid, "event queue full, dropping");
        }
    }

    /// Total number of events shed since the queue was created.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
