// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

//! # webbrick-lan-bridge
//!
//! Protocol engine for legacy Webbrick home-automation bricks: listens for
//! their positional-byte UDP announcements, periodically pulls richer
//! status/config XML over HTTP, maintains a live registry of discovered
//! channels, and emits normalized change events. Outbound, it encodes
//! desired state back into the `hid.spi` HTTP calls the firmware
//! understands.
//!
//! The companion `webbrick2mqtt` binary relays the event stream onto an
//! MQTT broker and maps inbound topics back to device commands.
//!
//! ## Quick Start
//!
//! ```no_run
//! use webbrick_lan_bridge::{DriverConfig, WebbrickDriver};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = DriverConfig::builder()
//!         .udp_port(2552)
//!         .pir("3::TD::2")   // this digital input is a motion sensor
//!         .deny("3::AO::7")  // wired but unused
//!         .build();
//!
//!     let mut driver = WebbrickDriver::start(config).await?;
//!
//!     let mut events = driver.take_events().expect("first take");
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             println!("{}: {:?}", event.name, event.device);
//!         }
//!     });
//!
//!     tokio::signal::ctrl_c().await?;
//!     driver.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod command;
pub mod config;
pub mod device;
pub mod driver;
pub mod error;
pub mod event;
pub mod listener;
pub mod packet;
pub mod poller;
pub mod registry;
pub mod xml;

// Re-exports for convenience
pub use command::CommandSender;
pub use config::{DriverConfig, DriverConfigBuilder};
pub use device::{device_uid, Device, DeviceCategory};
pub use driver::WebbrickDriver;
pub use error::{Result, WebbrickError};
pub use event::{event_queue, DriverEvent, EventQueue, EventReceiver};
pub use listener::resolve_local_ip;
pub use packet::{decode, observe, DecodedPacket, Payload, SourceType};
pub use poller::{ChannelReading, PollSnapshot, StatusPoller};
pub use registry::{DeviceRegistry, Observation, UpsertOrigin};
