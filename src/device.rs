// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

use std::net::IpAddr;

use serde::Serialize;

/// What kind of channel a registry entry represents.
///
/// The wire protocol only carries a two-letter source-type code; the final
/// category additionally depends on static configuration (a `TD` digital
/// input is a PIR sensor if its UID appears on the PIR-list, a push button
/// otherwise - the wire format cannot distinguish the two).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceCategory {
    /// Dimmable analog output (`AO`).
    Light,
    /// Motion sensor. `DO` datagrams always map here (a naming quirk of the
    /// protocol family: digital *outputs* announce as trigger inputs), and
    /// `TD` inputs map here when the PIR-list says so.
    Pir,
    /// Momentary push button (`TD` not on the PIR-list).
    Button,
    /// One-wire temperature channel (`CT`).
    Temp,
    /// Latched digital output tracked for its on/off state.
    State,
    /// The brick itself, sighted via its periodic clock broadcast (`ST`).
    Heartbeat,
    Unknown,
}

impl DeviceCategory {
    /// Event name emitted when a device of this category is first sighted.
    pub fn found_event(&self) -> &'static str {
        match self {
            Self::Light => "newlightchannelfound",
            Self::Pir => "newpirfound",
            Self::Button => "newbuttonfound",
            Self::Temp => "newtempfound",
            Self::State => "newoutputfound",
            Self::Heartbeat => "newwebbrickfound",
            Self::Unknown => "newunknownfound",
        }
    }

    /// Event name emitted on every repeat sighting.
    ///
    /// PIR repeats are spelled as triggers: a motion sensor only ever
    /// announces when it fires, so "updated" would undersell the event.
    pub fn updated_event(&self) -> &'static str {
        match self {
            Self::Light => "existinglightchannelupdated",
            Self::Pir => "existingpirtriggered",
            Self::Button => "existingbuttonupdated",
            Self::Temp => "existingtempupdated",
            Self::State => "existingoutputupdated",
            Self::Heartbeat => "existingwebbrickupdated",
            Self::Unknown => "existingunknownupdated",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Pir => "pir",
            Self::Button => "button",
            Self::Temp => "temp",
            Self::State => "state",
            Self::Heartbeat => "webbrick",
            Self::Unknown => "unknown",
        }
    }

    /// Whether `level` carries meaning for this category
    /// (0–100 percent for lights, sixteenths of a degree for temps).
    pub fn has_level(&self) -> bool {
        matches!(self, Self::Light | Self::Temp)
    }
}

/// Compute the registry key for a channel.
///
/// UIDs are `{brickID}::{SOURCETYPE}::{channel}`; the source-type segment is
/// always upper-cased so that UDP- and poll-derived sightings of the same
/// channel collapse onto one entry.
pub fn device_uid(brick_id: u8, source_type: &str, channel: u8) -> String {
    format!("{}::{}::{}", brick_id, source_type.to_ascii_uppercase(), channel)
}

/// A discovered physical channel - one entry in the registry.
///
/// Entries are created on first sighting and only ever updated in place;
/// the registry is a "last known" cache, so absence simply means a channel
/// has not been seen yet.
#[derive(Debug, Clone, Serialize)]
pub struct Device {
    /// Monotonic sequence id, assigned at first sighting.
    pub id: u32,
    /// Composite identity, the only lookup key. See [`device_uid`].
    pub uid: String,
    /// Human name from the brick's config document; empty until polled.
    pub name: String,
    pub category: DeviceCategory,
    pub channel: u8,
    /// Address of the owning brick.
    pub ip: IpAddr,
    pub brick_id: u8,
    pub subscribed: bool,
    /// Whether the name/details have been filled in from a poll.
    pub queried: bool,
    /// On/off. Meaningless for `Temp` and `Heartbeat`.
    pub state: bool,
    /// Percent for lights, sixteenth-degrees for temps, 0 otherwise.
    pub level: f64,
    /// Free-text description of the most recent sighting.
    pub last_message: String,
}
