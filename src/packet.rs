// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

//! Positional decoder for the bricks' UDP announcement datagrams.
//!
//! Datagrams are read in 16-byte chunks; each byte index has a fixed
//! meaning that additionally depends on the two-letter source-type code at
//! indices 2–3. Payloads may arrive shorter than 16 bytes - absent indices
//! read as zero rather than erroring, which is how the hardware behaves.

use std::net::IpAddr;

use crate::config::DriverConfig;
use crate::device::{device_uid, DeviceCategory};
use crate::error::{Result, WebbrickError};
use crate::registry::{Observation, UpsertOrigin};

/// Datagrams are read in chunks of this size.
pub const DATAGRAM_LEN: usize = 16;

/// The two-letter channel-family tag carried at indices 2–3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceType {
    /// `ST` - brick heartbeat carrying the unit's clock.
    Clock,
    /// `DO` - digital output announcing as a trigger (a naming artifact of
    /// this protocol family, preserved faithfully).
    DigitalOut,
    /// `TD` - digital input: push button or PIR sensor.
    DigitalIn,
    /// `AO` - analog output (dimmable light).
    AnalogOut,
    /// `CT` - one-wire temperature channel.
    TempSensor,
}

impl SourceType {
    /// Parse the wire code, case-insensitively.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_ascii_uppercase().as_str() {
            "ST" => Some(Self::Clock),
            "DO" => Some(Self::DigitalOut),
            "TD" => Some(Self::DigitalIn),
            "AO" => Some(Self::AnalogOut),
            "CT" => Some(Self::TempSensor),
            _ => None,
        }
    }

    /// The canonical upper-case wire code, as used in UIDs.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Clock => "ST",
            Self::DigitalOut => "DO",
            Self::DigitalIn => "TD",
            Self::AnalogOut => "AO",
            Self::TempSensor => "CT",
        }
    }

    /// The field-extraction function for this family's value/time bytes.
    fn payload_decoder(self) -> PayloadDecoder {
        match self {
            Self::Clock => decode_clock,
            Self::DigitalOut | Self::DigitalIn => decode_trigger,
            Self::AnalogOut => decode_reading,
            Self::TempSensor => decode_temperature,
        }
    }
}

/// Type-dependent tail of a datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    /// `ST` time-of-day fields. The second is carried at half resolution on
    /// the wire and is stored here already doubled back down (raw / 2).
    Clock { hour: u8, minute: u8, second: u8, day: u8 },
    /// `AO`/`CT` numeric reading. For `CT` this is the sum of the low byte
    /// (index 11) and the high byte (index 12).
    Reading { value: u16 },
    /// `DO`/`TD` momentary trigger - no value bytes.
    Trigger,
}

/// Zero-padding view over a possibly short datagram.
struct RawDatagram<'a>(&'a [u8]);

impl RawDatagram<'_> {
    fn byte(&self, index: usize) -> u8 {
        self.0.get(index).copied().unwrap_or(0)
    }
}

type PayloadDecoder = fn(&RawDatagram<'_>) -> Payload;

fn decode_clock(raw: &RawDatagram<'_>) -> Payload {
    Payload::Clock {
        hour: raw.byte(4),
        minute: raw.byte(5),
        second: raw.byte(6) / 2,
        day: raw.byte(9),
    }
}

fn decode_trigger(_raw: &RawDatagram<'_>) -> Payload {
    Payload::Trigger
}

fn decode_reading(raw: &RawDatagram<'_>) -> Payload {
    Payload::Reading {
        value: raw.byte(11) as u16,
    }
}

fn decode_temperature(raw: &RawDatagram<'_>) -> Payload {
    Payload::Reading {
        value: raw.byte(11) as u16 + raw.byte(12) as u16,
    }
}

/// One parsed announcement. Transient: consumed into a registry upsert and
/// discarded.
#[derive(Debug, Clone)]
pub struct DecodedPacket {
    pub sender: IpAddr,
    pub packet_type: char,
    pub source_type: SourceType,
    /// Zero for `ST` datagrams, whose index 4 carries the hour instead.
    pub source_channel: u8,
    pub target_channel: u8,
    pub brick_id: u8,
    pub payload: Payload,
}

impl DecodedPacket {
    /// The registry key this datagram maps onto.
    pub fn uid(&self) -> String {
        device_uid(self.brick_id, self.source_type.code(), self.source_channel)
    }
}

/// Decode one datagram.
///
/// The only error is an unrecognized source-type code (including datagrams
/// too short to carry one) - callers log it and move on. Short input past a
/// valid code is not an error: missing field indices decode as zero.
pub fn decode(buf: &[u8], sender: IpAddr) -> Result<DecodedPacket> {
    let raw = RawDatagram(buf);
    let code: String = [raw.byte(2) as char, raw.byte(3) as char].into_iter().collect();
    let source_type = SourceType::from_code(&code)
        .ok_or(WebbrickError::UnknownDeviceType { code })?;

    // For ST, indices 4-6 carry the time of day, not channel numbers.
    let (source_channel, target_channel) = match source_type {
        SourceType::Clock => (0, 0),
        _ => (raw.byte(4), raw.byte(5)),
    };

    Ok(DecodedPacket {
        sender,
        packet_type: raw.byte(1) as char,
        source_type,
        source_channel,
        target_channel,
        brick_id: raw.byte(7),
        payload: source_type.payload_decoder()(&raw),
    })
}

/// Normalize a decoded datagram into the observation the registry ingests.
///
/// This is where category-specific scaling lives: light levels pass through
/// as-is, temperatures divide by 16 (the hardware's fixed-point encoding),
/// and digital inputs are split into PIR vs button by the injected PIR-list
/// (the wire format cannot tell them apart).
pub fn observe(packet: &DecodedPacket, config: &DriverConfig) -> Observation {
    let uid = packet.uid();
    let value = match packet.payload {
        Payload::Reading { value } => value,
        _ => 0,
    };

    let (category, state, level, message) = match packet.source_type {
        SourceType::AnalogOut => (
            DeviceCategory::Light,
            value > 0,
            value as f64,
            format!("Light at level {value}"),
        ),
        SourceType::TempSensor => {
            let level = value as f64 / 16.0;
            (
                DeviceCategory::Temp,
                false,
                level,
                format!("Temperature at {level:.1}"),
            )
        }
        SourceType::DigitalIn => {
            if config.is_pir(&uid) {
                (
                    DeviceCategory::Pir,
                    true,
                    0.0,
                    format!("Movement on {}", packet.source_channel),
                )
            } else {
                (
                    DeviceCategory::Button,
                    true,
                    0.0,
                    format!("Button on {}", packet.source_channel),
                )
            }
        }
        SourceType::DigitalOut => (
            DeviceCategory::Pir,
            true,
            0.0,
            format!("Trigger on {}", packet.source_channel),
        ),
        SourceType::Clock => {
            let message = match packet.payload {
                Payload::Clock {
                    hour,
                    minute,
                    second,
                    ..
                } => format!("Seen at {hour:02}:{minute:02}:{second:02}"),
                _ => "Seen".to_string(),
            };
            (DeviceCategory::Heartbeat, false, 0.0, message)
        }
    };

    Observation {
        uid,
        category,
        channel: packet.source_channel,
        ip: packet.sender,
        brick_id: packet.brick_id,
        state,
        level,
        name: None,
        message,
        origin: UpsertOrigin::Udp,
    }
}
