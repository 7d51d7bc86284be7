// MIT License - Copyright (c) 2026 webbrick-lan-bridge contributors

//! Schemas for the two XML documents a brick serves over HTTP:
//! `WbStatus.xml` (live channel readings) and `WbCfg.xml` (channel names
//! and trigger setup). Both are sent in ISO-8859-1 and must be transcoded
//! before parsing.
//!
//! Only the elements the poller consumes are modeled; everything else in
//! the documents (trigger tables, scheduled events, dwell times) is
//! skipped by the deserializer.

use serde::Deserialize;

use crate::error::Result;

/// Transcode an ISO-8859-1 byte stream to UTF-8.
///
/// Latin-1 code points map 1:1 onto the first 256 Unicode scalars, so the
/// widening is a direct per-byte conversion.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Parse a transcoded `WbStatus.xml` document.
pub fn parse_status(xml: &str) -> Result<BrickStatus> {
    Ok(quick_xml::de::from_str(xml)?)
}

/// Parse a transcoded `WbCfg.xml` document.
pub fn parse_config(xml: &str) -> Result<BrickConfig> {
    Ok(quick_xml::de::from_str(xml)?)
}

// ---------------------------------------------------------------------------
// WbStatus.xml
// ---------------------------------------------------------------------------

/// Live readings for every channel family on a brick.
#[derive(Debug, Default, Deserialize)]
pub struct BrickStatus {
    #[serde(rename = "@Ver", default)]
    pub version: String,
    /// Serial/node number - the brick id used in UIDs.
    #[serde(rename = "SN", default)]
    pub brick_id: u8,
    #[serde(rename = "DI", default)]
    pub digital_in_mask: u32,
    #[serde(rename = "DO", default)]
    pub digital_out_mask: u32,
    #[serde(rename = "Clock", default)]
    pub clock: BrickClock,
    #[serde(rename = "Tmps", default)]
    pub temps: TempReadings,
    #[serde(rename = "AOs", default)]
    pub analog_outs: AnalogOutReadings,
    #[serde(rename = "AIs", default)]
    pub analog_ins: AnalogInReadings,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrickClock {
    #[serde(rename = "Date", default)]
    pub date: String,
    #[serde(rename = "Time", default)]
    pub time: String,
    #[serde(rename = "Day", default)]
    pub day: u8,
}

#[derive(Debug, Default, Deserialize)]
pub struct TempReadings {
    #[serde(rename = "Tmp", default)]
    pub entries: Vec<TempReading>,
}

/// `<Tmp id="0" lo="-800" hi="384">320</Tmp>` - raw sixteenth-degrees.
#[derive(Debug, Deserialize)]
pub struct TempReading {
    #[serde(rename = "@id")]
    pub id: u8,
    #[serde(rename = "@lo", default)]
    pub low: i32,
    #[serde(rename = "@hi", default)]
    pub high: i32,
    #[serde(rename = "$text", default)]
    pub value: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalogOutReadings {
    #[serde(rename = "AO", default)]
    pub entries: Vec<AnalogOutReading>,
}

/// `<AO id="0">85</AO>` - percent output of a dimmer channel.
#[derive(Debug, Deserialize)]
pub struct AnalogOutReading {
    #[serde(rename = "@id")]
    pub id: u8,
    #[serde(rename = "$text", default)]
    pub value: i32,
}

#[derive(Debug, Default, Deserialize)]
pub struct AnalogInReadings {
    #[serde(rename = "AI", default)]
    pub entries: Vec<AnalogInReading>,
}

#[derive(Debug, Deserialize)]
pub struct AnalogInReading {
    #[serde(rename = "@id")]
    pub id: u8,
    #[serde(rename = "@lo", default)]
    pub low: i32,
    #[serde(rename = "@hi", default)]
    pub high: i32,
    #[serde(rename = "$text", default)]
    pub value: i32,
}

// ---------------------------------------------------------------------------
// WbCfg.xml
// ---------------------------------------------------------------------------

/// Channel names and network identity for a brick.
#[derive(Debug, Default, Deserialize)]
pub struct BrickConfig {
    #[serde(rename = "@Ver", default)]
    pub version: String,
    /// The brick's own name.
    #[serde(rename = "NN", default)]
    pub name: String,
    #[serde(rename = "SI", default)]
    pub interface: BrickInterface,
    /// Digital inputs (buttons / PIR sensors).
    #[serde(rename = "CDs", default)]
    pub digital_ins: NamedChannels,
    /// Temperature channels.
    #[serde(rename = "CTs", default)]
    pub temps: NamedChannels,
    /// Analog inputs.
    #[serde(rename = "CIs", default)]
    pub analog_ins: NamedChannels,
    /// Digital output names.
    #[serde(rename = "NOs", default)]
    pub output_names: NamedChannels,
    /// Analog output (light) names.
    #[serde(rename = "NAs", default)]
    pub analog_names: NamedChannels,
}

#[derive(Debug, Default, Deserialize)]
pub struct BrickInterface {
    #[serde(rename = "@ip", default)]
    pub ip: String,
    #[serde(rename = "@mac", default)]
    pub mac: String,
}

/// A list of `<XX id="n" Name="..."/>` entries. The element name differs
/// per family (`CD`, `CT`, `CI`, `NO`, `NA`) but the shape is identical,
/// so one alias-driven struct covers all five.
#[derive(Debug, Default, Deserialize)]
pub struct NamedChannels {
    #[serde(
        rename = "CD",
        alias = "CT",
        alias = "CI",
        alias = "NO",
        alias = "NA",
        default
    )]
    pub entries: Vec<NamedChannel>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedChannel {
    #[serde(rename = "@id")]
    pub id: u8,
    #[serde(rename = "@Name", default)]
    pub name: String,
}
