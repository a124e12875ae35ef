//! Outbound text records.
//!
//! The receiver is a line-oriented parser: `POS` records are tab-separated,
//! channel descriptors are newline-separated, and `SPEAKERS` records join
//! descriptors with a vertical-tab control character. Floats are always
//! written with six fractional digits.

use std::fmt::Write;

use crate::geometry::{PositionInfo, Vec3};

pub const FIELD_SEPARATOR: char = '\t';
pub const DESCRIPTOR_FIELD_SEPARATOR: char = '\n';
pub const DESCRIPTOR_SEPARATOR: char = '\u{0B}';
/// Marks a command the receiver answers asynchronously.
pub const ASYNC_COMMAND_MARKER: char = '~';
pub const VEHICLE_PART_SEPARATOR: char = '\u{10}';
pub const FREQUENCY_SEPARATOR: char = '|';
/// Vehicle identity of an entity that is not inside anything.
pub const NO_VEHICLE: &str = "no";

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// One `POS` line describing an entity's position and audibility.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub name: String,
    pub position: PositionInfo,
    pub can_speak: bool,
    pub use_short_range: bool,
    pub use_digital: bool,
    pub vehicle_id: String,
    pub terrain_attenuation: f32,
    pub voice_volume: f32,
    pub object_attenuation: f32,
    pub is_spectating: bool,
    pub is_enemy: bool,
}

impl PositionRecord {
    /// Encode as the tab-separated `POS` line.
    ///
    /// The short-range flag occupies both the short- and long-range slots;
    /// receivers in the field depend on that layout.
    #[must_use]
    pub fn encode(&self) -> String {
        let fields = [
            "POS".to_string(),
            self.name.clone(),
            self.position.eye_pos.to_string(),
            self.position.eye_direction.to_string(),
            flag(self.can_speak).to_string(),
            flag(self.use_short_range).to_string(),
            flag(self.use_short_range).to_string(),
            flag(self.use_digital).to_string(),
            self.vehicle_id.clone(),
            format!("{:.6}", self.terrain_attenuation),
            format!("{:.6}", self.voice_volume),
            format!("{:.6}", self.object_attenuation),
            flag(self.is_spectating).to_string(),
            flag(self.is_enemy).to_string(),
        ];
        fields.join(&FIELD_SEPARATOR.to_string())
    }
}

/// How much a vehicle shields its occupant from the outside.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Isolation {
    /// Occupant has their head out of the hatch.
    TurnedOut,
    Amount(f32),
}

/// Vehicle identity sent in the `POS` record; receivers compare it to decide
/// whether two speakers share a vehicle and intercom.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleIdentity {
    pub net_id: String,
    pub isolation: Isolation,
    pub intercom_slot: Option<String>,
    pub velocity: Vec3,
}

impl VehicleIdentity {
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(64);
        out.push_str(&self.net_id);
        out.push(VEHICLE_PART_SEPARATOR);
        match self.isolation {
            Isolation::TurnedOut => out.push_str("turnout"),
            Isolation::Amount(amount) => {
                let _ = write!(out, "{amount:.6}");
            }
        }
        out.push(VEHICLE_PART_SEPARATOR);
        out.push_str(self.intercom_slot.as_deref().unwrap_or("-1"));
        out.push(VEHICLE_PART_SEPARATOR);
        let _ = write!(out, "{}", self.velocity);
        out
    }
}

/// One channel a speaker is currently transmitting on through a loudspeaker.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    pub network_id: String,
    pub frequencies: Vec<String>,
    pub speaker_name: String,
    pub volume: f32,
    pub vehicle_id: String,
    pub eye_height: f32,
}

impl ChannelDescriptor {
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::with_capacity(128);
        out.push_str(&self.network_id);
        out.push(DESCRIPTOR_FIELD_SEPARATOR);
        out.push_str(&self.frequencies.join(&FREQUENCY_SEPARATOR.to_string()));
        out.push(DESCRIPTOR_FIELD_SEPARATOR);
        out.push_str(&self.speaker_name);
        out.push(DESCRIPTOR_FIELD_SEPARATOR);
        // Position is resolved by the receiver.
        out.push_str("[]");
        out.push(DESCRIPTOR_FIELD_SEPARATOR);
        let _ = write!(out, "{:.6}", self.volume);
        out.push(DESCRIPTOR_FIELD_SEPARATOR);
        out.push_str(&self.vehicle_id);
        out.push(DESCRIPTOR_FIELD_SEPARATOR);
        let _ = write!(out, "{:.6}", self.eye_height);
        out
    }
}

/// The `SPEAKERS` record listing every active loudspeaker channel.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SpeakersRecord {
    pub channels: Vec<ChannelDescriptor>,
}

impl SpeakersRecord {
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::from("SPEAKERS");
        out.push(FIELD_SEPARATOR);
        for (i, channel) in self.channels.iter().enumerate() {
            if i > 0 {
                out.push(DESCRIPTOR_SEPARATOR);
            }
            out.push_str(&channel.encode());
        }
        out.push(ASYNC_COMMAND_MARKER);
        out
    }
}
