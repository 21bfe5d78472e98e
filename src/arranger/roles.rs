// Drum Roles - Kit voices and their General MIDI note numbers
// Every role maps 1:1 onto a fixed GM percussion key

use serde::{Deserialize, Serialize};
use std::fmt;

/// General Music MIDI note numbers for drums
pub const MIDI_KICK: u8 = 36;         // C1
pub const MIDI_SIDE_STICK: u8 = 37;   // C#1
pub const MIDI_SNARE: u8 = 38;        // D1
pub const MIDI_FLOOR_TOM: u8 = 41;    // F1
pub const MIDI_CLOSED_HIHAT: u8 = 42; // F#1
pub const MIDI_PEDAL_HIHAT: u8 = 44;  // G#1
pub const MIDI_LOW_TOM: u8 = 45;      // A1
pub const MIDI_OPEN_HIHAT: u8 = 46;   // A#1
pub const MIDI_MID_TOM: u8 = 47;      // B1
pub const MIDI_CRASH: u8 = 49;        // C#2
pub const MIDI_HIGH_TOM: u8 = 50;     // D2
pub const MIDI_RIDE: u8 = 51;         // D#2

/// A drum-kit voice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrumRole {
    Kick,
    Snare,
    SideStick,
    ClosedHat,
    PedalHat,
    OpenHat,
    Crash,
    Ride,
    TomHigh,
    TomMid,
    TomLow,
    FloorTom,
}

/// Which limb normally plays a role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limb {
    RightFoot,
    LeftFoot,
    Hands,
}

impl DrumRole {
    /// All roles in kit order
    pub const ALL: [DrumRole; 12] = [
        DrumRole::Kick,
        DrumRole::Snare,
        DrumRole::SideStick,
        DrumRole::ClosedHat,
        DrumRole::PedalHat,
        DrumRole::OpenHat,
        DrumRole::Crash,
        DrumRole::Ride,
        DrumRole::TomHigh,
        DrumRole::TomMid,
        DrumRole::TomLow,
        DrumRole::FloorTom,
    ];

    /// Fixed GM drum note for this role
    pub fn midi_note(&self) -> u8 {
        match self {
            DrumRole::Kick => MIDI_KICK,
            DrumRole::Snare => MIDI_SNARE,
            DrumRole::SideStick => MIDI_SIDE_STICK,
            DrumRole::ClosedHat => MIDI_CLOSED_HIHAT,
            DrumRole::PedalHat => MIDI_PEDAL_HIHAT,
            DrumRole::OpenHat => MIDI_OPEN_HIHAT,
            DrumRole::Crash => MIDI_CRASH,
            DrumRole::Ride => MIDI_RIDE,
            DrumRole::TomHigh => MIDI_HIGH_TOM,
            DrumRole::TomMid => MIDI_MID_TOM,
            DrumRole::TomLow => MIDI_LOW_TOM,
            DrumRole::FloorTom => MIDI_FLOOR_TOM,
        }
    }

    /// Reverse lookup from a GM drum note
    pub fn from_midi_note(note: u8) -> Option<DrumRole> {
        DrumRole::ALL.iter().copied().find(|role| role.midi_note() == note)
    }

    /// Convert to string representation
    pub fn to_str(&self) -> &'static str {
        match self {
            DrumRole::Kick => "kick",
            DrumRole::Snare => "snare",
            DrumRole::SideStick => "side_stick",
            DrumRole::ClosedHat => "closed_hat",
            DrumRole::PedalHat => "pedal_hat",
            DrumRole::OpenHat => "open_hat",
            DrumRole::Crash => "crash",
            DrumRole::Ride => "ride",
            DrumRole::TomHigh => "tom_high",
            DrumRole::TomMid => "tom_mid",
            DrumRole::TomLow => "tom_low",
            DrumRole::FloorTom => "floor_tom",
        }
    }

    /// Limb that plays this role in a standard right-handed setup
    pub fn limb(&self) -> Limb {
        match self {
            DrumRole::Kick => Limb::RightFoot,
            DrumRole::PedalHat => Limb::LeftFoot,
            _ => Limb::Hands,
        }
    }

    /// Time-keeping cymbal roles
    pub fn is_timekeeper(&self) -> bool {
        matches!(
            self,
            DrumRole::ClosedHat | DrumRole::OpenHat | DrumRole::PedalHat | DrumRole::Ride
        )
    }

    /// Tom roles used by fills
    pub fn is_tom(&self) -> bool {
        matches!(
            self,
            DrumRole::TomHigh | DrumRole::TomMid | DrumRole::TomLow | DrumRole::FloorTom
        )
    }
}

impl fmt::Display for DrumRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}
