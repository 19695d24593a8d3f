//! Pulse palpation sites and volume tables
//!
//! Four palpable pulse points on the mannequin each drive a dedicated
//! audio channel playing the shared pulse track. The audible volume is a
//! two-stage table: how hard the student is pressing selects a base
//! volume, then the configured pulse strength for the site adjusts it.

use std::fmt;

use crate::gain::{GAIN_MAX, GAIN_OFF};

/// Device track shared by all four pulse channels.
pub const PULSE_TRACK: u16 = 103;

/// Calibration offset subtracted from every computed pulse volume; tuned
/// against the installed speaker set.
pub const PULSE_CAL_OFFSET: i32 = 25;

/// The four palpation sites, each wired to a fixed device channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseSite {
    LeftFemoral,
    RightFemoral,
    LeftDorsal,
    RightDorsal,
}

impl PulseSite {
    pub const ALL: [PulseSite; 4] = [
        PulseSite::LeftFemoral,
        PulseSite::RightFemoral,
        PulseSite::LeftDorsal,
        PulseSite::RightDorsal,
    ];

    /// Audio channel the site's speaker is wired to.
    pub fn channel(self) -> u8 {
        match self {
            PulseSite::LeftFemoral => 2,
            PulseSite::RightFemoral => 3,
            PulseSite::LeftDorsal => 4,
            PulseSite::RightDorsal => 5,
        }
    }

    /// Index into the store's per-site telemetry arrays.
    pub fn index(self) -> usize {
        match self {
            PulseSite::LeftFemoral => 0,
            PulseSite::RightFemoral => 1,
            PulseSite::LeftDorsal => 2,
            PulseSite::RightDorsal => 3,
        }
    }
}

impl fmt::Display for PulseSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PulseSite::LeftFemoral => write!(f, "left femoral"),
            PulseSite::RightFemoral => write!(f, "right femoral"),
            PulseSite::LeftDorsal => write!(f, "left dorsal"),
            PulseSite::RightDorsal => write!(f, "right dorsal"),
        }
    }
}

/// Touch pressure category reported by the palpation sensors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TouchPressure {
    #[default]
    None,
    Light,
    Normal,
    Heavy,
    Excessive,
}

impl TouchPressure {
    pub fn is_touching(self) -> bool {
        self != TouchPressure::None
    }
}

/// Base volume by touch pressure, then adjusted by configured strength
/// (0 none, 1 weak, 2 normal, 3 strong).
///
/// A strength of 0 forces the site silent regardless of touch; pressing
/// anywhere from lightly to excessively gets the full base volume with
/// today's calibration.
pub fn pulse_volume(pressure: TouchPressure, strength: i32) -> i32 {
    let base = match pressure {
        TouchPressure::None => GAIN_OFF,
        TouchPressure::Light => GAIN_MAX,
        TouchPressure::Normal => GAIN_MAX,
        TouchPressure::Heavy => GAIN_MAX,
        TouchPressure::Excessive => GAIN_MAX,
    };
    match strength {
        0 => GAIN_OFF,
        1 => base - 10,
        2 => base,
        _ => base + 10,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_zero_forces_off() {
        for pressure in [
            TouchPressure::Light,
            TouchPressure::Normal,
            TouchPressure::Heavy,
            TouchPressure::Excessive,
        ] {
            assert_eq!(pulse_volume(pressure, 0), GAIN_OFF);
        }
    }

    #[test]
    fn test_no_touch_base_is_off() {
        assert_eq!(pulse_volume(TouchPressure::None, 2), GAIN_OFF);
    }

    #[test]
    fn test_strength_deltas() {
        assert_eq!(pulse_volume(TouchPressure::Normal, 1), GAIN_MAX - 10);
        assert_eq!(pulse_volume(TouchPressure::Normal, 2), GAIN_MAX);
        assert_eq!(pulse_volume(TouchPressure::Normal, 3), GAIN_MAX + 10);
    }

    #[test]
    fn test_site_channels() {
        assert_eq!(PulseSite::LeftFemoral.channel(), 2);
        assert_eq!(PulseSite::RightFemoral.channel(), 3);
        assert_eq!(PulseSite::LeftDorsal.channel(), 4);
        assert_eq!(PulseSite::RightDorsal.channel(), 5);
    }
}
