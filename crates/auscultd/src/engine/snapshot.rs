//! Last-applied parameter cache
//!
//! The engine reacts to edges, not levels: each tick it compares the
//! physiology store against this snapshot and acts only on differences.
//! The snapshot therefore holds the last value of everything the engine
//! has already acted on, plus the device-side dedup state for gain
//! writes.

use auscult_core::gain::GAIN_OFF;

/// The engine's cached view of the last-applied parameters.
#[derive(Debug, Clone)]
pub struct CurrentSnapshot {
    pub heart_rate: i32,
    pub heart_sound: String,
    pub heart_sound_volume: i32,
    pub heart_sound_mute: bool,
    pub heart_strength: i32,
    pub pea: bool,

    pub respiration_rate: i32,
    pub left_lung_sound: String,
    pub right_lung_sound: String,
    pub left_lung_sound_volume: i32,
    pub left_lung_sound_mute: bool,
    pub left_lung_strength: i32,
    pub right_lung_sound_volume: i32,
    pub right_lung_sound_mute: bool,
    pub right_lung_strength: i32,

    pub master_gain: i32,
    pub heart_gain: i32,
    pub left_lung_gain: i32,
    pub right_lung_gain: i32,

    /// Selected heart (lub-dub) track
    pub lubdub: Option<u16>,
    /// Selected inhale tracks per lung
    pub inhale_left: Option<u16>,
    pub inhale_right: Option<u16>,

    /// Counter values last observed by the state machines
    pub last_beats: u32,
    pub last_breaths: u32,

    /// Last (track, gain) actually written to the device, per category.
    /// Cleared when the selection changes to force a rewrite.
    pub applied_heart: Option<(u16, i32)>,
    pub applied_left: Option<(u16, i32)>,
    pub applied_right: Option<(u16, i32)>,
}

impl Default for CurrentSnapshot {
    fn default() -> Self {
        Self {
            heart_rate: 0,
            heart_sound: String::new(),
            heart_sound_volume: 0,
            heart_sound_mute: false,
            heart_strength: 0,
            pea: false,
            respiration_rate: 0,
            left_lung_sound: String::new(),
            right_lung_sound: String::new(),
            left_lung_sound_volume: 0,
            left_lung_sound_mute: false,
            left_lung_strength: 0,
            right_lung_sound_volume: 0,
            right_lung_sound_mute: false,
            right_lung_strength: 0,
            master_gain: 0,
            heart_gain: GAIN_OFF,
            left_lung_gain: GAIN_OFF,
            right_lung_gain: GAIN_OFF,
            lubdub: None,
            inhale_left: None,
            inhale_right: None,
            last_beats: 0,
            last_breaths: 0,
            applied_heart: None,
            applied_left: None,
            applied_right: None,
        }
    }
}
