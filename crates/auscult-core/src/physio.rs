//! Shared physiology store sampled by the engine
//!
//! The physiology models (cardiac, respiration) and the palpation sensor
//! scanner publish into this store at their own cadence; the engine
//! samples it once per tick. Each section sits behind its own `RwLock`
//! and reads clone the section — there is deliberately no transaction
//! across sections. The engine treats every read as a best-effort
//! snapshot and reacts only to observed changes, so a torn read across
//! sections costs at most one tick of staleness.
//!
//! The engine writes back exactly one thing: per-site pulse volume
//! telemetry, for the monitor display.

use std::sync::RwLock;

use crate::pulse::{PulseSite, TouchPressure};

/// Cardiac model outputs plus per-site configured pulse strengths.
#[derive(Debug, Clone, Default)]
pub struct CardiacState {
    /// Heart rate, beats per minute
    pub rate: i32,
    /// Selected heart sound name, catalog-normalized
    pub heart_sound: String,
    pub heart_sound_volume: i32,
    pub heart_sound_mute: bool,
    /// Pulseless electrical activity: electrical rhythm with no pulse
    pub pea: bool,
    /// Configured pulse strength per site: 0 none, 1 weak, 2 normal, 3 strong
    pub pulse_strength: [i32; 4],
}

/// Respiration model outputs.
#[derive(Debug, Clone, Default)]
pub struct RespirationState {
    /// Respiration rate, breaths per minute
    pub rate: i32,
    pub left_lung_sound: String,
    pub right_lung_sound: String,
    pub left_lung_sound_volume: i32,
    pub left_lung_sound_mute: bool,
    pub right_lung_sound_volume: i32,
    pub right_lung_sound_mute: bool,
    /// Whether the chest rise/fall pneumatics should move
    pub chest_movement: bool,
    /// An instructor-triggered manual breath is in progress
    pub manual_breath: bool,
}

/// Where the virtual stethoscope currently sits.
#[derive(Debug, Clone, Default)]
pub struct AuscultationState {
    /// 0 = not listening, 1 = left side, 2 = right side
    pub side: u8,
    pub heart_strength: i32,
    pub left_lung_strength: i32,
    pub right_lung_strength: i32,
    /// RFID tag of the sensed listening position
    pub tag: String,
    pub col: i32,
    pub row: i32,
}

/// Palpation sensor readings and engine-written volume telemetry,
/// indexed by [`PulseSite::index`].
#[derive(Debug, Clone, Default)]
pub struct PulseState {
    pub touch: [TouchPressure; 4],
    /// Sensor baseline per site (monitor display)
    pub base: [i32; 4],
    /// Raw sensor reading per site (monitor display)
    pub ain: [i32; 4],
    /// Last pulse volume the engine applied per site
    pub volume: [i32; 4],
}

/// The shared store. Producers and the engine reference it via
/// `Arc<PhysioStore>`.
#[derive(Debug, Default)]
pub struct PhysioStore {
    cardiac: RwLock<CardiacState>,
    respiration: RwLock<RespirationState>,
    auscultation: RwLock<AuscultationState>,
    pulse: RwLock<PulseState>,
}

impl PhysioStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cardiac(&self) -> CardiacState {
        self.cardiac.read().expect("cardiac lock poisoned").clone()
    }

    pub fn respiration(&self) -> RespirationState {
        self.respiration
            .read()
            .expect("respiration lock poisoned")
            .clone()
    }

    pub fn auscultation(&self) -> AuscultationState {
        self.auscultation
            .read()
            .expect("auscultation lock poisoned")
            .clone()
    }

    pub fn pulse(&self) -> PulseState {
        self.pulse.read().expect("pulse lock poisoned").clone()
    }

    pub fn update_cardiac(&self, f: impl FnOnce(&mut CardiacState)) {
        f(&mut self.cardiac.write().expect("cardiac lock poisoned"));
    }

    pub fn update_respiration(&self, f: impl FnOnce(&mut RespirationState)) {
        f(&mut self.respiration.write().expect("respiration lock poisoned"));
    }

    pub fn update_auscultation(&self, f: impl FnOnce(&mut AuscultationState)) {
        f(&mut self.auscultation.write().expect("auscultation lock poisoned"));
    }

    pub fn update_pulse(&self, f: impl FnOnce(&mut PulseState)) {
        f(&mut self.pulse.write().expect("pulse lock poisoned"));
    }

    /// Record the volume the engine applied for one pulse site.
    pub fn set_pulse_volume(&self, site: PulseSite, volume: i32) {
        self.update_pulse(|p| p.volume[site.index()] = volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_read_back() {
        let store = PhysioStore::new();
        store.update_cardiac(|c| {
            c.rate = 72;
            c.heart_sound = "normal".into();
            c.pea = false;
        });
        store.update_auscultation(|a| a.side = 1);

        assert_eq!(store.cardiac().rate, 72);
        assert_eq!(store.cardiac().heart_sound, "normal");
        assert_eq!(store.auscultation().side, 1);
    }

    #[test]
    fn test_pulse_telemetry() {
        let store = PhysioStore::new();
        store.set_pulse_volume(PulseSite::RightDorsal, -15);
        assert_eq!(store.pulse().volume[PulseSite::RightDorsal.index()], -15);
    }
}
