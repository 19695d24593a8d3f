//! Pulse equalizer: per-site palpation audio
//!
//! Runs once per played heartbeat. Each of the four pulse sites gets its
//! channel gain set from the touch-pressure and configured-strength
//! tables and a short poly trigger of the shared pulse track; untouched
//! or zero-strength sites are muted. The applied volume is written back
//! to the store as telemetry for the monitor display. Under PEA there is
//! no pulse to palpate, so the equalizer does nothing at all.

use auscult_core::gain::GAIN_OFF;
use auscult_core::pulse::{pulse_volume, PulseSite, PULSE_CAL_OFFSET, PULSE_TRACK};

use super::Engine;

impl Engine {
    pub(super) fn run_pulse_equalizer(&mut self) {
        let cardiac = self.store.cardiac();
        if cardiac.pea {
            return;
        }
        let pulse = self.store.pulse();

        for site in PulseSite::ALL {
            let touch = pulse.touch[site.index()];
            let strength = cardiac.pulse_strength[site.index()];
            let channel = site.channel();

            if touch.is_touching() && strength > 0 {
                let volume = pulse_volume(touch, strength) - PULSE_CAL_OFFSET;
                self.channel_gain(channel, volume);
                self.play(channel, PULSE_TRACK);
                self.store.set_pulse_volume(site, volume);
                log::debug!("pulse {}: touch {:?} strength {} volume {}", site, touch, strength, volume);
            } else {
                self.channel_gain(channel, GAIN_OFF);
                self.store.set_pulse_volume(site, GAIN_OFF);
            }
        }
    }
}
