//! Heart state machine
//!
//! A beat-counter edge arms the heart cue timer; when the cue fires the
//! next tick plays the selected lub-dub track and runs the pulse
//! equalizer, then the machine returns to idle. Under PEA the beat is
//! silent: the cue still cycles (the machine must not wedge) but no
//! audio or palpation output happens.

use std::time::Duration;

use auscult_core::gain::GAIN_OFF;
use auscult_core::volume_to_gain;

use super::{Engine, EngineError};
use crate::timers::TimerKind;

/// Observable heart machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeartPhase {
    /// Waiting for the next beat edge
    #[default]
    Idle,
    /// Cue timer pending
    Armed,
    /// Cue fired; playback due on the next step
    Ready,
}

#[derive(Debug, Default)]
pub(super) struct HeartMachine {
    phase: HeartPhase,
}

impl HeartMachine {
    /// Cue timer expired. Moves the phase forward only; a stale timer
    /// event while idle is ignored.
    pub(super) fn on_cue_timer(&mut self) {
        if self.phase == HeartPhase::Armed {
            self.phase = HeartPhase::Ready;
        }
    }

    pub(super) fn phase(&self) -> HeartPhase {
        self.phase
    }
}

impl Engine {
    /// One heart-machine step, run unconditionally each tick.
    pub(super) fn step_heart(&mut self) -> Result<(), EngineError> {
        self.set_heart_volume();

        match self.heart.phase {
            HeartPhase::Idle => {
                let beats = self.counters.beats();
                if beats != self.current.last_beats {
                    self.current.last_beats = beats;
                    self.timers.arm(
                        TimerKind::Heart,
                        Duration::from_millis(self.config.heart_cue_ms),
                    )?;
                    self.heart.phase = HeartPhase::Armed;
                }
            }
            HeartPhase::Armed => {}
            HeartPhase::Ready => {
                if !self.store.cardiac().pea {
                    if let Some(track) = self.current.lubdub {
                        self.play(0, track);
                    }
                    self.run_pulse_equalizer();
                }
                // A PEA beat is silent but the machine still completes.
                self.heart.phase = HeartPhase::Idle;
            }
        }
        Ok(())
    }

    /// Recompute the heart gain on an observed change and push it to the
    /// device when the applied (track, gain) pair would differ.
    fn set_heart_volume(&mut self) {
        let cardiac = self.store.cardiac();
        let strength = self.store.auscultation().heart_strength;

        if cardiac.heart_sound_mute != self.current.heart_sound_mute
            || cardiac.heart_sound_volume != self.current.heart_sound_volume
            || strength != self.current.heart_strength
            || cardiac.pea != self.current.pea
        {
            self.current.heart_sound_mute = cardiac.heart_sound_mute;
            self.current.heart_sound_volume = cardiac.heart_sound_volume;
            self.current.heart_strength = strength;
            self.current.pea = cardiac.pea;

            // PEA overrides volume and strength outright.
            self.current.heart_gain = if cardiac.pea {
                GAIN_OFF
            } else {
                volume_to_gain(cardiac.heart_sound_volume, strength)
            };
        }

        if let Some(track) = self.current.lubdub {
            let desired = (track, self.current.heart_gain);
            if self.current.applied_heart != Some(desired) {
                self.track_gain(track, self.current.heart_gain);
                self.current.applied_heart = Some(desired);
            }
        }
    }
}
