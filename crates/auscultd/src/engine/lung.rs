//! Lung state machine and chest rise/fall sequencing
//!
//! A breath-counter edge arms the breath cue timer (inhale sound) and
//! starts the pneumatic sequence: fall off, settle, rise on, hold for
//! 30% of the breath period, settle, fall on. The settling gaps between
//! opposing solenoid transitions are their own one-shot timer — nothing
//! blocks inside a handler, the gap is just another event.
//!
//! A safety countdown forces the lung lines off when the respiration
//! rate reads zero for long enough, so a rate drop mid-breath cannot
//! leave a solenoid stuck open against the mannequin chest.

use std::time::Duration;

use auscult_core::volume_to_gain;
use auscult_io::PneumoLine;

use super::{Engine, EngineError};
use crate::timers::TimerKind;

/// Fallback rise duration when the configured rate makes no sense.
const RISE_FALLBACK: Duration = Duration::from_secs(1);

/// Observable lung machine phase (sound cue only; the actuator sequence
/// runs on its own timers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LungPhase {
    /// Waiting for the next breath edge
    #[default]
    Idle,
    /// Cue timer pending
    Armed,
    /// Cue fired; inhale playback due on the next step
    Ready,
}

/// Deferred actuator action executed when the gap timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum GapAction {
    /// Open the rise solenoids and start the rise countdown
    RiseOn,
    /// Open the fall solenoid
    FallOn,
}

#[derive(Debug)]
pub(super) struct LungMachine {
    phase: LungPhase,
    gap_pending: Option<GapAction>,
    /// Remaining zero-rate ticks before the stuck-open protection trips
    exhale_ticks: u32,
    chest_movement_prev: bool,
}

impl LungMachine {
    pub(super) fn new() -> Self {
        Self {
            phase: LungPhase::Idle,
            gap_pending: None,
            exhale_ticks: 0,
            chest_movement_prev: false,
        }
    }

    /// Breath cue timer expired; forward only.
    pub(super) fn on_cue_timer(&mut self) {
        if self.phase == LungPhase::Armed {
            self.phase = LungPhase::Ready;
        }
    }

    pub(super) fn phase(&self) -> LungPhase {
        self.phase
    }
}

/// How long the chest rises: `rise_fraction` of the breath period.
///
/// A zero or negative rate (or a fraction that computes non-positive)
/// substitutes a one-second fallback so the solenoids still cycle.
pub fn rise_duration(rise_fraction: f64, rate: i32) -> Duration {
    if rate <= 0 {
        log::warn!("rise duration: respiration rate {} is unusable, using fallback", rate);
        return RISE_FALLBACK;
    }
    let seconds = rise_fraction * (60.0 / rate as f64);
    if seconds <= 0.0 {
        log::warn!(
            "rise duration: computed {}s for rate {}, using fallback",
            seconds,
            rate
        );
        return RISE_FALLBACK;
    }
    Duration::from_secs_f64(seconds)
}

impl Engine {
    /// One lung-machine step, run unconditionally each tick.
    pub(super) fn step_lung(&mut self) -> Result<(), EngineError> {
        let respiration = self.store.respiration();
        let side = self.store.auscultation().side;

        // Chest-movement disable edge: park the lung lines. The tank
        // line stays with reservoir maintenance.
        if self.lung.chest_movement_prev && !respiration.chest_movement {
            self.pneumo.lungs_off()?;
        }
        self.lung.chest_movement_prev = respiration.chest_movement;

        self.set_lung_volumes();

        match self.lung.phase {
            LungPhase::Idle => {
                let breaths = self.counters.breaths();
                if breaths != self.current.last_breaths {
                    self.current.last_breaths = breaths;

                    self.timers.arm(
                        TimerKind::Breath,
                        Duration::from_millis(self.config.breath_cue_ms),
                    )?;
                    self.lung.phase = LungPhase::Armed;

                    // Start the inflate sequence: fall closed, settle,
                    // then rise (via the gap timer).
                    self.pneumo.set(PneumoLine::Fall, false)?;
                    self.lung.gap_pending = Some(GapAction::RiseOn);
                    self.timers
                        .arm(TimerKind::Gap, Duration::from_millis(self.config.gap_ms))?;

                    self.lung.exhale_ticks = self.config.exhale_safety_ticks;
                } else if self.current.respiration_rate == 0 && self.lung.exhale_ticks > 0 {
                    self.lung.exhale_ticks -= 1;
                    if self.lung.exhale_ticks == 0 {
                        self.pneumo.lungs_off()?;
                        log::warn!("exhale safety limit hit, lung actuators forced off");
                    }
                }
            }
            LungPhase::Armed => {}
            LungPhase::Ready => {
                // Only the auscultated side is audible; with nobody
                // listening the channel bandwidth is saved entirely.
                let track = match side {
                    1 => self.current.inhale_left,
                    2 => self.current.inhale_right,
                    _ => None,
                };
                if let Some(track) = track {
                    self.play(0, track);
                }
                self.lung.phase = LungPhase::Idle;
            }
        }
        Ok(())
    }

    /// Rise timer expired: end the rise phase.
    pub(super) fn on_rise_timer(&mut self) -> Result<(), EngineError> {
        if self.store.respiration().chest_movement {
            self.pneumo.set(PneumoLine::RiseLeft, false)?;
            self.pneumo.set(PneumoLine::RiseRight, false)?;
            self.lung.gap_pending = Some(GapAction::FallOn);
            self.timers
                .arm(TimerKind::Gap, Duration::from_millis(self.config.gap_ms))?;
        } else {
            self.pneumo.lungs_off()?;
        }
        Ok(())
    }

    /// Gap timer expired: perform the deferred solenoid transition.
    pub(super) fn on_gap_timer(&mut self) -> Result<(), EngineError> {
        match self.lung.gap_pending.take() {
            Some(GapAction::RiseOn) => {
                if self.store.respiration().chest_movement {
                    self.pneumo.set(PneumoLine::RiseLeft, true)?;
                    self.pneumo.set(PneumoLine::RiseRight, true)?;
                }
                let duration =
                    rise_duration(self.config.rise_fraction, self.store.respiration().rate);
                self.timers.arm(TimerKind::Rise, duration)?;
            }
            Some(GapAction::FallOn) => {
                self.pneumo.set(PneumoLine::Fall, true)?;
            }
            None => {}
        }
        Ok(())
    }

    /// Recompute both lung gains on observed change and push them to the
    /// device. A side's gain is only written while that side could be
    /// heard: the left track gain is skipped when listening right, and
    /// vice versa.
    fn set_lung_volumes(&mut self) {
        let respiration = self.store.respiration();
        let auscultation = self.store.auscultation();

        if respiration.left_lung_sound_mute != self.current.left_lung_sound_mute
            || respiration.left_lung_sound_volume != self.current.left_lung_sound_volume
            || auscultation.left_lung_strength != self.current.left_lung_strength
        {
            self.current.left_lung_sound_mute = respiration.left_lung_sound_mute;
            self.current.left_lung_sound_volume = respiration.left_lung_sound_volume;
            self.current.left_lung_strength = auscultation.left_lung_strength;
            self.current.left_lung_gain = volume_to_gain(
                respiration.left_lung_sound_volume,
                auscultation.left_lung_strength,
            );
        }
        if let Some(track) = self.current.inhale_left {
            let desired = (track, self.current.left_lung_gain);
            if auscultation.side != 2 && self.current.applied_left != Some(desired) {
                self.track_gain(track, self.current.left_lung_gain);
                self.current.applied_left = Some(desired);
            }
        }

        if respiration.right_lung_sound_mute != self.current.right_lung_sound_mute
            || respiration.right_lung_sound_volume != self.current.right_lung_sound_volume
            || auscultation.right_lung_strength != self.current.right_lung_strength
        {
            self.current.right_lung_sound_mute = respiration.right_lung_sound_mute;
            self.current.right_lung_sound_volume = respiration.right_lung_sound_volume;
            self.current.right_lung_strength = auscultation.right_lung_strength;
            self.current.right_lung_gain = volume_to_gain(
                respiration.right_lung_sound_volume,
                auscultation.right_lung_strength,
            );
        }
        if let Some(track) = self.current.inhale_right {
            let desired = (track, self.current.right_lung_gain);
            if auscultation.side != 1 && self.current.applied_right != Some(desired) {
                self.track_gain(track, self.current.right_lung_gain);
                self.current.applied_right = Some(desired);
            }
        }
    }
}
