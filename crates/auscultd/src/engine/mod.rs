//! The change-detecting poll loop
//!
//! The engine thread is the sole driver of state-machine stepping and
//! trigger-device I/O. Each tick it: forces the master output gain to
//! match auscultation engagement, drains pending timer events into the
//! state machines, compares the physiology store against its snapshot
//! and re-runs the sound selector on change, steps the lung and heart
//! machines, and maintains the air reservoir. Physiology updates become
//! visible to the engine only at tick boundaries, so staleness is
//! bounded by the tick period.

mod heart;
mod lung;
mod pulse;
mod snapshot;

pub use heart::HeartPhase;
pub use lung::{rise_duration, LungPhase};
pub use snapshot::CurrentSnapshot;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use auscult_core::catalog::SoundCategory;
use auscult_core::gain::{GAIN_MAX, GAIN_OFF};
use auscult_core::{DaemonConfig, PhysioStore, SoundCatalog};
use auscult_io::{AinReader, PneumoLine, TriggerBackend};
use crossbeam::channel::Receiver;
use thiserror::Error;

use crate::pneumatics::{PneumoError, PneumoHandle};
use crate::syncworker::SyncCounters;
use crate::timers::{EngineEvent, TimerError, TimerHandle, TimerKind};

/// Fatal engine errors. Anything here means the real-time scheduling
/// state is no longer trustworthy; the caller logs, drives the
/// actuators off and terminates.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Timer(#[from] TimerError),

    #[error(transparent)]
    Pneumatics(#[from] PneumoError),
}

pub struct Engine {
    config: DaemonConfig,
    store: Arc<PhysioStore>,
    catalog: SoundCatalog,
    trigger: Box<dyn TriggerBackend>,
    pneumo: PneumoHandle,
    timers: TimerHandle,
    events_rx: Receiver<EngineEvent>,
    counters: Arc<SyncCounters>,
    ain: Box<dyn AinReader>,

    current: CurrentSnapshot,
    heart: heart::HeartMachine,
    lung: lung::LungMachine,
    tank_on: bool,
}

impl Engine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DaemonConfig,
        store: Arc<PhysioStore>,
        catalog: SoundCatalog,
        trigger: Box<dyn TriggerBackend>,
        pneumo: PneumoHandle,
        timers: TimerHandle,
        events_rx: Receiver<EngineEvent>,
        counters: Arc<SyncCounters>,
        ain: Box<dyn AinReader>,
    ) -> Self {
        Self {
            config,
            store,
            catalog,
            trigger,
            pneumo,
            timers,
            events_rx,
            counters,
            ain,
            current: CurrentSnapshot::default(),
            heart: heart::HeartMachine::default(),
            lung: lung::LungMachine::new(),
            tank_on: false,
        }
    }

    /// Run ticks at the configured cadence until `running` clears.
    pub fn run(&mut self, running: &AtomicBool) -> Result<(), EngineError> {
        let period = Duration::from_millis(self.config.tick_ms);
        while running.load(Ordering::Relaxed) {
            self.tick()?;
            std::thread::sleep(period);
        }
        Ok(())
    }

    /// One poll-loop iteration.
    pub fn tick(&mut self) -> Result<(), EngineError> {
        self.apply_master_gain();
        self.drain_timer_events()?;
        self.detect_changes();
        self.step_lung()?;
        self.step_heart()?;
        self.check_tank()?;
        Ok(())
    }

    /// (a) Gate the master output channel on auscultation engagement.
    fn apply_master_gain(&mut self) {
        let side = self.store.auscultation().side;
        if side == 0 && self.current.master_gain != GAIN_OFF {
            self.channel_gain(0, GAIN_OFF);
            self.current.master_gain = GAIN_OFF;
            log::info!(
                "master off: counts {}/{}, heart gain {}, lung gains {}/{}",
                self.current.last_beats,
                self.current.last_breaths,
                self.current.heart_gain,
                self.current.right_lung_gain,
                self.current.left_lung_gain,
            );
        } else if side != 0 && self.current.master_gain != GAIN_MAX {
            self.channel_gain(0, GAIN_MAX);
            self.current.master_gain = GAIN_MAX;
            log::info!(
                "master on: counts {}/{}, heart gain {}, lung gains {}/{}",
                self.current.last_beats,
                self.current.last_breaths,
                self.current.heart_gain,
                self.current.right_lung_gain,
                self.current.left_lung_gain,
            );
        }
    }

    /// (b) Route expired timers into the state machines.
    fn drain_timer_events(&mut self) -> Result<(), EngineError> {
        while let Ok(event) = self.events_rx.try_recv() {
            match event {
                EngineEvent::Timer(TimerKind::Heart) => self.heart.on_cue_timer(),
                EngineEvent::Timer(TimerKind::Breath) => self.lung.on_cue_timer(),
                EngineEvent::Timer(TimerKind::Rise) => self.on_rise_timer()?,
                EngineEvent::Timer(TimerKind::Gap) => self.on_gap_timer()?,
            }
        }
        Ok(())
    }

    /// (c) Compare physiology names/rates against the snapshot and
    /// re-run the selector for whatever changed.
    fn detect_changes(&mut self) {
        let cardiac = self.store.cardiac();
        let respiration = self.store.respiration();
        let mut changed = false;

        if cardiac.rate != self.current.heart_rate
            || cardiac.heart_sound != self.current.heart_sound
        {
            log::info!(
                "cardiac change: rate {} -> {}, sound \"{}\" -> \"{}\"",
                self.current.heart_rate,
                cardiac.rate,
                self.current.heart_sound,
                cardiac.heart_sound,
            );
            self.current.heart_rate = cardiac.rate;
            self.current.heart_sound = cardiac.heart_sound.clone();
            changed = true;

            match self.catalog.select(
                SoundCategory::Heart,
                &self.current.heart_sound,
                self.current.heart_rate,
            ) {
                Some(track) => {
                    self.current.lubdub = Some(track);
                    self.current.applied_heart = None;
                }
                None => log::warn!(
                    "no heart track for \"{}\" at {}, keeping {:?}",
                    self.current.heart_sound,
                    self.current.heart_rate,
                    self.current.lubdub,
                ),
            }
        }

        if respiration.rate != self.current.respiration_rate
            || respiration.left_lung_sound != self.current.left_lung_sound
            || respiration.right_lung_sound != self.current.right_lung_sound
        {
            log::info!(
                "respiration change: rate {} -> {}, sounds \"{}\"/\"{}\" -> \"{}\"/\"{}\"",
                self.current.respiration_rate,
                respiration.rate,
                self.current.left_lung_sound,
                self.current.right_lung_sound,
                respiration.left_lung_sound,
                respiration.right_lung_sound,
            );
            self.current.respiration_rate = respiration.rate;
            self.current.left_lung_sound = respiration.left_lung_sound.clone();
            self.current.right_lung_sound = respiration.right_lung_sound.clone();
            changed = true;

            match self.catalog.select(
                SoundCategory::Lung,
                &self.current.left_lung_sound,
                self.current.respiration_rate,
            ) {
                Some(track) => {
                    self.current.inhale_left = Some(track);
                    self.current.applied_left = None;
                }
                None => log::warn!(
                    "no left inhale track for \"{}\" at {}, keeping {:?}",
                    self.current.left_lung_sound,
                    self.current.respiration_rate,
                    self.current.inhale_left,
                ),
            }
            match self.catalog.select(
                SoundCategory::Lung,
                &self.current.right_lung_sound,
                self.current.respiration_rate,
            ) {
                Some(track) => {
                    self.current.inhale_right = Some(track);
                    self.current.applied_right = None;
                }
                None => log::warn!(
                    "no right inhale track for \"{}\" at {}, keeping {:?}",
                    self.current.right_lung_sound,
                    self.current.respiration_rate,
                    self.current.inhale_right,
                ),
            }
        }

        if changed {
            self.report();
        }
    }

    /// Diagnostic line carrying enough context to reconstruct the
    /// engine's decisions from the log.
    fn report(&self) {
        log::info!(
            "counts {}/{}, heart {:?} gain {} ({:?}), lungs L {:?} gain {} / R {:?} gain {} ({:?}), master {}",
            self.current.last_beats,
            self.current.last_breaths,
            self.current.lubdub,
            self.current.heart_gain,
            self.heart.phase(),
            self.current.inhale_left,
            self.current.left_lung_gain,
            self.current.inhale_right,
            self.current.right_lung_gain,
            self.lung.phase(),
            self.current.master_gain,
        );
    }

    /// (e) Maintain the air reservoir fill pump with hysteresis.
    fn check_tank(&mut self) -> Result<(), EngineError> {
        let reading = self.ain.read(self.config.tank.ain_channel);
        if reading < self.config.tank.threshold_low && !self.tank_on {
            self.pneumo.set(PneumoLine::TankFill, true)?;
            self.tank_on = true;
            log::debug!("tank fill on at {}", reading);
        } else if reading > self.config.tank.threshold_high && self.tank_on {
            self.pneumo.set(PneumoLine::TankFill, false)?;
            self.tank_on = false;
            log::debug!("tank fill off at {}", reading);
        }
        Ok(())
    }

    // --- small trigger wrappers: device I/O errors degrade audio but
    // never take down the control plane ---

    pub(crate) fn channel_gain(&mut self, channel: u8, gain: i32) {
        if let Err(e) = self.trigger.channel_gain(channel, gain) {
            log::warn!("channel_gain({}, {}) failed: {}", channel, gain, e);
        }
    }

    pub(crate) fn track_gain(&mut self, track: u16, gain: i32) {
        if let Err(e) = self.trigger.track_gain(track, gain) {
            log::warn!("track_gain({}, {}) failed: {}", track, gain, e);
        }
    }

    pub(crate) fn play(&mut self, channel: u8, track: u16) {
        if let Err(e) = self.trigger.track_play_poly(channel, track) {
            log::warn!("track_play_poly({}, {}) failed: {}", channel, track, e);
        }
    }

    /// Snapshot access for assertions in integration tests.
    pub fn current(&self) -> &CurrentSnapshot {
        &self.current
    }

    pub fn heart_phase(&self) -> HeartPhase {
        self.heart.phase()
    }

    pub fn lung_phase(&self) -> LungPhase {
        self.lung.phase()
    }
}
