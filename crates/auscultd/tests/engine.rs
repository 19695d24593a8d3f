//! End-to-end engine scenarios
//!
//! These run the real timer and pneumatics service threads around an
//! engine that is ticked manually, with beats and breaths injected
//! through the sync counters and all device I/O captured by the
//! recording backends. Cue and gap delays are shortened so a scenario
//! completes in a few tens of milliseconds.

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use auscult_core::gain::{GAIN_MAX, GAIN_OFF};
use auscult_core::pulse::{pulse_volume, PulseSite, TouchPressure, PULSE_CAL_OFFSET, PULSE_TRACK};
use auscult_core::{DaemonConfig, PhysioStore, SoundCatalog};
use auscult_io::{NullAin, PneumoLine, RecordingGpio, RecordingTrigger, TriggerCall};

use auscultd::engine::{Engine, HeartPhase, LungPhase};
use auscultd::pneumatics::PneumaticsService;
use auscultd::syncworker::SyncCounters;
use auscultd::timers::TimerService;

const CATALOG: &str = "\
heart,112,normal,0,60
heart,113,normal,61,120
lung,183,normal,0,60
lung,184,wheeze,0,60
";

struct Harness {
    engine: Engine,
    store: Arc<PhysioStore>,
    counters: Arc<SyncCounters>,
    trigger_calls: Arc<Mutex<Vec<TriggerCall>>>,
    gpio_writes: Arc<Mutex<Vec<(PneumoLine, bool)>>>,
}

impl Harness {
    fn new(configure: impl FnOnce(&mut DaemonConfig)) -> Self {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut config = DaemonConfig::default();
        config.heart_cue_ms = 5;
        config.breath_cue_ms = 5;
        config.gap_ms = 5;
        configure(&mut config);

        let store = Arc::new(PhysioStore::new());
        let catalog = SoundCatalog::from_reader(CATALOG.as_bytes()).unwrap();

        let trigger = RecordingTrigger::new();
        let trigger_calls = trigger.journal();
        let gpio = RecordingGpio::new();
        let gpio_writes = gpio.journal();

        let pneumo = PneumaticsService::spawn(Box::new(gpio)).unwrap();
        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        let timers = TimerService::spawn(event_tx).unwrap();
        let counters = Arc::new(SyncCounters::new());

        let engine = Engine::new(
            config,
            Arc::clone(&store),
            catalog,
            Box::new(trigger),
            pneumo,
            timers,
            event_rx,
            Arc::clone(&counters),
            Box::new(NullAin::default()),
        );

        Harness {
            engine,
            store,
            counters,
            trigger_calls,
            gpio_writes,
        }
    }

    fn tick(&mut self) {
        self.engine.tick().unwrap();
    }

    /// Let any armed short timer expire, then tick.
    fn settle_tick(&mut self) {
        thread::sleep(Duration::from_millis(30));
        self.tick();
    }

    fn plays_of(&self, track: u16) -> usize {
        self.trigger_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| matches!(c, TriggerCall::TrackPlayPoly { track: t, .. } if *t == track))
            .count()
    }

    fn gpio_snapshot(&self) -> Vec<(PneumoLine, bool)> {
        self.gpio_writes.lock().unwrap().clone()
    }
}

fn is_subsequence(haystack: &[(PneumoLine, bool)], needle: &[(PneumoLine, bool)]) -> bool {
    let mut want = needle.iter();
    let mut next = want.next();
    for item in haystack {
        if Some(item) == next {
            next = want.next();
        }
    }
    next.is_none()
}

fn listening_left(store: &PhysioStore) {
    store.update_auscultation(|a| {
        a.side = 1;
        a.heart_strength = 5;
        a.left_lung_strength = 5;
        a.right_lung_strength = 5;
    });
}

#[test]
fn test_beat_edge_plays_one_lubdub_then_idles() {
    let mut h = Harness::new(|_| {});
    h.store.update_cardiac(|c| {
        c.rate = 30;
        c.heart_sound = "normal".into();
        c.heart_sound_volume = 5;
    });
    listening_left(&h.store);

    h.tick();
    assert_eq!(h.engine.current().lubdub, Some(112));

    h.counters.note_beat();
    h.tick();
    assert_eq!(h.engine.heart_phase(), HeartPhase::Armed);

    h.settle_tick();
    assert_eq!(h.plays_of(112), 1);
    assert_eq!(h.engine.heart_phase(), HeartPhase::Idle);

    // No further beats: extra ticks must not replay the track.
    for _ in 0..5 {
        h.tick();
    }
    assert_eq!(h.plays_of(112), 1);
}

#[test]
fn test_catalog_miss_keeps_previous_selection() {
    let mut h = Harness::new(|_| {});
    h.store.update_cardiac(|c| {
        c.rate = 30;
        c.heart_sound = "normal".into();
    });
    listening_left(&h.store);
    h.tick();
    assert_eq!(h.engine.current().lubdub, Some(112));

    // No catalog entry for this name: the old track stays selected.
    h.store.update_cardiac(|c| c.heart_sound = "murmur".into());
    h.tick();
    assert_eq!(h.engine.current().lubdub, Some(112));

    // A valid change still reselects.
    h.store.update_cardiac(|c| {
        c.heart_sound = "normal".into();
        c.rate = 90;
    });
    h.tick();
    assert_eq!(h.engine.current().lubdub, Some(113));
}

#[test]
fn test_pea_beat_is_silent_but_machine_completes() {
    let mut h = Harness::new(|_| {});
    h.store.update_cardiac(|c| {
        c.rate = 30;
        c.heart_sound = "normal".into();
        c.heart_sound_volume = 5;
        c.pea = true;
    });
    listening_left(&h.store);
    h.tick();

    h.counters.note_beat();
    h.tick();
    h.settle_tick();

    assert_eq!(h.plays_of(112), 0);
    assert_eq!(h.engine.heart_phase(), HeartPhase::Idle);
    assert!(h.trigger_calls.lock().unwrap().contains(&TriggerCall::TrackGain {
        track: 112,
        gain: GAIN_OFF,
    }));
}

#[test]
fn test_breath_sequence_cycles_solenoids_and_plays_inhale() {
    let mut h = Harness::new(|c| c.rise_fraction = 0.001);
    h.store.update_respiration(|r| {
        r.rate = 60;
        r.left_lung_sound = "normal".into();
        r.right_lung_sound = "wheeze".into();
        r.left_lung_sound_volume = 5;
        r.right_lung_sound_volume = 5;
        r.chest_movement = true;
    });
    listening_left(&h.store);
    h.tick();
    assert_eq!(h.engine.current().inhale_left, Some(183));
    assert_eq!(h.engine.current().inhale_right, Some(184));

    h.counters.note_breath();
    h.tick();
    assert_eq!(h.engine.lung_phase(), LungPhase::Armed);

    for _ in 0..20 {
        h.settle_tick();
    }

    // Fall releases first, the chest rises, holds, then falls again.
    assert!(is_subsequence(
        &h.gpio_snapshot(),
        &[
            (PneumoLine::Fall, false),
            (PneumoLine::RiseLeft, true),
            (PneumoLine::RiseRight, true),
            (PneumoLine::RiseLeft, false),
            (PneumoLine::RiseRight, false),
            (PneumoLine::Fall, true),
        ],
    ));

    // Listening left: the left inhale track plays, the right does not.
    assert_eq!(h.plays_of(183), 1);
    assert_eq!(h.plays_of(184), 0);
}

#[test]
fn test_disengaging_before_cue_fires_plays_nothing() {
    let mut h = Harness::new(|_| {});
    h.store.update_respiration(|r| {
        r.rate = 60;
        r.left_lung_sound = "normal".into();
        r.right_lung_sound = "normal".into();
    });
    listening_left(&h.store);
    h.tick();

    h.counters.note_breath();
    h.tick();
    assert_eq!(h.engine.lung_phase(), LungPhase::Armed);

    // Stethoscope lifted before the cue delay elapses.
    h.store.update_auscultation(|a| a.side = 0);
    h.settle_tick();
    h.tick();

    assert_eq!(h.engine.lung_phase(), LungPhase::Idle);
    assert_eq!(h.plays_of(183), 0);
    assert_eq!(h.plays_of(184), 0);
}

#[test]
fn test_chest_movement_disabled_keeps_solenoids_parked() {
    let mut h = Harness::new(|_| {});
    h.store.update_respiration(|r| {
        r.rate = 60;
        r.left_lung_sound = "normal".into();
        r.right_lung_sound = "normal".into();
        r.chest_movement = false;
    });
    listening_left(&h.store);
    h.tick();

    h.counters.note_breath();
    h.tick();
    for _ in 0..10 {
        h.settle_tick();
    }

    // The inhale sound still tracks the breath, the hardware never moves.
    assert_eq!(h.plays_of(183), 1);
    assert!(!h.gpio_snapshot().iter().any(|&(_, on)| on));
}

#[test]
fn test_pulse_palpation_drives_site_channel() {
    let mut h = Harness::new(|_| {});
    h.store.update_cardiac(|c| {
        c.rate = 30;
        c.heart_sound = "normal".into();
        c.pulse_strength = [2, 0, 0, 0];
    });
    h.store
        .update_pulse(|p| p.touch[PulseSite::LeftFemoral.index()] = TouchPressure::Normal);
    listening_left(&h.store);
    h.tick();

    h.counters.note_beat();
    h.tick();
    h.settle_tick();

    let expected = pulse_volume(TouchPressure::Normal, 2) - PULSE_CAL_OFFSET;
    let calls = h.trigger_calls.lock().unwrap().clone();
    assert!(calls.contains(&TriggerCall::ChannelGain {
        channel: PulseSite::LeftFemoral.channel(),
        gain: expected,
    }));
    assert!(calls.contains(&TriggerCall::TrackPlayPoly {
        channel: PulseSite::LeftFemoral.channel(),
        track: PULSE_TRACK,
    }));
    // Untouched or zero-strength sites are muted, not triggered.
    for site in [PulseSite::RightFemoral, PulseSite::LeftDorsal, PulseSite::RightDorsal] {
        assert!(calls.contains(&TriggerCall::ChannelGain {
            channel: site.channel(),
            gain: GAIN_OFF,
        }));
        assert!(!calls
            .iter()
            .any(|c| matches!(c, TriggerCall::TrackPlayPoly { channel, .. } if *channel == site.channel())));
    }
    // Telemetry written back for the monitor.
    assert_eq!(
        h.store.pulse().volume[PulseSite::LeftFemoral.index()],
        expected
    );
}

#[test]
fn test_master_gain_follows_engagement() {
    let mut h = Harness::new(|_| {});

    h.tick();
    assert!(h.trigger_calls.lock().unwrap().contains(&TriggerCall::ChannelGain {
        channel: 0,
        gain: GAIN_OFF,
    }));

    listening_left(&h.store);
    h.tick();
    assert!(h.trigger_calls.lock().unwrap().contains(&TriggerCall::ChannelGain {
        channel: 0,
        gain: GAIN_MAX,
    }));

    // Repeated ticks at the same engagement write nothing new.
    let before = h.trigger_calls.lock().unwrap().len();
    h.tick();
    h.tick();
    assert_eq!(h.trigger_calls.lock().unwrap().len(), before);
}

#[test]
fn test_exhale_safety_forces_lung_lines_off() {
    // Stall the solenoid sequence with a long gap so only the safety
    // countdown can touch the lines after the breath starts.
    let mut h = Harness::new(|c| {
        c.gap_ms = 60_000;
        c.exhale_safety_ticks = 3;
    });
    h.store.update_respiration(|r| {
        r.rate = 60;
        r.left_lung_sound = "normal".into();
        r.right_lung_sound = "normal".into();
        r.chest_movement = true;
    });
    listening_left(&h.store);
    h.tick();

    h.counters.note_breath();
    h.tick();
    h.settle_tick();
    h.tick();
    assert_eq!(h.engine.lung_phase(), LungPhase::Idle);

    // Rate drops to zero mid-cycle; the countdown trips after 3 ticks.
    h.store.update_respiration(|r| r.rate = 0);
    for _ in 0..4 {
        h.tick();
    }
    thread::sleep(Duration::from_millis(30));
    assert!(is_subsequence(
        &h.gpio_snapshot(),
        &[(PneumoLine::RiseLeft, false), (PneumoLine::RiseRight, false)],
    ));
}
