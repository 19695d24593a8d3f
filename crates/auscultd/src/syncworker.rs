//! Sync counter worker: event stream to monotonic counters
//!
//! A dedicated thread blocks on the sync source and turns each event
//! into a counter increment, nothing more. The engine compares the
//! counters against its last-observed values once per tick, so several
//! events inside one tick collapse into a single observed edge — the
//! state machines only need "at least one beat happened", not the exact
//! count.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use auscult_io::{SyncEvent, SyncSource};

use crate::exit;
use crate::pneumatics::PneumoHandle;

/// Beat and breath counters. Written only by the worker, read only by
/// the engine; Relaxed suffices for a single-writer edge comparison.
#[derive(Debug, Default)]
pub struct SyncCounters {
    beats: AtomicU32,
    breaths: AtomicU32,
}

impl SyncCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn beats(&self) -> u32 {
        self.beats.load(Ordering::Relaxed)
    }

    pub fn breaths(&self) -> u32 {
        self.breaths.load(Ordering::Relaxed)
    }

    /// Count one heartbeat. The injection seam for tests.
    pub fn note_beat(&self) {
        self.beats.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one breath onset.
    pub fn note_breath(&self) {
        self.breaths.fetch_add(1, Ordering::Relaxed);
    }
}

/// Spawn the worker thread around a blocking sync source.
///
/// A source failure is a fatal control-plane error: the timebase is
/// gone, so the worker logs, drives the actuators off and terminates the
/// process with its own exit code.
pub fn spawn_sync_worker(
    mut source: Box<dyn SyncSource>,
    counters: Arc<SyncCounters>,
    pneumo: PneumoHandle,
) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new().name("sync-worker".into()).spawn(move || {
        log::info!("sync counter worker started");
        loop {
            match source.wait() {
                Ok(SyncEvent::Pulse) | Ok(SyncEvent::VpcPulse) => counters.note_beat(),
                Ok(SyncEvent::Breath) => counters.note_breath(),
                Err(e) => {
                    log::error!("sync source failed: {}", e);
                    if pneumo.all_off_blocking().is_err() {
                        log::error!("pneumatics unavailable during sync failure shutdown");
                    }
                    std::process::exit(exit::SYNC_WORKER);
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let counters = SyncCounters::new();
        assert_eq!(counters.beats(), 0);
        assert_eq!(counters.breaths(), 0);
    }

    #[test]
    fn test_counters_are_independent() {
        let counters = SyncCounters::new();
        counters.note_beat();
        counters.note_beat();
        counters.note_breath();
        assert_eq!(counters.beats(), 2);
        assert_eq!(counters.breaths(), 1);
    }

    #[test]
    fn test_worker_counts_events() {
        use auscult_io::{ChannelSyncSource, RecordingGpio};
        use crate::pneumatics::PneumaticsService;

        let (source, injector) = ChannelSyncSource::new();
        let counters = Arc::new(SyncCounters::new());
        let pneumo = PneumaticsService::spawn(Box::new(RecordingGpio::new())).unwrap();

        let _worker =
            spawn_sync_worker(Box::new(source), Arc::clone(&counters), pneumo).unwrap();

        injector.send(SyncEvent::Pulse);
        injector.send(SyncEvent::VpcPulse);
        injector.send(SyncEvent::Breath);

        // The worker thread owns the source; poll until it has drained.
        for _ in 0..100 {
            if counters.beats() == 2 && counters.breaths() == 1 {
                break;
            }
            thread::sleep(std::time::Duration::from_millis(5));
        }
        assert_eq!(counters.beats(), 2);
        assert_eq!(counters.breaths(), 1);

        // Keep the injector alive so the worker never sees a failure;
        // the thread ends with the test process.
        std::mem::forget(injector);
    }
}
