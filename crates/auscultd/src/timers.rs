//! Timer service: one-shot deadlines delivered as engine events
//!
//! The engine needs four independently re-armable one-shot countdowns
//! (heart cue, breath cue, chest rise, valve gap). Instead of POSIX
//! timers with signal handlers, a dedicated thread tracks the deadlines
//! and sends a plain [`EngineEvent`] when one expires; the poll loop
//! drains those events at the top of each tick. Re-arming a slot
//! replaces its pending deadline. Handlers that mutate shared state do
//! not exist in this design.

use std::thread;
use std::time::{Duration, Instant};

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender};
use thiserror::Error;

/// Timer service failures. Both are fatal to the daemon: a missing or
/// half-armed timer leaves the pneumatics in an unsafe schedule.
#[derive(Error, Debug)]
pub enum TimerError {
    /// The service thread could not be spawned at startup
    #[error("failed to spawn timer service thread: {0}")]
    Spawn(std::io::Error),

    /// The service thread is gone; arming is impossible
    #[error("timer service unavailable")]
    ServiceGone,
}

/// The four one-shot timer slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerKind {
    /// Beat-to-lubdub playback cue
    Heart,
    /// Breath-to-inhale playback cue
    Breath,
    /// End of the chest rise phase
    Rise,
    /// Valve settling gap between opposing solenoid transitions
    Gap,
}

impl TimerKind {
    const ALL: [TimerKind; 4] = [
        TimerKind::Heart,
        TimerKind::Breath,
        TimerKind::Rise,
        TimerKind::Gap,
    ];

    fn index(self) -> usize {
        match self {
            TimerKind::Heart => 0,
            TimerKind::Breath => 1,
            TimerKind::Rise => 2,
            TimerKind::Gap => 3,
        }
    }
}

/// Events consumed by the engine poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// A one-shot timer expired
    Timer(TimerKind),
}

enum TimerCommand {
    Arm { kind: TimerKind, duration: Duration },
    Shutdown,
}

/// Handle for arming timers from the engine thread.
pub struct TimerHandle {
    command_tx: Sender<TimerCommand>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TimerHandle {
    /// Arm (or re-arm) a one-shot slot. A pending expiration on the same
    /// slot is replaced.
    pub fn arm(&self, kind: TimerKind, duration: Duration) -> Result<(), TimerError> {
        self.command_tx
            .send(TimerCommand::Arm { kind, duration })
            .map_err(|_| TimerError::ServiceGone)
    }

    /// Stop the service and join its thread.
    pub fn shutdown(mut self) {
        let _ = self.command_tx.send(TimerCommand::Shutdown);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

/// The timer service thread.
pub struct TimerService {
    command_rx: Receiver<TimerCommand>,
    event_tx: Sender<EngineEvent>,
    deadlines: [Option<Instant>; 4],
}

impl TimerService {
    /// Spawn the service. Expirations are delivered on `event_tx`.
    pub fn spawn(event_tx: Sender<EngineEvent>) -> Result<TimerHandle, TimerError> {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();

        let service = TimerService {
            command_rx,
            event_tx,
            deadlines: [None; 4],
        };

        let handle = thread::Builder::new()
            .name("timer-service".into())
            .spawn(move || service.run())
            .map_err(TimerError::Spawn)?;

        Ok(TimerHandle {
            command_tx,
            thread: Some(handle),
        })
    }

    fn run(mut self) {
        log::info!("timer service started");

        loop {
            let now = Instant::now();
            for kind in TimerKind::ALL {
                let slot = &mut self.deadlines[kind.index()];
                if slot.is_some_and(|d| d <= now) {
                    *slot = None;
                    if self.event_tx.send(EngineEvent::Timer(kind)).is_err() {
                        // Engine gone; nothing left to time.
                        log::info!("timer service stopping, event channel closed");
                        return;
                    }
                }
            }

            let next = self.deadlines.iter().flatten().min().copied();
            let cmd = match next {
                Some(deadline) => {
                    match self
                        .command_rx
                        .recv_timeout(deadline.saturating_duration_since(now))
                    {
                        Ok(cmd) => cmd,
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                None => match self.command_rx.recv() {
                    Ok(cmd) => cmd,
                    Err(_) => break,
                },
            };

            match cmd {
                TimerCommand::Arm { kind, duration } => {
                    self.deadlines[kind.index()] = Some(Instant::now() + duration);
                }
                TimerCommand::Shutdown => break,
            }
        }

        log::info!("timer service stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_shot_fires_once() {
        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        let timers = TimerService::spawn(event_tx).unwrap();

        timers.arm(TimerKind::Heart, Duration::from_millis(10)).unwrap();

        let ev = event_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(ev, EngineEvent::Timer(TimerKind::Heart));
        assert!(event_rx.recv_timeout(Duration::from_millis(50)).is_err());

        timers.shutdown();
    }

    #[test]
    fn test_rearm_replaces_pending_deadline() {
        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        let timers = TimerService::spawn(event_tx).unwrap();

        timers.arm(TimerKind::Rise, Duration::from_millis(20)).unwrap();
        timers.arm(TimerKind::Rise, Duration::from_millis(200)).unwrap();

        // The first deadline must not fire.
        assert!(event_rx.recv_timeout(Duration::from_millis(100)).is_err());
        let ev = event_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(ev, EngineEvent::Timer(TimerKind::Rise));

        timers.shutdown();
    }

    #[test]
    fn test_slots_are_independent() {
        let (event_tx, event_rx) = crossbeam::channel::unbounded();
        let timers = TimerService::spawn(event_tx).unwrap();

        timers.arm(TimerKind::Gap, Duration::from_millis(10)).unwrap();
        timers.arm(TimerKind::Breath, Duration::from_millis(30)).unwrap();

        let first = event_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        let second = event_rx.recv_timeout(Duration::from_millis(500)).unwrap();
        assert_eq!(first, EngineEvent::Timer(TimerKind::Gap));
        assert_eq!(second, EngineEvent::Timer(TimerKind::Breath));

        timers.shutdown();
    }

    #[test]
    fn test_arm_after_shutdown_is_service_gone() {
        let (event_tx, _event_rx) = crossbeam::channel::unbounded();
        let timers = TimerService::spawn(event_tx).unwrap();
        let arm_tx = timers.command_tx.clone();
        timers.shutdown();

        // Give the thread a moment to exit, then the channel is closed.
        std::thread::sleep(Duration::from_millis(20));
        assert!(arm_tx
            .send(TimerCommand::Arm {
                kind: TimerKind::Heart,
                duration: Duration::from_millis(1),
            })
            .is_err());
    }
}
