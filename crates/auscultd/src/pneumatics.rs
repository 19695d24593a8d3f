//! Pneumatics service: single owner of the solenoid lines
//!
//! Every actuator write in the process funnels through this service's
//! command channel, so writes triggered by timers, the poll loop and the
//! signal thread serialize in arrival order and can never interleave
//! incoherently. The service tracks per-line state and skips writes that
//! would not change a line.
//!
//! `AllOff` carries an optional reply sender; `all_off_blocking` waits
//! on it, which makes the safe-shutdown path synchronous: when the call
//! returns, the lines are known to be off.

use std::collections::HashMap;
use std::thread;

use auscult_io::{GpioOutput, PneumoLine};
use crossbeam::channel::{Receiver, Sender};
use thiserror::Error;

/// Pneumatics service failures. The service going away is fatal to the
/// daemon: nobody else may touch the lines.
#[derive(Error, Debug)]
pub enum PneumoError {
    /// The service thread could not be spawned at startup
    #[error("failed to spawn pneumatics service thread: {0}")]
    Spawn(std::io::Error),

    /// The service thread is gone
    #[error("pneumatics service unavailable")]
    ServiceGone,
}

/// Commands accepted by the pneumatics service.
pub enum PneumoCommand {
    /// Drive one line
    Set { line: PneumoLine, on: bool },
    /// Drive the three lung lines (rise left/right, fall) off
    LungsOff,
    /// Drive every line off; reply when done if a sender is attached
    AllOff {
        reply: Option<tokio::sync::oneshot::Sender<()>>,
    },
    /// Stop the service
    Shutdown,
}

/// Cloneable handle for commanding the pneumatics service.
#[derive(Clone)]
pub struct PneumoHandle {
    command_tx: Sender<PneumoCommand>,
}

impl PneumoHandle {
    pub fn set(&self, line: PneumoLine, on: bool) -> Result<(), PneumoError> {
        self.command_tx
            .send(PneumoCommand::Set { line, on })
            .map_err(|_| PneumoError::ServiceGone)
    }

    pub fn lungs_off(&self) -> Result<(), PneumoError> {
        self.command_tx
            .send(PneumoCommand::LungsOff)
            .map_err(|_| PneumoError::ServiceGone)
    }

    /// Queue an all-off without waiting for it.
    pub fn all_off(&self) -> Result<(), PneumoError> {
        self.command_tx
            .send(PneumoCommand::AllOff { reply: None })
            .map_err(|_| PneumoError::ServiceGone)
    }

    /// Drive every line off and wait until the writes have happened.
    /// This is the safe-shutdown primitive: it must complete before the
    /// process exits.
    pub fn all_off_blocking(&self) -> Result<(), PneumoError> {
        let (reply_tx, reply_rx) = tokio::sync::oneshot::channel();
        self.command_tx
            .send(PneumoCommand::AllOff {
                reply: Some(reply_tx),
            })
            .map_err(|_| PneumoError::ServiceGone)?;
        reply_rx.blocking_recv().map_err(|_| PneumoError::ServiceGone)
    }

    pub fn shutdown(&self) {
        let _ = self.command_tx.send(PneumoCommand::Shutdown);
    }
}

/// The pneumatics service thread.
pub struct PneumaticsService {
    gpio: Box<dyn GpioOutput>,
    command_rx: Receiver<PneumoCommand>,
    /// Last commanded state per line; None until first write
    state: HashMap<PneumoLine, bool>,
}

impl PneumaticsService {
    /// Spawn the service around a GPIO backend it takes sole ownership of.
    pub fn spawn(gpio: Box<dyn GpioOutput>) -> Result<PneumoHandle, PneumoError> {
        let (command_tx, command_rx) = crossbeam::channel::unbounded();

        let service = PneumaticsService {
            gpio,
            command_rx,
            state: HashMap::new(),
        };

        thread::Builder::new()
            .name("pneumatics".into())
            .spawn(move || service.run())
            .map_err(PneumoError::Spawn)?;

        Ok(PneumoHandle { command_tx })
    }

    fn run(mut self) {
        log::info!("pneumatics service started");

        while let Ok(cmd) = self.command_rx.recv() {
            match cmd {
                PneumoCommand::Set { line, on } => self.write(line, on),
                PneumoCommand::LungsOff => {
                    self.write(PneumoLine::RiseLeft, false);
                    self.write(PneumoLine::RiseRight, false);
                    self.write(PneumoLine::Fall, false);
                }
                PneumoCommand::AllOff { reply } => {
                    for line in PneumoLine::ALL {
                        self.write(line, false);
                    }
                    if let Some(reply) = reply {
                        let _ = reply.send(());
                    }
                }
                PneumoCommand::Shutdown => break,
            }
        }

        // Whatever ended the loop, leave the hardware safe.
        for line in PneumoLine::ALL {
            self.write(line, false);
        }
        log::info!("pneumatics service stopped, all lines off");
    }

    fn write(&mut self, line: PneumoLine, on: bool) {
        if self.state.get(&line) == Some(&on) {
            return;
        }
        if let Err(e) = self.gpio.set_value(line, on) {
            log::error!("gpio write failed for {:?}: {}", line, e);
            return;
        }
        self.state.insert(line, on);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use auscult_io::RecordingGpio;
    use std::time::Duration;

    fn wait_for_writes() {
        thread::sleep(Duration::from_millis(50));
    }

    #[test]
    fn test_commands_serialize_in_order() {
        let gpio = RecordingGpio::new();
        let journal = gpio.journal();
        let handle = PneumaticsService::spawn(Box::new(gpio)).unwrap();

        handle.set(PneumoLine::Fall, true).unwrap();
        handle.lungs_off().unwrap();
        wait_for_writes();

        // LungsOff issued after FallOn leaves the fall line off.
        let writes = journal.lock().unwrap();
        assert_eq!(writes.first(), Some(&(PneumoLine::Fall, true)));
        assert_eq!(writes.last(), Some(&(PneumoLine::Fall, false)));

        handle.shutdown();
    }

    #[test]
    fn test_unchanged_writes_are_skipped() {
        let gpio = RecordingGpio::new();
        let journal = gpio.journal();
        let handle = PneumaticsService::spawn(Box::new(gpio)).unwrap();

        handle.set(PneumoLine::RiseLeft, true).unwrap();
        handle.set(PneumoLine::RiseLeft, true).unwrap();
        handle.set(PneumoLine::RiseLeft, false).unwrap();
        wait_for_writes();

        assert_eq!(
            *journal.lock().unwrap(),
            vec![(PneumoLine::RiseLeft, true), (PneumoLine::RiseLeft, false)]
        );

        handle.shutdown();
    }

    #[test]
    fn test_all_off_blocking_completes_after_writes() {
        let gpio = RecordingGpio::new();
        let journal = gpio.journal();
        let handle = PneumaticsService::spawn(Box::new(gpio)).unwrap();

        handle.set(PneumoLine::RiseLeft, true).unwrap();
        handle.set(PneumoLine::TankFill, true).unwrap();
        handle.all_off_blocking().unwrap();

        // No sleep: the reply only arrives after the off-writes happened.
        let writes = journal.lock().unwrap();
        assert!(writes.contains(&(PneumoLine::RiseLeft, false)));
        assert!(writes.contains(&(PneumoLine::TankFill, false)));

        handle.shutdown();
    }
}
