//! Pneumatic solenoid GPIO lines
//!
//! Four output lines: the tank fill pump and the rise-left, rise-right
//! and fall solenoids for chest movement. The daemon's pneumatics
//! service is the only caller; everything here is a thin, stateless
//! write path. `SysfsGpio` talks to the Linux sysfs GPIO interface,
//! `NullGpio` runs without hardware, `RecordingGpio` journals writes for
//! tests.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors from GPIO line access.
#[derive(Error, Debug)]
pub enum GpioError {
    /// Exporting the pin through sysfs failed
    #[error("failed to export GPIO pin {pin}: {source}")]
    Export {
        pin: u32,
        source: std::io::Error,
    },

    /// Writing the pin's direction or value failed
    #[error("failed to write GPIO pin {pin}: {source}")]
    Write {
        pin: u32,
        source: std::io::Error,
    },
}

/// The four pneumatic output lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PneumoLine {
    /// Air reservoir fill pump
    TankFill,
    /// Left chest rise solenoid
    RiseLeft,
    /// Right chest rise solenoid
    RiseRight,
    /// Chest fall (deflate) solenoid
    Fall,
}

impl PneumoLine {
    pub const ALL: [PneumoLine; 4] = [
        PneumoLine::TankFill,
        PneumoLine::RiseLeft,
        PneumoLine::RiseRight,
        PneumoLine::Fall,
    ];
}

/// Output driver for the pneumatic lines.
pub trait GpioOutput: Send {
    /// Drive a line high (`true`) or low (`false`).
    fn set_value(&mut self, line: PneumoLine, on: bool) -> Result<(), GpioError>;
}

/// Linux sysfs GPIO backend. Pins are exported and set to output on
/// construction; value writes reopen the value file each time, which is
/// plenty fast for solenoid switching.
pub struct SysfsGpio {
    pins: HashMap<PneumoLine, u32>,
    root: PathBuf,
}

impl SysfsGpio {
    /// Export the given pins and configure them as outputs.
    pub fn new(pins: HashMap<PneumoLine, u32>) -> Result<Self, GpioError> {
        Self::with_root(pins, PathBuf::from("/sys/class/gpio"))
    }

    fn with_root(pins: HashMap<PneumoLine, u32>, root: PathBuf) -> Result<Self, GpioError> {
        for &pin in pins.values() {
            let pin_dir = root.join(format!("gpio{}", pin));
            if !pin_dir.exists() {
                std::fs::write(root.join("export"), pin.to_string())
                    .map_err(|e| GpioError::Export { pin, source: e })?;
            }
            std::fs::write(pin_dir.join("direction"), "out")
                .map_err(|e| GpioError::Write { pin, source: e })?;
        }
        Ok(Self { pins, root })
    }
}

impl GpioOutput for SysfsGpio {
    fn set_value(&mut self, line: PneumoLine, on: bool) -> Result<(), GpioError> {
        let Some(&pin) = self.pins.get(&line) else {
            log::error!("no GPIO pin mapped for {:?}", line);
            return Ok(());
        };
        let path = self.root.join(format!("gpio{}", pin)).join("value");
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .open(&path)
            .map_err(|e| GpioError::Write { pin, source: e })?;
        file.write_all(if on { b"1" } else { b"0" })
            .map_err(|e| GpioError::Write { pin, source: e })
    }
}

/// Backend for running without pneumatic hardware; writes are logged.
#[derive(Debug, Default)]
pub struct NullGpio;

impl GpioOutput for NullGpio {
    fn set_value(&mut self, line: PneumoLine, on: bool) -> Result<(), GpioError> {
        log::debug!("null gpio: {:?} -> {}", line, if on { "on" } else { "off" });
        Ok(())
    }
}

/// Test double that journals every write in order.
#[derive(Debug, Default)]
pub struct RecordingGpio {
    journal: Arc<Mutex<Vec<(PneumoLine, bool)>>>,
}

impl RecordingGpio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn journal(&self) -> Arc<Mutex<Vec<(PneumoLine, bool)>>> {
        Arc::clone(&self.journal)
    }
}

impl GpioOutput for RecordingGpio {
    fn set_value(&mut self, line: PneumoLine, on: bool) -> Result<(), GpioError> {
        self.journal
            .lock()
            .expect("gpio journal poisoned")
            .push((line, on));
        Ok(())
    }
}
