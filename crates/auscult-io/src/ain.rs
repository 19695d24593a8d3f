//! Analog input channel for the air reservoir pressure sensor

use std::path::PathBuf;

/// Raw ADC read for one channel. Errors are folded into a logged
/// fallback value: reservoir maintenance must keep running on a flaky
/// sensor, and hysteresis smooths over isolated bad reads.
pub trait AinReader: Send {
    fn read(&mut self, channel: u8) -> i32;
}

/// Linux IIO raw-voltage backend.
pub struct SysfsAin {
    root: PathBuf,
}

impl SysfsAin {
    pub fn new() -> Self {
        Self {
            root: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
        }
    }
}

impl Default for SysfsAin {
    fn default() -> Self {
        Self::new()
    }
}

impl AinReader for SysfsAin {
    fn read(&mut self, channel: u8) -> i32 {
        let path = self.root.join(format!("in_voltage{}_raw", channel));
        match std::fs::read_to_string(&path) {
            Ok(s) => s.trim().parse().unwrap_or_else(|_| {
                log::warn!("unparseable ADC reading on channel {}: {:?}", channel, s);
                0
            }),
            Err(e) => {
                log::warn!("ADC read failed on channel {}: {}", channel, e);
                0
            }
        }
    }
}

/// Constant mid-scale reading, used without hardware so the tank
/// hysteresis sits quietly between its thresholds.
#[derive(Debug)]
pub struct NullAin {
    value: i32,
}

impl NullAin {
    pub fn new(value: i32) -> Self {
        Self { value }
    }
}

impl Default for NullAin {
    fn default() -> Self {
        Self::new(2000)
    }
}

impl AinReader for NullAin {
    fn read(&mut self, _channel: u8) -> i32 {
        self.value
    }
}
