//! Daemon configuration
//!
//! YAML config with defaults for every field, so a missing or partial
//! file always yields a runnable configuration. Timing values are the
//! ones the pneumatics and sound set were calibrated against; change
//! them only alongside a hardware recalibration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// GPIO pin numbers for the four pneumatic lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioPins {
    pub tank_fill: u32,
    pub rise_left: u32,
    pub rise_right: u32,
    pub fall: u32,
}

impl Default for GpioPins {
    fn default() -> Self {
        // BeagleBone header P8: pins 11, 13, 8, 10
        Self {
            tank_fill: 45,
            rise_left: 23,
            rise_right: 67,
            fall: 68,
        }
    }
}

/// Air reservoir maintenance thresholds (raw ADC counts).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TankConfig {
    pub ain_channel: u8,
    /// Below this the fill pump turns on
    pub threshold_low: i32,
    /// Above this the fill pump turns off
    pub threshold_high: i32,
}

impl Default for TankConfig {
    fn default() -> Self {
        Self {
            ain_channel: 2,
            threshold_low: 1550,
            threshold_high: 2400,
        }
    }
}

/// Serial port bring-up for the audio trigger device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub baud: u32,
    /// How many times to retry opening the port at boot
    pub open_tries: u32,
    pub retry_delay_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        // The trigger device defaults to 57600; at boot its USB port can
        // lag the daemon by several seconds, hence the retry window.
        Self {
            baud: 57600,
            open_tries: 20,
            retry_delay_ms: 1000,
        }
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Sound catalog file
    pub catalog_path: PathBuf,
    /// UDP address the sync event source binds
    pub sync_bind_addr: String,
    pub serial: SerialConfig,
    pub gpio: GpioPins,
    pub tank: TankConfig,

    /// Poll loop period
    pub tick_ms: u64,
    /// Delay between a beat event and the lub-dub playback cue
    pub heart_cue_ms: u64,
    /// Delay between a breath event and the inhale playback cue
    pub breath_cue_ms: u64,
    /// Fraction of the breath period the chest spends rising
    pub rise_fraction: f64,
    /// Valve settling gap between opposing solenoid transitions
    pub gap_ms: u64,
    /// Ticks at zero respiration rate before lung actuators are forced off
    pub exhale_safety_ticks: u32,

    /// Track played at startup to confirm the audio path
    pub startup_chime_track: u16,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("/simulator/soundList.csv"),
            sync_bind_addr: "0.0.0.0:5804".to_string(),
            serial: SerialConfig::default(),
            gpio: GpioPins::default(),
            tank: TankConfig::default(),
            tick_ms: 10,
            heart_cue_ms: 150,
            breath_cue_ms: 40,
            rise_fraction: 0.30,
            gap_ms: 10,
            exhale_safety_ticks: 400,
            startup_chime_track: 5,
        }
    }
}

impl DaemonConfig {
    /// Default config file location.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("auscult")
            .join("auscultd.yaml")
    }
}

/// Load a configuration from a YAML file.
///
/// A missing file yields defaults silently; an unreadable or unparseable
/// file logs a warning and yields defaults. The daemon must come up on a
/// fresh image with no config at all.
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("no config at {:?}, using defaults", path);
        return T::default();
    }

    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<T>(&contents) {
            Ok(config) => {
                log::info!("loaded config from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("failed to parse config {:?}: {}, using defaults", path, e);
                T::default()
            }
        },
        Err(e) => {
            log::warn!("failed to read config {:?}: {}, using defaults", path, e);
            T::default()
        }
    }
}

/// Save a configuration as YAML, creating parent directories as needed.
/// Used to seed a commented-out starting point on a fresh image.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create config directory {:?}", parent))?;
    }
    let yaml = serde_yaml::to_string(config).context("failed to serialize config")?;
    std::fs::write(path, yaml).with_context(|| format!("failed to write config {:?}", path))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: DaemonConfig = load_config(Path::new("/nonexistent/auscultd.yaml"));
        assert_eq!(config, DaemonConfig::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auscultd.yaml");
        std::fs::write(&path, "tick_ms: 20\nheart_cue_ms: 100\n").unwrap();

        let config: DaemonConfig = load_config(&path);
        assert_eq!(config.tick_ms, 20);
        assert_eq!(config.heart_cue_ms, 100);
        assert_eq!(config.breath_cue_ms, DaemonConfig::default().breath_cue_ms);
        assert_eq!(config.gpio, GpioPins::default());
    }

    #[test]
    fn test_save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("auscultd.yaml");

        let mut config = DaemonConfig::default();
        config.tick_ms = 25;
        config.gpio.fall = 99;
        save_config(&config, &path).unwrap();

        let loaded: DaemonConfig = load_config(&path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_invalid_file_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("auscultd.yaml");
        std::fs::write(&path, "tick_ms: [not a number\n").unwrap();

        let config: DaemonConfig = load_config(&path);
        assert_eq!(config, DaemonConfig::default());
    }
}
