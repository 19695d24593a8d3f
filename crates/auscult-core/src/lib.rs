//! Domain model for the auscultation controller
//!
//! This crate holds the pure, hardware-free parts of the simulator sound
//! engine: the gain mapping between operator volumes and device gain, the
//! sound catalog with its rate-range lookup, the pulse palpation volume
//! tables, the shared physiology store the engine samples every tick, and
//! the daemon configuration.

pub mod catalog;
pub mod config;
pub mod gain;
pub mod physio;
pub mod pulse;

pub use catalog::{SoundCatalog, SoundCategory, SoundEntry};
pub use config::DaemonConfig;
pub use gain::{volume_to_gain, GAIN_MAX, GAIN_MIN, GAIN_OFF};
pub use physio::PhysioStore;
