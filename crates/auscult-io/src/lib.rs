//! Hardware backends for the auscultation controller
//!
//! Everything the daemon touches outside its own process lives behind a
//! trait in this crate: the multi-channel audio trigger device, the
//! sysfs GPIO lines driving the pneumatic solenoids, the ADC channel
//! watching the air reservoir, and the UDP sync event source carrying
//! the physiological timebase. Each trait ships a null implementation
//! (run without the hardware) and a recording double (assert on I/O in
//! tests).

pub mod ain;
pub mod gpio;
pub mod serial;
pub mod sync;
pub mod trigger;
pub mod wavtrig;

pub use ain::{AinReader, NullAin, SysfsAin};
pub use gpio::{GpioError, GpioOutput, NullGpio, PneumoLine, RecordingGpio, SysfsGpio};
pub use sync::{ChannelSyncSource, SyncError, SyncEvent, SyncInjector, SyncSource, UdpSyncSource};
pub use trigger::{RecordingTrigger, SilentTrigger, TriggerBackend, TriggerCall, TriggerError};
pub use wavtrig::SerialTrigger;
