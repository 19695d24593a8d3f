//! auscultd — patient-simulator sound and pneumatic sync daemon
//!
//! The daemon keeps heart sounds, lung sounds, peripheral pulses and
//! chest rise/fall phase-locked to the physiological timebase published
//! by the simulation models. Five threads cooperate:
//!
//! 1. the engine poll loop — sole driver of state machines and trigger
//!    device I/O,
//! 2. the sync counter worker — counts beat/breath events,
//! 3. the timer service — turns one-shot deadlines into engine events,
//! 4. the pneumatics service — sole owner of the solenoid GPIO lines,
//! 5. the signal thread — drives the actuators safe on HUP/TERM.
//!
//! All cross-thread traffic is message passing or a pair of atomic
//! counters; no state is mutated from a signal handler.

pub mod engine;
pub mod monitor;
pub mod pneumatics;
pub mod syncworker;
pub mod timers;

/// Process exit codes. Usage errors exit 2 via clap.
pub mod exit {
    /// Sound catalog failed to load
    pub const CATALOG: i32 = 3;
    /// Sync event socket failed to bind at startup
    pub const SYNC_BIND: i32 = 4;
    /// Sync event source failed while the worker was listening
    pub const SYNC_WORKER: i32 = 5;
}
