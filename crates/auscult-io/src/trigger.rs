//! Audio trigger device interface
//!
//! The engine drives a serial multi-channel trigger board (WAV Trigger /
//! Tsunami class): named tracks played polyphonically on numbered
//! channels, with per-channel and per-track gain. The byte-level serial
//! protocol is a separate driver; this module defines the operations the
//! engine needs plus the two in-tree backends — `SilentTrigger` for
//! running without the device and `RecordingTrigger` for tests.

use std::sync::{Arc, Mutex};

use thiserror::Error;

/// Errors from trigger device I/O.
///
/// All of these are non-fatal to the engine: audio degrades, the
/// pneumatic control plane keeps running.
#[derive(Error, Debug)]
pub enum TriggerError {
    /// Serial write to the device failed
    #[error("trigger device write failed: {0}")]
    Write(String),

    /// Serial read from the device failed or timed out
    #[error("trigger device read failed: {0}")]
    Read(String),

    /// The device sent a response the driver could not parse
    #[error("unexpected trigger device response: {0}")]
    BadResponse(String),
}

/// Device identity and capability report.
#[derive(Debug, Clone, Default)]
pub struct SysInfo {
    pub voices: u8,
    pub tracks: u16,
    /// The board must run in mono mode for the mannequin speaker wiring
    pub mono: bool,
}

/// Operations the engine performs on the trigger device.
pub trait TriggerBackend: Send {
    /// Firmware version string.
    fn version(&mut self) -> Result<String, TriggerError>;

    /// Voice/track capability report.
    fn sys_info(&mut self) -> Result<SysInfo, TriggerError>;

    /// Switch the onboard amplifier on or off.
    fn amp_power(&mut self, on: bool) -> Result<(), TriggerError>;

    /// Stop every playing track.
    fn stop_all_tracks(&mut self) -> Result<(), TriggerError>;

    /// Set the gain of an output channel.
    fn channel_gain(&mut self, channel: u8, gain: i32) -> Result<(), TriggerError>;

    /// Set the gain of a track.
    fn track_gain(&mut self, track: u16, gain: i32) -> Result<(), TriggerError>;

    /// Trigger a track on a channel without stopping anything else.
    fn track_play_poly(&mut self, channel: u8, track: u16) -> Result<(), TriggerError>;

    /// How many tracks the device reports playing.
    fn tracks_playing(&mut self) -> Result<u32, TriggerError>;
}

/// Backend used when no device is attached: every operation succeeds and
/// is logged at debug level. The daemon runs "silent" — pneumatics and
/// state machines behave exactly as with audio.
#[derive(Debug, Default)]
pub struct SilentTrigger;

impl TriggerBackend for SilentTrigger {
    fn version(&mut self) -> Result<String, TriggerError> {
        Ok("silent".to_string())
    }

    fn sys_info(&mut self) -> Result<SysInfo, TriggerError> {
        Ok(SysInfo {
            voices: 0,
            tracks: 0,
            mono: true,
        })
    }

    fn amp_power(&mut self, on: bool) -> Result<(), TriggerError> {
        log::debug!("silent trigger: amp_power({})", on);
        Ok(())
    }

    fn stop_all_tracks(&mut self) -> Result<(), TriggerError> {
        log::debug!("silent trigger: stop_all_tracks");
        Ok(())
    }

    fn channel_gain(&mut self, channel: u8, gain: i32) -> Result<(), TriggerError> {
        log::debug!("silent trigger: channel_gain({}, {})", channel, gain);
        Ok(())
    }

    fn track_gain(&mut self, track: u16, gain: i32) -> Result<(), TriggerError> {
        log::debug!("silent trigger: track_gain({}, {})", track, gain);
        Ok(())
    }

    fn track_play_poly(&mut self, channel: u8, track: u16) -> Result<(), TriggerError> {
        log::debug!("silent trigger: track_play_poly({}, {})", channel, track);
        Ok(())
    }

    fn tracks_playing(&mut self) -> Result<u32, TriggerError> {
        Ok(0)
    }
}

/// One recorded device call, for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerCall {
    AmpPower(bool),
    StopAllTracks,
    ChannelGain { channel: u8, gain: i32 },
    TrackGain { track: u16, gain: i32 },
    TrackPlayPoly { channel: u8, track: u16 },
}

/// Test double that journals every call.
#[derive(Debug, Default)]
pub struct RecordingTrigger {
    journal: Arc<Mutex<Vec<TriggerCall>>>,
}

impl RecordingTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared handle to the journal; clones observe the same calls.
    pub fn journal(&self) -> Arc<Mutex<Vec<TriggerCall>>> {
        Arc::clone(&self.journal)
    }

    fn record(&self, call: TriggerCall) {
        self.journal.lock().expect("trigger journal poisoned").push(call);
    }
}

impl TriggerBackend for RecordingTrigger {
    fn version(&mut self) -> Result<String, TriggerError> {
        Ok("recording".to_string())
    }

    fn sys_info(&mut self) -> Result<SysInfo, TriggerError> {
        Ok(SysInfo {
            voices: 8,
            tracks: 4096,
            mono: true,
        })
    }

    fn amp_power(&mut self, on: bool) -> Result<(), TriggerError> {
        self.record(TriggerCall::AmpPower(on));
        Ok(())
    }

    fn stop_all_tracks(&mut self) -> Result<(), TriggerError> {
        self.record(TriggerCall::StopAllTracks);
        Ok(())
    }

    fn channel_gain(&mut self, channel: u8, gain: i32) -> Result<(), TriggerError> {
        self.record(TriggerCall::ChannelGain { channel, gain });
        Ok(())
    }

    fn track_gain(&mut self, track: u16, gain: i32) -> Result<(), TriggerError> {
        self.record(TriggerCall::TrackGain { track, gain });
        Ok(())
    }

    fn track_play_poly(&mut self, channel: u8, track: u16) -> Result<(), TriggerError> {
        self.record(TriggerCall::TrackPlayPoly { channel, track });
        Ok(())
    }

    fn tracks_playing(&mut self) -> Result<u32, TriggerError> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_trigger_journals_calls() {
        let mut trigger = RecordingTrigger::new();
        let journal = trigger.journal();

        trigger.channel_gain(0, -70).unwrap();
        trigger.track_play_poly(0, 112).unwrap();

        let calls = journal.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                TriggerCall::ChannelGain { channel: 0, gain: -70 },
                TriggerCall::TrackPlayPoly { channel: 0, track: 112 },
            ]
        );
    }

    #[test]
    fn test_silent_trigger_reports_idle() {
        let mut trigger = SilentTrigger;
        assert_eq!(trigger.tracks_playing().unwrap(), 0);
        assert!(trigger.sys_info().unwrap().mono);
    }
}
