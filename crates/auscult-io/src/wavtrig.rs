//! Serial protocol backend for the trigger board
//!
//! Frames the vendor's serial command set over an already-opened,
//! raw-mode port: `0xF0 0xAA <len> <cmd> <data...> 0x55`, with `len`
//! covering the whole frame. Replies to the query commands come back in
//! the same framing. The port's half-second read timeout bounds every
//! device-busy wait.

use std::fs::File;
use std::io::{Read, Write};

use crate::trigger::{SysInfo, TriggerBackend, TriggerError};

const SOM1: u8 = 0xF0;
const SOM2: u8 = 0xAA;
const EOM: u8 = 0x55;

const CMD_GET_VERSION: u8 = 1;
const CMD_GET_SYS_INFO: u8 = 2;
const CMD_TRACK_CONTROL: u8 = 3;
const CMD_STOP_ALL: u8 = 4;
const CMD_GET_STATUS: u8 = 7;
const CMD_TRACK_VOLUME: u8 = 8;
const CMD_AMP_POWER: u8 = 9;
const CMD_CHANNEL_VOLUME: u8 = 10;

const RSP_VERSION: u8 = 0x81;
const RSP_SYS_INFO: u8 = 0x82;
const RSP_STATUS: u8 = 0x83;

/// Track control code for polyphonic playback.
const TRK_PLAY_POLY: u8 = 1;

/// Trigger backend speaking the vendor serial protocol.
pub struct SerialTrigger {
    port: File,
}

impl SerialTrigger {
    /// Take ownership of an opened, raw-configured serial port.
    pub fn new(port: File) -> Self {
        Self { port }
    }

    fn send(&mut self, cmd: u8, data: &[u8]) -> Result<(), TriggerError> {
        let len = (data.len() + 5) as u8;
        let mut frame = Vec::with_capacity(data.len() + 5);
        frame.extend_from_slice(&[SOM1, SOM2, len, cmd]);
        frame.extend_from_slice(data);
        frame.push(EOM);
        self.port
            .write_all(&frame)
            .map_err(|e| TriggerError::Write(e.to_string()))
    }

    /// Read one response frame with the given code; returns its payload.
    ///
    /// The port is in VMIN=0/VTIME=5 mode, so each read returns within
    /// half a second; a zero-length read means the device went quiet.
    fn read_response(&mut self, expect: u8) -> Result<Vec<u8>, TriggerError> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 64];
        loop {
            let n = self
                .port
                .read(&mut chunk)
                .map_err(|e| TriggerError::Read(e.to_string()))?;
            if n == 0 {
                return Err(TriggerError::Read("device response timeout".to_string()));
            }
            buf.extend_from_slice(&chunk[..n]);

            // Resync to the start-of-message bytes, then wait for the
            // full frame length.
            while buf.len() >= 2 && !(buf[0] == SOM1 && buf[1] == SOM2) {
                buf.remove(0);
            }
            if buf.len() >= 4 {
                let len = buf[2] as usize;
                if len < 5 {
                    return Err(TriggerError::BadResponse(format!(
                        "frame length {} too short",
                        len
                    )));
                }
                if buf.len() >= len {
                    if buf[len - 1] != EOM {
                        return Err(TriggerError::BadResponse(
                            "missing end-of-message byte".to_string(),
                        ));
                    }
                    if buf[3] != expect {
                        return Err(TriggerError::BadResponse(format!(
                            "expected response {:#04x}, got {:#04x}",
                            expect, buf[3]
                        )));
                    }
                    return Ok(buf[4..len - 1].to_vec());
                }
            }
        }
    }
}

impl TriggerBackend for SerialTrigger {
    fn version(&mut self) -> Result<String, TriggerError> {
        self.send(CMD_GET_VERSION, &[])?;
        let payload = self.read_response(RSP_VERSION)?;
        Ok(String::from_utf8_lossy(&payload)
            .trim_end_matches('\0')
            .to_string())
    }

    fn sys_info(&mut self) -> Result<SysInfo, TriggerError> {
        self.send(CMD_GET_SYS_INFO, &[])?;
        let payload = self.read_response(RSP_SYS_INFO)?;
        if payload.len() < 3 {
            return Err(TriggerError::BadResponse(format!(
                "sys info payload {} bytes",
                payload.len()
            )));
        }
        Ok(SysInfo {
            voices: payload[0],
            tracks: u16::from_le_bytes([payload[1], payload[2]]),
            mono: payload.get(3).copied().unwrap_or(1) != 0,
        })
    }

    fn amp_power(&mut self, on: bool) -> Result<(), TriggerError> {
        self.send(CMD_AMP_POWER, &[on as u8])
    }

    fn stop_all_tracks(&mut self) -> Result<(), TriggerError> {
        self.send(CMD_STOP_ALL, &[])
    }

    fn channel_gain(&mut self, channel: u8, gain: i32) -> Result<(), TriggerError> {
        let g = (gain as i16).to_le_bytes();
        self.send(CMD_CHANNEL_VOLUME, &[channel, g[0], g[1]])
    }

    fn track_gain(&mut self, track: u16, gain: i32) -> Result<(), TriggerError> {
        let t = track.to_le_bytes();
        let g = (gain as i16).to_le_bytes();
        self.send(CMD_TRACK_VOLUME, &[t[0], t[1], g[0], g[1]])
    }

    fn track_play_poly(&mut self, channel: u8, track: u16) -> Result<(), TriggerError> {
        let t = track.to_le_bytes();
        self.send(CMD_TRACK_CONTROL, &[TRK_PLAY_POLY, t[0], t[1], channel])
    }

    fn tracks_playing(&mut self) -> Result<u32, TriggerError> {
        self.send(CMD_GET_STATUS, &[])?;
        let payload = self.read_response(RSP_STATUS)?;
        // The status payload lists two bytes per playing track.
        Ok((payload.len() / 2) as u32)
    }
}
