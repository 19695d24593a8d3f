//! Physiological sync event source
//!
//! The cardiac and respiration models announce each beat and breath as
//! it happens; the daemon's sync worker blocks on this source and counts
//! them. The wire format is one UDP datagram per event, first byte `P`
//! (pulse), `V` (VPC pulse variant) or `B` (breath); anything else is
//! logged and skipped. `ChannelSyncSource` is the in-process equivalent
//! for tests and embedding.

use std::net::UdpSocket;

use thiserror::Error;

/// Errors from the sync event source.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Binding the listening socket failed (fatal at startup)
    #[error("failed to bind sync socket on {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Receiving failed (fatal in the worker)
    #[error("sync receive failed: {0}")]
    Recv(std::io::Error),

    /// All in-process injector handles were dropped
    #[error("sync event channel closed")]
    Closed,
}

/// One physiological timebase event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncEvent {
    /// Normal heartbeat
    Pulse,
    /// Ventricular premature contraction beat; counts as a beat
    VpcPulse,
    /// Breath onset
    Breath,
}

/// Blocking source of sync events.
pub trait SyncSource: Send {
    /// Block until the next event arrives.
    fn wait(&mut self) -> Result<SyncEvent, SyncError>;
}

/// UDP-backed sync source.
pub struct UdpSyncSource {
    socket: UdpSocket,
}

impl UdpSyncSource {
    /// Bind the listening socket. Bind failure is fatal to the caller.
    pub fn bind(addr: &str) -> Result<Self, SyncError> {
        let socket = UdpSocket::bind(addr).map_err(|e| SyncError::Bind {
            addr: addr.to_string(),
            source: e,
        })?;
        log::info!("sync source listening on {}", addr);
        Ok(Self { socket })
    }
}

impl SyncSource for UdpSyncSource {
    fn wait(&mut self) -> Result<SyncEvent, SyncError> {
        let mut buf = [0u8; 16];
        loop {
            let (len, _peer) = self.socket.recv_from(&mut buf).map_err(SyncError::Recv)?;
            match buf.first() {
                Some(b'P') => return Ok(SyncEvent::Pulse),
                Some(b'V') => return Ok(SyncEvent::VpcPulse),
                Some(b'B') => return Ok(SyncEvent::Breath),
                _ => {
                    log::warn!("unknown sync datagram ({} bytes), skipping", len);
                }
            }
        }
    }
}

/// Handle for injecting events into a [`ChannelSyncSource`].
#[derive(Clone)]
pub struct SyncInjector {
    tx: flume::Sender<SyncEvent>,
}

impl SyncInjector {
    /// Inject one event. Returns false if the source side is gone.
    pub fn send(&self, event: SyncEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// In-process sync source fed through a channel.
pub struct ChannelSyncSource {
    rx: flume::Receiver<SyncEvent>,
}

impl ChannelSyncSource {
    pub fn new() -> (Self, SyncInjector) {
        let (tx, rx) = flume::unbounded();
        (Self { rx }, SyncInjector { tx })
    }
}

impl SyncSource for ChannelSyncSource {
    fn wait(&mut self) -> Result<SyncEvent, SyncError> {
        self.rx.recv().map_err(|_| SyncError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_source_delivers_in_order() {
        let (mut source, injector) = ChannelSyncSource::new();
        injector.send(SyncEvent::Pulse);
        injector.send(SyncEvent::Breath);

        assert_eq!(source.wait().unwrap(), SyncEvent::Pulse);
        assert_eq!(source.wait().unwrap(), SyncEvent::Breath);
    }

    #[test]
    fn test_channel_source_errors_when_injector_dropped() {
        let (mut source, injector) = ChannelSyncSource::new();
        drop(injector);
        assert!(matches!(source.wait(), Err(SyncError::Closed)));
    }

    #[test]
    fn test_udp_source_classifies_datagrams() {
        let mut source = UdpSyncSource::bind("127.0.0.1:0").unwrap();
        let addr = source.socket.local_addr().unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        sender.send_to(b"P", addr).unwrap();
        sender.send_to(b"?", addr).unwrap(); // skipped
        sender.send_to(b"V", addr).unwrap();
        sender.send_to(b"B", addr).unwrap();

        assert_eq!(source.wait().unwrap(), SyncEvent::Pulse);
        assert_eq!(source.wait().unwrap(), SyncEvent::VpcPulse);
        assert_eq!(source.wait().unwrap(), SyncEvent::Breath);
    }
}
