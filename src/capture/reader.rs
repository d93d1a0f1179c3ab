use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, info};
use pcap::{Activated, Active, Capture, Offline};

use super::parser::parse_frame;
use crate::error::{FlowError, Result};
use crate::processor::PacketSummary;

/// Result of one read from a capture source.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadOutcome {
    Packet(PacketSummary),
    /// A frame that could not be decoded, or a live read that timed out.
    Skipped,
    /// The source is exhausted.
    End,
}

/// Pulls frames from a pcap capture and decodes them, numbering every
/// frame read from 1.
///
/// Readers that share a sequence through [`PacketReader::with_sequence`]
/// draw ids from one counter, so ids stay unique across the interfaces of
/// a live session.
pub struct PacketReader<T: Activated + ?Sized> {
    capture: Capture<T>,
    sequence: Arc<AtomicU64>,
    frames: u64,
    valid: u64,
    discarded: u64,
}

impl PacketReader<Offline> {
    pub fn open_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let capture = Capture::from_file(path.as_ref())?;
        info!("Opened capture file {}", path.as_ref().display());
        Ok(Self::new(capture))
    }
}

impl PacketReader<Active> {
    /// Opens `interface` in promiscuous mode with a short read timeout so
    /// callers can poll a stop flag between reads.
    pub fn open_device(interface: &str, filter: &str) -> Result<Self> {
        let mut capture = Capture::from_device(interface)?
            .promisc(true)
            .immediate_mode(true)
            .timeout(10)
            .open()?;

        capture.filter(filter, true)?;
        info!("Interface: {interface} successfully opened");
        info!("Filter: {filter} applied");
        Ok(Self::new(capture))
    }
}

impl<T: Activated + ?Sized> PacketReader<T> {
    pub fn new(capture: Capture<T>) -> Self {
        Self {
            capture,
            sequence: Arc::new(AtomicU64::new(0)),
            frames: 0,
            valid: 0,
            discarded: 0,
        }
    }

    pub fn with_sequence(mut self, sequence: Arc<AtomicU64>) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn next_packet(&mut self) -> Result<ReadOutcome> {
        let packet = match self.capture.next_packet() {
            Ok(packet) => packet,
            Err(pcap::Error::NoMorePackets) => return Ok(ReadOutcome::End),
            Err(pcap::Error::TimeoutExpired) => return Ok(ReadOutcome::Skipped),
            Err(e) => return Err(FlowError::Capture(e)),
        };

        self.frames += 1;
        let id = self.sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let header = packet.header;
        let timestamp = (header.ts.tv_sec as u64 * 1_000_000) + header.ts.tv_usec as u64;

        match parse_frame(id, timestamp, header.len, packet.data) {
            Ok(summary) => {
                self.valid += 1;
                Ok(ReadOutcome::Packet(summary))
            }
            Err(e) => {
                self.discarded += 1;
                debug!("Discarding frame {id}: {e}");
                Ok(ReadOutcome::Skipped)
            }
        }
    }

    /// Frames this reader has read so far, decoded or not.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn valid(&self) -> u64 {
        self.valid
    }

    pub fn discarded(&self) -> u64 {
        self.discarded
    }
}
