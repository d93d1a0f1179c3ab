use std::fmt;

use serde::{Deserialize, Serialize};

/// Counters reported after an offline run and periodically in live mode.
#[derive(Clone, Serialize, Deserialize, Debug, Default, PartialEq)]
pub struct CaptureStats {
    /// Frames read from the source.
    pub total_packets: u64,
    /// Frames decoded and handed to the flow generator.
    pub valid_packets: u64,
    pub discarded_packets: u64,
    pub open_flows: u64,
    pub finished_flows: u64,
    /// Rows written to the output files.
    pub flows_written: u64,
    /// Sequence id of the first out-of-order packet. Ids are unique within
    /// one capture file or one live session, across all its interfaces.
    pub first_disordered_packet: Option<u64>,
    pub uptime_seconds: u64,
}

impl fmt::Display for CaptureStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "packets {} (valid {}, discarded {}), flows open {} finished {} written {}",
            self.total_packets,
            self.valid_packets,
            self.discarded_packets,
            self.open_flows,
            self.finished_flows,
            self.flows_written,
        )?;
        if let Some(id) = self.first_disordered_packet {
            write!(f, ", first disordered packet {id}")?;
        }
        Ok(())
    }
}
