use std::collections::BTreeMap;
use std::path::Path;

use super::export::FlowCsvWriter;
use super::flow::FlowRecord;
use crate::error::Result;

/// Receives every flow the generator terminates, exactly once, at the
/// moment of termination.
pub trait FlowSink {
    /// `id` increases by one with every completed flow, starting at 1. A
    /// flow the sink rejected still consumed its id.
    fn on_flow_completed(&mut self, id: u64, flow: FlowRecord) -> Result<()>;
}

/// Keeps completed flows in memory for a later bulk export.
#[derive(Debug, Default)]
pub struct FinishedFlows {
    flows: BTreeMap<u64, FlowRecord>,
}

impl FinishedFlows {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Completed flows in completion order.
    pub fn iter(&self) -> impl Iterator<Item = (&u64, &FlowRecord)> {
        self.flows.iter()
    }
}

impl FlowSink for FinishedFlows {
    fn on_flow_completed(&mut self, id: u64, flow: FlowRecord) -> Result<()> {
        self.flows.insert(id, flow);
        Ok(())
    }
}

/// Appends one CSV row per completed flow to a single file.
pub struct CsvFlowSink {
    writer: FlowCsvWriter,
    label: String,
}

impl CsvFlowSink {
    pub fn append<P: AsRef<Path>>(path: P, header: &[&str], label: &str) -> Result<Self> {
        Ok(Self {
            writer: FlowCsvWriter::append(path, header)?,
            label: label.to_string(),
        })
    }

    pub fn rows(&self) -> usize {
        self.writer.rows()
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()
    }
}

impl FlowSink for CsvFlowSink {
    fn on_flow_completed(&mut self, _id: u64, flow: FlowRecord) -> Result<()> {
        self.writer.write(&flow.features(&self.label))
    }
}
