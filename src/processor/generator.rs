use std::collections::HashMap;
use std::path::Path;

use log::{debug, info, warn};

use super::export::FlowCsvWriter;
use super::flow::{FlowCloseState, FlowRecord};
use super::key::FlowKey;
use super::packet::{PacketSummary, Protocol};
use super::sink::{FinishedFlows, FlowSink};
use crate::config::FlowConfig;
use crate::error::Result;

/// Assigns packets to bidirectional flows and hands terminated flows to a sink.
///
/// Not thread-safe: a generator is meant to be owned by exactly one
/// processing loop. Timeouts are evaluated lazily against packet
/// timestamps, so a flow that stops receiving packets stays open until a
/// later packet on the same key or an explicit [`FlowGenerator::drain`].
pub struct FlowGenerator<S: FlowSink = FinishedFlows> {
    current_flows: HashMap<FlowKey, FlowRecord>,
    sink: S,
    flow_timeout: u64,
    activity_timeout: u64,
    label: String,
    last_flow_id: u64,
    finished_flow_count: u64,
    last_timestamp: Option<u64>,
    first_disordered: Option<u64>,
}

impl FlowGenerator<FinishedFlows> {
    /// Generator that keeps completed flows for [`FlowGenerator::dump_labeled_flow_features`].
    pub fn new(config: &FlowConfig) -> Self {
        Self::with_sink(config, FinishedFlows::new())
    }

    /// Bulk export: finished flows with more than one packet, then open
    /// flows with at least one. The file is truncated first.
    pub fn dump_labeled_flow_features<P: AsRef<Path>>(&self, path: P, header: &[&str]) -> Result<usize> {
        let mut writer = FlowCsvWriter::create(path.as_ref(), header)?;
        let mut skipped = 0;

        for (_, flow) in self.sink.iter() {
            if flow.packet_count() > 1 {
                writer.write(&flow.features(&self.label))?;
            } else {
                skipped += 1;
            }
        }
        debug!("dumpLabeledFlow finished flows -> {} written, {} skipped", writer.rows(), skipped);

        for flow in self.sorted_current_flows() {
            if flow.packet_count() >= 1 {
                writer.write(&Self::snapshot(flow).features(&self.label))?;
            }
        }
        writer.flush()?;

        info!("Wrote {} flows to {}", writer.rows(), path.as_ref().display());
        Ok(writer.rows())
    }
}

impl<S: FlowSink> FlowGenerator<S> {
    pub fn with_sink(config: &FlowConfig, sink: S) -> Self {
        info!(
            "Initializing flow generator (flow_timeout={}us, activity_timeout={}us)",
            config.flow_timeout_us, config.activity_timeout_us
        );
        Self {
            current_flows: HashMap::new(),
            sink,
            flow_timeout: config.flow_timeout_us,
            activity_timeout: config.activity_timeout_us,
            label: config.label.clone(),
            last_flow_id: 0,
            finished_flow_count: 0,
            last_timestamp: None,
            first_disordered: None,
        }
    }

    /// Feeds one packet through the flow state machine.
    ///
    /// Errors only come from the sink; the flow table is already consistent
    /// when one is returned.
    pub fn add_packet(&mut self, packet: &PacketSummary) -> Result<()> {
        self.check_order(packet);

        let forward = FlowKey::forward(packet);
        let backward = forward.reversed();
        let id = if self.current_flows.contains_key(&forward) {
            forward
        } else if self.current_flows.contains_key(&backward) {
            backward
        } else {
            self.start_flow(packet);
            return Ok(());
        };

        let now = packet.timestamp;
        let flags = packet.flags;
        let open = self.current_flows.len();
        let Some(flow) = self.current_flows.get_mut(&id) else {
            return Ok(());
        };

        // Hard timeout, or a new connection on a closed 4-tuple
        let timed_out = now.saturating_sub(flow.start_time()) > self.flow_timeout;
        let restart = flow.close_state() == FlowCloseState::ReadyForTermination && flags.syn();
        if timed_out || restart {
            return self.split_flow(id, packet, restart);
        }

        if packet.is_tcp() && flags.fin() {
            debug!("FlagFIN current has {open} flow");
            flow.fold(packet);
            flow.on_fin();
        } else if packet.is_tcp() && flags.rst() {
            flow.fold(packet);
            flow.on_rst();
        } else if packet.is_tcp() && flags.ack() {
            flow.fold(packet);
            flow.on_ack();
        } else if flow.protocol().is_icmp()
            && flow.icmp_type() != packet.icmp_type
            && flow.icmp_code() != packet.icmp_code
        {
            // A different ICMP exchange on the same pair of hosts
            let fresh = FlowRecord::new(packet, FlowKey::forward(packet), self.activity_timeout);
            if let Some(finished) = self.current_flows.insert(id, fresh) {
                self.emit(finished)?;
            }
        } else {
            flow.fold(packet);
        }
        Ok(())
    }

    /// Emits every open flow through the sink, oldest first, and returns
    /// how many the sink accepted. A rejected flow does not stop the drain;
    /// the first sink error is returned once every flow has been offered.
    pub fn drain(&mut self) -> Result<usize> {
        let mut flows: Vec<FlowRecord> = self.current_flows.drain().map(|(_, f)| f).collect();
        flows.sort_by_key(|f| (f.start_time(), f.key()));

        let before = self.finished_flow_count;
        let mut first_error = None;
        for mut flow in flows {
            if flow.protocol().is_tcp_or_udp() {
                flow.accumulate_connection_duration();
            }
            if let Err(e) = self.emit(flow) {
                first_error.get_or_insert(e);
            }
        }

        let count = (self.finished_flow_count - before) as usize;
        if count > 0 {
            info!("Drained {count} open flows");
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(count),
        }
    }

    /// Appends every open flow with at least one packet to `path`. The header
    /// is written only when the file is new. Open flows are left untouched.
    pub fn dump_current_flows<P: AsRef<Path>>(&self, path: P, header: &[&str]) -> Result<usize> {
        let mut writer = FlowCsvWriter::append(path.as_ref(), header)?;
        for flow in self.sorted_current_flows() {
            if flow.packet_count() >= 1 {
                writer.write(&Self::snapshot(flow).features(&self.label))?;
            }
        }
        writer.flush()?;
        debug!("dumpLabeledCurrentFlow -> {} rows to {}", writer.rows(), path.as_ref().display());
        Ok(writer.rows())
    }

    pub fn clear_current_flows(&mut self) {
        self.current_flows.clear();
    }

    pub fn current_flow_count(&self) -> usize {
        self.current_flows.len()
    }

    pub fn current_flow(&self, key: &FlowKey) -> Option<&FlowRecord> {
        self.current_flows.get(key)
    }

    pub fn current_flows(&self) -> impl Iterator<Item = &FlowRecord> {
        self.current_flows.values()
    }

    /// Number of completed flows the sink accepted so far.
    pub fn finished_flow_count(&self) -> u64 {
        self.finished_flow_count
    }

    /// Sequence id of the first packet seen with a timestamp older than its predecessor.
    pub fn first_disordered_packet(&self) -> Option<u64> {
        self.first_disordered
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    fn check_order(&mut self, packet: &PacketSummary) {
        match self.last_timestamp {
            Some(previous) if packet.timestamp < previous => {
                if self.first_disordered.is_none() {
                    self.first_disordered = Some(packet.id);
                    warn!(
                        "Capture contains disordered packets, flows may be incorrect. Packet {} is the first disordered one",
                        packet.id
                    );
                }
            }
            _ => self.last_timestamp = Some(packet.timestamp),
        }
    }

    fn start_flow(&mut self, packet: &PacketSummary) {
        let (key, flow) = self.fresh_flow(packet);
        self.current_flows.insert(key, flow);
    }

    /// A SYN+ACK with no open flow is taken as a reply whose SYN was
    /// captured late or not at all, so the flow is oriented from the
    /// SYN+ACK's destination.
    fn fresh_flow(&self, packet: &PacketSummary) -> (FlowKey, FlowRecord) {
        let key = if packet.flags.syn() && packet.flags.ack() {
            FlowKey::backward(packet)
        } else {
            FlowKey::forward(packet)
        };
        (key, FlowRecord::new(packet, key, self.activity_timeout))
    }

    /// Terminates the flow under `id` and opens its successor from `packet`.
    fn split_flow(&mut self, id: FlowKey, packet: &PacketSummary, restart: bool) -> Result<()> {
        let Some(mut flow) = self.current_flows.remove(&id) else {
            return Ok(());
        };
        let now = packet.timestamp;

        if flow.protocol().is_tcp_or_udp() {
            flow.accumulate_connection_duration();
        }

        let new_udp_dialogue = flow.protocol() == Protocol::Udp
            && now.saturating_sub(flow.last_seen()) > self.flow_timeout;

        let successor = if restart || new_udp_dialogue || !packet.protocol.is_tcp_or_udp() {
            let (_, fresh) = self.fresh_flow(packet);
            fresh
        } else {
            // Same connection cut by the hard timeout
            let cumulative = flow.cumulative_duration() + now.saturating_sub(flow.last_seen());
            FlowRecord::resume(packet, &flow, self.activity_timeout, cumulative)
        };
        self.current_flows.insert(id, successor);

        let open = self.current_flows.len();
        if open % 50 == 0 {
            debug!("Timeout current has {open} flow");
        }
        self.emit(flow)
    }

    /// Every completed flow consumes an id; only accepted ones are counted.
    fn emit(&mut self, flow: FlowRecord) -> Result<()> {
        self.last_flow_id += 1;
        let id = self.last_flow_id;
        match self.sink.on_flow_completed(id, flow) {
            Ok(()) => {
                self.finished_flow_count += 1;
                Ok(())
            }
            Err(e) => {
                warn!("Flow sink rejected flow {id}: {e}");
                Err(e)
            }
        }
    }

    fn sorted_current_flows(&self) -> Vec<&FlowRecord> {
        let mut flows: Vec<&FlowRecord> = self.current_flows.values().collect();
        flows.sort_by_key(|f| (f.start_time(), f.key()));
        flows
    }

    /// Export view of an open flow: TCP/UDP connection time includes the
    /// flow's own duration so far.
    fn snapshot(flow: &FlowRecord) -> FlowRecord {
        let mut snapshot = flow.clone();
        if snapshot.protocol().is_tcp_or_udp() {
            snapshot.accumulate_connection_duration();
        }
        snapshot
    }
}
