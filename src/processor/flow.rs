use chrono::{DateTime, Utc};

use super::features::{per_second, ratio, FlowFeatures};
use super::key::FlowKey;
use super::packet::{PacketSummary, Protocol};
use super::stats::RunningStats;

const SUBFLOW_TIMEOUT_US: u64 = 1_000_000; // 1 second
const BULK_TIMEOUT_US: u64 = 1_000_000; // 1 second
const BULK_THRESHOLD: u64 = 4; // Minimum packets for bulk transfer

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowDirection { Forward, Backward }

/// TCP teardown progress of a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlowCloseState {
    #[default]
    NonClosing,
    FirstFin,
    SecondFin,
    ReadyForTermination,
}

impl FlowCloseState {
    /// A FIN was folded in. `both_sides_fin` is true once each direction has sent one.
    pub fn on_fin(self, both_sides_fin: bool) -> Self {
        match self {
            FlowCloseState::NonClosing => FlowCloseState::FirstFin,
            FlowCloseState::FirstFin if both_sides_fin => FlowCloseState::SecondFin,
            other => other,
        }
    }

    pub fn on_rst(self) -> Self {
        FlowCloseState::ReadyForTermination
    }

    pub fn on_ack(self) -> Self {
        match self {
            FlowCloseState::SecondFin => FlowCloseState::ReadyForTermination,
            other => other,
        }
    }
}

/// Bulk transfer tracking for one direction.
#[derive(Debug, Clone, Default)]
struct BulkState {
    bulk_count: u64,
    packet_total: u64,
    bytes_total: u64,
    duration_total: u64,

    // Candidate bulk being built
    start: Option<u64>,
    last: Option<u64>,
    candidate_packets: u64,
    candidate_bytes: u64,
}

impl BulkState {
    fn update(&mut self, timestamp: u64, payload_len: u32, other_side_last: Option<u64>) {
        // Traffic from the other side since this candidate started breaks it
        if let (Some(other), Some(start)) = (other_side_last, self.start) {
            if other > start {
                self.start = None;
            }
        }
        if payload_len == 0 {
            return;
        }
        let size = payload_len as u64;

        let last = match (self.start, self.last) {
            (Some(_), Some(last)) if timestamp.saturating_sub(last) <= BULK_TIMEOUT_US => last,
            _ => {
                self.start = Some(timestamp);
                self.last = Some(timestamp);
                self.candidate_packets = 1;
                self.candidate_bytes = size;
                return;
            }
        };

        self.candidate_packets += 1;
        self.candidate_bytes += size;
        if self.candidate_packets == BULK_THRESHOLD {
            let start = self.start.unwrap_or(timestamp);
            self.bulk_count += 1;
            self.packet_total += self.candidate_packets;
            self.bytes_total += self.candidate_bytes;
            self.duration_total += timestamp.saturating_sub(start);
        } else if self.candidate_packets > BULK_THRESHOLD {
            self.packet_total += 1;
            self.bytes_total += size;
            self.duration_total += timestamp.saturating_sub(last);
        }
        self.last = Some(timestamp);
    }

    fn bytes_per_bulk(&self) -> f64 {
        ratio(self.bytes_total as f64, self.bulk_count)
    }

    fn packets_per_bulk(&self) -> f64 {
        ratio(self.packet_total as f64, self.bulk_count)
    }

    fn rate(&self) -> f64 {
        per_second(self.bytes_total as f64, self.duration_total)
    }
}

/// Per-direction counters.
#[derive(Debug, Clone, Default)]
struct DirectionStats {
    payload: RunningStats,
    iat: RunningStats,
    bytes: u64,
    header_bytes: u64,
    last_seen: Option<u64>,
    init_window: Option<u16>,
    fin_flags: u32,
    psh_flags: u32,
    urg_flags: u32,
    bulk: BulkState,
}

impl DirectionStats {
    fn packets(&self) -> u64 {
        self.payload.count()
    }
}

#[derive(Debug, Clone, Default)]
struct FlagCounts {
    fin: u32,
    syn: u32,
    rst: u32,
    psh: u32,
    ack: u32,
    urg: u32,
    cwr: u32,
    ece: u32,
}

/// Running state and statistics of one bidirectional flow.
#[derive(Debug, Clone)]
pub struct FlowRecord {
    key: FlowKey,
    close_state: FlowCloseState,

    flow_start_time: u64,
    flow_last_time: u64,

    fwd: DirectionStats,
    bwd: DirectionStats,
    packet_len: RunningStats,
    flow_iat: RunningStats,
    flags: FlagCounts,

    // Forward-only extras
    fwd_act_data_packets: u64,
    fwd_min_header_len: Option<u32>,

    // Subflows
    subflow_count: u64,
    subflow_last_time: u64,

    // Active/Idle segmentation
    activity_timeout: u64,
    start_active: u64,
    end_active: u64,
    active: RunningStats,
    idle: RunningStats,

    // Connection bookkeeping carried across split records
    cumulative_duration: u64,
    tcp_packets_seen: u64,

    icmp_type: u8,
    icmp_code: u8,
}

impl FlowRecord {
    /// Starts a flow from its first packet. `key` fixes the orientation:
    /// packets from `key.src:key.src_port` are forward.
    pub fn new(packet: &PacketSummary, key: FlowKey, activity_timeout: u64) -> Self {
        let mut flow = Self::blank(packet, key, activity_timeout);
        flow.accumulate(packet);
        flow
    }

    /// Starts the next record of a connection that was split by the flow
    /// timeout: same orientation and TCP packet history as `previous`,
    /// `cumulative_duration` seeded by the caller.
    pub fn resume(packet: &PacketSummary, previous: &FlowRecord, activity_timeout: u64, cumulative_duration: u64) -> Self {
        let mut flow = Self::blank(packet, previous.key, activity_timeout);
        flow.tcp_packets_seen = previous.tcp_packets_seen;
        flow.cumulative_duration = cumulative_duration;
        flow.accumulate(packet);
        flow
    }

    fn blank(packet: &PacketSummary, key: FlowKey, activity_timeout: u64) -> Self {
        let ts = packet.timestamp;
        Self {
            key,
            close_state: FlowCloseState::NonClosing,
            flow_start_time: ts,
            flow_last_time: ts,
            fwd: DirectionStats::default(),
            bwd: DirectionStats::default(),
            packet_len: RunningStats::default(),
            flow_iat: RunningStats::default(),
            flags: FlagCounts::default(),
            fwd_act_data_packets: 0,
            fwd_min_header_len: None,
            subflow_count: 1,
            subflow_last_time: ts,
            activity_timeout,
            start_active: ts,
            end_active: ts,
            active: RunningStats::default(),
            idle: RunningStats::default(),
            cumulative_duration: 0,
            tcp_packets_seen: 0,
            icmp_type: packet.icmp_type,
            icmp_code: packet.icmp_code,
        }
    }

    pub fn key(&self) -> FlowKey { self.key }
    pub fn protocol(&self) -> Protocol { self.key.protocol }
    pub fn close_state(&self) -> FlowCloseState { self.close_state }
    pub fn start_time(&self) -> u64 { self.flow_start_time }
    pub fn last_seen(&self) -> u64 { self.flow_last_time }
    pub fn cumulative_duration(&self) -> u64 { self.cumulative_duration }
    pub fn tcp_packets_seen(&self) -> u64 { self.tcp_packets_seen }
    pub fn icmp_type(&self) -> u8 { self.icmp_type }
    pub fn icmp_code(&self) -> u8 { self.icmp_code }
    pub fn fwd_packet_count(&self) -> u64 { self.fwd.packets() }
    pub fn bwd_packet_count(&self) -> u64 { self.bwd.packets() }

    pub fn packet_count(&self) -> u64 {
        self.fwd.packets() + self.bwd.packets()
    }

    /// Time between first and last packet, in microseconds.
    pub fn duration(&self) -> u64 {
        self.flow_last_time.saturating_sub(self.flow_start_time)
    }

    /// Adds this record's own duration to the connection total.
    pub fn accumulate_connection_duration(&mut self) {
        self.cumulative_duration += self.duration();
    }

    pub fn direction_of(&self, packet: &PacketSummary) -> FlowDirection {
        if self.key.is_forward(packet) {
            FlowDirection::Forward
        } else {
            FlowDirection::Backward
        }
    }

    /// Folds one more packet into the flow: active/idle segmentation first,
    /// then every counter and timing series.
    pub fn fold(&mut self, packet: &PacketSummary) {
        self.update_active_idle(packet.timestamp);
        self.accumulate(packet);
    }

    pub fn on_fin(&mut self) {
        let both_sides = self.fwd.fin_flags > 0 && self.bwd.fin_flags > 0;
        self.close_state = self.close_state.on_fin(both_sides);
    }

    pub fn on_rst(&mut self) {
        self.close_state = self.close_state.on_rst();
    }

    pub fn on_ack(&mut self) {
        self.close_state = self.close_state.on_ack();
    }

    /// Update Active/Idle time features according to CICFlowMeter rules
    fn update_active_idle(&mut self, timestamp: u64) {
        if timestamp.saturating_sub(self.end_active) > self.activity_timeout {
            let active_duration = self.end_active.saturating_sub(self.start_active);
            if active_duration > 0 {
                self.active.push(active_duration);
            }
            self.idle.push(timestamp - self.end_active);
            self.start_active = timestamp;
            self.end_active = timestamp;
        } else {
            self.end_active = self.end_active.max(timestamp);
        }
    }

    fn update_subflows(&mut self, timestamp: u64) {
        if timestamp.saturating_sub(self.subflow_last_time) > SUBFLOW_TIMEOUT_US {
            self.subflow_count += 1;
        }
        self.subflow_last_time = self.subflow_last_time.max(timestamp);
    }

    fn update_bulk(&mut self, direction: FlowDirection, timestamp: u64, payload_len: u32) {
        match direction {
            FlowDirection::Forward => {
                let other = self.bwd.bulk.last;
                self.fwd.bulk.update(timestamp, payload_len, other);
            }
            FlowDirection::Backward => {
                let other = self.fwd.bulk.last;
                self.bwd.bulk.update(timestamp, payload_len, other);
            }
        }
    }

    fn update_flags(&mut self, packet: &PacketSummary, direction: FlowDirection) {
        let f = packet.flags;
        let flags = &mut self.flags;
        if f.fin() { flags.fin += 1; }
        if f.syn() { flags.syn += 1; }
        if f.rst() { flags.rst += 1; }
        if f.psh() { flags.psh += 1; }
        if f.ack() { flags.ack += 1; }
        if f.urg() { flags.urg += 1; }
        if f.cwr() { flags.cwr += 1; }
        if f.ece() { flags.ece += 1; }

        let side = match direction {
            FlowDirection::Forward => &mut self.fwd,
            FlowDirection::Backward => &mut self.bwd,
        };
        if f.fin() { side.fin_flags += 1; }
        if f.psh() { side.psh_flags += 1; }
        if f.urg() { side.urg_flags += 1; }
    }

    fn accumulate(&mut self, packet: &PacketSummary) {
        let ts = packet.timestamp;
        let direction = self.direction_of(packet);

        self.update_bulk(direction, ts, packet.payload_len);
        self.update_subflows(ts);
        self.update_flags(packet, direction);

        if packet.is_tcp() {
            self.tcp_packets_seen += 1;
        }
        if self.protocol().is_icmp() {
            self.icmp_type = packet.icmp_type;
            self.icmp_code = packet.icmp_code;
        }

        // Flow-level inter-arrival, skipped for the very first packet
        if self.packet_count() > 0 {
            self.flow_iat.push(ts.saturating_sub(self.flow_last_time));
        }
        self.packet_len.push(packet.payload_len as u64);

        let side = match direction {
            FlowDirection::Forward => &mut self.fwd,
            FlowDirection::Backward => &mut self.bwd,
        };
        if let Some(last) = side.last_seen {
            side.iat.push(ts.saturating_sub(last));
        }
        side.last_seen = Some(side.last_seen.map_or(ts, |last| last.max(ts)));
        side.payload.push(packet.payload_len as u64);
        side.bytes += packet.payload_len as u64;
        side.header_bytes += packet.header_len as u64;
        if side.init_window.is_none() && packet.is_tcp() {
            side.init_window = Some(packet.window_size);
        }

        if direction == FlowDirection::Forward {
            if packet.payload_len >= 1 {
                self.fwd_act_data_packets += 1;
            }
            self.fwd_min_header_len = Some(
                self.fwd_min_header_len.map_or(packet.header_len, |min| min.min(packet.header_len)),
            );
        }

        self.flow_last_time = self.flow_last_time.max(ts);
    }

    /// Finalised feature row.
    pub fn features(&self, label: &str) -> FlowFeatures {
        let duration = self.duration();
        let fwd = &self.fwd;
        let bwd = &self.bwd;
        let timestamp = DateTime::<Utc>::from_timestamp_micros(self.flow_start_time as i64)
            .unwrap_or_default()
            .format("%d/%m/%Y %I:%M:%S %p")
            .to_string();

        FlowFeatures {
            flow_id: self.key.to_string(),
            src_ip: self.key.src.to_string(),
            src_port: self.key.src_port,
            dst_ip: self.key.dst.to_string(),
            dst_port: self.key.dst_port,
            protocol: self.protocol().number(),
            timestamp,
            flow_duration: duration,

            total_fwd_packets: fwd.packets(),
            total_bwd_packets: bwd.packets(),
            total_fwd_bytes: fwd.bytes,
            total_bwd_bytes: bwd.bytes,

            fwd_packet_len_max: fwd.payload.max(),
            fwd_packet_len_min: fwd.payload.min(),
            fwd_packet_len_mean: fwd.payload.mean(),
            fwd_packet_len_std: fwd.payload.std_dev(),
            bwd_packet_len_max: bwd.payload.max(),
            bwd_packet_len_min: bwd.payload.min(),
            bwd_packet_len_mean: bwd.payload.mean(),
            bwd_packet_len_std: bwd.payload.std_dev(),

            flow_bytes_per_sec: per_second((fwd.bytes + bwd.bytes) as f64, duration),
            flow_packets_per_sec: per_second(self.packet_count() as f64, duration),

            flow_iat_mean: self.flow_iat.mean(),
            flow_iat_std: self.flow_iat.std_dev(),
            flow_iat_max: self.flow_iat.max(),
            flow_iat_min: self.flow_iat.min(),

            fwd_iat_total: fwd.iat.sum(),
            fwd_iat_mean: fwd.iat.mean(),
            fwd_iat_std: fwd.iat.std_dev(),
            fwd_iat_max: fwd.iat.max(),
            fwd_iat_min: fwd.iat.min(),

            bwd_iat_total: bwd.iat.sum(),
            bwd_iat_mean: bwd.iat.mean(),
            bwd_iat_std: bwd.iat.std_dev(),
            bwd_iat_max: bwd.iat.max(),
            bwd_iat_min: bwd.iat.min(),

            fwd_psh_flags: fwd.psh_flags,
            bwd_psh_flags: bwd.psh_flags,
            fwd_urg_flags: fwd.urg_flags,
            bwd_urg_flags: bwd.urg_flags,

            fwd_header_len: fwd.header_bytes,
            bwd_header_len: bwd.header_bytes,
            fwd_packets_per_sec: per_second(fwd.packets() as f64, duration),
            bwd_packets_per_sec: per_second(bwd.packets() as f64, duration),

            packet_len_min: self.packet_len.min(),
            packet_len_max: self.packet_len.max(),
            packet_len_mean: self.packet_len.mean(),
            packet_len_std: self.packet_len.std_dev(),
            packet_len_variance: self.packet_len.variance(),

            fin_flag_count: self.flags.fin,
            syn_flag_count: self.flags.syn,
            rst_flag_count: self.flags.rst,
            psh_flag_count: self.flags.psh,
            ack_flag_count: self.flags.ack,
            urg_flag_count: self.flags.urg,
            cwr_flag_count: self.flags.cwr,
            ece_flag_count: self.flags.ece,

            down_up_ratio: ratio(bwd.packets() as f64, fwd.packets()),
            avg_packet_size: ratio(self.packet_len.sum(), self.packet_count()),
            fwd_segment_size_avg: fwd.payload.mean(),
            bwd_segment_size_avg: bwd.payload.mean(),

            fwd_bytes_bulk_avg: fwd.bulk.bytes_per_bulk(),
            fwd_packet_bulk_avg: fwd.bulk.packets_per_bulk(),
            fwd_bulk_rate_avg: fwd.bulk.rate(),
            bwd_bytes_bulk_avg: bwd.bulk.bytes_per_bulk(),
            bwd_packet_bulk_avg: bwd.bulk.packets_per_bulk(),
            bwd_bulk_rate_avg: bwd.bulk.rate(),

            subflow_fwd_packets: fwd.packets() / self.subflow_count,
            subflow_fwd_bytes: fwd.bytes / self.subflow_count,
            subflow_bwd_packets: bwd.packets() / self.subflow_count,
            subflow_bwd_bytes: bwd.bytes / self.subflow_count,

            fwd_init_win_bytes: fwd.init_window.unwrap_or(0),
            bwd_init_win_bytes: bwd.init_window.unwrap_or(0),
            fwd_act_data_packets: self.fwd_act_data_packets,
            fwd_seg_size_min: self.fwd_min_header_len.unwrap_or(0),

            active_mean: self.active.mean(),
            active_std: self.active.std_dev(),
            active_max: self.active.max(),
            active_min: self.active.min(),
            idle_mean: self.idle.mean(),
            idle_std: self.idle.std_dev(),
            idle_max: self.idle.max(),
            idle_min: self.idle.min(),

            icmp_code: self.icmp_code,
            icmp_type: self.icmp_type,
            cumulative_duration: self.cumulative_duration,
            label: label.to_string(),
        }
    }
}
