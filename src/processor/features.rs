use serde::Serialize;

/// Column names of one output row, in serialisation order.
pub const FLOW_HEADER: [&str; 87] = [
    "Flow ID", "Src IP", "Src Port", "Dst IP", "Dst Port", "Protocol", "Timestamp", "Flow Duration",
    "Total Fwd Packet", "Total Bwd packets", "Total Length of Fwd Packet", "Total Length of Bwd Packet",
    "Fwd Packet Length Max", "Fwd Packet Length Min", "Fwd Packet Length Mean", "Fwd Packet Length Std",
    "Bwd Packet Length Max", "Bwd Packet Length Min", "Bwd Packet Length Mean", "Bwd Packet Length Std",
    "Flow Bytes/s", "Flow Packets/s",
    "Flow IAT Mean", "Flow IAT Std", "Flow IAT Max", "Flow IAT Min",
    "Fwd IAT Total", "Fwd IAT Mean", "Fwd IAT Std", "Fwd IAT Max", "Fwd IAT Min",
    "Bwd IAT Total", "Bwd IAT Mean", "Bwd IAT Std", "Bwd IAT Max", "Bwd IAT Min",
    "Fwd PSH Flags", "Bwd PSH Flags", "Fwd URG Flags", "Bwd URG Flags",
    "Fwd Header Length", "Bwd Header Length", "Fwd Packets/s", "Bwd Packets/s",
    "Packet Length Min", "Packet Length Max", "Packet Length Mean", "Packet Length Std", "Packet Length Variance",
    "FIN Flag Count", "SYN Flag Count", "RST Flag Count", "PSH Flag Count",
    "ACK Flag Count", "URG Flag Count", "CWR Flag Count", "ECE Flag Count",
    "Down/Up Ratio", "Average Packet Size", "Fwd Segment Size Avg", "Bwd Segment Size Avg",
    "Fwd Bytes/Bulk Avg", "Fwd Packet/Bulk Avg", "Fwd Bulk Rate Avg",
    "Bwd Bytes/Bulk Avg", "Bwd Packet/Bulk Avg", "Bwd Bulk Rate Avg",
    "Subflow Fwd Packets", "Subflow Fwd Bytes", "Subflow Bwd Packets", "Subflow Bwd Bytes",
    "FWD Init Win Bytes", "Bwd Init Win Bytes", "Fwd Act Data Pkts", "Fwd Seg Size Min",
    "Active Mean", "Active Std", "Active Max", "Active Min",
    "Idle Mean", "Idle Std", "Idle Max", "Idle Min",
    "ICMP Code", "ICMP Type", "Cumulative Connection Duration", "Label",
];

/// Finalised feature row of one flow. Field order is the column order of
/// [`FLOW_HEADER`]; durations and inter-arrival times are in microseconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlowFeatures {
    pub flow_id: String,
    pub src_ip: String,
    pub src_port: u16,
    pub dst_ip: String,
    pub dst_port: u16,
    pub protocol: u8,
    pub timestamp: String,
    pub flow_duration: u64,

    pub total_fwd_packets: u64,
    pub total_bwd_packets: u64,
    pub total_fwd_bytes: u64,
    pub total_bwd_bytes: u64,

    pub fwd_packet_len_max: u64,
    pub fwd_packet_len_min: u64,
    pub fwd_packet_len_mean: f64,
    pub fwd_packet_len_std: f64,
    pub bwd_packet_len_max: u64,
    pub bwd_packet_len_min: u64,
    pub bwd_packet_len_mean: f64,
    pub bwd_packet_len_std: f64,

    pub flow_bytes_per_sec: f64,
    pub flow_packets_per_sec: f64,

    pub flow_iat_mean: f64,
    pub flow_iat_std: f64,
    pub flow_iat_max: u64,
    pub flow_iat_min: u64,

    pub fwd_iat_total: f64,
    pub fwd_iat_mean: f64,
    pub fwd_iat_std: f64,
    pub fwd_iat_max: u64,
    pub fwd_iat_min: u64,

    pub bwd_iat_total: f64,
    pub bwd_iat_mean: f64,
    pub bwd_iat_std: f64,
    pub bwd_iat_max: u64,
    pub bwd_iat_min: u64,

    pub fwd_psh_flags: u32,
    pub bwd_psh_flags: u32,
    pub fwd_urg_flags: u32,
    pub bwd_urg_flags: u32,

    pub fwd_header_len: u64,
    pub bwd_header_len: u64,
    pub fwd_packets_per_sec: f64,
    pub bwd_packets_per_sec: f64,

    pub packet_len_min: u64,
    pub packet_len_max: u64,
    pub packet_len_mean: f64,
    pub packet_len_std: f64,
    pub packet_len_variance: f64,

    pub fin_flag_count: u32,
    pub syn_flag_count: u32,
    pub rst_flag_count: u32,
    pub psh_flag_count: u32,
    pub ack_flag_count: u32,
    pub urg_flag_count: u32,
    pub cwr_flag_count: u32,
    pub ece_flag_count: u32,

    pub down_up_ratio: f64,
    pub avg_packet_size: f64,
    pub fwd_segment_size_avg: f64,
    pub bwd_segment_size_avg: f64,

    pub fwd_bytes_bulk_avg: f64,
    pub fwd_packet_bulk_avg: f64,
    pub fwd_bulk_rate_avg: f64,
    pub bwd_bytes_bulk_avg: f64,
    pub bwd_packet_bulk_avg: f64,
    pub bwd_bulk_rate_avg: f64,

    pub subflow_fwd_packets: u64,
    pub subflow_fwd_bytes: u64,
    pub subflow_bwd_packets: u64,
    pub subflow_bwd_bytes: u64,

    pub fwd_init_win_bytes: u16,
    pub bwd_init_win_bytes: u16,
    pub fwd_act_data_packets: u64,
    pub fwd_seg_size_min: u32,

    pub active_mean: f64,
    pub active_std: f64,
    pub active_max: u64,
    pub active_min: u64,
    pub idle_mean: f64,
    pub idle_std: f64,
    pub idle_max: u64,
    pub idle_min: u64,

    pub icmp_code: u8,
    pub icmp_type: u8,
    pub cumulative_duration: u64,
    pub label: String,
}

/// `numerator / seconds`, or 0 when no time has elapsed.
pub(crate) fn per_second(numerator: f64, duration_us: u64) -> f64 {
    if duration_us == 0 {
        return 0.0;
    }
    numerator / (duration_us as f64 / 1_000_000.0)
}

/// `numerator / denominator`, or 0 for an empty denominator.
pub(crate) fn ratio(numerator: f64, denominator: u64) -> f64 {
    if denominator == 0 {
        return 0.0;
    }
    numerator / denominator as f64
}
