pub mod feature_processor;
mod engine;
mod publisher;
mod export;
mod features;
mod flow;
mod generator;
mod key;
mod packet;
mod sink;
mod stats;

pub use export::{default_header, FlowCsvWriter};
pub use feature_processor::FeatureProcessor;
pub use features::{FlowFeatures, FLOW_HEADER};
pub use flow::{FlowCloseState, FlowDirection, FlowRecord};
pub use generator::FlowGenerator;
pub use key::FlowKey;
pub use packet::{PacketSummary, Protocol, TcpFlags};
pub use sink::{CsvFlowSink, FinishedFlows, FlowSink};
pub use stats::RunningStats;
