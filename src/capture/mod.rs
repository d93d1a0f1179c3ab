mod parser;
mod reader;
mod sniffer;

pub use parser::parse_frame;
pub use reader::{PacketReader, ReadOutcome};
pub use sniffer::{interface_info, list_network_devices, NetworkInterface, PacketSniffer};
