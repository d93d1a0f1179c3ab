use std::fmt;
use std::net::IpAddr;

use super::packet::{PacketSummary, Protocol};

/// Directed flow identity. A packet matches an open flow when its forward
/// key or its backward key equals the flow's key.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FlowKey {
    pub src: IpAddr,
    pub src_port: u16,
    pub dst: IpAddr,
    pub dst_port: u16,
    pub protocol: Protocol,
}

impl FlowKey {
    pub fn new(src: IpAddr, src_port: u16, dst: IpAddr, dst_port: u16, protocol: Protocol) -> Self {
        Self { src, src_port, dst, dst_port, protocol }
    }

    /// Key in the packet's own orientation.
    pub fn forward(packet: &PacketSummary) -> Self {
        Self::new(packet.src, packet.src_port, packet.dst, packet.dst_port, packet.protocol)
    }

    /// Key with source and destination swapped.
    pub fn backward(packet: &PacketSummary) -> Self {
        Self::forward(packet).reversed()
    }

    pub fn reversed(&self) -> Self {
        Self::new(self.dst, self.dst_port, self.src, self.src_port, self.protocol)
    }

    /// True when `packet` travels from this key's source to its destination.
    pub fn is_forward(&self, packet: &PacketSummary) -> bool {
        self.src == packet.src && self.src_port == packet.src_port
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}-{}",
            self.src,
            self.dst,
            self.src_port,
            self.dst_port,
            self.protocol.number()
        )
    }
}
