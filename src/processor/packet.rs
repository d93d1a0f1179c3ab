use std::net::{IpAddr, SocketAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Icmpv6,
    Other(u8),
}

impl Protocol {
    pub fn from_number(number: u8) -> Self {
        match number {
            6 => Protocol::Tcp,
            17 => Protocol::Udp,
            1 => Protocol::Icmp,
            58 => Protocol::Icmpv6,
            n => Protocol::Other(n),
        }
    }

    /// IANA protocol number.
    pub fn number(self) -> u8 {
        match self {
            Protocol::Tcp => 6,
            Protocol::Udp => 17,
            Protocol::Icmp => 1,
            Protocol::Icmpv6 => 58,
            Protocol::Other(n) => n,
        }
    }

    /// Protocols whose connection time is carried across split flow records.
    pub fn is_tcp_or_udp(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }

    pub fn is_icmp(self) -> bool {
        matches!(self, Protocol::Icmp | Protocol::Icmpv6)
    }
}

/// TCP control bits, laid out as in the TCP header's flags byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TcpFlags(u8);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x01);
    pub const SYN: TcpFlags = TcpFlags(0x02);
    pub const RST: TcpFlags = TcpFlags(0x04);
    pub const PSH: TcpFlags = TcpFlags(0x08);
    pub const ACK: TcpFlags = TcpFlags(0x10);
    pub const URG: TcpFlags = TcpFlags(0x20);
    pub const ECE: TcpFlags = TcpFlags(0x40);
    pub const CWR: TcpFlags = TcpFlags(0x80);

    pub const fn empty() -> Self {
        TcpFlags(0)
    }

    pub const fn from_bits(bits: u8) -> Self {
        TcpFlags(bits)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn fin(self) -> bool { self.contains(Self::FIN) }
    pub fn syn(self) -> bool { self.contains(Self::SYN) }
    pub fn rst(self) -> bool { self.contains(Self::RST) }
    pub fn psh(self) -> bool { self.contains(Self::PSH) }
    pub fn ack(self) -> bool { self.contains(Self::ACK) }
    pub fn urg(self) -> bool { self.contains(Self::URG) }
    pub fn ece(self) -> bool { self.contains(Self::ECE) }
    pub fn cwr(self) -> bool { self.contains(Self::CWR) }
}

impl std::ops::BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

/// One decoded packet, as handed to the flow generator.
#[derive(Debug, Clone, PartialEq)]
pub struct PacketSummary {
    /// Sequence number within the capture.
    pub id: u64,
    /// Capture time in microseconds.
    pub timestamp: u64,
    pub src: IpAddr,
    pub dst: IpAddr,
    pub src_port: u16,
    pub dst_port: u16,
    pub protocol: Protocol,
    pub flags: TcpFlags,
    pub window_size: u16,
    /// IP header plus transport header, in bytes.
    pub header_len: u32,
    /// Bytes on the wire.
    pub packet_len: u32,
    pub payload_len: u32,
    pub icmp_type: u8,
    pub icmp_code: u8,
}

impl PacketSummary {
    pub fn tcp(id: u64, timestamp: u64, src: SocketAddr, dst: SocketAddr, flags: TcpFlags, payload_len: u32) -> Self {
        let header_len = ip_header_len(src.ip()) + 20;
        Self {
            id,
            timestamp,
            src: src.ip(),
            dst: dst.ip(),
            src_port: src.port(),
            dst_port: dst.port(),
            protocol: Protocol::Tcp,
            flags,
            window_size: 0,
            header_len,
            packet_len: 14 + header_len + payload_len,
            payload_len,
            icmp_type: 0,
            icmp_code: 0,
        }
    }

    pub fn udp(id: u64, timestamp: u64, src: SocketAddr, dst: SocketAddr, payload_len: u32) -> Self {
        let header_len = ip_header_len(src.ip()) + 8;
        Self {
            id,
            timestamp,
            src: src.ip(),
            dst: dst.ip(),
            src_port: src.port(),
            dst_port: dst.port(),
            protocol: Protocol::Udp,
            flags: TcpFlags::empty(),
            window_size: 0,
            header_len,
            packet_len: 14 + header_len + payload_len,
            payload_len,
            icmp_type: 0,
            icmp_code: 0,
        }
    }

    pub fn icmp(id: u64, timestamp: u64, src: IpAddr, dst: IpAddr, icmp_type: u8, icmp_code: u8, payload_len: u32) -> Self {
        let header_len = ip_header_len(src) + 8;
        let protocol = if src.is_ipv6() { Protocol::Icmpv6 } else { Protocol::Icmp };
        Self {
            id,
            timestamp,
            src,
            dst,
            src_port: 0,
            dst_port: 0,
            protocol,
            flags: TcpFlags::empty(),
            window_size: 0,
            header_len,
            packet_len: 14 + header_len + payload_len,
            payload_len,
            icmp_type,
            icmp_code,
        }
    }

    pub fn with_window(mut self, window_size: u16) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn is_tcp(&self) -> bool {
        self.protocol == Protocol::Tcp
    }
}

fn ip_header_len(addr: IpAddr) -> u32 {
    if addr.is_ipv4() { 20 } else { 40 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_accessors_follow_header_bits() {
        let flags = TcpFlags::SYN | TcpFlags::ACK;
        assert!(flags.syn());
        assert!(flags.ack());
        assert!(!flags.fin());
        assert_eq!(flags.bits(), 0x12);
        assert!(TcpFlags::from_bits(0x80).cwr());
    }

    #[test]
    fn protocol_numbers_round_trip() {
        for n in [1u8, 6, 17, 58, 47] {
            assert_eq!(Protocol::from_number(n).number(), n);
        }
        assert!(Protocol::Udp.is_tcp_or_udp());
        assert!(!Protocol::Icmp.is_tcp_or_udp());
        assert!(Protocol::Icmpv6.is_icmp());
    }
}
