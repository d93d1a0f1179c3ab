use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use etherparse::{NetHeaders, PacketHeaders, TransportHeader};

use crate::error::{FlowError, Result};
use crate::processor::{PacketSummary, Protocol, TcpFlags};

/// Decodes one Ethernet frame into a [`PacketSummary`].
///
/// `wire_len` is the original length of the frame, which may exceed
/// `data.len()` when the capture was truncated by its snaplen. Payload
/// length is taken from the IP length fields, so link headers, VLAN tags
/// and Ethernet padding never count as payload.
pub fn parse_frame(id: u64, timestamp: u64, wire_len: u32, data: &[u8]) -> Result<PacketSummary> {
    let parsed = PacketHeaders::from_ethernet_slice(data)
        .map_err(|e| FlowError::Parse(format!("Failed to parse packet: {e}")))?;

    // (src, dst, IP header bytes, bytes after the IP headers, protocol)
    let (src, dst, ip_header_len, ip_payload_len, ip_protocol) = match &parsed.net {
        Some(NetHeaders::Ipv4(ipv4, exts)) => {
            let header_len = (ipv4.header_len() + exts.header_len()) as u32;
            (
                IpAddr::V4(Ipv4Addr::from(ipv4.source)),
                IpAddr::V4(Ipv4Addr::from(ipv4.destination)),
                header_len,
                u32::from(ipv4.total_len).saturating_sub(header_len),
                ipv4.protocol.0,
            )
        }
        Some(NetHeaders::Ipv6(ipv6, exts)) => (
            IpAddr::V6(Ipv6Addr::from(ipv6.source)),
            IpAddr::V6(Ipv6Addr::from(ipv6.destination)),
            (ipv6.header_len() + exts.header_len()) as u32,
            // The fixed header is not part of payload_length
            u32::from(ipv6.payload_length).saturating_sub(exts.header_len() as u32),
            ipv6.next_header.0,
        ),
        _ => return Err(FlowError::Parse("Not an IP packet".into())),
    };

    let mut summary = PacketSummary {
        id,
        timestamp,
        src,
        dst,
        src_port: 0,
        dst_port: 0,
        protocol: Protocol::from_number(ip_protocol),
        flags: TcpFlags::empty(),
        window_size: 0,
        header_len: ip_header_len,
        packet_len: wire_len,
        payload_len: 0,
        icmp_type: 0,
        icmp_code: 0,
    };

    let transport_header_len = match &parsed.transport {
        Some(TransportHeader::Tcp(tcp)) => {
            let flags = (tcp.cwr as u8) << 7
                | (tcp.ece as u8) << 6
                | (tcp.urg as u8) << 5
                | (tcp.ack as u8) << 4
                | (tcp.psh as u8) << 3
                | (tcp.rst as u8) << 2
                | (tcp.syn as u8) << 1
                | (tcp.fin as u8);
            summary.protocol = Protocol::Tcp;
            summary.src_port = tcp.source_port;
            summary.dst_port = tcp.destination_port;
            summary.flags = TcpFlags::from_bits(flags);
            summary.window_size = tcp.window_size;
            tcp.data_offset() as u32 * 4
        }
        Some(TransportHeader::Udp(udp)) => {
            summary.protocol = Protocol::Udp;
            summary.src_port = udp.source_port;
            summary.dst_port = udp.destination_port;
            8
        }
        Some(TransportHeader::Icmpv4(icmp)) => {
            // Type and code lead the serialized header
            let bytes = icmp.to_bytes();
            summary.protocol = Protocol::Icmp;
            summary.icmp_type = bytes.first().copied().unwrap_or_default();
            summary.icmp_code = bytes.get(1).copied().unwrap_or_default();
            icmp.header_len() as u32
        }
        Some(TransportHeader::Icmpv6(icmp)) => {
            summary.protocol = Protocol::Icmpv6;
            summary.icmp_type = icmp.icmp_type.type_u8();
            summary.icmp_code = icmp.icmp_type.code_u8();
            icmp.header_len() as u32
        }
        None => 0,
    };

    summary.header_len += transport_header_len;
    summary.payload_len = ip_payload_len.saturating_sub(transport_header_len);
    Ok(summary)
}
