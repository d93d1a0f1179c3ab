#![allow(dead_code)]

use std::fs::File;
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::Path;

use etherparse::PacketBuilder;
use flowmeter_lib::processor::{PacketSummary, TcpFlags};

pub const SEC: u64 = 1_000_000;

pub fn client() -> SocketAddr { "192.168.10.5:1234".parse().unwrap() }
pub fn server() -> SocketAddr { "192.168.10.50:80".parse().unwrap() }

pub fn tcp(id: u64, ts: u64, src: SocketAddr, dst: SocketAddr, flags: TcpFlags, payload: u32) -> PacketSummary {
    PacketSummary::tcp(id, ts, src, dst, flags, payload)
}

/// The handshake, one response, and a graceful close.
pub fn tcp_session() -> Vec<PacketSummary> {
    let (c, s) = (client(), server());
    vec![
        tcp(1, 0, c, s, TcpFlags::SYN, 0),
        tcp(2, 10_000, s, c, TcpFlags::SYN | TcpFlags::ACK, 0),
        tcp(3, 20_000, c, s, TcpFlags::ACK, 0),
        tcp(4, SEC, s, c, TcpFlags::PSH | TcpFlags::ACK, 512),
        tcp(5, 2 * SEC, c, s, TcpFlags::FIN, 0),
        tcp(6, 2 * SEC + 10_000, s, c, TcpFlags::FIN, 0),
        tcp(7, 2 * SEC + 20_000, c, s, TcpFlags::ACK, 0),
    ]
}

/// One captured frame: timestamp in microseconds and the Ethernet bytes.
pub struct Frame {
    pub timestamp: u64,
    pub data: Vec<u8>,
}

/// Builds the Ethernet/IPv4/TCP frame of `packet`.
pub fn tcp_frame(packet: &PacketSummary) -> Frame {
    let (SocketAddr::V4(src), SocketAddr::V4(dst)) = (
        SocketAddr::new(packet.src, packet.src_port),
        SocketAddr::new(packet.dst, packet.dst_port),
    ) else {
        panic!("IPv4 only");
    };

    let mut builder = PacketBuilder::ethernet2([2, 0, 0, 0, 0, 1], [2, 0, 0, 0, 0, 2])
        .ipv4(src.ip().octets(), dst.ip().octets(), 64)
        .tcp(packet.src_port, packet.dst_port, packet.id as u32, 64240);
    let flags = packet.flags;
    if flags.syn() { builder = builder.syn(); }
    if flags.ack() { builder = builder.ack(1); }
    if flags.fin() { builder = builder.fin(); }
    if flags.rst() { builder = builder.rst(); }
    if flags.psh() { builder = builder.psh(); }

    let payload = vec![0u8; packet.payload_len as usize];
    let mut data = Vec::with_capacity(builder.size(payload.len()));
    builder.write(&mut data, &payload).unwrap();
    Frame { timestamp: packet.timestamp, data }
}

/// Writes a classic little-endian pcap file with an Ethernet link type.
pub fn write_pcap(path: &Path, base_secs: u64, frames: &[Frame]) -> io::Result<()> {
    let mut out = File::create(path)?;
    out.write_all(&0xa1b2_c3d4u32.to_le_bytes())?;
    out.write_all(&2u16.to_le_bytes())?;
    out.write_all(&4u16.to_le_bytes())?;
    out.write_all(&0i32.to_le_bytes())?;
    out.write_all(&0u32.to_le_bytes())?;
    out.write_all(&65_535u32.to_le_bytes())?;
    out.write_all(&1u32.to_le_bytes())?;

    for frame in frames {
        let ts = base_secs * SEC + frame.timestamp;
        out.write_all(&((ts / SEC) as u32).to_le_bytes())?;
        out.write_all(&((ts % SEC) as u32).to_le_bytes())?;
        out.write_all(&(frame.data.len() as u32).to_le_bytes())?;
        out.write_all(&(frame.data.len() as u32).to_le_bytes())?;
        out.write_all(&frame.data)?;
    }
    Ok(())
}

/// Reads an output CSV into its header and rows.
pub fn read_rows(path: &Path) -> (csv::StringRecord, Vec<csv::StringRecord>) {
    let mut reader = csv::Reader::from_path(path).unwrap();
    let header = reader.headers().unwrap().clone();
    let rows = reader.records().map(|r| r.unwrap()).collect();
    (header, rows)
}

pub fn column(header: &csv::StringRecord, name: &str) -> usize {
    header.iter().position(|h| h == name).unwrap_or_else(|| panic!("no column {name}"))
}
