mod common;

use common::*;
use flowmeter_lib::config::FlowConfig;
use flowmeter_lib::processor::{FlowCloseState, FlowGenerator, FlowKey, PacketSummary, TcpFlags, FLOW_HEADER};
use pretty_assertions::assert_eq;

fn generator() -> FlowGenerator {
    FlowGenerator::new(&FlowConfig::default())
}

#[test]
fn tcp_session_is_one_flow_ready_before_drain() {
    let mut meter = generator();
    for packet in tcp_session() {
        meter.add_packet(&packet).unwrap();
    }

    assert_eq!(meter.current_flow_count(), 1);
    let flow = meter.current_flows().next().unwrap();
    assert_eq!(flow.close_state(), FlowCloseState::ReadyForTermination);
    assert_eq!(flow.key().src, client().ip());
    assert_eq!(flow.fwd_packet_count(), 4);
    assert_eq!(flow.bwd_packet_count(), 3);
    assert_eq!(flow.duration(), 2_020_000);

    assert_eq!(meter.drain().unwrap(), 1);
    let rows: Vec<_> = meter.sink().iter().map(|(id, f)| (*id, f.features("x"))).collect();
    assert_eq!(rows.len(), 1);
    let (id, features) = &rows[0];
    assert_eq!(*id, 1);
    assert_eq!(features.flow_duration, 2_020_000);
    assert_eq!(features.cumulative_duration, 2_020_000);
    assert_eq!((features.total_fwd_packets, features.total_bwd_packets), (4, 3));
    assert_eq!(features.flow_id, "192.168.10.5-192.168.10.50-1234-80-6");
}

#[test]
fn close_state_only_ready_after_final_ack() {
    let mut meter = generator();
    let session = tcp_session();
    let key = FlowKey::forward(&session[0]);
    let mut states = Vec::new();
    for packet in &session {
        meter.add_packet(packet).unwrap();
        states.push(meter.current_flow(&key).unwrap().close_state());
    }

    use FlowCloseState::*;
    assert_eq!(
        states,
        vec![NonClosing, NonClosing, NonClosing, NonClosing, FirstFin, SecondFin, ReadyForTermination]
    );
}

#[test]
fn udp_packets_200s_apart_are_two_flows() {
    let mut meter = generator();
    let (a, b) = (client(), server());
    meter.add_packet(&PacketSummary::udp(1, 0, a, b, 64)).unwrap();
    meter.add_packet(&PacketSummary::udp(2, 200 * SEC, a, b, 64)).unwrap();
    meter.drain().unwrap();

    let starts: Vec<u64> = meter.sink().iter().map(|(_, f)| f.start_time()).collect();
    assert_eq!(starts, vec![0, 200 * SEC]);
    assert!(meter.sink().iter().all(|(_, f)| f.packet_count() == 1));
}

#[test]
fn timeout_split_conserves_connection_duration() {
    let mut meter = generator();
    let (c, s) = (client(), server());
    meter.add_packet(&tcp(1, 0, c, s, TcpFlags::ACK, 10)).unwrap();
    meter.add_packet(&tcp(2, 100 * SEC, s, c, TcpFlags::ACK, 10)).unwrap();
    meter.add_packet(&tcp(3, 130 * SEC, s, c, TcpFlags::ACK, 10)).unwrap();
    meter.add_packet(&tcp(4, 135 * SEC, c, s, TcpFlags::ACK, 10)).unwrap();
    meter.drain().unwrap();

    let records: Vec<_> = meter.sink().iter().map(|(_, f)| f.clone()).collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].duration(), 100 * SEC);
    assert_eq!(records[0].cumulative_duration(), 100 * SEC);

    // Successor keeps the connection's orientation and its running time
    assert_eq!(records[1].key(), records[0].key());
    assert_eq!(records[1].bwd_packet_count(), 1);
    assert_eq!(records[1].fwd_packet_count(), 1);
    assert_eq!(records[1].tcp_packets_seen(), 4);
    assert_eq!(records[1].cumulative_duration(), 135 * SEC);
}

#[test]
fn rst_after_fin_forces_termination() {
    let mut meter = generator();
    let (c, s) = (client(), server());
    meter.add_packet(&tcp(1, 0, c, s, TcpFlags::SYN, 0)).unwrap();
    meter.add_packet(&tcp(2, 10, c, s, TcpFlags::FIN, 0)).unwrap();
    meter.add_packet(&tcp(3, 20, s, c, TcpFlags::FIN, 0)).unwrap();
    meter.add_packet(&tcp(4, 30, s, c, TcpFlags::RST, 0)).unwrap();

    let flow = meter.current_flows().next().unwrap();
    assert_eq!(flow.close_state(), FlowCloseState::ReadyForTermination);
}

#[test]
fn keys_are_an_involution_under_swap() {
    let packet = tcp(1, 0, client(), server(), TcpFlags::SYN, 0);
    let reply = tcp(2, 0, server(), client(), TcpFlags::SYN, 0);
    assert_eq!(FlowKey::forward(&packet), FlowKey::backward(&reply));
    assert_eq!(FlowKey::forward(&packet).reversed().reversed(), FlowKey::forward(&packet));
}

#[test]
fn bulk_and_current_exports_differ_on_single_packet_flows() {
    let dir = tempfile::tempdir().unwrap();
    let mut meter = generator();
    let (c, s) = (client(), server());
    // A lone SYN later pushed out by the timeout, then a two-packet flow
    meter.add_packet(&tcp(1, 0, c, s, TcpFlags::SYN, 0)).unwrap();
    meter.add_packet(&tcp(2, 121 * SEC, c, s, TcpFlags::ACK, 0)).unwrap();
    meter.add_packet(&tcp(3, 122 * SEC, s, c, TcpFlags::ACK, 0)).unwrap();
    assert_eq!(meter.finished_flow_count(), 1);

    let bulk = dir.path().join("bulk.csv");
    meter.dump_labeled_flow_features(&bulk, &FLOW_HEADER).unwrap();
    let (header, rows) = read_rows(&bulk);
    assert_eq!(header.len(), 87);
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][column(&header, "Total Bwd packets")], "1");

    let current = dir.path().join("current.csv");
    meter.dump_current_flows(&current, &FLOW_HEADER).unwrap();
    let (_, rows) = read_rows(&current);
    assert_eq!(rows.len(), 1);
    assert_eq!(&rows[0][column(&header, "Cumulative Connection Duration")], (122 * SEC).to_string());
}

#[test]
fn only_the_first_disordered_packet_is_reported() {
    let mut meter = generator();
    let (c, s) = (client(), server());
    meter.add_packet(&tcp(1, 500, c, s, TcpFlags::SYN, 0)).unwrap();
    meter.add_packet(&tcp(2, 600, s, c, TcpFlags::ACK, 0)).unwrap();
    meter.add_packet(&tcp(3, 550, c, s, TcpFlags::ACK, 0)).unwrap();
    meter.add_packet(&tcp(4, 100, s, c, TcpFlags::ACK, 0)).unwrap();
    assert_eq!(meter.first_disordered_packet(), Some(3));
}
