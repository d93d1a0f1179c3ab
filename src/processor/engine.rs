use crossbeam_channel::{select, tick, Receiver, Sender};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use log::{debug, error, info, warn};

use super::features::FLOW_HEADER;
use super::generator::FlowGenerator;
use super::packet::PacketSummary;
use super::sink::{CsvFlowSink, FlowSink};
use crate::config::FlowConfig;
use crate::error::Result;
use crate::types::CaptureStats;

pub const FINISHED_FLOWS_FILE: &str = "finished-flows.csv";

/// Owns the flow generator of a live capture. Completed flows are appended
/// to `<out_dir>/finished-flows.csv`; every export interval the open flows
/// are written to their own timestamped file and forgotten. Stops when
/// `running` is cleared or every packet sender is gone, then drains.
pub fn processing_loop(
    running: Arc<AtomicBool>,
    packet_rx: Receiver<PacketSummary>,
    stats_tx: Sender<CaptureStats>,
    config: FlowConfig,
    out_dir: PathBuf,
) -> Result<CaptureStats> {
    let started = Instant::now();

    let sink = CsvFlowSink::append(out_dir.join(FINISHED_FLOWS_FILE), &FLOW_HEADER, &config.label)?;
    let mut generator = FlowGenerator::with_sink(&config, sink);

    // Timers to export open flows and to publish stats
    let export_tick = tick(Duration::from_secs(config.export_interval_secs));
    let stats_tick = tick(Duration::from_secs(1));

    let mut stats = CaptureStats::default();

    loop {
        if !running.load(Ordering::Relaxed) { break; }

        select! {
            recv(packet_rx) -> msg => {
                match msg {
                    Ok(packet) => process_packet(&mut generator, &packet, &mut stats),
                    Err(_) => {
                        debug!("All packet senders disconnected");
                        break;
                    }
                }
            },

            recv(export_tick) -> _ => {
                export_current_flows(&mut generator, &out_dir, &mut stats);
            },

            recv(stats_tick) -> _ => {
                refresh(&generator, &mut stats, started);
                let _ = stats_tx.send(stats.clone());
            },
        }
    }

    // Packets already queued still belong to this capture
    while let Ok(packet) = packet_rx.try_recv() {
        process_packet(&mut generator, &packet, &mut stats);
    }
    let before = generator.finished_flow_count();
    if let Err(e) = generator.drain() {
        warn!("Failed to record drained flows: {e}");
    }
    generator.sink_mut().flush()?;
    stats.flows_written += generator.finished_flow_count() - before;

    refresh(&generator, &mut stats, started);
    let _ = stats_tx.send(stats.clone());
    info!("Processing loop finished: {stats}");
    Ok(stats)
}

fn process_packet(generator: &mut FlowGenerator<CsvFlowSink>, packet: &PacketSummary, stats: &mut CaptureStats) {
    stats.total_packets += 1;
    stats.valid_packets += 1;

    let before = generator.finished_flow_count();
    if let Err(e) = generator.add_packet(packet) {
        warn!("Failed to record completed flow: {e}");
    }
    stats.flows_written += generator.finished_flow_count() - before;
}

fn export_current_flows(generator: &mut FlowGenerator<CsvFlowSink>, out_dir: &Path, stats: &mut CaptureStats) {
    if let Err(e) = generator.sink_mut().flush() {
        warn!("Failed to flush finished flows: {e}");
    }
    if generator.current_flow_count() == 0 {
        return;
    }

    let path = out_dir.join(format!("capture-{}.csv", Utc::now().format("%Y%m%d-%H%M%S")));
    match generator.dump_current_flows(&path, &FLOW_HEADER) {
        Ok(rows) => {
            stats.flows_written += rows as u64;
            generator.clear_current_flows();
            info!("Exported {rows} open flows to {}", path.display());
        }
        // Flows stay in memory and go out with the next export
        Err(e) => error!("Failed to export open flows to {}: {e}", path.display()),
    }
}

fn refresh<S: FlowSink>(generator: &FlowGenerator<S>, stats: &mut CaptureStats, started: Instant) {
    stats.open_flows = generator.current_flow_count() as u64;
    stats.finished_flows = generator.finished_flow_count();
    stats.first_disordered_packet = generator.first_disordered_packet();
    stats.uptime_seconds = started.elapsed().as_secs();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::packet::TcpFlags;
    use crossbeam_channel::unbounded;
    use std::fs;
    use std::net::SocketAddr;

    #[test]
    fn loop_drains_open_flows_when_senders_go_away() {
        let dir = tempfile::tempdir().unwrap();
        let (packet_tx, packet_rx) = unbounded();
        let (stats_tx, stats_rx) = unbounded();
        let running = Arc::new(AtomicBool::new(true));

        let client: SocketAddr = "10.0.0.1:40000".parse().unwrap();
        let server: SocketAddr = "10.0.0.2:80".parse().unwrap();
        packet_tx.send(PacketSummary::tcp(1, 0, client, server, TcpFlags::SYN, 0)).unwrap();
        packet_tx.send(PacketSummary::tcp(2, 10, server, client, TcpFlags::RST, 0)).unwrap();
        packet_tx.send(PacketSummary::tcp(3, 20, client, server, TcpFlags::SYN, 0)).unwrap();
        drop(packet_tx);

        let stats = processing_loop(running, packet_rx, stats_tx, FlowConfig::default(), dir.path().to_path_buf()).unwrap();
        assert_eq!(stats.total_packets, 3);
        assert_eq!(stats.finished_flows, 2);
        assert_eq!(stats.open_flows, 0);
        assert_eq!(stats.flows_written, 2);
        assert_eq!(stats_rx.try_iter().last(), Some(stats));

        let text = fs::read_to_string(dir.path().join(FINISHED_FLOWS_FILE)).unwrap();
        assert_eq!(text.lines().count(), 3);
    }
}
