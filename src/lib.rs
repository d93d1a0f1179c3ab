pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod processor;
pub mod types;

use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use log::{error, info, warn};

use capture::{interface_info, PacketReader, PacketSniffer, ReadOutcome};
use cli::{Cli, Command};
use config::FlowConfig;
use error::{FlowError, Result};
use processor::{CsvFlowSink, FeatureProcessor, FlowGenerator, FLOW_HEADER};
use types::CaptureStats;

pub use capture::{list_network_devices, NetworkInterface};

/// Appended to the capture file name to name its output.
pub const FLOW_SUFFIX: &str = "_Flow.csv";

const CAPTURE_EXTENSIONS: [&str; 3] = ["pcap", "pcapng", "cap"];

/// Output file for one capture: `<out_dir>/<file name>_Flow.csv`.
pub fn output_path(input: &Path, out_dir: &Path) -> Result<PathBuf> {
    let file_name = input
        .file_name()
        .ok_or(FlowError::MissingArgument("capture file name"))?
        .to_string_lossy();
    Ok(out_dir.join(format!("{file_name}{FLOW_SUFFIX}")))
}

/// Extracts the flows of one capture file. Completed flows are written as
/// they terminate; flows still open at the end of the file follow them.
pub fn process_pcap_file(input: &Path, out_dir: &Path, config: &FlowConfig) -> Result<CaptureStats> {
    fs::create_dir_all(out_dir)?;
    let output = output_path(input, out_dir)?;
    if output.exists() {
        fs::remove_file(&output)?;
    }

    let mut reader = PacketReader::open_file(input)?;
    let sink = CsvFlowSink::append(&output, &FLOW_HEADER, &config.label)?;
    let mut generator = FlowGenerator::with_sink(config, sink);

    loop {
        match reader.next_packet()? {
            ReadOutcome::Packet(packet) => generator.add_packet(&packet)?,
            ReadOutcome::Skipped => {}
            ReadOutcome::End => break,
        }
    }

    // The sink's rows must be on disk before the open flows are appended
    generator.sink_mut().flush()?;
    let open_rows = generator.dump_current_flows(&output, &FLOW_HEADER)?;

    let stats = CaptureStats {
        total_packets: reader.frames(),
        valid_packets: reader.valid(),
        discarded_packets: reader.discarded(),
        open_flows: generator.current_flow_count() as u64,
        finished_flows: generator.finished_flow_count(),
        flows_written: (generator.sink().rows() + open_rows) as u64,
        first_disordered_packet: generator.first_disordered_packet(),
        uptime_seconds: 0,
    };
    info!("{} -> {}: {stats}", input.display(), output.display());
    Ok(stats)
}

/// Runs [`process_pcap_file`] on every capture file directly inside `dir`.
/// A file that fails is logged and skipped.
pub fn process_pcap_dir(dir: &Path, out_dir: &Path, config: &FlowConfig) -> Result<Vec<(PathBuf, CaptureStats)>> {
    let mut inputs: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_capture_file(path))
        .collect();
    inputs.sort();

    if inputs.is_empty() {
        warn!("No capture files found in {}", dir.display());
    }

    let mut results = Vec::with_capacity(inputs.len());
    for input in inputs {
        match process_pcap_file(&input, out_dir, config) {
            Ok(stats) => results.push((input, stats)),
            Err(e) => error!("Failed to process {}: {e}", input.display()),
        }
    }
    Ok(results)
}

fn is_capture_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CAPTURE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// A running live capture: one sniffer per interface, one processor.
pub struct LiveSession {
    sniffers: Vec<PacketSniffer>,
    processor: FeatureProcessor,
}

/// Starts live capture on `interfaces`, or on every interface that is up
/// when none are given.
pub fn start_system(interfaces: &[String], config: FlowConfig, out_dir: &Path) -> Result<LiveSession> {
    let interfaces: Vec<String> = if interfaces.is_empty() {
        list_network_devices()?
            .into_iter()
            .filter(|d| d.is_up)
            .map(|d| d.name)
            .collect()
    } else {
        interfaces.to_vec()
    };
    if interfaces.is_empty() {
        return Err(FlowError::Runtime("No capture interface available".into()));
    }

    let filter = config.capture_filter.clone();
    let mut processor = FeatureProcessor::new();
    processor.start_processor(config, out_dir)?;

    // One id sequence for the whole session
    let sequence = Arc::new(AtomicU64::new(0));
    let mut sniffers = Vec::with_capacity(interfaces.len());
    for interface in &interfaces {
        match open_sniffer(&processor, interface, &filter, sequence.clone()) {
            Ok(sniffer) => sniffers.push(sniffer),
            Err(e) => {
                drop(sniffers);
                let _ = processor.stop_processor();
                return Err(e);
            }
        }
    }

    info!("Capturing on {}", interfaces.join(", "));
    Ok(LiveSession { sniffers, processor })
}

fn open_sniffer(
    processor: &FeatureProcessor,
    interface: &str,
    filter: &str,
    sequence: Arc<AtomicU64>,
) -> Result<PacketSniffer> {
    match interface_info(interface) {
        Ok(info) => info!("{}: {} (up: {})", info.name, info.description, info.is_up),
        Err(e) => warn!("{e}"),
    }
    let mut sniffer = PacketSniffer::new_with_sender(processor.get_sender());
    sniffer.init_sniffer(interface, filter, sequence)?;
    sniffer.start_sniffer()?;
    Ok(sniffer)
}

impl LiveSession {
    /// Stops capturing, drains the open flows and returns the final statistics.
    pub fn stop_system(mut self) -> Result<CaptureStats> {
        let mut discarded = 0;
        for sniffer in &mut self.sniffers {
            sniffer.stop_sniffer()?;
            discarded += sniffer.discarded();
        }

        let mut stats = self.processor.stop_processor()?;
        stats.total_packets += discarded;
        stats.discarded_packets += discarded;
        info!("System stopped successfully");
        Ok(stats)
    }
}

pub fn run(cli: Cli) -> anyhow::Result<()> {
    let config = cli.flow_config().context("invalid flow configuration")?;

    match &cli.command {
        Command::Interfaces => {
            let devices = list_network_devices().context("listing capture interfaces")?;
            println!("{}", serde_json::to_string_pretty(&devices)?);
        }

        Command::Offline { input, out_dir } => {
            if input.is_dir() {
                let results = process_pcap_dir(input, out_dir, &config)
                    .with_context(|| format!("reading capture directory {}", input.display()))?;
                info!("Processed {} capture files", results.len());
            } else {
                process_pcap_file(input, out_dir, &config)
                    .with_context(|| format!("processing {}", input.display()))?;
            }
        }

        Command::Live { out_dir, interfaces, duration } => {
            let session = start_system(interfaces, config, out_dir).context("starting live capture")?;
            match duration {
                Some(secs) => thread::sleep(Duration::from_secs(*secs)),
                None => {
                    info!("Press Enter to stop");
                    let mut line = String::new();
                    std::io::stdin().lock().read_line(&mut line)?;
                }
            }
            let stats = session.stop_system().context("stopping live capture")?;
            info!("Final stats: {stats}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_name_keeps_the_capture_file_name() {
        let out = output_path(Path::new("/data/monday.pcap"), Path::new("/tmp/out")).unwrap();
        assert_eq!(out, PathBuf::from("/tmp/out/monday.pcap_Flow.csv"));
        assert!(matches!(output_path(Path::new("/"), Path::new("out")), Err(FlowError::MissingArgument(_))));
    }

    #[test]
    fn capture_extensions_are_case_insensitive() {
        assert!(is_capture_file(Path::new("a.pcap")));
        assert!(is_capture_file(Path::new("a.PCAPNG")));
        assert!(is_capture_file(Path::new("a.cap")));
        assert!(!is_capture_file(Path::new("a.csv")));
        assert!(!is_capture_file(Path::new("pcap")));
    }
}
