use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fs;
use std::path::PathBuf;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{info, warn};

use super::packet::PacketSummary;
use super::{engine, publisher};
use crate::config::FlowConfig;
use crate::error::{FlowError, Result};
use crate::types::CaptureStats;

const STATS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Live flow processing: a processing thread that owns the flow generator
/// and a publisher thread that logs its statistics.
pub struct FeatureProcessor {
    running: Arc<AtomicBool>,
    processing_thread: Option<JoinHandle<Result<CaptureStats>>>,
    publisher_thread: Option<JoinHandle<()>>,
    packet_tx: Sender<PacketSummary>,
    packet_rx: Receiver<PacketSummary>,
    stats_tx: Sender<CaptureStats>,
    stats_rx: Receiver<CaptureStats>,
}

impl Default for FeatureProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl FeatureProcessor {
    pub fn new() -> Self {
        let (packet_tx, packet_rx) = unbounded();
        let (stats_tx, stats_rx) = unbounded();
        Self {
            running: Arc::new(AtomicBool::new(false)),
            processing_thread: None,
            publisher_thread: None,
            packet_tx,
            packet_rx,
            stats_tx,
            stats_rx,
        }
    }

    /// Sender for capture threads.
    pub fn get_sender(&self) -> Sender<PacketSummary> { self.packet_tx.clone() }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn start_processor(&mut self, config: FlowConfig, out_dir: impl Into<PathBuf>) -> Result<()> {
        if self.running.load(Ordering::Relaxed) {
            return Err(FlowError::Runtime("Processor is already running".into()));
        }
        config.validate()?;
        let out_dir = out_dir.into();
        fs::create_dir_all(&out_dir)?;
        self.running.store(true, Ordering::Relaxed);

        let processing = {
            let running = self.running.clone();
            let rx = self.packet_rx.clone();
            let stats_tx = self.stats_tx.clone();
            thread::spawn(move || engine::processing_loop(running, rx, stats_tx, config, out_dir))
        };

        let publisher = {
            let running = self.running.clone();
            let stats_rx = self.stats_rx.clone();
            thread::spawn(move || publisher::publisher_loop(running, stats_rx, STATS_LOG_INTERVAL))
        };

        self.processing_thread = Some(processing);
        self.publisher_thread = Some(publisher);
        info!("Feature processor started");
        Ok(())
    }

    /// Stops both threads. Open flows are drained into the finished-flows
    /// file before the final statistics are returned.
    pub fn stop_processor(&mut self) -> Result<CaptureStats> {
        if !self.running.load(Ordering::Relaxed) {
            return Err(FlowError::Runtime("Processor isn't running".into()));
        }
        self.running.store(false, Ordering::Relaxed);

        let stats = match self.processing_thread.take().map(|h| h.join()) {
            Some(Ok(result)) => result?,
            Some(Err(_)) => return Err(FlowError::Runtime("Processing thread panicked".into())),
            None => CaptureStats::default(),
        };
        if let Some(h) = self.publisher_thread.take() {
            if h.join().is_err() {
                warn!("Stats publisher thread panicked");
            }
        }
        info!("Feature processor stopped");
        Ok(stats)
    }
}
