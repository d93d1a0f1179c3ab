use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{error, info, warn};
use serde::Serialize;

use super::reader::{PacketReader, ReadOutcome};
use crate::error::{FlowError, Result};
use crate::processor::PacketSummary;

#[derive(Debug, Clone, Serialize)]
pub struct NetworkInterface {
    pub name: String,
    pub description: String,
    pub is_up: bool,
}

/// Capture interfaces, loopback excluded.
pub fn list_network_devices() -> Result<Vec<NetworkInterface>> {
    let devices = pcap::Device::list()?;
    Ok(devices
        .into_iter()
        .filter(|d| !d.flags.is_loopback())
        .map(describe)
        .collect())
}

pub fn interface_info(interface_name: &str) -> Result<NetworkInterface> {
    pcap::Device::list()?
        .into_iter()
        .find(|d| d.name == interface_name)
        .map(describe)
        .ok_or_else(|| FlowError::Runtime(format!("Interface '{interface_name}' not found")))
}

fn describe(d: pcap::Device) -> NetworkInterface {
    let description = d.desc.unwrap_or_else(|| {
        if d.name.starts_with("br-") || d.name == "docker0" { "Docker Bridge".into() }
        else if d.name.starts_with("en") || d.name.starts_with("eth") { "Ethernet Interface".into() }
        else if d.name.starts_with("wl") { "Wi-Fi Interface".into() }
        else { "Network Interface".into() }
    });
    NetworkInterface { name: d.name, description, is_up: d.flags.is_up() }
}

/// Live capture on one interface, feeding decoded packets to a channel
/// from a dedicated thread.
pub struct PacketSniffer {
    interface: String,
    sniffer_running: Arc<AtomicBool>,
    sniffer_thread: Option<JoinHandle<()>>,
    reader: Option<PacketReader<pcap::Active>>, // owned until start, then moved into thread
    packet_sender: Sender<PacketSummary>,
    discarded: Arc<AtomicU64>,
}

impl PacketSniffer {
    pub fn new_with_sender(sender: Sender<PacketSummary>) -> Self {
        Self {
            interface: String::new(),
            sniffer_running: Arc::new(AtomicBool::new(false)),
            sniffer_thread: None,
            reader: None,
            packet_sender: sender,
            discarded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Opens `interface`. Packet ids are drawn from `sequence`, which the
    /// sniffers of one session share.
    pub fn init_sniffer(&mut self, interface: &str, filter: &str, sequence: Arc<AtomicU64>) -> Result<()> {
        self.reader = Some(PacketReader::open_device(interface, filter)?.with_sequence(sequence));
        self.interface = interface.to_string();
        Ok(())
    }

    pub fn start_sniffer(&mut self) -> Result<()> {
        let mut reader = self
            .reader
            .take()
            .ok_or_else(|| FlowError::Runtime("Capture is not initialized. Call init_sniffer first".into()))?;

        if self.sniffer_running.swap(true, Ordering::Relaxed) {
            return Err(FlowError::Runtime("Sniffer is already running".into()));
        }

        let running = self.sniffer_running.clone();
        let sender = self.packet_sender.clone();
        let discarded = self.discarded.clone();
        let interface = self.interface.clone();

        self.sniffer_thread = Some(thread::spawn(move || {
            info!("Sniffer thread started on {interface}");
            let mut reported = 0;
            while running.load(Ordering::Relaxed) {
                match reader.next_packet() {
                    Ok(ReadOutcome::Packet(packet)) => {
                        if sender.try_send(packet).is_err() {
                            discarded.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    Ok(ReadOutcome::Skipped) => {
                        // Timeouts also land here; only undecodable frames count
                        let undecodable = reader.discarded();
                        discarded.fetch_add(undecodable - reported, Ordering::Relaxed);
                        reported = undecodable;
                    }
                    Ok(ReadOutcome::End) => break,
                    Err(e) => { error!("Error capturing packet on {interface}: {e}"); break; }
                }
            }
            info!("Sniffer thread on {interface} exiting after {} frames", reader.frames());
        }));

        Ok(())
    }

    pub fn stop_sniffer(&mut self) -> Result<()> {
        if !self.sniffer_running.swap(false, Ordering::Relaxed) {
            return Ok(());
        }

        if let Some(handle) = self.sniffer_thread.take() {
            if handle.join().is_err() {
                warn!("Sniffer thread on {} panicked", self.interface);
            }
        }

        // If start succeeded, the reader is already moved. If not, drop it now.
        self.reader = None;
        info!("Sniffer on {} stopped", self.interface);
        Ok(())
    }

    /// Frames dropped so far: undecodable, or sent after the processor went away.
    pub fn discarded(&self) -> u64 {
        self.discarded.load(Ordering::Relaxed)
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }
}

impl Drop for PacketSniffer {
    fn drop(&mut self) {
        let _ = self.stop_sniffer();
    }
}
