use crossbeam_channel::{select, tick, Receiver};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::info;

use crate::types::CaptureStats;

/// Logs the most recent statistics every `every`, skipping repeats.
pub fn publisher_loop(
    running: Arc<AtomicBool>,
    stats_rx: Receiver<CaptureStats>,
    every: Duration,
) {
    let emit_tick = tick(every);
    let mut latest: Option<CaptureStats> = None;
    let mut published: Option<CaptureStats> = None;

    loop {
        if !running.load(Ordering::Relaxed) { break; }

        select! {
            recv(stats_rx) -> msg => {
                match msg {
                    Ok(s) => latest = Some(s),
                    Err(_) => break,
                }
            }
            recv(emit_tick) -> _ => {
                if let Some(ref s) = latest {
                    if published.as_ref() != Some(s) {
                        info!("Capture stats: {s}");
                        published = latest.clone();
                    }
                }
            }
            default(Duration::from_millis(250)) => {}
        }
    }
}
