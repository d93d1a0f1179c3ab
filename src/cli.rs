use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::FlowConfig;
use crate::error::Result;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// JSON file with flow settings; flags below override it
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Flow timeout in microseconds
    #[arg(long, global = true)]
    pub flow_timeout: Option<u64>,

    /// Activity timeout in microseconds
    #[arg(long, global = true)]
    pub activity_timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Extract flows from a capture file, or from every capture in a directory
    Offline { input: PathBuf, out_dir: PathBuf },

    /// Capture live traffic until Enter is pressed or the duration elapses
    Live {
        out_dir: PathBuf,

        /// Interface to capture on; repeat for several. Defaults to every interface that is up
        #[arg(short, long = "interface")]
        interfaces: Vec<String>,

        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// List capture interfaces
    Interfaces,
}

impl Cli {
    /// Defaults, then the config file, then command-line overrides.
    pub fn flow_config(&self) -> Result<FlowConfig> {
        let mut config = match &self.config {
            Some(path) => FlowConfig::from_json_file(path)?,
            None => FlowConfig::default(),
        };
        if let Some(timeout) = self.flow_timeout {
            config.flow_timeout_us = timeout;
        }
        if let Some(timeout) = self.activity_timeout {
            config.activity_timeout_us = timeout;
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FlowError;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from(["flowmeter", "offline", "in.pcap", "out", "--flow-timeout", "30000000"]);
        let config = cli.flow_config().unwrap();
        assert_eq!(config.flow_timeout_us, 30_000_000);
        assert_eq!(config.activity_timeout_us, 5_000_000);
        assert!(matches!(cli.command, Command::Offline { .. }));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let cli = Cli::parse_from(["flowmeter", "--activity-timeout", "0", "interfaces"]);
        assert!(matches!(cli.flow_config(), Err(FlowError::Config(_))));
    }

    #[test]
    fn live_accepts_several_interfaces() {
        let cli = Cli::parse_from(["flowmeter", "live", "out", "-i", "eth0", "-i", "wlan0", "--duration", "5"]);
        match cli.command {
            Command::Live { interfaces, duration, .. } => {
                assert_eq!(interfaces, vec!["eth0", "wlan0"]);
                assert_eq!(duration, Some(5));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
