use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{FlowError, Result};

pub const FLOW_TIMEOUT_US: u64 = 120_000_000; // 120 seconds
pub const ACTIVITY_TIMEOUT_US: u64 = 5_000_000; // 5 seconds
pub const EXPORT_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_LABEL: &str = "NeedManualLabel";

/// Runtime settings for flow generation and export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Hard limit on a flow record's lifetime, measured from its first packet.
    pub flow_timeout_us: u64,
    /// Gap that ends an active period and starts an idle one.
    pub activity_timeout_us: u64,
    /// Live mode: how often open flows are written out and cleared.
    pub export_interval_secs: u64,
    /// BPF filter applied to live captures.
    pub capture_filter: String,
    /// Value of the trailing `Label` column.
    pub label: String,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            flow_timeout_us: FLOW_TIMEOUT_US,
            activity_timeout_us: ACTIVITY_TIMEOUT_US,
            export_interval_secs: EXPORT_INTERVAL_SECS,
            capture_filter: "ip or ip6".to_string(),
            label: DEFAULT_LABEL.to_string(),
        }
    }
}

impl FlowConfig {
    /// Reads a JSON config file. Missing keys fall back to the defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: FlowConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.flow_timeout_us == 0 {
            return Err(FlowError::Config("flow_timeout_us must be greater than zero".into()));
        }
        if self.activity_timeout_us == 0 {
            return Err(FlowError::Config("activity_timeout_us must be greater than zero".into()));
        }
        if self.export_interval_secs == 0 {
            return Err(FlowError::Config("export_interval_secs must be greater than zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_cic_timeouts() {
        let config = FlowConfig::default();
        assert_eq!(config.flow_timeout_us, 120_000_000);
        assert_eq!(config.activity_timeout_us, 5_000_000);
        assert_eq!(config.label, "NeedManualLabel");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "flow_timeout_us": 60000000, "label": "BENIGN" }}"#).unwrap();

        let config = FlowConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.flow_timeout_us, 60_000_000);
        assert_eq!(config.activity_timeout_us, ACTIVITY_TIMEOUT_US);
        assert_eq!(config.label, "BENIGN");
    }

    #[test]
    fn zero_timeout_is_rejected() {
        let config = FlowConfig { activity_timeout_us: 0, ..FlowConfig::default() };
        assert!(matches!(config.validate(), Err(FlowError::Config(_))));
    }
}
