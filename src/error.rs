use thiserror::Error;

#[derive(Debug, Error)]
pub enum FlowError {
    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("capture error: {0}")]
    Capture(#[from] pcap::Error),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("packet parse error: {0}")]
    Parse(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, FlowError>;
