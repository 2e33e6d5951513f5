use thiserror::Error;

/// Failures reported by whatever produces frames upstream of the tracker.
/// These are the only errors that end the frame loop.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("detection source disconnected: {0}")]
    Disconnected(String),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("detection source I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("annotator failed: {0}")]
    Annotator(String),
    #[error("frame report channel closed")]
    ReportChannelClosed,
}
