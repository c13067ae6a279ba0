//! Crate-wide error taxonomy, split by concern the way the teacher splits
//! `ExtractionError`/`AnalysisError`/`ValidationError` rather than using one
//! flat error type.

use thiserror::Error;

/// Errors talking to the host's HTTP surface.
#[derive(Error, Debug)]
pub enum HostError {
    #[error("host request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("host returned non-success status {status} for {url}")]
    Status { status: u16, url: String },

    #[error("failed to decode host response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("unsupported in local transport mode: {0}")]
    Unsupported(&'static str),
}

/// Errors from the broker transport's setup or publish path.
#[derive(Error, Debug)]
pub enum BrokerError {
    #[error("broker connection failed: {0}")]
    Connect(#[from] lapin::Error),

    #[error("failed to decode message body: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Errors from input staging (temp file/dir creation, download, extraction).
#[derive(Error, Debug)]
pub enum StageError {
    #[error("host error while staging input: {0}")]
    Host(#[from] HostError),

    #[error("I/O error while staging input: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip extraction failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("failed to encode staged metadata: {0}")]
    Json(#[from] serde_json::Error),
}

/// Classification of a failure raised inside the worker while running
/// `check_message`/`process_message`, replacing the source's exception
/// hierarchy dispatch (spec.md §7 / DESIGN NOTES).
#[derive(Debug)]
pub enum FailureKind {
    /// Process exit, keyboard interrupt, or cancellation — always resubmitted,
    /// then the process is expected to terminate.
    FatalInterrupt(String),
    /// A broad/expected transient failure — subject to the retry policy.
    Transient(String),
    /// A subprocess exited with a non-zero code; output is captured.
    SubprocessFailure { code: i32, output: String },
    /// Anything else.
    Other(String),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::FatalInterrupt(msg) => write!(f, "fatal interrupt: {msg}"),
            FailureKind::Transient(msg) => write!(f, "transient error: {msg}"),
            FailureKind::SubprocessFailure { code, output } => {
                write!(f, "subprocess failed [exit code={code}]\n{output}")
            }
            FailureKind::Other(msg) => write!(f, "error processing: {msg}"),
        }
    }
}

/// Top-level error type surfaced to embedders that drive the connector
/// directly (e.g. the single-shot local transport's caller).
#[derive(Error, Debug)]
pub enum ConnectorError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Failure(FailureKind),
}
