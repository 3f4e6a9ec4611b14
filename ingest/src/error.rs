//! Error taxonomy for listing, normalization and content fetches.

use thiserror::Error;
use timeline::item::ValidationError;

/// Result type alias for ingestion operations
pub type Result<T> = std::result::Result<T, IngestError>;

/// Errors surfaced by connectors and the ingestion pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Unsupported invocation mode. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Network, authentication or malformed-response failure.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("normalization error: {0}")]
    Normalization(#[from] NormalizationError),

    #[error("operation cancelled")]
    Cancelled,

    /// The consumer dropped the receiving end of the output channel.
    #[error("output channel closed by consumer")]
    ChannelClosed,

    /// A listing task panicked or could not be joined.
    #[error("internal error: {0}")]
    Internal(String),

    /// Every failed listing task of one pipeline run.
    #[error("one or more errors: {}", join_failures(.0))]
    Aggregate(Vec<TaskFailure>),
}

impl IngestError {
    /// True for cancellation, including an aggregate made only of cancellations.
    pub fn is_cancelled(&self) -> bool {
        match self {
            IngestError::Cancelled => true,
            IngestError::Aggregate(failures) => {
                !failures.is_empty() && failures.iter().all(|f| f.error.is_cancelled())
            }
            _ => false,
        }
    }
}

impl From<timeline::rate_limit::Cancelled> for IngestError {
    fn from(_: timeline::rate_limit::Cancelled) -> Self {
        IngestError::Cancelled
    }
}

/// A listing task's terminal error, labelled with the task that produced it.
#[derive(Error, Debug)]
#[error("{task}: {error}")]
pub struct TaskFailure {
    pub task: String,
    pub error: IngestError,
}

fn join_failures(failures: &[TaskFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A single provider record could not be mapped to a valid item.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizationError {
    #[error("record has no id")]
    MissingId,

    /// The raw record does not match the expected field types.
    #[error("record {id} is malformed: {reason}")]
    Malformed { id: String, reason: String },

    #[error("record {id} has no start or creation time")]
    MissingTimestamp { id: String },

    #[error("parsing {field} as timestamp: {value:?}")]
    InvalidTimestamp { field: &'static str, value: String },

    #[error("unknown time zone {value:?} in {field}")]
    UnknownTimeZone { field: &'static str, value: String },

    #[error("parsing {field} as number: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("parsing {field} as duration: {value:?}")]
    InvalidDuration { field: &'static str, value: String },

    #[error("invalid item: {0}")]
    Invalid(#[from] ValidationError),
}

/// Downloading out-of-band content failed after every attempt.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("getting content after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },

    #[error("HTTP {status} after {attempts} attempts: >>> {body} <<<")]
    Status {
        attempts: u32,
        status: u16,
        body: String,
    },

    /// The response was accepted but its body could not be read.
    #[error("reading content: {0}")]
    Read(String),

    #[error("content fetch cancelled")]
    Cancelled,
}
