//! Error taxonomy for the build pipeline (spec §7).

/// Raised by [`crate::normalize::Normalizer`] on a non-200/non-404 response, or a
/// 200 response missing an entry for one of the requested ids.
#[derive(thiserror::Error, Debug)]
pub enum NormalizationError {
    #[error("node normalization returned HTTP {status} for a batch of {batch_size} ids")]
    BadNodeResponse { status: u16, batch_size: usize },
    #[error("edge normalization returned HTTP {status} for a batch of {batch_size} predicates")]
    BadEdgeResponse { status: u16, batch_size: usize },
    #[error("node normalization returned 200 but was missing an entry for {0}")]
    MissingNodeEntry(String),
    #[error("transport error talking to identity service: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Raised by [`crate::graph::store::GraphStore`] on connection/value errors.
#[derive(thiserror::Error, Debug)]
pub enum GraphDbConnectionError {
    #[error("graph database connection error: {0}")]
    Connection(#[from] neo4rs::Error),
}

/// Raised by [`crate::annotate::Annotator`] when the external tool fails.
#[derive(thiserror::Error, Debug)]
pub enum AnnotationFailedError {
    #[error("annotator subprocess exited with status {status}, see log at {log_path}")]
    NonZeroExit { status: i32, log_path: String },
    #[error("failed to launch annotator subprocess: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("failed to provision annotator tool: {0}")]
    Provisioning(String),
}

/// Top-level error type tying the typed phase-aborting errors together with
/// persistence and I/O failures, for callers (the CLI binary) that just want
/// one chain to print.
#[derive(thiserror::Error, Debug)]
pub enum RagsError {
    #[error(transparent)]
    Normalization(#[from] NormalizationError),
    #[error(transparent)]
    GraphDb(#[from] GraphDbConnectionError),
    #[error(transparent)]
    Annotation(#[from] AnnotationFailedError),
    #[error("project store error: {0}")]
    Store(#[from] sqlx::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Other(String),
}

/// Integer error-type tag persisted alongside a study (spec §3, `Error`).
///
/// Kept as a tagged enum (design notes: reimplement dynamic-dispatch-by-
/// string-name as a tagged variant) rather than the source's bare integer
/// constants, but round-trips to/from the same `i64` values so the
/// relational schema stays a plain integer column.
#[derive(
    serde::Serialize,
    serde::Deserialize,
    strum_macros::Display,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
)]
pub enum ErrorType {
    Searching,
    Building,
    Normalization,
}

impl ErrorType {
    pub fn as_i64(self) -> i64 {
        match self {
            ErrorType::Searching => 40001,
            ErrorType::Building => 40002,
            ErrorType::Normalization => 40003,
        }
    }

    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            40001 => Some(ErrorType::Searching),
            40002 => Some(ErrorType::Building),
            40003 => Some(ErrorType::Normalization),
            _ => None,
        }
    }
}
