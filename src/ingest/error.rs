//! Ingestion error types

use crate::codec::{CodecError, ValueType};
use thiserror::Error;

/// Errors raised by a sink
///
/// The pipeline never hands these to producers; it logs them and carries on.
#[derive(Error, Debug)]
pub enum SinkError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Write attempted before `open` or after `close`
    #[error("Sink is not open: {0}")]
    NotOpen(String),

    /// Sink cannot write to its destination
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors returned to callers of the pipeline
#[derive(Error, Debug)]
pub enum IngestError {
    /// The consumer task has stopped
    #[error("Pipeline is closed")]
    Closed,

    /// Name already registered with another value type
    #[error("Signal '{name}' already registered as {existing}, not {requested}")]
    TypeConflict {
        name: String,
        existing: ValueType,
        requested: ValueType,
    },

    #[error("Consumer task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub type SinkResult<T> = Result<T, SinkError>;
pub type IngestResult<T> = Result<T, IngestError>;
