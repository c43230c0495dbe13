//! Codec error types
//!
//! Defines all errors that can occur while encoding or decoding a log.

use crate::codec::types::SignalId;
use thiserror::Error;

/// Errors that can occur in the codec layer
#[derive(Error, Debug)]
pub enum CodecError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Header section ended without an `*end` marker
    #[error("Truncated log: {0}")]
    TruncatedLog(String),

    /// Data section does not start with the expected magic number
    #[error("Invalid data magic: {0:#010x}")]
    InvalidMagic(u32),

    /// Data section version newer than this reader understands
    #[error("Unsupported log version: {0}")]
    UnsupportedVersion(u8),

    /// A record references a signal missing from the header
    #[error("Unknown signal id in data section: {0}")]
    UnknownSignal(SignalId),

    /// String payload is not valid (modified) UTF-8
    #[error("Invalid string payload: {0}")]
    InvalidString(String),

    /// Anything else that does not follow the log layout
    #[error("Malformed log: {0}")]
    Malformed(String),
}

/// Result type alias for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodecError::TruncatedLog("no *end marker".to_string());
        assert_eq!(err.to_string(), "Truncated log: no *end marker");

        let err = CodecError::InvalidMagic(0x1234);
        assert_eq!(err.to_string(), "Invalid data magic: 0x00001234");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let codec_err: CodecError = io_err.into();
        assert!(matches!(codec_err, CodecError::Io(_)));
    }
}
