//! Log reader
//!
//! One entry point for both log encodings. The header is parsed first; the
//! bytes after its `*end` line decide whether the binary or the text data
//! decoder runs.

use crate::codec::binary::{self, DataSection, DATA_MAGIC};
use crate::codec::error::{CodecError, CodecResult};
use crate::codec::header::{end_line, read_header};
use crate::codec::text;
use crate::codec::types::{Sample, Signal};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// File suffix of a complete (or header-only) log
pub const LOG_SUFFIX: &str = ".clog";
/// File suffix of a data section that was never merged into its log
pub const DATA_SUFFIX: &str = ".cdata";
/// Suffix marking the text encoding
pub const TEXT_LOG_SUFFIX: &str = ".text.clog";

/// Data section encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Binary,
    Text,
}

impl LogFormat {
    /// Pick the decoder for a data section
    ///
    /// A `.text.clog` file name wins; otherwise the first bytes of the data
    /// section are sniffed.
    pub fn detect(file_name: Option<&str>, data: &[u8]) -> CodecResult<Self> {
        if file_name.is_some_and(|name| name.ends_with(TEXT_LOG_SUFFIX)) {
            return Ok(LogFormat::Text);
        }
        if data.starts_with(&DATA_MAGIC.to_be_bytes()) {
            return Ok(LogFormat::Binary);
        }
        if text::is_text_section(data) {
            return Ok(LogFormat::Text);
        }
        if data.len() >= 4 {
            let magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
            return Err(CodecError::InvalidMagic(magic));
        }
        Err(CodecError::Malformed("log has no data section".into()))
    }
}

/// A fully decoded log session
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedLog {
    /// Version declared in the header
    pub version: Option<i32>,
    pub format: LogFormat,
    /// Session start (epoch of the record deltas)
    pub start_time: i64,
    /// Signals in header order
    pub signals: Vec<Signal>,
    /// Samples in file order, absolute times
    pub samples: Vec<Sample>,
}

/// Decode a complete log held in memory
pub fn decode_log(bytes: &[u8], file_name: Option<&str>) -> CodecResult<DecodedLog> {
    let (header, offset) = read_header(bytes)?;
    let data = &bytes[offset..];
    let format = LogFormat::detect(file_name, data)?;

    let DataSection { preamble, samples } = match format {
        LogFormat::Binary => binary::read_samples(data, &header.signals)?,
        LogFormat::Text => text::read_samples(data, &header.signals)?,
    };

    tracing::debug!(
        format = ?format,
        signals = header.signals.len(),
        samples = samples.len(),
        start_time = preamble.start_time,
        "Decoded log"
    );

    Ok(DecodedLog {
        version: header.version,
        format,
        start_time: preamble.start_time,
        signals: header.signals,
        samples,
    })
}

/// Path of the data file that belongs to a `.clog` path
pub fn data_file_for(log_path: &Path) -> Option<PathBuf> {
    let name = log_path.file_name()?.to_str()?;
    let stem = name.strip_suffix(LOG_SUFFIX)?;
    Some(log_path.with_file_name(format!("{}{}", stem, DATA_SUFFIX)))
}

/// Read and decode a log from disk
///
/// A sibling `.cdata` file means the session was never closed: the `.clog`
/// file then holds only the header (possibly without its `*end` line) and
/// the data lives next to it. A `.clog` that already carries data after
/// `*end` is complete and any leftover `.cdata` is ignored.
pub fn read_log(path: impl AsRef<Path>) -> CodecResult<DecodedLog> {
    let path = path.as_ref();
    let file_name = path.file_name().and_then(|n| n.to_str());
    let mut bytes = std::fs::read(path)?;

    if let Some(data_path) = data_file_for(path).filter(|p| p.exists()) {
        match header_state(&bytes) {
            HeaderState::Complete => {
                tracing::warn!(
                    log = %path.display(),
                    data = %data_path.display(),
                    "Log already holds its data, ignoring leftover data file"
                );
            }
            state => {
                tracing::info!(
                    header = %path.display(),
                    data = %data_path.display(),
                    "Reading split log"
                );
                if state == HeaderState::Open {
                    bytes.extend_from_slice(end_line().as_bytes());
                }
                bytes.extend_from_slice(&std::fs::read(&data_path)?);
            }
        }
    }

    decode_log(&bytes, file_name)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeaderState {
    /// No `*end` line yet
    Open,
    /// `*end` present, nothing after it
    HeaderOnly,
    /// `*end` followed by a data section
    Complete,
}

fn header_state(bytes: &[u8]) -> HeaderState {
    match read_header(bytes) {
        Ok((_, offset)) if bytes[offset..].iter().any(|b| !b.is_ascii_whitespace()) => {
            HeaderState::Complete
        }
        Ok(_) => HeaderState::HeaderOnly,
        Err(_) => HeaderState::Open,
    }
}
