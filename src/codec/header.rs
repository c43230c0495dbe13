//! Text header section of a context log
//!
//! Layout (one item per `\n`-terminated line):
//! ```text
//! *version
//! 1
//! [options, reserved]
//! *logs
//! <signal id> <type code> <name>
//! ...
//! *end
//! ```
//!
//! The header is always text, whichever data encoding follows it. The byte
//! right after the `*end` line is where the data section starts.

use crate::codec::error::{CodecError, CodecResult};
use crate::codec::types::{Signal, ValueType};
use regex::Regex;
use std::sync::LazyLock;

pub const VERSION_MARKER: &str = "*version";
pub const LOGS_MARKER: &str = "*logs";
pub const END_MARKER: &str = "*end";

/// Header format version written by this crate
pub const HEADER_VERSION: i32 = 1;

/// `<id> <type code> <name>`
static SIGNAL_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s(\d+)\s(.*)$").expect("signal line pattern is valid"));

/// Parsed header section
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    /// Declared format version (`None` if the version line was unreadable)
    pub version: Option<i32>,
    /// Signals in declaration order
    pub signals: Vec<Signal>,
}

/// Opening lines of a header, up to and including `*logs`
pub fn preamble() -> String {
    format!("{}\n{}\n{}\n", VERSION_MARKER, HEADER_VERSION, LOGS_MARKER)
}

/// One schema line for a registered signal
pub fn signal_line(signal: &Signal) -> String {
    format!("{} {} {}\n", signal.id, signal.value_type.code(), signal.name)
}

/// Closing line of a header
pub fn end_line() -> String {
    format!("{}\n", END_MARKER)
}

/// Encode a complete header for the given signals
pub fn write_header(signals: &[Signal]) -> Vec<u8> {
    let mut out = preamble();
    for signal in signals {
        out.push_str(&signal_line(signal));
    }
    out.push_str(&end_line());
    out.into_bytes()
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode {
    Version,
    Options,
    Logs,
}

/// Parse the header at the start of `bytes`
///
/// Returns the header and the byte offset of the data section. Lines that
/// cannot be parsed are skipped; a header without an `*end` line is a
/// truncated log.
pub fn read_header(bytes: &[u8]) -> CodecResult<(Header, usize)> {
    let mut offset = 0usize;
    let mut mode = Mode::Version;
    let mut header = Header {
        version: None,
        signals: Vec::new(),
    };

    loop {
        let rest = &bytes[offset..];
        let Some(newline) = rest.iter().position(|&b| b == b'\n') else {
            // A final line without a newline still counts if it is the marker
            if trim_line(rest) == END_MARKER.as_bytes() {
                return Ok((header, bytes.len()));
            }
            return Err(CodecError::TruncatedLog(
                "header section does not have an *end marker".to_string(),
            ));
        };

        let raw = trim_line(&rest[..newline]);
        offset += newline + 1;
        let line = String::from_utf8_lossy(raw);

        if line.starts_with('*') {
            match line.as_ref() {
                VERSION_MARKER => {
                    mode = Mode::Version;
                    continue;
                }
                LOGS_MARKER => {
                    mode = Mode::Logs;
                    continue;
                }
                END_MARKER => break,
                _ => {}
            }
        }

        match mode {
            Mode::Version => {
                match line.trim().parse::<i32>() {
                    Ok(v) => header.version = Some(v),
                    Err(_) => tracing::warn!(line = %line, "Unreadable header version line"),
                }
                mode = Mode::Options;
            }
            // No options are defined in version 1
            Mode::Options => {}
            Mode::Logs => match parse_signal_line(&line) {
                Some(signal) => header.signals.push(signal),
                None => tracing::warn!(line = %line, "Skipping malformed header line"),
            },
        }
    }

    Ok((header, offset))
}

fn trim_line(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn parse_signal_line(line: &str) -> Option<Signal> {
    let caps = SIGNAL_LINE.captures(line)?;
    let id = caps.get(1)?.as_str().parse().ok()?;
    let code: u8 = caps.get(2)?.as_str().parse().ok()?;
    let value_type = ValueType::try_from(code).ok()?;
    let name = caps
        .get(3)
        .map(|m| m.as_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("(unknown)");
    Some(Signal::new(id, name, value_type))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_signals() -> Vec<Signal> {
        vec![
            Signal::new(0, "battery", ValueType::Int32),
            Signal::new(1, "light level", ValueType::Float32),
            Signal::new(2, "wifi_bssid", ValueType::Utf8),
        ]
    }

    #[test]
    fn test_write_header_layout() {
        let bytes = write_header(&sample_signals());
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(
            text,
            "*version\n1\n*logs\n0 1 battery\n1 3 light level\n2 5 wifi_bssid\n*end\n"
        );
    }

    #[test]
    fn test_read_header_roundtrip_and_offset() {
        let mut bytes = write_header(&sample_signals());
        let header_len = bytes.len();
        bytes.extend_from_slice(&[0x57, 0x4F, 0x4C, 0x53]);

        let (header, offset) = read_header(&bytes).unwrap();
        assert_eq!(header.version, Some(1));
        assert_eq!(header.signals, sample_signals());
        assert_eq!(offset, header_len);
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let text = "*version\n1\n*logs\n0 1 ok\nnot a line\n7 9 badtype\n1 2 second\n*end\n";
        let (header, _) = read_header(text.as_bytes()).unwrap();
        assert_eq!(header.signals.len(), 2);
        assert_eq!(header.signals[0].name, "ok");
        assert_eq!(header.signals[1].value_type, ValueType::Int64);
    }

    #[test]
    fn test_missing_end_marker_is_truncated() {
        let text = "*version\n1\n*logs\n0 1 battery\n";
        let err = read_header(text.as_bytes()).unwrap_err();
        assert!(matches!(err, CodecError::TruncatedLog(_)));
    }

    #[test]
    fn test_options_are_ignored() {
        let text = "*version\n1\nclock=wall\n*logs\n3 4 pressure\n*end\n";
        let (header, offset) = read_header(text.as_bytes()).unwrap();
        assert_eq!(header.signals, vec![Signal::new(3, "pressure", ValueType::Float64)]);
        assert_eq!(offset, text.len());
    }

    #[test]
    fn test_signal_line_pattern_shared_across_reads() {
        assert!(SIGNAL_LINE.is_match("12 3 cpu load"));
        assert!(!SIGNAL_LINE.is_match("x 3 cpu"));

        let bytes = write_header(&sample_signals());
        for _ in 0..3 {
            let (header, _) = read_header(&bytes).unwrap();
            assert_eq!(header.signals, sample_signals());
        }
    }

    #[test]
    fn test_crlf_lines() {
        let text = "*version\r\n1\r\n*logs\r\n0 5 name\r\n*end\r\n";
        let (header, offset) = read_header(text.as_bytes()).unwrap();
        assert_eq!(header.signals[0].name, "name");
        assert_eq!(offset, text.len());
    }
}
