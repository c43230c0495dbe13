//! Human-readable data section
//!
//! Mirrors the binary section line by line:
//! ```text
//! magic: 1464814675
//! version: 1
//! starttime: <start time>
//! Id: <signal id>
//! time: <time - start time>
//! value <value>
//! ...
//! ```
//!
//! Values are parsed back using the header's type table, like the binary
//! payloads.

use crate::codec::binary::{type_table, DataPreamble, DataSection, DATA_MAGIC, DATA_VERSION};
use crate::codec::error::{CodecError, CodecResult};
use crate::codec::types::{Sample, Signal, Value};

const MAGIC_PREFIX: &str = "magic:";
const VERSION_PREFIX: &str = "version:";
const START_PREFIX: &str = "starttime:";
const ID_PREFIX: &str = "Id:";
const TIME_PREFIX: &str = "time:";
const VALUE_PREFIX: &str = "value ";

/// Encode the text data preamble
pub fn write_preamble(start_time: i64) -> String {
    format!(
        "{} {}\n{} {}\n{} {}\n",
        MAGIC_PREFIX, DATA_MAGIC, VERSION_PREFIX, DATA_VERSION, START_PREFIX, start_time
    )
}

/// Encode one record as three text lines
pub fn write_sample(sample: &Sample, epoch: i64) -> String {
    format!(
        "{} {}\n{} {}\n{}{}\n",
        ID_PREFIX,
        sample.signal_id,
        TIME_PREFIX,
        sample.time.wrapping_sub(epoch),
        VALUE_PREFIX,
        sample.value
    )
}

/// True if `bytes` looks like a text data section
pub fn is_text_section(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC_PREFIX.as_bytes())
}

fn field<'a>(line: Option<&'a str>, prefix: &str) -> Option<&'a str> {
    line?.strip_prefix(prefix).map(str::trim)
}

/// Decode a whole text data section
pub fn read_samples(bytes: &[u8], signals: &[Signal]) -> CodecResult<DataSection> {
    let text = String::from_utf8_lossy(bytes);
    let mut lines = text.lines();

    let magic: u32 = field(lines.next(), MAGIC_PREFIX)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CodecError::Malformed("text data section lacks magic line".into()))?;
    if magic != DATA_MAGIC {
        return Err(CodecError::InvalidMagic(magic));
    }

    let version: u8 = field(lines.next(), VERSION_PREFIX)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CodecError::Malformed("text data section lacks version line".into()))?;
    if version > DATA_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let start_time: i64 = field(lines.next(), START_PREFIX)
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| CodecError::Malformed("text data section lacks start time line".into()))?;

    let types = type_table(signals);
    let mut samples = Vec::new();

    while let Some(id_line) = lines.next() {
        if id_line.is_empty() {
            continue;
        }
        let Some(signal_id) = field(Some(id_line), ID_PREFIX).and_then(|v| v.parse().ok()) else {
            tracing::warn!(line = %id_line, "Skipping unexpected line in text data section");
            continue;
        };
        let value_type = *types
            .get(&signal_id)
            .ok_or(CodecError::UnknownSignal(signal_id))?;

        let (Some(time_line), Some(value_line)) = (lines.next(), lines.next()) else {
            tracing::warn!(
                signal_id,
                decoded = samples.len(),
                "Text data section ends mid-record, dropping partial record"
            );
            break;
        };

        let delta: Option<i64> = field(Some(time_line), TIME_PREFIX).and_then(|v| v.parse().ok());
        let value = value_line
            .strip_prefix(VALUE_PREFIX)
            .and_then(|raw| Value::parse_as(raw, value_type));

        match (delta, value) {
            (Some(delta), Some(value)) => samples.push(Sample {
                time: start_time.wrapping_add(delta),
                signal_id,
                value,
            }),
            _ => tracing::warn!(
                signal_id,
                time_line = %time_line,
                value_line = %value_line,
                "Skipping unreadable text record"
            ),
        }
    }

    Ok(DataSection {
        preamble: DataPreamble {
            version,
            start_time,
        },
        samples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::types::ValueType;

    fn signals() -> Vec<Signal> {
        vec![
            Signal::new(0, "battery", ValueType::Int32),
            Signal::new(1, "light", ValueType::Float64),
            Signal::new(2, "ssid", ValueType::Utf8),
            Signal::new(3, "uptime", ValueType::Int64),
            Signal::new(4, "cpu_load", ValueType::Float32),
        ]
    }

    #[test]
    fn test_text_layout() {
        let mut text = write_preamble(100);
        text.push_str(&write_sample(&Sample::new(0, 150, 87i32), 100));
        assert_eq!(
            text,
            "magic: 1464814675\nversion: 1\nstarttime: 100\nId: 0\ntime: 50\nvalue 87\n"
        );
    }

    #[test]
    fn test_read_text_section() {
        let samples = vec![
            Sample::new(0, 1_010, 55i32),
            Sample::new(1, 1_020, 12.5f64),
            Sample::new(2, 1_030, "home network"),
            Sample::new(3, 1_040, 9_000_000_000i64),
            Sample::new(4, 1_050, 0.75f32),
            Sample::new(3, 990, -42i64),
            Sample::new(4, 1_060, -1.5e-3f32),
        ];
        let mut text = write_preamble(1_000);
        for sample in &samples {
            text.push_str(&write_sample(sample, 1_000));
        }

        assert!(is_text_section(text.as_bytes()));
        let section = read_samples(text.as_bytes(), &signals()).unwrap();
        assert_eq!(section.preamble.start_time, 1_000);
        assert_eq!(section.samples, samples);
    }

    #[test]
    fn test_extreme_times_wrap_without_panic() {
        let samples = vec![
            Sample::new(0, i64::MIN, 1i32),
            Sample::new(0, i64::MAX, 2i32),
        ];
        let mut text = write_preamble(1_000);
        for sample in &samples {
            text.push_str(&write_sample(sample, 1_000));
        }
        let section = read_samples(text.as_bytes(), &signals()).unwrap();
        assert_eq!(section.samples, samples);

        let text = format!(
            "magic: 1464814675\nversion: 1\nstarttime: 1000\nId: 0\ntime: {}\nvalue 7\n",
            i64::MAX
        );
        let section = read_samples(text.as_bytes(), &signals()).unwrap();
        assert_eq!(section.samples[0].time, 1_000i64.wrapping_add(i64::MAX));
    }

    #[test]
    fn test_unreadable_value_skipped() {
        let text = "magic: 1464814675\nversion: 1\nstarttime: 0\n\
                    Id: 0\ntime: 1\nvalue abc\n\
                    Id: 0\ntime: 2\nvalue 3\n";
        let section = read_samples(text.as_bytes(), &signals()).unwrap();
        assert_eq!(section.samples, vec![Sample::new(0, 2, 3i32)]);
    }

    #[test]
    fn test_partial_trailing_record() {
        let text = "magic: 1464814675\nversion: 1\nstarttime: 0\nId: 0\ntime: 1\nvalue 3\nId: 0\ntime: 2\n";
        let section = read_samples(text.as_bytes(), &signals()).unwrap();
        assert_eq!(section.samples.len(), 1);
    }

    #[test]
    fn test_wrong_magic() {
        let text = "magic: 1\nversion: 1\nstarttime: 0\n";
        assert!(matches!(
            read_samples(text.as_bytes(), &signals()),
            Err(CodecError::InvalidMagic(1))
        ));
    }
}
