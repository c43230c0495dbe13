//! Binary data section of a context log
//!
//! Layout (all numbers big-endian):
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ PREAMBLE (13 bytes)                     │
//! │   magic: u32 = 0x574F4C53               │
//! │   version: u8 = 1                       │
//! │   start_time: i64                       │
//! ├─────────────────────────────────────────┤
//! │ RECORDS (variable, until end of stream) │
//! │   signal_id: i32                        │
//! │   delta_time: i64 (time - start_time)   │
//! │   payload: by the signal's header type  │
//! │     int32 | int64 | f32 | f64 |         │
//! │     u16 length + modified UTF-8 bytes   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Records carry no type tag. The reader needs the header's type table to
//! know how wide each payload is.

use crate::codec::error::{CodecError, CodecResult};
use crate::codec::types::{Sample, Signal, SignalId, Value, ValueType};
use std::collections::HashMap;

/// Magic number opening the data section ("WOLS")
pub const DATA_MAGIC: u32 = 0x574F_4C53;

/// Current data section version
pub const DATA_VERSION: u8 = 1;

/// Preamble size in bytes
pub const PREAMBLE_SIZE: usize = 4 + 1 + 8;

/// Maximum encoded string payload (u16 length prefix)
const MAX_STRING_BYTES: usize = u16::MAX as usize;

/// Parsed data section preamble
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPreamble {
    pub version: u8,
    /// Session start, the epoch every record's delta is relative to
    pub start_time: i64,
}

/// Decoded data section
#[derive(Debug, Clone, PartialEq)]
pub struct DataSection {
    pub preamble: DataPreamble,
    /// Samples in file order, with absolute times
    pub samples: Vec<Sample>,
}

/// Encode the data section preamble
pub fn write_preamble(start_time: i64) -> [u8; PREAMBLE_SIZE] {
    let mut buf = [0u8; PREAMBLE_SIZE];
    buf[0..4].copy_from_slice(&DATA_MAGIC.to_be_bytes());
    buf[4] = DATA_VERSION;
    buf[5..13].copy_from_slice(&start_time.to_be_bytes());
    buf
}

/// Parse the preamble at the start of `bytes`
pub fn read_preamble(bytes: &[u8]) -> CodecResult<DataPreamble> {
    let mut cursor = ByteCursor::new(bytes);
    let magic = cursor
        .read_u32()
        .ok_or_else(|| CodecError::Malformed("data section shorter than preamble".into()))?;
    if magic != DATA_MAGIC {
        return Err(CodecError::InvalidMagic(magic));
    }

    let version = cursor
        .read_u8()
        .ok_or_else(|| CodecError::Malformed("data section shorter than preamble".into()))?;
    if version > DATA_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let start_time = cursor
        .read_i64()
        .ok_or_else(|| CodecError::Malformed("data section shorter than preamble".into()))?;

    Ok(DataPreamble {
        version,
        start_time,
    })
}

/// Append one record to `buf`
///
/// `epoch` is the session start time; the record stores `sample.time - epoch`
/// with two's-complement wraparound, so any pair of times encodes and
/// decodes back to the same sample time.
pub fn encode_sample(buf: &mut Vec<u8>, sample: &Sample, epoch: i64) {
    buf.extend_from_slice(&sample.signal_id.to_be_bytes());
    buf.extend_from_slice(&sample.time.wrapping_sub(epoch).to_be_bytes());
    match &sample.value {
        Value::Int32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Int64(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Float32(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Float64(v) => buf.extend_from_slice(&v.to_be_bytes()),
        Value::Utf8(s) => {
            let encoded = encode_modified_utf8(s);
            buf.extend_from_slice(&(encoded.len() as u16).to_be_bytes());
            buf.extend_from_slice(&encoded);
        }
    }
}

/// Encode one record as a standalone byte vector
pub fn write_sample(sample: &Sample, epoch: i64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32);
    encode_sample(&mut buf, sample, epoch);
    buf
}

/// Build the id -> type lookup the record decoder needs
pub fn type_table(signals: &[Signal]) -> HashMap<SignalId, ValueType> {
    signals.iter().map(|s| (s.id, s.value_type)).collect()
}

/// Decode a whole data section (preamble included)
///
/// Decoding stops at the end of the stream. A record cut short by the end
/// of the stream is dropped with a warning; a record for a signal missing
/// from the header is an error, since its payload width is unknown.
pub fn read_samples(bytes: &[u8], signals: &[Signal]) -> CodecResult<DataSection> {
    let preamble = read_preamble(bytes)?;
    let types = type_table(signals);
    let mut cursor = ByteCursor::new(&bytes[PREAMBLE_SIZE..]);
    let mut samples = Vec::new();

    while !cursor.is_empty() {
        let record_start = cursor.position();
        match read_record(&mut cursor, &types, preamble.start_time)? {
            Some(sample) => samples.push(sample),
            None => {
                tracing::warn!(
                    offset = PREAMBLE_SIZE + record_start,
                    decoded = samples.len(),
                    "Data section ends mid-record, dropping partial record"
                );
                break;
            }
        }
    }

    Ok(DataSection { preamble, samples })
}

/// Decode one record; `Ok(None)` means the stream ended inside it
fn read_record(
    cursor: &mut ByteCursor<'_>,
    types: &HashMap<SignalId, ValueType>,
    start_time: i64,
) -> CodecResult<Option<Sample>> {
    let Some(signal_id) = cursor.read_i32() else {
        return Ok(None);
    };
    let value_type = *types
        .get(&signal_id)
        .ok_or(CodecError::UnknownSignal(signal_id))?;
    let Some(delta) = cursor.read_i64() else {
        return Ok(None);
    };

    let value = match value_type {
        ValueType::Int32 => cursor.read_i32().map(Value::Int32),
        ValueType::Int64 => cursor.read_i64().map(Value::Int64),
        ValueType::Float32 => cursor.read_f32().map(Value::Float32),
        ValueType::Float64 => cursor.read_f64().map(Value::Float64),
        ValueType::Utf8 => match cursor.read_u16() {
            Some(len) => match cursor.take(len as usize) {
                Some(raw) => Some(Value::Utf8(decode_modified_utf8(raw)?)),
                None => None,
            },
            None => None,
        },
    };

    Ok(value.map(|value| Sample {
        time: start_time.wrapping_add(delta),
        signal_id,
        value,
    }))
}

/// Encode a string the way `DataOutputStream.writeUTF` does
///
/// NUL becomes `C0 80` and characters outside the BMP are written as two
/// three-byte surrogates. Output is cut at a character boundary so it fits
/// the u16 length prefix.
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for ch in s.chars() {
        let mut units = [0u16; 2];
        let mut encoded = Vec::with_capacity(6);
        for &unit in ch.encode_utf16(&mut units).iter() {
            push_unit(&mut encoded, unit);
        }
        if out.len() + encoded.len() > MAX_STRING_BYTES {
            tracing::warn!(
                chars = s.chars().count(),
                "String payload exceeds 65535 bytes, truncating"
            );
            break;
        }
        out.extend_from_slice(&encoded);
    }
    out
}

fn push_unit(out: &mut Vec<u8>, unit: u16) {
    match unit {
        0x0001..=0x007F => out.push(unit as u8),
        0x0000 | 0x0080..=0x07FF => {
            out.push(0xC0 | ((unit >> 6) & 0x1F) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
        _ => {
            out.push(0xE0 | ((unit >> 12) & 0x0F) as u8);
            out.push(0x80 | ((unit >> 6) & 0x3F) as u8);
            out.push(0x80 | (unit & 0x3F) as u8);
        }
    }
}

/// Decode modified UTF-8 (standard four-byte sequences are accepted too)
pub fn decode_modified_utf8(raw: &[u8]) -> CodecResult<String> {
    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut i = 0;
    let bad = |at: usize| CodecError::InvalidString(format!("bad byte sequence at {}", at));
    let cont = |at: usize| -> CodecResult<u32> {
        match raw.get(at) {
            Some(&b) if b & 0xC0 == 0x80 => Ok((b & 0x3F) as u32),
            _ => Err(bad(at)),
        }
    };

    while i < raw.len() {
        let b = raw[i];
        if b < 0x80 {
            units.push(b as u16);
            i += 1;
        } else if b >> 5 == 0b110 {
            let cp = (((b & 0x1F) as u32) << 6) | cont(i + 1)?;
            units.push(cp as u16);
            i += 2;
        } else if b >> 4 == 0b1110 {
            let cp = (((b & 0x0F) as u32) << 12) | (cont(i + 1)? << 6) | cont(i + 2)?;
            units.push(cp as u16);
            i += 3;
        } else if b >> 3 == 0b11110 {
            let cp = (((b & 0x07) as u32) << 18)
                | (cont(i + 1)? << 12)
                | (cont(i + 2)? << 6)
                | cont(i + 3)?;
            let ch = char::from_u32(cp).ok_or_else(|| bad(i))?;
            let mut pair = [0u16; 2];
            units.extend_from_slice(ch.encode_utf16(&mut pair));
            i += 4;
        } else {
            return Err(bad(i));
        }
    }

    String::from_utf16(&units).map_err(|e| CodecError::InvalidString(e.to_string()))
}

/// Forward-only reader over a byte slice
pub(crate) struct ByteCursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    pub(crate) fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.buf.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    fn take_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.take(N).and_then(|s| s.try_into().ok())
    }

    pub(crate) fn read_u8(&mut self) -> Option<u8> {
        self.take_array::<1>().map(|b| b[0])
    }

    pub(crate) fn read_u16(&mut self) -> Option<u16> {
        self.take_array().map(u16::from_be_bytes)
    }

    pub(crate) fn read_u32(&mut self) -> Option<u32> {
        self.take_array().map(u32::from_be_bytes)
    }

    pub(crate) fn read_i32(&mut self) -> Option<i32> {
        self.take_array().map(i32::from_be_bytes)
    }

    pub(crate) fn read_i64(&mut self) -> Option<i64> {
        self.take_array().map(i64::from_be_bytes)
    }

    pub(crate) fn read_f32(&mut self) -> Option<f32> {
        self.take_array().map(f32::from_be_bytes)
    }

    pub(crate) fn read_f64(&mut self) -> Option<f64> {
        self.take_array().map(f64::from_be_bytes)
    }
}
