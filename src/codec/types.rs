//! Core data types for the context log
//!
//! This module defines the fundamental types shared by the codec, the
//! ingestion pipeline and the analysis side:
//! - `Signal`: a named, typed telemetry source
//! - `Value`: one observation, tagged with its kind
//! - `Sample`: a timestamped observation of a signal
//! - `ValueType`: the fixed type table (codes 1..5 on disk)

use crate::codec::error::CodecError;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Identifier of a registered signal (sequential, unique per session)
pub type SignalId = i32;

/// Kind of value a signal produces
///
/// The discriminants are the type codes written into the log header.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ValueType {
    Int32 = 1,
    Int64 = 2,
    Float32 = 3,
    Float64 = 4,
    Utf8 = 5,
}

impl ValueType {
    /// Type code used in the header's signal lines
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Integer-valued signals (intervals end on the violating sample)
    pub fn is_discrete(self) -> bool {
        matches!(self, ValueType::Int32 | ValueType::Int64)
    }

    /// Float-valued signals (interval boundaries are interpolated)
    pub fn is_continuous(self) -> bool {
        matches!(self, ValueType::Float32 | ValueType::Float64)
    }

    pub fn is_text(self) -> bool {
        matches!(self, ValueType::Utf8)
    }

    pub fn all() -> &'static [ValueType] {
        &[
            ValueType::Int32,
            ValueType::Int64,
            ValueType::Float32,
            ValueType::Float64,
            ValueType::Utf8,
        ]
    }
}

impl TryFrom<u8> for ValueType {
    type Error = CodecError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(ValueType::Int32),
            2 => Ok(ValueType::Int64),
            3 => Ok(ValueType::Float32),
            4 => Ok(ValueType::Float64),
            5 => Ok(ValueType::Utf8),
            _ => Err(CodecError::Malformed(format!("Unknown type code: {}", value))),
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::Int32 => write!(f, "int"),
            ValueType::Int64 => write!(f, "long"),
            ValueType::Float32 => write!(f, "float"),
            ValueType::Float64 => write!(f, "double"),
            ValueType::Utf8 => write!(f, "string"),
        }
    }
}

/// A single observed value
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Utf8(String),
}

impl Value {
    /// The kind of this value
    pub fn value_type(&self) -> ValueType {
        match self {
            Value::Int32(_) => ValueType::Int32,
            Value::Int64(_) => ValueType::Int64,
            Value::Float32(_) => ValueType::Float32,
            Value::Float64(_) => ValueType::Float64,
            Value::Utf8(_) => ValueType::Utf8,
        }
    }

    /// Text value, falling back to the literal `"null"` for a missing string
    pub fn text_or_null(value: Option<String>) -> Self {
        Value::Utf8(value.unwrap_or_else(|| "null".to_string()))
    }

    /// Widen an integer value to i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(*v as i64),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    /// Widen a numeric value to f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int32(v) => Some(*v as f64),
            Value::Int64(v) => Some(*v as f64),
            Value::Float32(v) => Some(*v as f64),
            Value::Float64(v) => Some(*v),
            Value::Utf8(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Utf8(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a textual value according to an expected type
    pub fn parse_as(text: &str, value_type: ValueType) -> Option<Self> {
        match value_type {
            ValueType::Int32 => text.trim().parse().ok().map(Value::Int32),
            ValueType::Int64 => text.trim().parse().ok().map(Value::Int64),
            ValueType::Float32 => text.trim().parse().ok().map(Value::Float32),
            ValueType::Float64 => text.trim().parse().ok().map(Value::Float64),
            ValueType::Utf8 => Some(Value::Utf8(text.to_string())),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int32(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Utf8(v) => write!(f, "{}", v),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float64(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

/// Definition of a signal (what is being logged)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Signal {
    /// Sequential identifier assigned at registration
    pub id: SignalId,
    /// Human-readable name (e.g. "battery_level", "wifi_bssid")
    pub name: String,
    /// Kind of values this signal produces
    pub value_type: ValueType,
}

impl Signal {
    pub fn new(id: SignalId, name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            id,
            name: name.into(),
            value_type,
        }
    }
}

/// One timestamped observation of a signal
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sample {
    /// Device clock time (microseconds)
    pub time: i64,
    /// Signal this sample belongs to
    pub signal_id: SignalId,
    /// The observed value
    pub value: Value,
}

impl Sample {
    pub fn new(signal_id: SignalId, time: i64, value: impl Into<Value>) -> Self {
        Self {
            time,
            signal_id,
            value: value.into(),
        }
    }
}

/// Total order on f64 used by sorting code (NaN sorts last)
pub(crate) fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or_else(|| a.is_nan().cmp(&b.is_nan()))
}
