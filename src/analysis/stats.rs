//! Occurrence statistics
//!
//! Summaries of the values signals had at problem occurrences:
//!
//! - int/long: most frequent values (top N, extended while tied with the
//!   Nth entry's percentage)
//! - float/double: the value range covering the middle 90% of samples
//! - string: every distinct value with its share
//!
//! Percentages are integer `100 * count / total`, truncated.

use crate::codec::types::cmp_f64;
use crate::codec::{Value, ValueType};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;

/// Statistics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Minimum number of discrete values reported
    pub discrete_top_n: usize,
    /// Share of continuous values the reported range covers (percent)
    pub continuous_coverage: u32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            discrete_top_n: 5,
            continuous_coverage: 90,
        }
    }
}

/// One distinct value and its share
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrequencyEntry<T> {
    pub value: T,
    pub count: usize,
    pub percent: u32,
}

/// Value range of the central share of a continuous signal
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageRange {
    pub coverage: u32,
    pub low: f64,
    pub high: f64,
}

/// Statistics for one signal
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "entries", rename_all = "lowercase")]
pub enum SignalStats {
    Discrete(Vec<FrequencyEntry<i64>>),
    Continuous(Option<CoverageRange>),
    Text(Vec<FrequencyEntry<String>>),
}

fn percent(count: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100 * count / total) as u32
}

/// Count distinct values, most frequent first (ties by value)
fn frequency_table<T: Eq + Hash + Ord + Clone>(values: &[T]) -> Vec<FrequencyEntry<T>> {
    let mut counts: HashMap<&T, usize> = HashMap::new();
    for value in values {
        *counts.entry(value).or_insert(0) += 1;
    }

    let mut entries: Vec<FrequencyEntry<T>> = counts
        .into_iter()
        .map(|(value, count)| FrequencyEntry {
            value: value.clone(),
            count,
            percent: percent(count, values.len()),
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
    entries
}

/// Most frequent integer values
///
/// At least `top_n` entries are reported; after that, entries continue only
/// while their percentage equals the previous one.
pub fn discrete_stats(values: &[i64], top_n: usize) -> Vec<FrequencyEntry<i64>> {
    let mut reported = Vec::new();
    let mut last_percent = None;

    for entry in frequency_table(values) {
        if reported.len() >= top_n && last_percent != Some(entry.percent) {
            break;
        }
        last_percent = Some(entry.percent);
        reported.push(entry);
    }
    reported
}

/// Range between the lower and upper nearest-rank positions
///
/// For 90% coverage the positions are `n * 0.05` and `n * 0.95`, truncated.
/// NaN values are ignored.
pub fn continuous_stats(values: &[f64], coverage: u32) -> Option<CoverageRange> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| cmp_f64(*a, *b));

    let coverage = coverage.min(100);
    let n = sorted.len() as f64;
    let lower = (n * (100 - coverage) as f64 / 200.0) as usize;
    let upper = (n * (100 + coverage) as f64 / 200.0) as usize;
    let last = sorted.len() - 1;

    Some(CoverageRange {
        coverage,
        low: sorted[lower.min(last)],
        high: sorted[upper.min(last)],
    })
}

/// Every distinct string with its share, most frequent first
pub fn text_stats(values: &[String]) -> Vec<FrequencyEntry<String>> {
    frequency_table(values)
}

/// Statistics for a signal of `value_type` over the given values
///
/// Missing values and values of another kind are skipped.
pub fn signal_stats<'a>(
    value_type: ValueType,
    values: impl IntoIterator<Item = &'a Value>,
    config: &StatsConfig,
) -> SignalStats {
    let values = values.into_iter();
    match value_type {
        ValueType::Int32 | ValueType::Int64 => {
            let numbers: Vec<i64> = values.filter_map(Value::as_i64).collect();
            SignalStats::Discrete(discrete_stats(&numbers, config.discrete_top_n))
        }
        ValueType::Float32 | ValueType::Float64 => {
            let numbers: Vec<f64> = values
                .filter(|v| v.value_type().is_continuous())
                .filter_map(Value::as_f64)
                .collect();
            SignalStats::Continuous(continuous_stats(&numbers, config.continuous_coverage))
        }
        ValueType::Utf8 => {
            let texts: Vec<String> = values
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect();
            SignalStats::Text(text_stats(&texts))
        }
    }
}

impl fmt::Display for SignalStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalStats::Discrete(entries) => {
                for e in entries {
                    writeln!(f, "\t{}% {}", e.percent, e.value)?;
                }
            }
            SignalStats::Continuous(Some(range)) => {
                writeln!(
                    f,
                    "\t{}% interval: ({}-{})",
                    range.coverage, range.low, range.high
                )?;
            }
            SignalStats::Continuous(None) => {}
            SignalStats::Text(entries) => {
                for e in entries {
                    writeln!(f, "\t{}% {}", e.percent, e.value)?;
                }
            }
        }
        Ok(())
    }
}
