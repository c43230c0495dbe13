//! Event traces
//!
//! Program events (function call instants) are the occurrences a problem is
//! evaluated at. They live on their own timeline, relative to the trace's
//! start; a `ClockOffset` moves them onto the log's session time.

use crate::analysis::error::AnalysisResult;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

/// Correction from the event timeline onto the telemetry timeline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClockOffset(pub i64);

impl ClockOffset {
    /// Offset between two session starts: `event_start - log_start`
    pub fn between(event_start: i64, log_start: i64) -> Self {
        ClockOffset(event_start.saturating_sub(log_start))
    }

    /// Event time on the telemetry timeline
    pub fn apply(self, event_time: i64) -> i64 {
        event_time.saturating_add(self.0)
    }

    pub fn value(self) -> i64 {
        self.0
    }
}

/// Provider of event timestamps
pub trait EventSource {
    /// Start of the event timeline (same clock as the log's start time)
    fn start_time(&self) -> i64;

    /// Timestamps of the events selected by `matcher`, ascending
    fn timestamps_for(&self, matcher: &str) -> Vec<i64>;
}

/// In-memory record of function calls
#[derive(Debug, Clone, Default)]
pub struct EventTrace {
    start_time: i64,
    /// Function names in first-seen order
    names: Vec<String>,
    calls: HashMap<String, Vec<i64>>,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    name: String,
    time: i64,
}

impl EventTrace {
    pub fn new(start_time: i64) -> Self {
        Self {
            start_time,
            ..Default::default()
        }
    }

    /// Record one call of `name` at `time` (relative to the trace start)
    pub fn record(&mut self, name: impl Into<String>, time: i64) {
        let name = name.into();
        match self.calls.get_mut(&name) {
            Some(times) => times.push(time),
            None => {
                self.names.push(name.clone());
                self.calls.insert(name, vec![time]);
            }
        }
    }

    /// Builder form of `record`
    pub fn with_call(mut self, name: impl Into<String>, time: i64) -> Self {
        self.record(name, time);
        self
    }

    /// Load `name,time` rows (with a header row) from a CSV file
    pub fn from_csv(path: impl AsRef<Path>, start_time: i64) -> AnalysisResult<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)?;
        let trace = Self::from_reader(file, start_time)?;
        tracing::info!(
            path = %path.display(),
            functions = trace.names.len(),
            calls = trace.len(),
            "Loaded event trace"
        );
        Ok(trace)
    }

    /// Load `name,time` rows (with a header row) from any reader
    ///
    /// Rows that do not parse are skipped with a warning.
    pub fn from_reader<R: Read>(reader: R, start_time: i64) -> AnalysisResult<Self> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut trace = Self::new(start_time);
        let mut rows_failed = 0usize;

        for (line_num, result) in csv_reader.deserialize::<EventRow>().enumerate() {
            match result {
                Ok(row) => trace.record(row.name, row.time),
                Err(e) => {
                    rows_failed += 1;
                    tracing::warn!(line = line_num + 2, error = %e, "Skipping unreadable event row");
                }
            }
        }

        if rows_failed > 0 {
            tracing::warn!(rows_failed, "Event trace had unreadable rows");
        }
        Ok(trace)
    }

    /// Function names in first-seen order
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Total number of recorded calls
    pub fn len(&self) -> usize {
        self.calls.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Function selected by `matcher`
    ///
    /// An exact name wins; otherwise the first name containing the matcher,
    /// ignoring case.
    pub fn resolve(&self, matcher: &str) -> Option<&str> {
        if let Some((name, _)) = self.calls.get_key_value(matcher) {
            return Some(name.as_str());
        }
        let needle = matcher.to_lowercase();
        self.names
            .iter()
            .find(|name| name.to_lowercase().contains(&needle))
            .map(String::as_str)
    }
}

impl EventSource for EventTrace {
    fn start_time(&self) -> i64 {
        self.start_time
    }

    fn timestamps_for(&self, matcher: &str) -> Vec<i64> {
        let Some(name) = self.resolve(matcher) else {
            tracing::debug!(matcher, "No function matches");
            return Vec::new();
        };
        let mut times = self.calls.get(name).cloned().unwrap_or_default();
        times.sort_unstable();
        times
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_offset() {
        let offset = ClockOffset::between(1_500, 1_000);
        assert_eq!(offset.value(), 500);
        assert_eq!(offset.apply(20), 520);
        assert_eq!(ClockOffset::between(1_000, 1_500).apply(600), 100);
    }

    #[test]
    fn test_exact_match_wins() {
        let trace = EventTrace::new(0)
            .with_call("Activity.onCreateOptions", 5)
            .with_call("onCreate", 10)
            .with_call("onCreate", 2);
        assert_eq!(trace.resolve("onCreate"), Some("onCreate"));
        assert_eq!(trace.timestamps_for("onCreate"), vec![2, 10]);
    }

    #[test]
    fn test_substring_match_is_case_insensitive() {
        let trace = EventTrace::new(0)
            .with_call("net.Http.fetch", 1)
            .with_call("net.Http.fetchAll", 2);
        assert_eq!(trace.resolve("FETCH"), Some("net.Http.fetch"));
        assert_eq!(trace.timestamps_for("FETCH"), vec![1]);
        assert!(trace.timestamps_for("upload").is_empty());
    }

    #[test]
    fn test_from_reader() {
        let csv = "name,time\nrender,10\nrender,30\nsync, 20\nbroken,abc\n";
        let trace = EventTrace::from_reader(csv.as_bytes(), 100).unwrap();
        assert_eq!(trace.start_time(), 100);
        assert_eq!(trace.names(), &["render".to_string(), "sync".to_string()]);
        assert_eq!(trace.len(), 3);
        assert_eq!(trace.timestamps_for("sync"), vec![20]);
    }

    #[test]
    fn test_from_csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.csv");
        std::fs::write(&path, "name,time\ndraw,7\n").unwrap();
        let trace = EventTrace::from_csv(&path, 0).unwrap();
        assert_eq!(trace.timestamps_for("draw"), vec![7]);
    }
}
