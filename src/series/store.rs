//! Per-signal timelines decoded from a log
//!
//! Keys are session time: microseconds since the log's start time. Event
//! timestamps are brought onto the same axis with a `ClockOffset`.

use crate::codec::{read_log, CodecResult, DecodedLog, Signal, SignalId, Value};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;
use std::path::Path;

/// Value range and time span of one series
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SeriesSummary {
    pub min_time: i64,
    pub max_time: i64,
    pub min_value: f64,
    pub max_value: f64,
    /// `max_value - min_value`
    pub max_diff: f64,
}

/// Ordered samples of a single signal
///
/// At most one value per timestamp; a later insert at the same time
/// replaces the earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSeries {
    signal: Signal,
    points: BTreeMap<i64, Value>,
}

impl TimeSeries {
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            points: BTreeMap::new(),
        }
    }

    /// Build a series from `(time, value)` pairs
    pub fn from_points<V: Into<Value>>(
        signal: Signal,
        points: impl IntoIterator<Item = (i64, V)>,
    ) -> Self {
        let mut series = Self::new(signal);
        for (time, value) in points {
            series.insert(time, value.into());
        }
        series
    }

    /// Insert a value, returning the one it replaced
    pub fn insert(&mut self, time: i64, value: Value) -> Option<Value> {
        self.points.insert(time, value)
    }

    pub fn signal(&self) -> &Signal {
        &self.signal
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Samples in ascending time order
    pub fn iter(&self) -> impl Iterator<Item = (i64, &Value)> + '_ {
        self.points.iter().map(|(t, v)| (*t, v))
    }

    /// Latest sample at or before `time`
    pub fn floor(&self, time: i64) -> Option<(i64, &Value)> {
        self.points
            .range(..=time)
            .next_back()
            .map(|(t, v)| (*t, v))
    }

    /// Earliest sample at or after `time`
    pub fn ceiling(&self, time: i64) -> Option<(i64, &Value)> {
        self.points
            .range((Bound::Included(time), Bound::Unbounded))
            .next()
            .map(|(t, v)| (*t, v))
    }

    /// Sample exactly at `time`
    pub fn exact(&self, time: i64) -> Option<&Value> {
        self.points.get(&time)
    }

    pub fn first(&self) -> Option<(i64, &Value)> {
        self.points.iter().next().map(|(t, v)| (*t, v))
    }

    pub fn last(&self) -> Option<(i64, &Value)> {
        self.points.iter().next_back().map(|(t, v)| (*t, v))
    }

    /// Time span and value range
    ///
    /// Text series only report the time span; an empty series is all zeros.
    pub fn summary(&self) -> SeriesSummary {
        let (Some((min_time, _)), Some((max_time, _))) = (self.first(), self.last()) else {
            return SeriesSummary::default();
        };

        let mut numbers = self.points.values().filter_map(Value::as_f64);
        let Some(first) = numbers.next() else {
            return SeriesSummary {
                min_time,
                max_time,
                ..Default::default()
            };
        };
        let (min_value, max_value) =
            numbers.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)));

        SeriesSummary {
            min_time,
            max_time,
            min_value,
            max_value,
            max_diff: max_value - min_value,
        }
    }
}

/// All series of one decoded log
#[derive(Debug, Clone)]
pub struct TimeSeriesStore {
    start_time: i64,
    series: HashMap<SignalId, TimeSeries>,
    names: HashMap<String, SignalId>,
}

impl TimeSeriesStore {
    /// Decode a log file into a store
    pub fn load(path: impl AsRef<Path>) -> CodecResult<Self> {
        let path = path.as_ref();
        let log = read_log(path)?;
        let store = Self::from_decoded(log);
        tracing::info!(
            path = %path.display(),
            signals = store.len(),
            "Loaded log"
        );
        Ok(store)
    }

    /// Build a store from a decoded log
    pub fn from_decoded(log: DecodedLog) -> Self {
        let mut store = Self::from_series(
            log.start_time,
            log.signals.into_iter().map(TimeSeries::new),
        );

        let mut replaced = 0usize;
        for sample in log.samples {
            if let Some(series) = store.series.get_mut(&sample.signal_id) {
                if series
                    .insert(sample.time.wrapping_sub(log.start_time), sample.value)
                    .is_some()
                {
                    replaced += 1;
                }
            }
        }
        if replaced > 0 {
            tracing::debug!(replaced, "Samples sharing a timestamp, kept the last");
        }
        store
    }

    /// Build a store from ready-made series
    pub fn from_series(start_time: i64, series: impl IntoIterator<Item = TimeSeries>) -> Self {
        let mut store = Self {
            start_time,
            series: HashMap::new(),
            names: HashMap::new(),
        };
        for s in series {
            let id = s.signal().id;
            if let Some(previous) = store.names.insert(s.signal().name.clone(), id) {
                tracing::warn!(
                    name = %s.signal().name,
                    previous,
                    id,
                    "Duplicate signal name, lookups by name use the later id"
                );
            }
            store.series.insert(id, s);
        }
        store
    }

    /// Start time of the log (epoch of the series keys)
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Signals ordered by descending id
    pub fn signals_desc(&self) -> Vec<&Signal> {
        let mut signals: Vec<&Signal> = self.series.values().map(TimeSeries::signal).collect();
        signals.sort_by(|a, b| b.id.cmp(&a.id));
        signals
    }

    pub fn by_id(&self, id: SignalId) -> Option<&TimeSeries> {
        self.series.get(&id)
    }

    pub fn by_name(&self, name: &str) -> Option<&TimeSeries> {
        self.names.get(name).and_then(|id| self.series.get(id))
    }

    /// All series, ordered by ascending id
    pub fn series(&self) -> Vec<&TimeSeries> {
        let mut all: Vec<&TimeSeries> = self.series.values().collect();
        all.sort_by_key(|s| s.signal().id);
        all
    }

    pub fn floor(&self, id: SignalId, time: i64) -> Option<(i64, &Value)> {
        self.by_id(id)?.floor(time)
    }

    pub fn ceiling(&self, id: SignalId, time: i64) -> Option<(i64, &Value)> {
        self.by_id(id)?.ceiling(time)
    }

    pub fn exact(&self, id: SignalId, time: i64) -> Option<&Value> {
        self.by_id(id)?.exact(time)
    }
}
