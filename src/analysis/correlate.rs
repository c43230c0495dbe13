//! Event correlation
//!
//! Classifies event instants against constraint intervals and captures the
//! value of every signal at each instant.
//!
//! `intervals == None` means the problem has no constraint: every event
//! counts as inside. An empty interval set means the constraint never held:
//! every event is outside.

use crate::analysis::events::ClockOffset;
use crate::analysis::interval::IntervalSet;
use crate::codec::Value;
use crate::series::TimeSeriesStore;
use serde::Serialize;
use std::collections::BTreeMap;

/// One matched event instant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    /// Event time on the event timeline
    pub time: i64,
    pub inside_intervals: bool,
    /// Latest value of each signal at the event (None before its first sample)
    pub snapshot: BTreeMap<String, Option<Value>>,
}

/// Event times split by interval membership
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Partition {
    pub inside: Vec<i64>,
    pub outside: Vec<i64>,
}

/// Whether an event at `time` falls inside the intervals
pub fn is_inside(time: i64, intervals: Option<&IntervalSet>, offset: ClockOffset) -> bool {
    match intervals {
        None => true,
        Some(set) if set.is_empty() => false,
        Some(set) => set.contains(offset.apply(time)),
    }
}

/// Partition event times into inside and outside
pub fn classify(
    event_times: &[i64],
    intervals: Option<&IntervalSet>,
    offset: ClockOffset,
) -> Partition {
    let (inside, outside) = event_times
        .iter()
        .partition(|&&t| is_inside(t, intervals, offset));
    Partition { inside, outside }
}

/// Snapshot every signal at each event time
pub fn build_occurrences(
    event_times: &[i64],
    intervals: Option<&IntervalSet>,
    offset: ClockOffset,
    store: &TimeSeriesStore,
) -> Vec<Occurrence> {
    let all_series = store.series();

    event_times
        .iter()
        .map(|&time| {
            let log_time = offset.apply(time);
            let snapshot = all_series
                .iter()
                .map(|series| {
                    let value = series.floor(log_time).map(|(_, v)| v.clone());
                    (series.signal().name.clone(), value)
                })
                .collect();
            Occurrence {
                time,
                inside_intervals: is_inside(time, intervals, offset),
                snapshot,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::interval::ConstraintInterval;
    use crate::codec::{Signal, ValueType};
    use crate::series::TimeSeries;

    fn set(intervals: &[(i64, Option<i64>)]) -> IntervalSet {
        let mut set = IntervalSet::new();
        for (start, end) in intervals {
            set.push(ConstraintInterval::new(*start, *end));
        }
        set
    }

    #[test]
    fn test_no_constraint_is_always_inside() {
        for t in [i64::MIN, -5, 0, 17, i64::MAX] {
            assert!(is_inside(t, None, ClockOffset::default()));
        }
    }

    #[test]
    fn test_empty_set_is_never_inside() {
        let empty = IntervalSet::new();
        for t in [i64::MIN, -5, 0, 17, i64::MAX] {
            assert!(!is_inside(t, Some(&empty), ClockOffset(3)));
        }
    }

    #[test]
    fn test_inclusive_bounds_with_offset() {
        let intervals = set(&[(100, Some(200))]);
        let offset = ClockOffset(50);
        assert!(!is_inside(49, Some(&intervals), offset));
        assert!(is_inside(50, Some(&intervals), offset));
        assert!(is_inside(150, Some(&intervals), offset));
        assert!(!is_inside(151, Some(&intervals), offset));
    }

    #[test]
    fn test_classify() {
        let intervals = set(&[(10, Some(20)), (40, None)]);
        let partition = classify(&[5, 10, 25, 40, 1_000], Some(&intervals), ClockOffset(0));
        assert_eq!(partition.inside, vec![10, 40, 1_000]);
        assert_eq!(partition.outside, vec![5, 25]);
    }

    #[test]
    fn test_build_occurrences_snapshot() {
        let store = TimeSeriesStore::from_series(
            0,
            vec![
                TimeSeries::from_points(
                    Signal::new(0, "battery", ValueType::Int32),
                    vec![(0, 90i32), (100, 80)],
                ),
                TimeSeries::from_points(
                    Signal::new(1, "ssid", ValueType::Utf8),
                    vec![(60, "home")],
                ),
            ],
        );
        let intervals = set(&[(50, Some(150))]);

        let occurrences = build_occurrences(&[0, 60], Some(&intervals), ClockOffset(10), &store);
        assert_eq!(occurrences.len(), 2);

        let first = &occurrences[0];
        assert_eq!(first.time, 0);
        assert!(!first.inside_intervals);
        assert_eq!(first.snapshot["battery"], Some(Value::Int32(90)));
        assert_eq!(first.snapshot["ssid"], None);

        let second = &occurrences[1];
        assert!(second.inside_intervals);
        assert_eq!(second.snapshot["battery"], Some(Value::Int32(90)));
        assert_eq!(second.snapshot["ssid"], Some(Value::from("home")));
    }
}
