//! Constraint intervals
//!
//! Walks a series in time order and records the time ranges in which the
//! constraint holds. How a boundary is placed depends on the signal type:
//!
//! - int/long: at the sample that flips the constraint
//! - float/double: linearly interpolated between the two straddling samples
//! - string: at the sample that flips the constraint
//!
//! A range still open after the last sample ends at +∞ (`end == None`).

use crate::analysis::constraint::{SignalConstraint, Threshold};
use crate::analysis::error::AnalysisResult;
use crate::codec::Value;
use crate::series::TimeSeries;
use serde::Serialize;

/// Closed time range `[start, end]`; `end == None` is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConstraintInterval {
    pub start: i64,
    pub end: Option<i64>,
}

impl ConstraintInterval {
    pub fn new(start: i64, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: i64) -> bool {
        time >= self.start && self.end.map_or(true, |end| time <= end)
    }
}

/// Sorted, pairwise disjoint intervals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IntervalSet {
    intervals: Vec<ConstraintInterval>,
}

impl IntervalSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an interval starting at or after every existing start
    ///
    /// An interval touching or overlapping the last one is merged into it.
    pub fn push(&mut self, interval: ConstraintInterval) {
        if let Some(last) = self.intervals.last_mut() {
            debug_assert!(interval.start >= last.start);
            if last.end.map_or(true, |end| interval.start <= end) {
                last.end = match (last.end, interval.end) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    _ => None,
                };
                return;
            }
        }
        self.intervals.push(interval);
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConstraintInterval> {
        self.intervals.iter()
    }

    pub fn as_slice(&self) -> &[ConstraintInterval] {
        &self.intervals
    }

    /// Whether `time` lies in any interval
    pub fn contains(&self, time: i64) -> bool {
        // Intervals are sorted by start: only the last one starting at or
        // before `time` can contain it
        let idx = self.intervals.partition_point(|i| i.start <= time);
        idx > 0 && self.intervals[idx - 1].contains(time)
    }
}

impl<'a> IntoIterator for &'a IntervalSet {
    type Item = &'a ConstraintInterval;
    type IntoIter = std::slice::Iter<'a, ConstraintInterval>;

    fn into_iter(self) -> Self::IntoIter {
        self.intervals.iter()
    }
}

/// Derive the intervals in which `constraint` holds on `series`
///
/// The constraint is checked against the series' signal first.
pub fn derive_intervals(
    series: &TimeSeries,
    constraint: &SignalConstraint,
) -> AnalysisResult<IntervalSet> {
    constraint.check_signal(series.signal())?;

    let intervals = if series.signal().value_type.is_continuous() {
        continuous_intervals(series, constraint)
    } else {
        // Discrete and text series share the sample-boundary rule
        stepped_intervals(series, constraint)
    };

    tracing::debug!(
        signal = %series.signal().name,
        constraint = %constraint,
        samples = series.len(),
        intervals = intervals.len(),
        "Derived constraint intervals"
    );
    Ok(intervals)
}

/// Boundaries at the timestamps of the samples that flip the constraint
fn stepped_intervals(series: &TimeSeries, constraint: &SignalConstraint) -> IntervalSet {
    let mut set = IntervalSet::new();
    let mut open: Option<i64> = None;

    for (time, value) in series.iter() {
        match (open, constraint.holds(value)) {
            (None, true) => open = Some(time),
            (Some(start), false) => {
                set.push(ConstraintInterval::new(start, Some(time)));
                open = None;
            }
            _ => {}
        }
    }

    if let Some(start) = open {
        set.push(ConstraintInterval::new(start, None));
    }
    set
}

/// Boundaries interpolated to where the value crosses the threshold
fn continuous_intervals(series: &TimeSeries, constraint: &SignalConstraint) -> IntervalSet {
    let threshold = match &constraint.threshold {
        Threshold::Float(t) => *t,
        _ => return IntervalSet::new(),
    };

    let mut set = IntervalSet::new();
    let mut open: Option<i64> = None;
    let mut previous: Option<(i64, f64)> = None;

    for (time, value) in series.iter() {
        let Some(v) = float_value(value) else {
            continue;
        };
        let inside = constraint.relation.eval(v, threshold);

        match (open, inside) {
            (None, true) => {
                let start = match previous {
                    Some((t0, v0)) => interpolate(t0, v0, time, v, threshold),
                    None => time,
                };
                open = Some(start);
            }
            (Some(start), false) => {
                // `previous` is set: an open interval implies an earlier sample
                let end = previous.map_or(time, |(t0, v0)| interpolate(t0, v0, time, v, threshold));
                set.push(ConstraintInterval::new(start, Some(end)));
                open = None;
            }
            _ => {}
        }
        previous = Some((time, v));
    }

    if let Some(start) = open {
        set.push(ConstraintInterval::new(start, None));
    }
    set
}

fn float_value(value: &Value) -> Option<f64> {
    match value {
        Value::Float32(v) => Some(*v as f64),
        Value::Float64(v) => Some(*v),
        _ => None,
    }
}

/// Time at which the line through `(t0, v0)` and `(t1, v1)` reaches
/// `threshold`
///
/// The result is truncated toward zero and clamped to `[t0, t1]`. Equal or
/// non-finite values (no crossing point) put the boundary at `t1`.
pub fn interpolate(t0: i64, v0: f64, t1: i64, v1: f64, threshold: f64) -> i64 {
    let span = (v1 - v0).abs();
    let fraction = (threshold - v0).abs() / span;
    if span == 0.0 || !fraction.is_finite() {
        return t1;
    }
    let boundary = (fraction * t1.abs_diff(t0) as f64 + t0 as f64) as i64;
    boundary.clamp(t0.min(t1), t0.max(t1))
}
