//! Problems
//!
//! A problem pairs an optional event matcher ("which function calls are the
//! occurrences") with an optional signal constraint ("when is the device in
//! the suspicious state"). Evaluating it runs
//!
//! ```text
//! definition ─▶ intervals ─┐
//!            └▶ timestamps ┴▶ inside/outside partition, occurrences ─▶ report
//! ```
//!
//! Every derived value is memoized under the definition parts it depends
//! on, so changing the matcher leaves intervals alone and changing the
//! constraint leaves event timestamps alone.

use crate::analysis::constraint::SignalConstraint;
use crate::analysis::correlate::{build_occurrences, classify, Occurrence, Partition};
use crate::analysis::error::{AnalysisError, AnalysisResult};
use crate::analysis::events::{ClockOffset, EventSource};
use crate::analysis::interval::{derive_intervals, IntervalSet};
use crate::analysis::stats::{signal_stats, SignalStats, StatsConfig};
use crate::codec::{Value, ValueType};
use crate::series::TimeSeriesStore;
use serde::{Deserialize, Serialize};
use std::fmt;

/// What a problem looks for
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemDefinition {
    event_matcher: Option<String>,
    constraint: Option<SignalConstraint>,
}

impl ProblemDefinition {
    /// Build a definition; at least one part must be present
    ///
    /// An empty matcher counts as absent.
    pub fn new(
        event_matcher: Option<String>,
        constraint: Option<SignalConstraint>,
    ) -> AnalysisResult<Self> {
        let event_matcher = event_matcher.filter(|m| !m.trim().is_empty());
        if event_matcher.is_none() && constraint.is_none() {
            return Err(AnalysisError::InvalidArgument(
                "a problem needs an event matcher or a signal constraint".into(),
            ));
        }
        Ok(Self {
            event_matcher,
            constraint,
        })
    }

    pub fn event_matcher(&self) -> Option<&str> {
        self.event_matcher.as_deref()
    }

    pub fn constraint(&self) -> Option<&SignalConstraint> {
        self.constraint.as_ref()
    }
}

impl fmt::Display for ProblemDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.event_matcher, &self.constraint) {
            (Some(m), Some(c)) => write!(f, "{} while {}", m, c),
            (Some(m), None) => write!(f, "{}", m),
            (None, Some(c)) => write!(f, "{}", c),
            (None, None) => write!(f, "(empty)"),
        }
    }
}

/// Single cached value tagged with the key it was computed from
#[derive(Debug)]
struct Memo<K, V> {
    entry: Option<(K, V)>,
    computations: usize,
}

impl<K: PartialEq, V> Memo<K, V> {
    fn new() -> Self {
        Self {
            entry: None,
            computations: 0,
        }
    }

    fn is_fresh(&self, key: &K) -> bool {
        self.entry.as_ref().is_some_and(|(k, _)| k == key)
    }

    fn store(&mut self, key: K, value: V) {
        self.computations += 1;
        self.entry = Some((key, value));
    }

    fn value(&self) -> Option<&V> {
        self.entry.as_ref().map(|(_, v)| v)
    }
}

type DefinitionKey = (Option<String>, Option<SignalConstraint>);

/// A problem evaluated against one log and one event source
pub struct Problem<'a, E: EventSource> {
    store: &'a TimeSeriesStore,
    events: &'a E,
    offset: ClockOffset,
    definition: ProblemDefinition,
    timestamps: Memo<Option<String>, Vec<i64>>,
    intervals: Memo<Option<SignalConstraint>, Option<IntervalSet>>,
    partition: Memo<DefinitionKey, Partition>,
    occurrences: Memo<DefinitionKey, Vec<Occurrence>>,
}

impl<'a, E: EventSource> Problem<'a, E> {
    /// Bind a definition to a log and an event source
    ///
    /// The clock offset is taken from the two start times.
    pub fn new(
        store: &'a TimeSeriesStore,
        events: &'a E,
        definition: ProblemDefinition,
    ) -> AnalysisResult<Self> {
        validate(store, &definition)?;
        Ok(Self {
            store,
            events,
            offset: ClockOffset::between(events.start_time(), store.start_time()),
            definition,
            timestamps: Memo::new(),
            intervals: Memo::new(),
            partition: Memo::new(),
            occurrences: Memo::new(),
        })
    }

    /// Override the clock offset
    pub fn with_offset(mut self, offset: ClockOffset) -> Self {
        self.offset = offset;
        // Offsets shift every classification
        self.partition = Memo::new();
        self.occurrences = Memo::new();
        self
    }

    pub fn offset(&self) -> ClockOffset {
        self.offset
    }

    pub fn definition(&self) -> &ProblemDefinition {
        &self.definition
    }

    pub fn store(&self) -> &'a TimeSeriesStore {
        self.store
    }

    /// Replace the definition; cached values whose inputs did not change
    /// are kept
    pub fn set_definition(&mut self, definition: ProblemDefinition) -> AnalysisResult<()> {
        validate(self.store, &definition)?;
        self.definition = definition;
        Ok(())
    }

    /// Event instants selected by the matcher (empty without one)
    pub fn timestamps(&mut self) -> &[i64] {
        self.ensure_timestamps();
        self.timestamps.value().map(Vec::as_slice).unwrap_or_default()
    }

    /// Constraint intervals (`None` without a constraint)
    pub fn intervals(&mut self) -> AnalysisResult<Option<&IntervalSet>> {
        self.ensure_intervals()?;
        Ok(self.intervals.value().and_then(Option::as_ref))
    }

    pub fn inside_timestamps(&mut self) -> AnalysisResult<&[i64]> {
        self.ensure_partition()?;
        Ok(self
            .partition
            .value()
            .map(|p| p.inside.as_slice())
            .unwrap_or_default())
    }

    pub fn outside_timestamps(&mut self) -> AnalysisResult<&[i64]> {
        self.ensure_partition()?;
        Ok(self
            .partition
            .value()
            .map(|p| p.outside.as_slice())
            .unwrap_or_default())
    }

    pub fn occurrences(&mut self) -> AnalysisResult<&[Occurrence]> {
        self.ensure_occurrences()?;
        Ok(self
            .occurrences
            .value()
            .map(Vec::as_slice)
            .unwrap_or_default())
    }

    fn definition_key(&self) -> DefinitionKey {
        (
            self.definition.event_matcher.clone(),
            self.definition.constraint.clone(),
        )
    }

    fn ensure_timestamps(&mut self) {
        let key = self.definition.event_matcher.clone();
        if self.timestamps.is_fresh(&key) {
            return;
        }
        let times = key
            .as_deref()
            .map(|m| self.events.timestamps_for(m))
            .unwrap_or_default();
        tracing::debug!(matcher = ?key, events = times.len(), "Resolved event timestamps");
        self.timestamps.store(key, times);
    }

    fn ensure_intervals(&mut self) -> AnalysisResult<()> {
        let key = self.definition.constraint.clone();
        if self.intervals.is_fresh(&key) {
            return Ok(());
        }
        let intervals = match &key {
            Some(constraint) => Some(derive_intervals(
                constraint.signal.resolve(self.store)?,
                constraint,
            )?),
            None => None,
        };
        self.intervals.store(key, intervals);
        Ok(())
    }

    fn ensure_partition(&mut self) -> AnalysisResult<()> {
        let key = self.definition_key();
        if self.partition.is_fresh(&key) {
            return Ok(());
        }
        self.ensure_timestamps();
        self.ensure_intervals()?;

        let times = self.timestamps.value().map(Vec::as_slice).unwrap_or_default();
        let intervals = self.intervals.value().and_then(Option::as_ref);
        let partition = classify(times, intervals, self.offset);
        self.partition.store(key, partition);
        Ok(())
    }

    fn ensure_occurrences(&mut self) -> AnalysisResult<()> {
        let key = self.definition_key();
        if self.occurrences.is_fresh(&key) {
            return Ok(());
        }
        self.ensure_timestamps();
        self.ensure_intervals()?;

        let times = self.timestamps.value().map(Vec::as_slice).unwrap_or_default();
        let intervals = self.intervals.value().and_then(Option::as_ref);
        let occurrences = build_occurrences(times, intervals, self.offset, self.store);
        self.occurrences.store(key, occurrences);
        Ok(())
    }
}

fn validate(store: &TimeSeriesStore, definition: &ProblemDefinition) -> AnalysisResult<()> {
    if let Some(constraint) = &definition.constraint {
        let series = constraint.signal.resolve(store)?;
        constraint.check_signal(series.signal())?;
    }
    Ok(())
}

/// Which occurrences feed the statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OccurrenceFilter {
    #[default]
    All,
    Inside,
    Outside,
}

impl OccurrenceFilter {
    fn accepts(self, occurrence: &Occurrence) -> bool {
        match self {
            OccurrenceFilter::All => true,
            OccurrenceFilter::Inside => occurrence.inside_intervals,
            OccurrenceFilter::Outside => !occurrence.inside_intervals,
        }
    }
}

/// Statistics of one signal across the occurrences
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalReport {
    pub name: String,
    pub value_type: ValueType,
    pub stats: SignalStats,
}

/// Per-signal statistics over the occurrences of one or more problems
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProblemReport {
    pub occurrences: usize,
    pub signals: Vec<SignalReport>,
}

impl ProblemReport {
    /// Summarize `occurrences` for every signal of `store`
    pub fn build<'o>(
        store: &TimeSeriesStore,
        occurrences: impl IntoIterator<Item = &'o Occurrence>,
        filter: OccurrenceFilter,
        config: &StatsConfig,
    ) -> Self {
        let selected: Vec<&Occurrence> = occurrences
            .into_iter()
            .filter(|o| filter.accepts(o))
            .collect();

        let signals = store
            .series()
            .into_iter()
            .map(|series| {
                let signal = series.signal();
                let values = selected
                    .iter()
                    .filter_map(|o| o.snapshot.get(&signal.name))
                    .filter_map(Option::as_ref);
                SignalReport {
                    name: signal.name.clone(),
                    value_type: signal.value_type,
                    stats: signal_stats(signal.value_type, values, config),
                }
            })
            .collect();

        Self {
            occurrences: selected.len(),
            signals,
        }
    }

    /// Merge the occurrences of several problems into one report
    ///
    /// Signals are taken from the first problem's log.
    pub fn from_problems<E: EventSource>(
        problems: &mut [Problem<'_, E>],
        filter: OccurrenceFilter,
        config: &StatsConfig,
    ) -> AnalysisResult<Self> {
        let Some(store) = problems.first().map(Problem::store) else {
            return Ok(Self {
                occurrences: 0,
                signals: Vec::new(),
            });
        };

        let mut merged: Vec<Occurrence> = Vec::new();
        for problem in problems.iter_mut() {
            merged.extend_from_slice(problem.occurrences()?);
        }

        tracing::info!(
            problems = problems.len(),
            occurrences = merged.len(),
            "Building problem report"
        );
        Ok(Self::build(store, &merged, filter, config))
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl fmt::Display for ProblemReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for signal in &self.signals {
            writeln!(f, "{}:", signal.name)?;
            write!(f, "{}", signal.stats)?;
        }
        Ok(())
    }
}

/// Values of one signal across occurrences, skipping missing ones
pub fn snapshot_values<'o>(occurrences: &'o [Occurrence], signal: &'o str) -> Vec<&'o Value> {
    occurrences
        .iter()
        .filter_map(|o| o.snapshot.get(signal).and_then(Option::as_ref))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::constraint::{Relation, Threshold};
    use crate::analysis::events::EventTrace;
    use crate::analysis::interval::ConstraintInterval;
    use crate::codec::Signal;
    use crate::series::TimeSeries;

    fn store() -> TimeSeriesStore {
        TimeSeriesStore::from_series(
            1_000,
            vec![
                TimeSeries::from_points(
                    Signal::new(0, "battery", ValueType::Int64),
                    vec![(0, 80i64), (5, 80), (10, 40), (15, 40)],
                ),
                TimeSeries::from_points(
                    Signal::new(1, "network", ValueType::Utf8),
                    vec![(0, "A"), (7, "B"), (12, "A")],
                ),
            ],
        )
    }

    fn trace() -> EventTrace {
        // Same start as the log: zero offset
        EventTrace::new(1_000)
            .with_call("sync", 2)
            .with_call("sync", 8)
            .with_call("sync", 12)
            .with_call("sync", 20)
            .with_call("render", 1)
    }

    fn low_battery() -> SignalConstraint {
        SignalConstraint::new("battery", Relation::Lt, Threshold::Integer(50)).unwrap()
    }

    #[test]
    fn test_definition_requires_a_part() {
        assert!(matches!(
            ProblemDefinition::new(None, None),
            Err(AnalysisError::InvalidArgument(_))
        ));
        assert!(matches!(
            ProblemDefinition::new(Some("  ".into()), None),
            Err(AnalysisError::InvalidArgument(_))
        ));
        assert!(ProblemDefinition::new(Some("sync".into()), None).is_ok());
        assert!(ProblemDefinition::new(None, Some(low_battery())).is_ok());
    }

    #[test]
    fn test_problem_validates_constraint() {
        let store = store();
        let trace = trace();

        let missing = SignalConstraint::new("gps", Relation::Gt, Threshold::Integer(1)).unwrap();
        let def = ProblemDefinition::new(None, Some(missing)).unwrap();
        assert!(matches!(
            Problem::new(&store, &trace, def),
            Err(AnalysisError::SignalNotFound(_))
        ));

        let wrong = SignalConstraint::new("battery", Relation::Gt, Threshold::Float(1.0)).unwrap();
        let def = ProblemDefinition::new(None, Some(wrong)).unwrap();
        assert!(matches!(
            Problem::new(&store, &trace, def),
            Err(AnalysisError::ConstraintTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_partition_and_occurrences() {
        let store = store();
        let trace = trace();
        let def = ProblemDefinition::new(Some("sync".into()), Some(low_battery())).unwrap();
        let mut problem = Problem::new(&store, &trace, def).unwrap();

        assert_eq!(problem.offset(), ClockOffset(0));
        assert_eq!(problem.timestamps(), &[2, 8, 12, 20]);
        assert_eq!(
            problem.intervals().unwrap().unwrap().as_slice(),
            &[ConstraintInterval::new(10, None)]
        );
        assert_eq!(problem.inside_timestamps().unwrap(), &[12, 20]);
        assert_eq!(problem.outside_timestamps().unwrap(), &[2, 8]);

        let occurrences = problem.occurrences().unwrap();
        assert_eq!(occurrences.len(), 4);
        assert_eq!(occurrences[1].snapshot["network"], Some(Value::from("B")));
        assert!(occurrences[2].inside_intervals);
    }

    #[test]
    fn test_event_only_problem_is_always_inside() {
        let store = store();
        let trace = trace();
        let def = ProblemDefinition::new(Some("sync".into()), None).unwrap();
        let mut problem = Problem::new(&store, &trace, def).unwrap();

        assert!(problem.intervals().unwrap().is_none());
        assert_eq!(problem.inside_timestamps().unwrap().len(), 4);
        assert!(problem.outside_timestamps().unwrap().is_empty());
    }

    #[test]
    fn test_never_satisfied_constraint_is_never_inside() {
        let store = store();
        let trace = trace();
        let never = SignalConstraint::new("battery", Relation::Gt, Threshold::Integer(100)).unwrap();
        let def = ProblemDefinition::new(Some("sync".into()), Some(never)).unwrap();
        let mut problem = Problem::new(&store, &trace, def).unwrap();

        assert!(problem.intervals().unwrap().unwrap().is_empty());
        assert!(problem.inside_timestamps().unwrap().is_empty());
    }

    #[test]
    fn test_offset_shifts_events() {
        let store = store();
        // Trace started 5 units after the log
        let trace = EventTrace::new(1_005).with_call("sync", 5);
        let def = ProblemDefinition::new(Some("sync".into()), Some(low_battery())).unwrap();
        let mut problem = Problem::new(&store, &trace, def).unwrap();

        assert_eq!(problem.offset(), ClockOffset(5));
        assert_eq!(problem.inside_timestamps().unwrap(), &[5]);

        let mut problem = problem.with_offset(ClockOffset(0));
        assert_eq!(problem.inside_timestamps().unwrap(), &[] as &[i64]);
    }

    #[test]
    fn test_matcher_change_keeps_intervals() {
        let store = store();
        let trace = trace();
        let def = ProblemDefinition::new(Some("sync".into()), Some(low_battery())).unwrap();
        let mut problem = Problem::new(&store, &trace, def).unwrap();
        problem.occurrences().unwrap();
        problem.inside_timestamps().unwrap();

        let def = ProblemDefinition::new(Some("render".into()), Some(low_battery())).unwrap();
        problem.set_definition(def).unwrap();
        assert_eq!(problem.timestamps(), &[1]);
        assert_eq!(problem.occurrences().unwrap().len(), 1);
        problem.inside_timestamps().unwrap();

        assert_eq!(problem.intervals.computations, 1);
        assert_eq!(problem.timestamps.computations, 2);
        assert_eq!(problem.occurrences.computations, 2);
        assert_eq!(problem.partition.computations, 2);
    }

    #[test]
    fn test_constraint_change_keeps_timestamps() {
        let store = store();
        let trace = trace();
        let def = ProblemDefinition::new(Some("sync".into()), Some(low_battery())).unwrap();
        let mut problem = Problem::new(&store, &trace, def).unwrap();
        problem.occurrences().unwrap();

        let high = SignalConstraint::new("battery", Relation::Ge, Threshold::Integer(50)).unwrap();
        problem
            .set_definition(ProblemDefinition::new(Some("sync".into()), Some(high)).unwrap())
            .unwrap();
        assert_eq!(problem.inside_timestamps().unwrap(), &[2, 8]);
        problem.occurrences().unwrap();

        assert_eq!(problem.timestamps.computations, 1);
        assert_eq!(problem.intervals.computations, 2);
        assert_eq!(problem.occurrences.computations, 2);
    }

    #[test]
    fn test_unchanged_definition_recomputes_nothing() {
        let store = store();
        let trace = trace();
        let def = ProblemDefinition::new(Some("sync".into()), Some(low_battery())).unwrap();
        let mut problem = Problem::new(&store, &trace, def.clone()).unwrap();
        problem.occurrences().unwrap();
        problem.set_definition(def).unwrap();
        problem.occurrences().unwrap();
        problem.intervals().unwrap();

        assert_eq!(problem.occurrences.computations, 1);
        assert_eq!(problem.intervals.computations, 1);
        assert_eq!(problem.timestamps.computations, 1);
    }

    #[test]
    fn test_report_text_and_filter() {
        let store = store();
        let trace = trace();
        let def = ProblemDefinition::new(Some("sync".into()), Some(low_battery())).unwrap();
        let mut problems = vec![Problem::new(&store, &trace, def).unwrap()];

        let report =
            ProblemReport::from_problems(&mut problems, OccurrenceFilter::All, &StatsConfig::default())
                .unwrap();
        assert_eq!(report.occurrences, 4);
        assert_eq!(
            report.to_string(),
            "battery:\n\t50% 40\n\t50% 80\nnetwork:\n\t75% A\n\t25% B\n"
        );

        let inside = ProblemReport::from_problems(
            &mut problems,
            OccurrenceFilter::Inside,
            &StatsConfig::default(),
        )
        .unwrap();
        assert_eq!(inside.occurrences, 2);
        assert_eq!(inside.to_string(), "battery:\n\t100% 40\nnetwork:\n\t100% A\n");

        let json = inside.to_json().unwrap();
        assert!(json.contains("\"battery\""));
    }

    #[test]
    fn test_report_merges_problems() {
        let store = store();
        let first = EventTrace::new(1_000).with_call("sync", 2);
        let second = EventTrace::new(1_000).with_call("sync", 12).with_call("sync", 13);
        let def = ProblemDefinition::new(Some("sync".into()), None).unwrap();

        let mut problems = vec![
            Problem::new(&store, &first, def.clone()).unwrap(),
            Problem::new(&store, &second, def).unwrap(),
        ];
        let report =
            ProblemReport::from_problems(&mut problems, OccurrenceFilter::All, &StatsConfig::default())
                .unwrap();
        assert_eq!(report.occurrences, 3);
        assert_eq!(report.signals[0].name, "battery");
        assert_eq!(
            report.signals[0].stats.to_string(),
            "\t66% 40\n\t33% 80\n"
        );
    }

    #[test]
    fn test_snapshot_values_skips_missing() {
        let store = store();
        let trace = EventTrace::new(990).with_call("sync", 5).with_call("sync", 20);
        let def = ProblemDefinition::new(Some("sync".into()), None).unwrap();
        let mut problem = Problem::new(&store, &trace, def).unwrap();
        // offset -10: the first event falls before any sample, the second at 10
        let occurrences = problem.occurrences().unwrap();
        assert_eq!(snapshot_values(occurrences, "battery"), vec![&Value::Int64(40)]);
    }
}
