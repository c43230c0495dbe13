//! Analysis
//!
//! Correlates program events with telemetry recorded in a log:
//!
//! - **constraint**: `<signal> <relation> <threshold>` predicates
//! - **interval**: Time ranges during which a constraint holds
//! - **events**: Event traces and the clock offset between timelines
//! - **correlate**: Inside/outside classification and value snapshots
//! - **stats**: Frequency tables and coverage ranges
//! - **problem**: Memoized problem evaluation and merged reports
//! - **error**: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use contextlog::analysis::{
//!     EventTrace, OccurrenceFilter, Problem, ProblemDefinition, ProblemReport, Relation,
//!     SignalConstraint, StatsConfig, Threshold,
//! };
//! use contextlog::series::TimeSeriesStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = TimeSeriesStore::load("session.clog")?;
//! let trace = EventTrace::from_csv("calls.csv", store.start_time())?;
//!
//! let low_battery = SignalConstraint::new("battery", Relation::Lt, Threshold::Integer(20))?;
//! let definition = ProblemDefinition::new(Some("sync".into()), Some(low_battery))?;
//! let mut problems = vec![Problem::new(&store, &trace, definition)?];
//!
//! let report =
//!     ProblemReport::from_problems(&mut problems, OccurrenceFilter::All, &StatsConfig::default())?;
//! print!("{}", report);
//! # Ok(())
//! # }
//! ```

pub mod constraint;
pub mod correlate;
pub mod error;
pub mod events;
pub mod interval;
pub mod problem;
pub mod stats;

pub use constraint::{Relation, SignalConstraint, SignalRef, Threshold};
pub use correlate::{build_occurrences, classify, is_inside, Occurrence, Partition};
pub use error::{AnalysisError, AnalysisResult};
pub use events::{ClockOffset, EventSource, EventTrace};
pub use interval::{derive_intervals, interpolate, ConstraintInterval, IntervalSet};
pub use problem::{
    snapshot_values, OccurrenceFilter, Problem, ProblemDefinition, ProblemReport, SignalReport,
};
pub use stats::{
    continuous_stats, discrete_stats, signal_stats, text_stats, CoverageRange, FrequencyEntry,
    SignalStats, StatsConfig,
};
