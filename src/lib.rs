//! # ContextLog
//!
//! Context telemetry logging and problem analysis: record typed device
//! signals into a compact log, then find out what the device state looked
//! like whenever a given piece of program code ran.
//!
//! ## Features
//!
//! - **Compact log format**: Text schema header plus delta-encoded binary
//!   (or human-readable text) records
//! - **Concurrent ingestion**: Any number of producers, one ordered consumer
//!   task fanning out to file and broadcast sinks
//! - **Time series**: Per-signal ordered timelines with floor/ceiling lookups
//! - **Problem analysis**: Constraint intervals, event correlation and
//!   per-signal statistics
//!
//! ## Modules
//!
//! - [`codec`]: Log format encoding and decoding
//! - [`ingest`]: Ingestion pipeline and sinks
//! - [`series`]: Time series rebuilt from a log
//! - [`analysis`]: Constraints, intervals, correlation and statistics
//! - [`config`]: TOML configuration with environment overrides
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use contextlog::codec::ValueType;
//! use contextlog::ingest::{BinaryFileSink, Pipeline, PipelineConfig};
//! use contextlog::series::TimeSeriesStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::start(PipelineConfig::default());
//!     pipeline.add_sink(Box::new(BinaryFileSink::new("./logs", "session")));
//!
//!     let wifi = pipeline.register_signal("wifi_rssi", ValueType::Int32)?;
//!     pipeline.insert_now(wifi.id, -61);
//!     pipeline.shutdown().await?;
//!
//!     let store = TimeSeriesStore::load("./logs/session.clog")?;
//!     for series in store.series() {
//!         println!("{}: {:?}", series.signal().name, series.summary());
//!     }
//!     Ok(())
//! }
//! ```

pub mod analysis;
pub mod codec;
pub mod config;
pub mod ingest;
pub mod series;

// Re-export top-level types for convenience
pub use codec::{
    decode_log, read_log, CodecError, CodecResult, DecodedLog, LogFormat, Sample, Signal,
    SignalId, Value, ValueType,
};

pub use ingest::{
    BinaryFileSink, BroadcastSink, IngestError, IngestResult, OverflowPolicy, Pipeline,
    PipelineConfig, PipelineNotice, PipelineStats, Sink, SinkError, TextFileSink,
};

pub use series::{SeriesSummary, TimeSeries, TimeSeriesStore};

pub use analysis::{
    AnalysisError, AnalysisResult, ClockOffset, EventSource, EventTrace, IntervalSet,
    OccurrenceFilter, Problem, ProblemDefinition, ProblemReport, Relation, SignalConstraint,
    StatsConfig, Threshold,
};

pub use config::{AnalysisConfig, Config, ConfigError, LoggingConfig, SinksConfig};
