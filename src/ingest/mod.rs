//! Ingestion
//!
//! Turns typed sample calls from any number of producers into persisted
//! records:
//!
//! - **pipeline**: The ordered command queue and its consumer task
//! - **sink**: The `Sink` trait every destination implements
//! - **file_sink**: Binary and text log files
//! - **broadcast**: In-process event fan-out
//! - **error**: Error types
//!
//! # Example
//!
//! ```rust,no_run
//! use contextlog::codec::ValueType;
//! use contextlog::ingest::{BinaryFileSink, Pipeline, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::start(PipelineConfig::default());
//!     pipeline.add_sink(Box::new(BinaryFileSink::new("./logs", "session")));
//!
//!     let battery = pipeline.register_signal("battery", ValueType::Int32)?;
//!     pipeline.insert_now(battery.id, 87);
//!
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod error;
pub mod file_sink;
pub mod pipeline;
pub mod sink;

pub use broadcast::{BroadcastSink, TransportEvent, TransportValue};
pub use error::{IngestError, IngestResult, SinkError, SinkResult};
pub use file_sink::{BinaryFileSink, FileSink, TextFileSink};
pub use pipeline::{OverflowPolicy, Pipeline, PipelineConfig, PipelineNotice, PipelineStats};
pub use sink::Sink;
