//! ContextLog codec
//!
//! This module encodes and decodes the paired header + data log format:
//!
//! - **types**: Core data structures (Signal, Sample, Value, ValueType)
//! - **header**: Text schema section (`*version` / `*logs` / `*end`)
//! - **binary**: Binary data section (magic, start time, delta records)
//! - **text**: Human-readable data section with the same structure
//! - **reader**: Format detection and whole-log decoding
//! - **error**: Error types
//!
//! # Layout
//!
//! ```text
//! <base>.clog  = header bytes ++ data bytes
//!
//!   *version\n1\n*logs\n
//!   <id> <type code> <name>\n ...
//!   *end\n
//!   [magic | version | start time][record]...
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use contextlog::codec::read_log;
//!
//! let log = read_log("session.clog")?;
//! for signal in &log.signals {
//!     println!("{} {} {}", signal.id, signal.value_type, signal.name);
//! }
//! # Ok::<(), contextlog::codec::CodecError>(())
//! ```

pub mod binary;
pub mod error;
pub mod header;
pub mod reader;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use binary::{read_samples, write_preamble, write_sample, DataPreamble, DataSection, DATA_MAGIC, DATA_VERSION};
pub use error::{CodecError, CodecResult};
pub use header::{read_header, write_header, Header};
pub use reader::{decode_log, read_log, DecodedLog, LogFormat};
pub use types::{Sample, Signal, SignalId, Value, ValueType};
