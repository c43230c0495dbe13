//! Time series
//!
//! Read-only, per-signal timelines rebuilt from a decoded log. The analysis
//! side queries them with floor/ceiling/exact lookups.

pub mod store;

pub use store::{SeriesSummary, TimeSeries, TimeSeriesStore};
