//! Sink trait
//!
//! A sink is one destination for a session's schema and samples. Sinks are
//! owned by the pipeline's consumer task, so they are only ever driven from
//! one task at a time and need no internal locking.

use crate::codec::{Signal, SignalId, Value};
use crate::ingest::error::SinkResult;

/// Destination for a logging session
pub trait Sink: Send {
    /// Short name used in logs and notices
    fn name(&self) -> &str;

    /// Check that the sink can write where it is configured to
    ///
    /// Called before `open`; a failing sink is excluded from the session.
    fn check_permissions(&self) -> SinkResult<()>;

    /// Start a session
    fn open(&mut self) -> SinkResult<()>;

    /// Record a signal definition
    fn register_signal(&mut self, signal: &Signal) -> SinkResult<()>;

    /// Record one sample
    fn insert_log(&mut self, signal_id: SignalId, time: i64, value: &Value) -> SinkResult<()>;

    /// End the session and release resources
    fn close(&mut self) -> SinkResult<()>;
}

/// Session clock in microseconds
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ingest::error::SinkError;
    use std::sync::{Arc, Mutex};

    /// Everything a `RecordingSink` has seen
    #[derive(Debug, Default, Clone, PartialEq)]
    pub struct Recorded {
        pub opened: bool,
        pub closed: bool,
        pub signals: Vec<Signal>,
        pub samples: Vec<(SignalId, i64, Value)>,
    }

    /// In-memory sink for pipeline tests
    pub struct RecordingSink {
        name: String,
        pub log: Arc<Mutex<Recorded>>,
        pub deny: bool,
        pub fail_writes: bool,
    }

    impl RecordingSink {
        pub fn new(name: &str) -> (Self, Arc<Mutex<Recorded>>) {
            let log = Arc::new(Mutex::new(Recorded::default()));
            let sink = Self {
                name: name.to_string(),
                log: Arc::clone(&log),
                deny: false,
                fail_writes: false,
            };
            (sink, log)
        }
    }

    impl Sink for RecordingSink {
        fn name(&self) -> &str {
            &self.name
        }

        fn check_permissions(&self) -> SinkResult<()> {
            if self.deny {
                return Err(SinkError::PermissionDenied("denied for test".into()));
            }
            Ok(())
        }

        fn open(&mut self) -> SinkResult<()> {
            self.log.lock().unwrap().opened = true;
            Ok(())
        }

        fn register_signal(&mut self, signal: &Signal) -> SinkResult<()> {
            self.log.lock().unwrap().signals.push(signal.clone());
            Ok(())
        }

        fn insert_log(&mut self, signal_id: SignalId, time: i64, value: &Value) -> SinkResult<()> {
            if self.fail_writes {
                return Err(SinkError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "disk full",
                )));
            }
            self.log
                .lock()
                .unwrap()
                .samples
                .push((signal_id, time, value.clone()));
            Ok(())
        }

        fn close(&mut self) -> SinkResult<()> {
            self.log.lock().unwrap().closed = true;
            Ok(())
        }
    }
}
