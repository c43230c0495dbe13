//! Ingestion pipeline
//!
//! Many producers, one consumer. Every call (sink attachment, signal
//! registration, sample insert, session finish) becomes a `Command` on a
//! single ordered channel, so a signal's schema always reaches the sinks
//! before any of its samples.
//!
//! ```text
//! producers ─ insert() ─┐
//! register_signal() ────┼─▶ mpsc (FIFO) ─▶ consumer task ─▶ sinks
//! add_sink() / finish() ┘
//! ```
//!
//! The queue is unbounded under `OverflowPolicy::Grow`: inserts never block
//! and a slow sink grows memory. `OverflowPolicy::DropNewest` caps the
//! depth instead and counts what it drops.

use crate::codec::{Sample, Signal, SignalId, Value, ValueType};
use crate::ingest::error::{IngestError, IngestResult};
use crate::ingest::sink::{now_micros, Sink};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// What to do when the queue is deeper than the consumer can keep up with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Never reject; memory grows with the backlog
    Grow,
    /// Drop incoming samples while `max_depth` are already queued
    DropNewest { max_depth: usize },
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Grow
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub overflow: OverflowPolicy,
    /// Queue depth that triggers a warning (0 disables)
    pub queue_warn_threshold: usize,
    /// Capacity of the notice channel
    pub notice_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            overflow: OverflowPolicy::Grow,
            queue_warn_threshold: 10_000,
            notice_capacity: 64,
        }
    }
}

/// User-facing notices raised by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PipelineNotice {
    /// Sink failed its permission check and was left out of the session
    SinkExcluded { sink: String, reason: String },
    /// Sink raised an I/O error; the session continues without interruption
    SinkFailed { sink: String, error: String },
}

/// Pipeline counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    /// Samples accepted onto the queue
    pub enqueued: u64,
    /// Samples dispatched to the sinks
    pub written: u64,
    /// Samples rejected by the overflow policy or dropped by the consumer
    pub dropped: u64,
    /// Samples currently queued
    pub queue_depth: usize,
}

impl std::fmt::Display for PipelineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Enqueued: {}, Written: {}, Dropped: {}, Queued: {}",
            self.enqueued, self.written, self.dropped, self.queue_depth
        )
    }
}

enum Command {
    AddSink(Box<dyn Sink>),
    Register(Signal),
    Sample(Sample),
    Finish(oneshot::Sender<()>),
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    written: AtomicU64,
    dropped: AtomicU64,
    depth: AtomicUsize,
}

/// Signals known to this session, assigned on the caller's side
#[derive(Default)]
struct Registry {
    by_name: HashMap<String, Signal>,
    next_id: SignalId,
}

/// Concurrent sample ingestion pipeline
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
pub struct Pipeline {
    tx: mpsc::UnboundedSender<Command>,
    registry: Mutex<Registry>,
    counters: Arc<Counters>,
    notices: broadcast::Sender<PipelineNotice>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
    config: PipelineConfig,
}

impl Pipeline {
    /// Spawn the consumer task and return the pipeline
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: PipelineConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(config.notice_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let cancel = CancellationToken::new();

        let consumer = Consumer {
            sinks: Vec::new(),
            schema: Vec::new(),
            types: HashMap::new(),
            counters: Arc::clone(&counters),
            notices: notices.clone(),
        };
        let handle = tokio::spawn(consumer.run(rx, cancel.clone()));

        tracing::info!(overflow = ?config.overflow, "Ingestion pipeline started");

        Self {
            tx,
            registry: Mutex::new(Registry::default()),
            counters,
            notices,
            cancel,
            handle: Mutex::new(Some(handle)),
            config,
        }
    }

    /// Attach a sink to the session
    ///
    /// A sink failing its permission check is excluded and a
    /// `PipelineNotice::SinkExcluded` is raised. Returns whether the sink
    /// was accepted.
    pub fn add_sink(&self, sink: Box<dyn Sink>) -> bool {
        if let Err(e) = sink.check_permissions() {
            tracing::warn!(sink = sink.name(), error = %e, "Sink excluded from session");
            let _ = self.notices.send(PipelineNotice::SinkExcluded {
                sink: sink.name().to_string(),
                reason: e.to_string(),
            });
            return false;
        }
        self.tx.send(Command::AddSink(sink)).is_ok()
    }

    /// Register a signal, or return the existing one with the same name
    pub fn register_signal(
        &self,
        name: impl Into<String>,
        value_type: ValueType,
    ) -> IngestResult<Signal> {
        let name = name.into();
        let mut registry = self.lock_registry();

        if let Some(existing) = registry.by_name.get(&name) {
            if existing.value_type != value_type {
                return Err(IngestError::TypeConflict {
                    name,
                    existing: existing.value_type,
                    requested: value_type,
                });
            }
            return Ok(existing.clone());
        }

        let signal = Signal::new(registry.next_id, name, value_type);
        // Sent while the registry is locked so the schema precedes any
        // sample that could name this signal
        self.tx
            .send(Command::Register(signal.clone()))
            .map_err(|_| IngestError::Closed)?;
        registry.next_id += 1;
        registry.by_name.insert(signal.name.clone(), signal.clone());

        tracing::debug!(signal_id = signal.id, name = %signal.name, value_type = %signal.value_type, "Signal registered");
        Ok(signal)
    }

    /// Look up a registered signal by name
    pub fn signal(&self, name: &str) -> Option<Signal> {
        self.lock_registry().by_name.get(name).cloned()
    }

    /// Registered signals ordered by id
    pub fn signals(&self) -> Vec<Signal> {
        let mut signals: Vec<Signal> = self.lock_registry().by_name.values().cloned().collect();
        signals.sort_by_key(|s| s.id);
        signals
    }

    /// Queue a sample; never blocks
    ///
    /// Returns false if the overflow policy rejected it or the pipeline is
    /// shut down.
    pub fn insert(&self, signal_id: SignalId, time: i64, value: impl Into<Value>) -> bool {
        let sample = Sample::new(signal_id, time, value);

        if let OverflowPolicy::DropNewest { max_depth } = self.config.overflow {
            if self.counters.depth.load(Ordering::Relaxed) >= max_depth {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(signal_id, "Queue full, sample dropped");
                return false;
            }
        }

        let depth = self.counters.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if self.tx.send(Command::Sample(sample)).is_err() {
            self.counters.depth.fetch_sub(1, Ordering::Relaxed);
            return false;
        }
        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);

        if self.config.queue_warn_threshold > 0 && depth == self.config.queue_warn_threshold {
            tracing::warn!(depth, "Ingestion queue is backing up");
        }
        true
    }

    /// Queue a sample for a signal given by name
    pub fn insert_named(&self, name: &str, time: i64, value: impl Into<Value>) -> bool {
        match self.signal(name) {
            Some(signal) => self.insert(signal.id, time, value),
            None => {
                tracing::warn!(name, "Insert for unregistered signal ignored");
                false
            }
        }
    }

    /// Queue a sample stamped with the current clock
    pub fn insert_now(&self, signal_id: SignalId, value: impl Into<Value>) -> bool {
        self.insert(signal_id, now_micros(), value)
    }

    /// Close every sink and clear the sink set
    ///
    /// Samples queued before this call are written first. The consumer
    /// keeps running; sinks added afterwards start a new session.
    pub async fn finish(&self) -> IngestResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.tx
            .send(Command::Finish(ack_tx))
            .map_err(|_| IngestError::Closed)?;
        ack_rx.await.map_err(|_| IngestError::Closed)
    }

    /// Stop the consumer
    ///
    /// Queued commands are drained, sinks are closed, and the task is
    /// joined. Later calls are no-ops.
    pub async fn shutdown(&self) -> IngestResult<()> {
        self.cancel.cancel();
        let handle = self
            .handle
            .lock()
            .map_err(|_| IngestError::Closed)?
            .take();
        if let Some(handle) = handle {
            handle.await?;
            tracing::info!(stats = %self.stats(), "Ingestion pipeline stopped");
        }
        Ok(())
    }

    /// Subscribe to user-facing notices
    pub fn subscribe_notices(&self) -> broadcast::Receiver<PipelineNotice> {
        self.notices.subscribe()
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            queue_depth: self.counters.depth.load(Ordering::Relaxed),
        }
    }

    fn lock_registry(&self) -> std::sync::MutexGuard<'_, Registry> {
        // The registry holds plain data, a poisoned lock is still usable
        self.registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// State owned by the consumer task
struct Consumer {
    sinks: Vec<Box<dyn Sink>>,
    /// Schema replayed to sinks attached mid-session
    schema: Vec<Signal>,
    types: HashMap<SignalId, ValueType>,
    counters: Arc<Counters>,
    notices: broadcast::Sender<PipelineNotice>,
}

impl Consumer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                command = rx.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = cancel.cancelled() => break,
            }
        }

        // Drain whatever was queued before the stop
        rx.close();
        while let Ok(command) = rx.try_recv() {
            self.handle(command);
        }
        self.close_sinks();
        tracing::debug!("Consumer loop exited");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::AddSink(sink) => self.add_sink(sink),
            Command::Register(signal) => self.register(signal),
            Command::Sample(sample) => {
                self.counters.depth.fetch_sub(1, Ordering::Relaxed);
                self.write(sample);
            }
            Command::Finish(ack) => {
                self.close_sinks();
                let _ = ack.send(());
            }
        }
    }

    fn add_sink(&mut self, mut sink: Box<dyn Sink>) {
        if let Err(e) = sink.open() {
            self.report_failure(sink.name(), "open", &e);
            return;
        }
        for signal in &self.schema {
            if let Err(e) = sink.register_signal(signal) {
                self.report_failure(sink.name(), "register", &e);
            }
        }
        tracing::info!(sink = sink.name(), signals = self.schema.len(), "Sink attached");
        self.sinks.push(sink);
    }

    fn register(&mut self, signal: Signal) {
        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.register_signal(&signal) {
                tracing::error!(sink = sink.name(), signal_id = signal.id, error = %e, "Sink register failed");
                let _ = self.notices.send(PipelineNotice::SinkFailed {
                    sink: sink.name().to_string(),
                    error: e.to_string(),
                });
            }
        }
        self.types.insert(signal.id, signal.value_type);
        self.schema.push(signal);
    }

    fn write(&mut self, sample: Sample) {
        match self.types.get(&sample.signal_id) {
            None => {
                tracing::warn!(signal_id = sample.signal_id, "Sample for unregistered signal dropped");
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Some(&expected) if expected != sample.value.value_type() => {
                tracing::warn!(
                    signal_id = sample.signal_id,
                    expected = %expected,
                    actual = %sample.value.value_type(),
                    "Sample type does not match signal, dropped"
                );
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
            Some(_) => {}
        }

        for sink in self.sinks.iter_mut() {
            if let Err(e) = sink.insert_log(sample.signal_id, sample.time, &sample.value) {
                tracing::error!(sink = sink.name(), signal_id = sample.signal_id, error = %e, "Sink write failed");
                let _ = self.notices.send(PipelineNotice::SinkFailed {
                    sink: sink.name().to_string(),
                    error: e.to_string(),
                });
            }
        }
        self.counters.written.fetch_add(1, Ordering::Relaxed);
    }

    fn close_sinks(&mut self) {
        for mut sink in self.sinks.drain(..) {
            match sink.close() {
                Ok(()) => tracing::info!(sink = sink.name(), "Sink closed"),
                Err(e) => {
                    tracing::error!(sink = sink.name(), error = %e, "Sink close failed");
                    let _ = self.notices.send(PipelineNotice::SinkFailed {
                        sink: sink.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn report_failure(&self, sink: &str, stage: &str, error: &crate::ingest::error::SinkError) {
        tracing::error!(sink, stage, error = %error, "Sink operation failed");
        let _ = self.notices.send(PipelineNotice::SinkFailed {
            sink: sink.to_string(),
            error: error.to_string(),
        });
    }
}
