//! ContextLog demo session
//!
//! Records a short session from a few simulated producers, then reloads the
//! log and prints what it contains.

use contextlog::codec::{Value, ValueType};
use contextlog::config::Config;
use contextlog::ingest::{Pipeline, PipelineNotice, TransportEvent};
use contextlog::series::TimeSeriesStore;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const SAMPLES_PER_PRODUCER: usize = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut config = Config::load_default();
    config.logging.init_tracing();

    tracing::info!("ContextLog demo session v{}", env!("CARGO_PKG_VERSION"));

    // The demo always writes both encodings
    config.sinks.binary = true;
    config.sinks.text = true;
    std::fs::create_dir_all(&config.sinks.output_dir)?;
    tracing::info!("Output directory: {}", config.sinks.output_dir);

    let pipeline = Arc::new(Pipeline::start(config.pipeline.clone()));
    let notice_task = spawn_notice_logger(&pipeline);
    let broadcast = config.sinks.attach(&pipeline);
    let monitor_task = broadcast.map(|sink| {
        let mut events = sink.subscribe();
        tokio::spawn(async move {
            let mut samples = 0usize;
            while let Ok(event) = events.recv().await {
                if let TransportEvent::Sample { .. } = event {
                    samples += 1;
                }
            }
            tracing::info!(samples, "Broadcast monitor finished");
        })
    });

    let producers = vec![
        spawn_producer(&pipeline, "battery_level", ValueType::Int32, |i| {
            (100 - (i as i32 / 3)).into()
        })?,
        spawn_producer(&pipeline, "uptime_ms", ValueType::Int64, |i| {
            (i as i64 * 20).into()
        })?,
        spawn_producer(&pipeline, "cpu_load", ValueType::Float32, |i| {
            (0.5 + 0.4 * ((i as f32) / 7.0).sin()).into()
        })?,
        spawn_producer(&pipeline, "network", ValueType::Utf8, |i| {
            let network = if (i / 10) % 2 == 0 { "wifi" } else { "cellular" };
            network.into()
        })?,
    ];

    for producer in producers {
        producer.await?;
    }

    pipeline.shutdown().await?;
    tracing::info!("Pipeline stats: {}", pipeline.stats());

    if let Some(task) = monitor_task {
        // Sender side lives in the pipeline's sinks, which are gone now
        if tokio::time::timeout(Duration::from_secs(1), task).await.is_err() {
            tracing::debug!("Broadcast monitor still running, leaving it");
        }
    }
    notice_task.abort();

    let dir = Path::new(&config.sinks.output_dir);
    for file in [
        format!("{}.clog", config.sinks.base_name),
        format!("{}.text.clog", config.sinks.base_name),
    ] {
        print_summary(&dir.join(file))?;
    }

    tracing::info!("ContextLog demo complete");
    Ok(())
}

fn spawn_producer(
    pipeline: &Arc<Pipeline>,
    name: &str,
    value_type: ValueType,
    value_at: fn(usize) -> Value,
) -> anyhow::Result<tokio::task::JoinHandle<()>> {
    let signal = pipeline.register_signal(name, value_type)?;
    let pipeline = Arc::clone(pipeline);

    Ok(tokio::spawn(async move {
        for i in 0..SAMPLES_PER_PRODUCER {
            if !pipeline.insert_now(signal.id, value_at(i)) {
                tracing::warn!(signal = %signal.name, "Sample rejected");
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        tracing::debug!(signal = %signal.name, "Producer done");
    }))
}

fn spawn_notice_logger(pipeline: &Pipeline) -> tokio::task::JoinHandle<()> {
    let mut notices = pipeline.subscribe_notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match notice {
                PipelineNotice::SinkExcluded { sink, reason } => {
                    tracing::warn!(%sink, %reason, "Sink excluded");
                }
                PipelineNotice::SinkFailed { sink, error } => {
                    tracing::error!(%sink, %error, "Sink failed");
                }
            }
        }
    })
}

fn print_summary(path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Log not found, skipping");
        return Ok(());
    }

    let store = TimeSeriesStore::load(path)?;
    println!("{} (start {})", path.display(), store.start_time());
    for series in store.series() {
        let signal = series.signal();
        let summary = series.summary();
        println!(
            "  {:<16} {:<6} samples={:<4} time=[{}, {}] value=[{}, {}] max_diff={}",
            signal.name,
            signal.value_type,
            series.len(),
            summary.min_time,
            summary.max_time,
            summary.min_value,
            summary.max_value,
            summary.max_diff
        );
    }
    Ok(())
}
