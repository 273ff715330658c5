//! End-to-end demo: producer threads offer segments, an async worker drains
//! them, and an exporter task consumes the batch stream.
//!
//! Run with: `RUST_LOG=debug cargo run -p datacarrier-async --bin demo`

use datacarrier::{Channels, WorkerConfig, METRICS_CONFIG, TRACE_SEGMENT_CONFIG};
use datacarrier_async::{batch_channel, AsyncConsumerWorker};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct Segment {
    producer: usize,
    seq: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let segments = Arc::new(Channels::<Segment>::new(TRACE_SEGMENT_CONFIG.with_metrics(true))?);
    let meter_readings = Arc::new(Channels::<f64>::new(METRICS_CONFIG.with_metrics(true))?);

    let (segment_sink, mut segment_batches) = batch_channel(64);
    let (metric_sink, mut metric_batches) = batch_channel(64);

    let worker = AsyncConsumerWorker::new(WorkerConfig::new("demo-consumer").with_idle_interval(Duration::from_millis(10)))?;
    worker.add_target(Arc::clone(&segments), Arc::new(segment_sink))?;
    worker.add_target(Arc::clone(&meter_readings), Arc::new(metric_sink))?;
    info!(size = worker.size(), groups = worker.target_count(), "targets registered");
    worker.start()?;

    let exporter = tokio::spawn(async move {
        let (mut spans, mut metrics) = (0usize, 0usize);
        loop {
            tokio::select! {
                Some(batch) = segment_batches.next() => {
                    spans += batch.len();
                    if let Some(last) = batch.last() {
                        info!(batch = batch.len(), last_producer = last.producer, last_seq = last.seq, "exported segments");
                    }
                }
                Some(batch) = metric_batches.next() => {
                    metrics += batch.len();
                    info!(batch = batch.len(), "exported metric readings");
                }
                else => break,
            }
        }
        (spans, metrics)
    });

    let producers: Vec<_> = (0..4)
        .map(|producer| {
            let segments = Arc::clone(&segments);
            let readings = Arc::clone(&meter_readings);
            thread::spawn(move || {
                for seq in 0..5_000 {
                    segments.offer(Segment { producer, seq });
                    if seq % 50 == 0 {
                        readings.offer(seq as f64 / 50.0);
                    }
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().map_err(|_| "producer thread panicked")?;
    }

    worker.shutdown_and_join().await?;
    let worker_metrics = worker.metrics();
    drop(worker);
    let (spans, metrics) = exporter.await?;

    let seg = segments.metrics();
    let met = meter_readings.metrics();
    info!(
        saved = seg.saved,
        overwritten = seg.overwritten,
        exported = spans,
        "segment channel summary"
    );
    info!(saved = met.saved, rejected = met.rejected, exported = metrics, "metric channel summary");
    info!(
        cycles = worker_metrics.cycles,
        batches = worker_metrics.batches,
        sink_errors = worker_metrics.sink_errors,
        "worker summary"
    );
    Ok(())
}
