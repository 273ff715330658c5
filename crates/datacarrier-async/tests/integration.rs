//! Integration tests for datacarrier-async.

use datacarrier::{Channels, ChannelsConfig, OverflowStrategy, WorkerConfig, WorkerState};
use datacarrier_async::{batch_channel, AsyncConsumerWorker};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tokio_stream::StreamExt;

fn fast_config(name: &str) -> WorkerConfig {
    WorkerConfig::new(name).with_idle_interval(Duration::from_millis(2))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_thread_producers_into_async_stream() {
    let config = ChannelsConfig::new(3, 512, OverflowStrategy::DropIfOccupied);
    let channels = Arc::new(Channels::<(usize, u32)>::new(config).unwrap());
    let (sink, mut batches) = batch_channel(1024);

    let worker = AsyncConsumerWorker::new(fast_config("bridge")).unwrap();
    worker.add_target(Arc::clone(&channels), Arc::new(sink)).unwrap();
    worker.start().unwrap();

    let collector = tokio::spawn(async move {
        let mut seen = HashSet::new();
        while let Some(batch) = batches.next().await {
            seen.extend(batch);
        }
        seen
    });

    let producers: Vec<_> = (0..3)
        .map(|id| {
            let ch = Arc::clone(&channels);
            thread::spawn(move || (0..300u32).filter(|&i| ch.offer((id, i))).map(|i| (id, i)).collect::<Vec<_>>())
        })
        .collect();
    let accepted: HashSet<(usize, u32)> = producers
        .into_iter()
        .flat_map(|p| p.join().unwrap())
        .collect();

    worker.shutdown_and_join().await.unwrap();
    assert_eq!(worker.metrics().sink_errors, 0);
    // Dropping the worker releases the last handle on the sink, ending the stream
    drop(worker);
    let seen = collector.await.unwrap();

    assert_eq!(seen, accepted);
}

#[tokio::test]
async fn test_stalled_stream_reports_errors_and_keeps_running() {
    let channels = Arc::new(Channels::<u32>::new(ChannelsConfig::new(1, 8, OverflowStrategy::OverwriteAlways)).unwrap());
    // Never read: one batch fits, the rest are transport errors
    let (sink, _batches) = batch_channel(1);

    let worker = AsyncConsumerWorker::new(fast_config("stalled")).unwrap();
    worker.add_target(Arc::clone(&channels), Arc::new(sink)).unwrap();
    worker.start().unwrap();

    for round in 0..3 {
        channels.offer(round);
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(worker.state(), WorkerState::Running);
    worker.shutdown_and_join().await.unwrap();
    assert!(worker.metrics().sink_errors >= 2);
}

#[tokio::test]
async fn test_register_while_running() {
    let worker = AsyncConsumerWorker::<u32>::new(fast_config("hot")).unwrap();
    worker.start().unwrap();

    let mut streams = Vec::new();
    for _ in 0..3 {
        let ch = Arc::new(Channels::new(ChannelsConfig::new(2, 10, OverflowStrategy::DropIfOccupied)).unwrap());
        let (sink, stream) = batch_channel(8);
        worker.add_target(Arc::clone(&ch), Arc::new(sink)).unwrap();
        ch.offer(7);
        streams.push((ch, stream));
    }
    assert_eq!(worker.size(), 60);

    for (_, stream) in &mut streams {
        let batch = tokio::time::timeout(Duration::from_secs(2), stream.next())
            .await
            .expect("late group was never drained");
        assert_eq!(batch, Some(vec![7]));
    }
    worker.shutdown_and_join().await.unwrap();
}
