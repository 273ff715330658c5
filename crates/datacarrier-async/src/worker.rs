use crate::AsyncWorkerError;
use datacarrier::{
    CarrierError, Channels, ConsumeTargets, IdleBackoff, IdlePause, Lifecycle, Sink, StopAction,
    WorkerConfig, WorkerMetrics, WorkerMetricsSnapshot, WorkerState,
};
use std::hint;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info};

#[derive(Debug)]
struct Shared {
    lifecycle: Lifecycle,
    /// Ends an idle wait early. A permit left by `notify_one` is picked up by
    /// the next wait, so a signal sent mid-cycle is never lost.
    notify: Notify,
    metrics: WorkerMetrics,
}

/// Consumer worker that runs as a Tokio task instead of a dedicated thread.
///
/// Same cycle and shutdown semantics as [`datacarrier::ConsumerWorker`]; the
/// idle wait is a `sleep` raced against a wake signal. Sinks are called on
/// the runtime's worker thread, so they should hand batches off rather than
/// block (see [`ChannelSink`](crate::ChannelSink)).
pub struct AsyncConsumerWorker<T: Send + 'static> {
    config: WorkerConfig,
    targets: Arc<ConsumeTargets<T>>,
    shared: Arc<Shared>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> AsyncConsumerWorker<T> {
    pub fn new(config: WorkerConfig) -> Result<Self, AsyncWorkerError> {
        config.validate()?;
        Ok(Self {
            targets: Arc::new(ConsumeTargets::new(config.name.clone())),
            shared: Arc::new(Shared {
                lifecycle: Lifecycle::new(),
                notify: Notify::new(),
                metrics: WorkerMetrics::new(),
            }),
            task: Mutex::new(None),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> WorkerState {
        self.shared.lifecycle.state()
    }

    pub fn add_target(&self, channels: Arc<Channels<T>>, sink: Arc<dyn Sink<T>>) -> Result<(), AsyncWorkerError> {
        self.targets.add(channels, sink)?;
        Ok(())
    }

    pub fn size(&self) -> u64 {
        self.targets.size()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Spawns the consume task on the current runtime.
    pub fn start(&self) -> Result<(), AsyncWorkerError> {
        let runtime = Handle::try_current().map_err(|source| AsyncWorkerError::NoRuntime {
            name: self.config.name.clone(),
            source,
        })?;
        if !self.shared.lifecycle.begin() {
            return Err(CarrierError::AlreadyStarted(self.config.name.clone()).into());
        }

        let task = runtime.spawn(run(
            self.config.clone(),
            Arc::clone(&self.targets),
            Arc::clone(&self.shared),
        ));
        *self.task_slot() = Some(task);
        Ok(())
    }

    /// Requests a stop. Idempotent; a never-started worker flushes inline.
    pub fn shutdown(&self) {
        match self.shared.lifecycle.request_stop() {
            StopAction::FlushInline => {
                let mut scratch = Vec::with_capacity(self.config.batch_capacity);
                self.targets.close_and_flush(&mut scratch, &self.shared.metrics);
                self.shared.lifecycle.terminate();
            }
            StopAction::Signal => {
                debug!(worker = %self.config.name, "shutdown requested");
                self.shared.notify.notify_one();
            }
            StopAction::Nothing => {}
        }
    }

    /// Cuts the current idle wait short.
    pub fn wake(&self) {
        self.shared.notify.notify_one();
    }

    /// Waits for the consume task to finish its final flush.
    pub async fn join(&self) -> Result<(), AsyncWorkerError> {
        let task = self.task_slot().take();
        match task {
            Some(task) => task.await.map_err(|source| AsyncWorkerError::TaskFailed {
                name: self.config.name.clone(),
                source,
            }),
            None => Ok(()),
        }
    }

    pub async fn shutdown_and_join(&self) -> Result<(), AsyncWorkerError> {
        self.shutdown();
        self.join().await
    }

    fn task_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> Drop for AsyncConsumerWorker<T> {
    fn drop(&mut self) {
        // The task owns its own handles and finishes the flush on its own
        self.shutdown();
    }
}

impl<T: Send + 'static> std::fmt::Debug for AsyncConsumerWorker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncConsumerWorker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("targets", &self.targets)
            .finish()
    }
}

async fn run<T: Send>(config: WorkerConfig, targets: Arc<ConsumeTargets<T>>, shared: Arc<Shared>) {
    info!(worker = %config.name, idle_ms = config.idle_interval.as_millis() as u64, "async consumer worker started");

    let mut scratch = Vec::with_capacity(config.batch_capacity);
    let mut backoff = IdleBackoff::new();
    while shared.lifecycle.is_running() {
        if targets.drain_cycle(&mut scratch, &shared.metrics) {
            backoff.reset();
            // Let other tasks run between busy cycles
            tokio::task::yield_now().await;
            continue;
        }

        match config.idle_strategy.pause(&mut backoff) {
            IdlePause::Spin(n) => (0..n).for_each(|_| hint::spin_loop()),
            IdlePause::Yield => tokio::task::yield_now().await,
            IdlePause::Sleep => {
                tokio::select! {
                    () = tokio::time::sleep(config.idle_interval) => {}
                    () = shared.notify.notified() => {}
                }
            }
        }
    }

    let exited = targets.close_and_flush(&mut scratch, &shared.metrics);
    shared.lifecycle.terminate();
    info!(worker = %config.name, groups = exited, "async consumer worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use datacarrier::{ChannelsConfig, IdleStrategy, OverflowStrategy, SinkError};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        items: AtomicUsize,
        exits: AtomicUsize,
    }

    impl Sink<u32> for Counting {
        fn consume(&self, batch: &[u32]) -> Result<(), SinkError> {
            self.items.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }

        fn on_exit(&self) {
            self.exits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn channels() -> Arc<Channels<u32>> {
        Arc::new(Channels::new(ChannelsConfig::new(2, 32, OverflowStrategy::DropIfOccupied)).unwrap())
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let worker = AsyncConsumerWorker::<u32>::new(WorkerConfig::new("no-rt")).unwrap();
        assert!(matches!(worker.start(), Err(AsyncWorkerError::NoRuntime { .. })));
        assert_eq!(worker.state(), WorkerState::Created);
    }

    #[tokio::test]
    async fn test_delivers_and_flushes_on_shutdown() {
        let worker = AsyncConsumerWorker::new(
            WorkerConfig::new("async-deliver").with_idle_interval(Duration::from_millis(5)),
        )
        .unwrap();
        let ch = channels();
        let sink = Arc::new(Counting::default());
        worker.add_target(Arc::clone(&ch), sink.clone()).unwrap();
        worker.start().unwrap();

        for i in 0..20 {
            assert!(ch.offer(i));
        }
        worker.shutdown_and_join().await.unwrap();

        assert_eq!(sink.items.load(Ordering::SeqCst), 20);
        assert_eq!(sink.exits.load(Ordering::SeqCst), 1);
        assert_eq!(worker.state(), WorkerState::Terminated);
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let worker = AsyncConsumerWorker::<u32>::new(WorkerConfig::new("twice")).unwrap();
        worker.start().unwrap();
        assert!(matches!(
            worker.start(),
            Err(AsyncWorkerError::Carrier(CarrierError::AlreadyStarted(_)))
        ));
        worker.shutdown_and_join().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_long_idle() {
        let worker = AsyncConsumerWorker::<u32>::new(
            WorkerConfig::new("sleepy").with_idle_interval(Duration::from_secs(3600)),
        )
        .unwrap();
        worker.start().unwrap();
        tokio::task::yield_now().await;

        tokio::time::timeout(Duration::from_secs(5), worker.shutdown_and_join())
            .await
            .expect("shutdown must not wait out the idle interval")
            .unwrap();
    }

    #[test]
    fn test_never_started_flushes_inline() {
        let worker = AsyncConsumerWorker::new(WorkerConfig::new("inline")).unwrap();
        let ch = channels();
        let sink = Arc::new(Counting::default());
        worker.add_target(Arc::clone(&ch), sink.clone()).unwrap();
        ch.offer(1);

        worker.shutdown();
        assert_eq!(sink.items.load(Ordering::SeqCst), 1);
        assert_eq!(sink.exits.load(Ordering::SeqCst), 1);
        assert_eq!(worker.state(), WorkerState::Terminated);
    }

    async fn wait_for_idle_cycles<T: Send + 'static>(worker: &AsyncConsumerWorker<T>, at_least: u64) {
        tokio::time::timeout(Duration::from_secs(2), async {
            while worker.metrics().idle_cycles < at_least {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .expect("worker did not reach the expected idle cycle count");
    }

    #[tokio::test]
    async fn test_spin_then_sleep_backs_off_before_sleeping() {
        let worker = AsyncConsumerWorker::<u32>::new(
            WorkerConfig::new("spinny")
                .with_idle_interval(Duration::from_secs(3600))
                .with_idle_strategy(IdleStrategy::SpinThenSleep),
        )
        .unwrap();
        worker.start().unwrap();

        // Every busy pause is its own idle cycle; the last one enters the hour-long sleep
        wait_for_idle_cycles(&worker, u64::from(IdleBackoff::busy_pauses()) + 1).await;

        tokio::time::timeout(Duration::from_secs(5), worker.shutdown_and_join())
            .await
            .expect("shutdown must interrupt the sleep after backoff")
            .unwrap();
        assert_eq!(worker.state(), WorkerState::Terminated);
    }

    #[tokio::test]
    async fn test_sleep_strategy_sleeps_on_first_idle_cycle() {
        let worker = AsyncConsumerWorker::<u32>::new(
            WorkerConfig::new("straight-to-sleep")
                .with_idle_interval(Duration::from_secs(3600))
                .with_idle_strategy(IdleStrategy::Sleep),
        )
        .unwrap();
        worker.start().unwrap();

        wait_for_idle_cycles(&worker, 1).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(worker.metrics().idle_cycles, 1);

        worker.shutdown_and_join().await.unwrap();
    }
}
