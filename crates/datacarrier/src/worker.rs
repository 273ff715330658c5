use crate::{
    CarrierError, Channels, ConsumeTargets, IdleBackoff, IdlePause, Sink, WorkerConfig,
    WorkerMetrics, WorkerMetricsSnapshot,
};
use std::hint;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info};

/// Lifecycle of a consumer worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Built, accepting targets, no thread yet
    Created = 0,
    /// Thread is cycling over its groups
    Running = 1,
    /// Stop requested; the final flush is pending or in progress
    Stopping = 2,
    /// Final flush done and every sink exited
    Terminated = 3,
}

impl TryFrom<u8> for WorkerState {
    type Error = u8;

    fn try_from(raw: u8) -> Result<Self, Self::Error> {
        match raw {
            0 => Ok(Self::Created),
            1 => Ok(Self::Running),
            2 => Ok(Self::Stopping),
            3 => Ok(Self::Terminated),
            other => Err(other),
        }
    }
}

/// What the caller of [`Lifecycle::request_stop`] has to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopAction {
    /// Never started: run the final flush on the calling thread, then
    /// [`terminate`](Lifecycle::terminate)
    FlushInline,
    /// Running: wake the worker so it sees `Stopping` and flushes
    Signal,
    /// A stop was already requested
    Nothing,
}

/// Atomic [`WorkerState`] cell with the transitions every worker flavour
/// shares. Only `Lifecycle` writes the state.
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(WorkerState::Created as u8),
        }
    }

    #[inline]
    pub fn state(&self) -> WorkerState {
        // Only valid discriminants are ever stored
        WorkerState::try_from(self.state.load(Ordering::Acquire)).unwrap_or(WorkerState::Terminated)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.state() == WorkerState::Running
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// `Created -> Running`. Returns `false` if the worker was already
    /// started or stopped.
    pub fn begin(&self) -> bool {
        self.transition(WorkerState::Created, WorkerState::Running)
    }

    /// Rolls back a [`begin`](Self::begin) whose spawn failed. Returns `false`
    /// if a stop was requested in between; the caller then owes the inline flush.
    pub fn abort_begin(&self) -> bool {
        self.transition(WorkerState::Running, WorkerState::Created)
    }

    /// Moves towards `Stopping`. Idempotent.
    pub fn request_stop(&self) -> StopAction {
        loop {
            match self.state() {
                WorkerState::Created => {
                    if self.transition(WorkerState::Created, WorkerState::Stopping) {
                        return StopAction::FlushInline;
                    }
                }
                WorkerState::Running => {
                    if self.transition(WorkerState::Running, WorkerState::Stopping) {
                        return StopAction::Signal;
                    }
                }
                WorkerState::Stopping | WorkerState::Terminated => return StopAction::Nothing,
            }
        }
    }

    /// Marks the final flush as done.
    pub fn terminate(&self) {
        self.state
            .store(WorkerState::Terminated as u8, Ordering::Release);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

/// State shared between the handle and the worker thread.
#[derive(Debug)]
struct Shared {
    lifecycle: Lifecycle,
    metrics: WorkerMetrics,
}

/// One background thread draining any number of (channels, sink) groups.
///
/// Each cycle walks every group, drains all lanes into a shared scratch batch
/// and hands non-empty batches to the group's sink. A cycle where no group
/// had data is followed by an idle wait. A sink error is reported to that
/// sink's `on_error` and never stops the worker.
///
/// ```no_run
/// use datacarrier::{Channels, ChannelsConfig, ConsumerWorker, Sink, SinkError, WorkerConfig};
/// use std::sync::Arc;
///
/// struct Print;
/// impl Sink<String> for Print {
///     fn consume(&self, batch: &[String]) -> Result<(), SinkError> {
///         println!("{batch:?}");
///         Ok(())
///     }
/// }
///
/// let channels = Arc::new(Channels::new(ChannelsConfig::default()).unwrap());
/// let worker = ConsumerWorker::new(WorkerConfig::new("segments")).unwrap();
/// worker.add_target(Arc::clone(&channels), Arc::new(Print)).unwrap();
/// worker.start().unwrap();
///
/// channels.offer("span".to_string());
/// worker.shutdown_and_join().unwrap();
/// ```
pub struct ConsumerWorker<T: Send + 'static> {
    config: WorkerConfig,
    targets: Arc<ConsumeTargets<T>>,
    shared: Arc<Shared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + 'static> ConsumerWorker<T> {
    pub fn new(config: WorkerConfig) -> Result<Self, CarrierError> {
        config.validate()?;
        Ok(Self {
            targets: Arc::new(ConsumeTargets::new(config.name.clone())),
            shared: Arc::new(Shared {
                lifecycle: Lifecycle::new(),
                metrics: WorkerMetrics::new(),
            }),
            handle: Mutex::new(None),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn state(&self) -> WorkerState {
        self.shared.lifecycle.state()
    }

    /// Registers a group. Safe while running; the next cycle sees it.
    pub fn add_target(&self, channels: Arc<Channels<T>>, sink: Arc<dyn Sink<T>>) -> Result<(), CarrierError> {
        self.targets.add(channels, sink)
    }

    /// Aggregate lane capacity across registered groups.
    pub fn size(&self) -> u64 {
        self.targets.size()
    }

    pub fn target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Spawns the worker thread. Valid once, from `Created`.
    pub fn start(&self) -> Result<(), CarrierError> {
        if !self.shared.lifecycle.begin() {
            return Err(CarrierError::AlreadyStarted(self.config.name.clone()));
        }

        let config = self.config.clone();
        let targets = Arc::clone(&self.targets);
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.config.name.clone())
            .spawn(move || run(config, targets, shared));

        match spawned {
            Ok(handle) => {
                *self.handle_slot() = Some(handle);
                Ok(())
            }
            Err(source) => {
                // A shutdown that raced the failed spawn still owes the sinks their exit
                if !self.shared.lifecycle.abort_begin() {
                    self.flush_inline();
                }
                Err(CarrierError::Spawn {
                    name: self.config.name.clone(),
                    source,
                })
            }
        }
    }

    /// Asks the worker to stop. Idempotent.
    ///
    /// A running worker finishes its current cycle, flushes every group once
    /// and exits every sink. A worker that was never started does that
    /// flush inline on the calling thread.
    pub fn shutdown(&self) {
        match self.shared.lifecycle.request_stop() {
            StopAction::FlushInline => self.flush_inline(),
            StopAction::Signal => {
                debug!(worker = %self.config.name, "shutdown requested");
                self.wake();
            }
            StopAction::Nothing => {}
        }
    }

    /// Cuts the current idle sleep short without stopping the worker.
    pub fn wake(&self) {
        if let Some(handle) = self.handle_slot().as_ref() {
            handle.thread().unpark();
        }
    }

    /// Waits for the worker thread to end. Returns immediately if it was
    /// never started or was already joined.
    pub fn join(&self) -> Result<(), CarrierError> {
        let handle = self.handle_slot().take();
        match handle {
            Some(handle) => handle
                .join()
                .map_err(|_| CarrierError::WorkerPanicked(self.config.name.clone())),
            None => Ok(()),
        }
    }

    pub fn shutdown_and_join(&self) -> Result<(), CarrierError> {
        self.shutdown();
        self.join()
    }

    fn flush_inline(&self) {
        let mut scratch = Vec::with_capacity(self.config.batch_capacity);
        self.targets.close_and_flush(&mut scratch, &self.shared.metrics);
        self.shared.lifecycle.terminate();
    }

    fn handle_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Send + 'static> Drop for ConsumerWorker<T> {
    fn drop(&mut self) {
        self.shutdown();
        let _ = self.join();
    }
}

impl<T: Send + 'static> std::fmt::Debug for ConsumerWorker<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerWorker")
            .field("name", &self.config.name)
            .field("state", &self.state())
            .field("targets", &self.targets)
            .finish()
    }
}

fn run<T: Send>(config: WorkerConfig, targets: Arc<ConsumeTargets<T>>, shared: Arc<Shared>) {
    info!(worker = %config.name, idle_ms = config.idle_interval.as_millis() as u64, "consumer worker started");

    let mut scratch = Vec::with_capacity(config.batch_capacity);
    let mut backoff = IdleBackoff::new();

    while shared.lifecycle.is_running() {
        if targets.drain_cycle(&mut scratch, &shared.metrics) {
            backoff.reset();
            continue;
        }

        match config.idle_strategy.pause(&mut backoff) {
            IdlePause::Spin(n) => (0..n).for_each(|_| hint::spin_loop()),
            IdlePause::Yield => thread::yield_now(),
            // An unpark (shutdown, wake, or spurious) just ends the wait early
            IdlePause::Sleep => thread::park_timeout(config.idle_interval),
        }
    }

    let exited = targets.close_and_flush(&mut scratch, &shared.metrics);
    shared.lifecycle.terminate();
    info!(worker = %config.name, groups = exited, "consumer worker stopped");
}

#[cfg(all(test, not(feature = "loom")))]
mod tests {
    use super::*;
    use crate::{ChannelsConfig, IdleStrategy, OverflowStrategy, SinkError};
    use std::sync::atomic::AtomicUsize;
    use std::time::{Duration, Instant};

    #[derive(Default)]
    struct Counting {
        items: AtomicUsize,
        exits: AtomicUsize,
    }

    impl Sink<u64> for Counting {
        fn consume(&self, batch: &[u64]) -> Result<(), SinkError> {
            self.items.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }

        fn on_exit(&self) {
            self.exits.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_config(name: &str) -> WorkerConfig {
        WorkerConfig::new(name).with_idle_interval(Duration::from_millis(5))
    }

    fn channels() -> Arc<Channels<u64>> {
        Arc::new(Channels::new(ChannelsConfig::new(2, 64, OverflowStrategy::DropIfOccupied)).unwrap())
    }

    fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        done()
    }

    #[test]
    fn test_lifecycle_states() {
        let worker = ConsumerWorker::<u64>::new(fast_config("lifecycle")).unwrap();
        assert_eq!(worker.state(), WorkerState::Created);

        worker.start().unwrap();
        assert_eq!(worker.state(), WorkerState::Running);
        assert!(matches!(worker.start(), Err(CarrierError::AlreadyStarted(_))));

        worker.shutdown();
        worker.shutdown(); // idempotent
        worker.join().unwrap();
        assert_eq!(worker.state(), WorkerState::Terminated);
    }

    #[test]
    fn test_running_worker_delivers() {
        let worker = ConsumerWorker::new(fast_config("deliver")).unwrap();
        let ch = channels();
        let sink = Arc::new(Counting::default());
        worker.add_target(Arc::clone(&ch), sink.clone()).unwrap();
        worker.start().unwrap();

        for i in 0..50 {
            assert!(ch.offer(i));
        }
        assert!(wait_until(Duration::from_secs(2), || sink.items.load(Ordering::SeqCst) == 50));

        worker.shutdown_and_join().unwrap();
        assert_eq!(sink.exits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_before_start_flushes_inline() {
        let worker = ConsumerWorker::new(fast_config("never-started")).unwrap();
        let ch = channels();
        let sink = Arc::new(Counting::default());
        worker.add_target(Arc::clone(&ch), sink.clone()).unwrap();
        ch.offer(1);
        ch.offer(2);

        worker.shutdown();
        assert_eq!(worker.state(), WorkerState::Terminated);
        assert_eq!(sink.items.load(Ordering::SeqCst), 2);
        assert_eq!(sink.exits.load(Ordering::SeqCst), 1);
        assert!(matches!(worker.start(), Err(CarrierError::AlreadyStarted(_))));
    }

    #[test]
    fn test_long_idle_interval_still_stops_promptly() {
        let config = WorkerConfig::new("sleepy").with_idle_interval(Duration::from_secs(30));
        let worker = ConsumerWorker::<u64>::new(config).unwrap();
        worker.start().unwrap();
        thread::sleep(Duration::from_millis(20));

        let start = Instant::now();
        worker.shutdown_and_join().unwrap();
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_spin_then_sleep_strategy() {
        let config = fast_config("spinner").with_idle_strategy(IdleStrategy::SpinThenSleep);
        let worker = ConsumerWorker::new(config).unwrap();
        let ch = channels();
        let sink = Arc::new(Counting::default());
        worker.add_target(Arc::clone(&ch), sink.clone()).unwrap();
        worker.start().unwrap();

        ch.offer(9);
        assert!(wait_until(Duration::from_secs(2), || sink.items.load(Ordering::SeqCst) == 1));
        worker.shutdown_and_join().unwrap();
        assert!(worker.metrics().idle_cycles > 0);
    }

    #[test]
    fn test_spin_then_sleep_burns_backoff_before_sleeping() {
        // With an hour-long sleep, every idle cycle past the first comes from the backoff
        let config = WorkerConfig::new("backoff")
            .with_idle_interval(Duration::from_secs(3600))
            .with_idle_strategy(IdleStrategy::SpinThenSleep);
        let worker = ConsumerWorker::<u64>::new(config).unwrap();
        worker.start().unwrap();

        let busy = u64::from(IdleBackoff::busy_pauses());
        assert!(wait_until(Duration::from_secs(2), || worker.metrics().idle_cycles > busy));
        worker.shutdown_and_join().unwrap();
    }

    #[test]
    fn test_lifecycle_transitions() {
        let lc = Lifecycle::new();
        assert_eq!(lc.state(), WorkerState::Created);
        assert!(lc.begin());
        assert!(!lc.begin());
        assert!(lc.is_running());

        assert_eq!(lc.request_stop(), StopAction::Signal);
        assert_eq!(lc.request_stop(), StopAction::Nothing);
        assert!(!lc.abort_begin());
        lc.terminate();
        assert_eq!(lc.state(), WorkerState::Terminated);

        let never = Lifecycle::new();
        assert_eq!(never.request_stop(), StopAction::FlushInline);
        assert!(!never.begin());
    }

    #[test]
    fn test_state_from_raw() {
        for state in [
            WorkerState::Created,
            WorkerState::Running,
            WorkerState::Stopping,
            WorkerState::Terminated,
        ] {
            assert_eq!(WorkerState::try_from(state as u8), Ok(state));
        }
        assert_eq!(WorkerState::try_from(9), Err(9));
    }

    #[test]
    fn test_drop_flushes() {
        let ch = channels();
        let sink = Arc::new(Counting::default());
        {
            let worker = ConsumerWorker::new(fast_config("dropped")).unwrap();
            worker.add_target(Arc::clone(&ch), sink.clone()).unwrap();
            worker.start().unwrap();
            ch.offer(3);
        }
        assert_eq!(sink.items.load(Ordering::SeqCst), 1);
        assert_eq!(sink.exits.load(Ordering::SeqCst), 1);
    }
}
