use crate::{CarrierError, Channels, ConsumerWorker, PoolConfig, Sink, WorkerMetricsSnapshot};
use std::sync::Arc;
use tracing::{debug, info};

/// A fixed set of [`ConsumerWorker`]s sharing the consumption of many groups.
///
/// Each new target goes to the worker currently carrying the least
/// registered capacity ([`ConsumerWorker::size`]).
pub struct ConsumerPool<T: Send + 'static> {
    name: String,
    workers: Vec<ConsumerWorker<T>>,
}

impl<T: Send + 'static> ConsumerPool<T> {
    pub fn new(config: PoolConfig) -> Result<Self, CarrierError> {
        config.validate()?;
        let workers = (0..config.workers)
            .map(|i| ConsumerWorker::new(config.worker_config(i)))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name,
            workers,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a group on the least-loaded worker and returns that
    /// worker's index.
    pub fn add_target(&self, channels: Arc<Channels<T>>, sink: Arc<dyn Sink<T>>) -> Result<usize, CarrierError> {
        let (index, worker) = self
            .workers
            .iter()
            .enumerate()
            .min_by_key(|(_, w)| w.size())
            .ok_or_else(|| CarrierError::EmptyPool {
                name: self.name.clone(),
            })?;

        worker.add_target(channels, sink)?;
        debug!(pool = %self.name, worker = %worker.name(), size = worker.size(), "assigned consume target");
        Ok(index)
    }

    /// Starts every worker.
    pub fn begin(&self) -> Result<(), CarrierError> {
        for worker in &self.workers {
            worker.start()?;
        }
        info!(pool = %self.name, workers = self.workers.len(), "consumer pool started");
        Ok(())
    }

    /// Signals every worker to stop, then waits for all of them. Each sink
    /// gets its final flush and one `on_exit` before this returns.
    pub fn close(&self) -> Result<(), CarrierError> {
        for worker in &self.workers {
            worker.shutdown();
        }
        let mut first_err = None;
        for worker in &self.workers {
            if let Err(e) = worker.join() {
                first_err.get_or_insert(e);
            }
        }
        info!(pool = %self.name, "consumer pool closed");
        first_err.map_or(Ok(()), Err)
    }

    pub fn workers(&self) -> &[ConsumerWorker<T>] {
        &self.workers
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Worker metrics summed across the pool.
    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.workers.iter().map(ConsumerWorker::metrics).fold(
            WorkerMetricsSnapshot::default(),
            |mut acc, m| {
                acc.cycles += m.cycles;
                acc.idle_cycles += m.idle_cycles;
                acc.batches += m.batches;
                acc.items += m.items;
                acc.sink_errors += m.sink_errors;
                acc
            },
        )
    }
}

impl<T: Send + 'static> std::fmt::Debug for ConsumerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumerPool")
            .field("name", &self.name)
            .field("workers", &self.workers)
            .finish()
    }
}
