use crate::{CarrierError, IdleBackoff, IdlePause, OverflowStrategy};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shape of a [`Channels`](crate::Channels) set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ChannelsConfig {
    /// Number of independent lanes (default: 5)
    pub lanes: usize,
    /// Slots per lane (default: 300)
    pub lane_capacity: usize,
    /// Initial overflow strategy for every lane
    pub strategy: OverflowStrategy,
    /// Enable per-lane counters (slight overhead on the producer path)
    pub enable_metrics: bool,
}

impl ChannelsConfig {
    pub const fn new(lanes: usize, lane_capacity: usize, strategy: OverflowStrategy) -> Self {
        Self {
            lanes,
            lane_capacity,
            strategy,
            enable_metrics: false,
        }
    }

    pub const fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    pub const fn with_strategy(mut self, strategy: OverflowStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Slots across all lanes.
    #[inline]
    pub const fn total_capacity(&self) -> usize {
        self.lanes * self.lane_capacity
    }

    pub fn validate(&self) -> Result<(), CarrierError> {
        if self.lanes == 0 {
            return Err(CarrierError::ZeroLanes);
        }
        if self.lane_capacity == 0 {
            return Err(CarrierError::ZeroCapacity);
        }
        Ok(())
    }
}

impl Default for ChannelsConfig {
    fn default() -> Self {
        TRACE_SEGMENT_CONFIG
    }
}

/// Finished trace segments: several lanes, newest data wins.
pub const TRACE_SEGMENT_CONFIG: ChannelsConfig =
    ChannelsConfig::new(5, 300, OverflowStrategy::OverwriteAlways);

/// Periodic metric snapshots: one lane, keep what is already queued.
pub const METRICS_CONFIG: ChannelsConfig =
    ChannelsConfig::new(1, 600, OverflowStrategy::DropIfOccupied);

/// How a worker waits after a cycle in which no group had data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum IdleStrategy {
    /// Sleep for the idle interval straight away.
    #[default]
    Sleep,
    /// Spin, then yield, across the first empty cycles; sleep once the
    /// backoff is exhausted. Data resets the backoff.
    SpinThenSleep,
}

impl IdleStrategy {
    /// Pause to take after an empty cycle, advancing `backoff` when spinning.
    pub fn pause(self, backoff: &mut IdleBackoff) -> IdlePause {
        match self {
            Self::Sleep => IdlePause::Sleep,
            Self::SpinThenSleep => backoff.next_pause(),
        }
    }
}

/// Settings for one [`ConsumerWorker`](crate::ConsumerWorker).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct WorkerConfig {
    /// Thread name, also used in log fields
    pub name: String,
    /// Sleep after an empty cycle (default: 20ms)
    pub idle_interval: Duration,
    /// Initial capacity of the shared scratch batch (default: 2000)
    pub batch_capacity: usize,
    pub idle_strategy: IdleStrategy,
}

impl WorkerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    pub fn with_batch_capacity(mut self, capacity: usize) -> Self {
        self.batch_capacity = capacity;
        self
    }

    pub fn with_idle_strategy(mut self, strategy: IdleStrategy) -> Self {
        self.idle_strategy = strategy;
        self
    }

    pub fn validate(&self) -> Result<(), CarrierError> {
        if self.batch_capacity == 0 {
            return Err(CarrierError::ZeroBatchCapacity);
        }
        Ok(())
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "datacarrier-consumer".to_string(),
            idle_interval: Duration::from_millis(20),
            batch_capacity: 2000,
            idle_strategy: IdleStrategy::Sleep,
        }
    }
}

/// Settings for a [`ConsumerPool`](crate::ConsumerPool).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    pub name: String,
    /// Number of worker threads (default: 1)
    pub workers: usize,
    pub idle_interval: Duration,
    pub batch_capacity: usize,
}

impl PoolConfig {
    pub fn new(name: impl Into<String>, workers: usize) -> Self {
        Self {
            name: name.into(),
            workers,
            ..Self::default()
        }
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval = interval;
        self
    }

    /// Config for the worker at `index`, named `"{name}-{index}"`.
    pub fn worker_config(&self, index: usize) -> WorkerConfig {
        WorkerConfig::new(format!("{}-{}", self.name, index))
            .with_idle_interval(self.idle_interval)
            .with_batch_capacity(self.batch_capacity)
    }

    pub fn validate(&self) -> Result<(), CarrierError> {
        if self.workers == 0 {
            return Err(CarrierError::EmptyPool {
                name: self.name.clone(),
            });
        }
        if self.batch_capacity == 0 {
            return Err(CarrierError::ZeroBatchCapacity);
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        let worker = WorkerConfig::default();
        Self {
            name: "datacarrier-pool".to_string(),
            workers: 1,
            idle_interval: worker.idle_interval,
            batch_capacity: worker.batch_capacity,
        }
    }
}
