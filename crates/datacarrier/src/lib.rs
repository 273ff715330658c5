//! DataCarrier - Lock-Free Telemetry Transport
//!
//! Moves telemetry records (spans, metrics, log events) off application
//! threads and onto background workers without ever blocking the caller.
//!
//! # Pieces
//!
//! - [`RotatingCursor`]: lock-free bounded counter handing out slot indices
//! - [`SlotBuffer`]: fixed ring of slots; overwrite or reject when occupied
//! - [`Channels`]: several buffers ("lanes") behind one `offer`, picked by a [`Partitioner`]
//! - [`ConsumerWorker`]: one thread draining many (channels, [`Sink`]) groups
//! - [`ConsumerPool`]: several workers, targets placed on the least-loaded one
//!
//! Producers never wait: `offer` either lands the item or reports `false`
//! right away. Ordering holds only within a lane.
//!
//! # Example
//!
//! ```
//! use datacarrier::{Channels, ChannelsConfig, ConsumerWorker, Sink, SinkError, WorkerConfig};
//! use std::sync::{Arc, Mutex};
//!
//! #[derive(Default)]
//! struct Collect(Mutex<Vec<u64>>);
//!
//! impl Sink<u64> for Collect {
//!     fn consume(&self, batch: &[u64]) -> Result<(), SinkError> {
//!         self.0.lock().unwrap().extend_from_slice(batch);
//!         Ok(())
//!     }
//! }
//!
//! let channels = Arc::new(Channels::new(ChannelsConfig::default()).unwrap());
//! let sink = Arc::new(Collect::default());
//!
//! let worker = ConsumerWorker::new(WorkerConfig::new("example")).unwrap();
//! worker.add_target(Arc::clone(&channels), sink.clone()).unwrap();
//! worker.start().unwrap();
//!
//! for i in 0..10 {
//!     channels.offer(i);
//! }
//!
//! // Final flush delivers anything still buffered
//! worker.shutdown_and_join().unwrap();
//! assert_eq!(sink.0.lock().unwrap().len(), 10);
//! ```

mod backoff;
mod buffer;
mod channels;
mod config;
mod cursor;
mod error;
mod invariants;
mod metrics;
mod partition;
mod pool;
mod sink;
mod strategy;
mod sync;
mod targets;
mod worker;

pub use backoff::{IdleBackoff, IdlePause};
pub use buffer::SlotBuffer;
pub use channels::Channels;
pub use config::{
    ChannelsConfig, IdleStrategy, PoolConfig, WorkerConfig, METRICS_CONFIG, TRACE_SEGMENT_CONFIG,
};
pub use cursor::RotatingCursor;
pub use error::{CarrierError, SinkError};
pub use metrics::{BufferMetrics, BufferMetricsSnapshot, WorkerMetrics, WorkerMetricsSnapshot};
pub use partition::{Partitioner, ProducerThread, RoundRobin};
pub use pool::ConsumerPool;
pub use sink::Sink;
pub use strategy::OverflowStrategy;
pub use targets::{ConsumeTargets, Group};
pub use worker::{ConsumerWorker, Lifecycle, StopAction, WorkerState};
