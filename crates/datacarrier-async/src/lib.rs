//! Tokio integration for datacarrier.
//!
//! - [`AsyncConsumerWorker`]: consumer worker running as a Tokio task
//! - [`ChannelSink`] / [`batch_channel`]: forward drained batches into a
//!   bounded async stream
//!
//! Producers keep using the synchronous, non-blocking
//! [`Channels::offer`](datacarrier::Channels::offer); only the consuming side
//! moves onto the runtime.
//!
//! # Example
//!
//! ```no_run
//! use datacarrier::{Channels, ChannelsConfig, WorkerConfig};
//! use datacarrier_async::{batch_channel, AsyncConsumerWorker};
//! use std::sync::Arc;
//! use tokio_stream::StreamExt;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let channels = Arc::new(Channels::<String>::new(ChannelsConfig::default())?);
//! let (sink, mut batches) = batch_channel(16);
//!
//! let worker = AsyncConsumerWorker::new(WorkerConfig::new("segments"))?;
//! worker.add_target(Arc::clone(&channels), Arc::new(sink))?;
//! worker.start()?;
//!
//! channels.offer("segment".to_string());
//! if let Some(batch) = batches.next().await {
//!     println!("exporting {} segments", batch.len());
//! }
//! worker.shutdown_and_join().await?;
//! # Ok(())
//! # }
//! ```

mod bridge;
mod error;
mod worker;

pub use bridge::{batch_channel, BatchStream, ChannelSink};
pub use error::AsyncWorkerError;
pub use worker::AsyncConsumerWorker;
