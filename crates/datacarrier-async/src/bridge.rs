//! Hand-off from a consumer worker into async code.
//!
//! [`ChannelSink`] forwards each drained batch into a bounded Tokio channel
//! without blocking the worker; the receiving side is a plain
//! [`Stream`](tokio_stream::Stream) of batches that an async exporter can
//! process at its own pace.

use datacarrier::{Sink, SinkError};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_stream::wrappers::ReceiverStream;

/// Stream of batches produced by a [`ChannelSink`].
pub type BatchStream<T> = ReceiverStream<Vec<T>>;

/// Creates a sink and the stream that receives its batches.
///
/// `capacity` bounds the number of batches in flight. When the stream falls
/// that far behind, further batches are reported to `on_error` as transport
/// errors and dropped.
pub fn batch_channel<T: Clone + Send>(capacity: usize) -> (ChannelSink<T>, BatchStream<T>) {
    let (tx, rx) = mpsc::channel(capacity);
    (ChannelSink { tx }, ReceiverStream::new(rx))
}

/// [`Sink`] that copies each batch into a bounded Tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink<T> {
    tx: mpsc::Sender<Vec<T>>,
}

impl<T> ChannelSink<T> {
    pub fn new(tx: mpsc::Sender<Vec<T>>) -> Self {
        Self { tx }
    }

    /// Returns `true` once the receiving stream has been dropped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl<T: Clone + Send> Sink<T> for ChannelSink<T> {
    fn consume(&self, batch: &[T]) -> Result<(), SinkError> {
        match self.tx.try_send(batch.to_vec()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(rejected)) => Err(SinkError::Transport(format!(
                "batch stream full, {} items dropped",
                rejected.len()
            ))),
            Err(TrySendError::Closed(_)) => Err(SinkError::Transport("batch stream closed".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_stream::StreamExt;

    #[tokio::test]
    async fn test_batches_arrive_in_order() {
        let (sink, mut stream) = batch_channel::<u8>(4);
        sink.consume(&[1, 2]).unwrap();
        sink.consume(&[3]).unwrap();
        drop(sink);

        assert_eq!(stream.next().await, Some(vec![1, 2]));
        assert_eq!(stream.next().await, Some(vec![3]));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn test_full_and_closed_are_transport_errors() {
        let (sink, stream) = batch_channel::<u8>(1);
        sink.consume(&[1]).unwrap();
        assert!(matches!(sink.consume(&[2, 3]), Err(SinkError::Transport(msg)) if msg.contains("2 items")));

        drop(stream);
        assert!(sink.is_closed());
        assert!(matches!(sink.consume(&[4]), Err(SinkError::Transport(_))));
    }
}
