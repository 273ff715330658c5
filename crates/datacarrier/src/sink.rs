use crate::SinkError;

/// Downstream consumer driven by a worker.
///
/// A worker calls exactly one of `consume` / `nothing_to_consume` per group
/// per cycle, `on_error` after a failed `consume`, and `on_exit` once after the
/// final flush. All hooks run on the worker's thread.
pub trait Sink<T>: Send + Sync {
    /// Handles one non-empty batch. The slice is only valid for this call.
    fn consume(&self, batch: &[T]) -> Result<(), SinkError>;

    /// Called with the same batch when `consume` returned an error or panicked.
    fn on_error(&self, batch: &[T], error: SinkError) {
        tracing::warn!(items = batch.len(), error = %error, "sink failed to consume batch");
    }

    /// Called for a cycle in which this group's channels were empty.
    fn nothing_to_consume(&self) {}

    /// Called once when the worker stops, after the final flush.
    fn on_exit(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Collect(Mutex<Vec<u32>>);

    impl Sink<u32> for Collect {
        fn consume(&self, batch: &[u32]) -> Result<(), SinkError> {
            self.0.lock().unwrap().extend_from_slice(batch);
            Ok(())
        }
    }

    #[test]
    fn test_default_hooks_are_inert() {
        let sink = Collect(Mutex::new(Vec::new()));
        sink.consume(&[1, 2]).unwrap();
        sink.nothing_to_consume();
        sink.on_error(&[3], SinkError::Encoding("bad".into()));
        sink.on_exit();
        assert_eq!(*sink.0.lock().unwrap(), vec![1, 2]);
    }
}
