use crate::invariants::{debug_assert_exit_once, debug_assert_scratch_empty};
use crate::{CarrierError, Channels, Sink, SinkError, WorkerMetrics};
use arc_swap::ArcSwap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error, trace};

// =============================================================================
// COPY-ON-WRITE REGISTRATION
// =============================================================================
//
// The group list is an immutable `TargetList` behind an `ArcSwap`. A drain
// cycle takes one `Arc` snapshot and iterates it start to finish; registration
// builds a fresh list (old groups + new one) and publishes it with a
// compare-and-swap, retrying if another registration won the race. The hot
// drain path never locks and never sees a list being mutated.
//
// Shutdown publishes the same list with `closed = true` through the same CAS.
// That makes the final flush and late registration mutually ordered: a group
// is either in the closed snapshot (flushed + exited) or its registration
// observes `closed` and fails.
//
// =============================================================================

/// A registered (channels, sink) pairing.
pub struct Group<T> {
    channels: Arc<Channels<T>>,
    sink: Arc<dyn Sink<T>>,
}

impl<T> Group<T> {
    pub fn channels(&self) -> &Arc<Channels<T>> {
        &self.channels
    }

    pub fn sink(&self) -> &Arc<dyn Sink<T>> {
        &self.sink
    }
}

impl<T> Clone for Group<T> {
    fn clone(&self) -> Self {
        Self {
            channels: Arc::clone(&self.channels),
            sink: Arc::clone(&self.sink),
        }
    }
}

struct TargetList<T> {
    groups: Vec<Group<T>>,
    closed: bool,
}

impl<T> TargetList<T> {
    fn empty() -> Self {
        Self {
            groups: Vec::new(),
            closed: false,
        }
    }
}

/// The set of groups one worker drains, shared between the worker loop and
/// registering threads.
pub struct ConsumeTargets<T> {
    owner: String,
    list: ArcSwap<TargetList<T>>,
    size: AtomicU64,
}

impl<T: Send> ConsumeTargets<T> {
    /// `owner` names the worker in log fields and errors.
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            list: ArcSwap::from_pointee(TargetList::empty()),
            size: AtomicU64::new(0),
        }
    }

    /// Registers a group. Safe to call while a cycle is draining; the new
    /// group is picked up from the next cycle on.
    pub fn add(&self, channels: Arc<Channels<T>>, sink: Arc<dyn Sink<T>>) -> Result<(), CarrierError> {
        let capacity = channels.total_capacity() as u64;
        let group = Group { channels, sink };

        let mut current = self.list.load_full();
        loop {
            if current.closed {
                return Err(CarrierError::TargetsClosed(self.owner.clone()));
            }
            let mut groups = Vec::with_capacity(current.groups.len() + 1);
            groups.extend(current.groups.iter().cloned());
            groups.push(group.clone());
            let next = Arc::new(TargetList {
                groups,
                closed: false,
            });

            let previous = self.list.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                break;
            }
            current = arc_swap::Guard::into_inner(previous);
        }

        let size = self.size.fetch_add(capacity, Ordering::Relaxed) + capacity;
        debug!(worker = %self.owner, capacity, size, "registered consume target");
        Ok(())
    }

    /// Aggregate lane capacity of every registered group.
    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.list.load().groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.list.load().closed
    }

    /// One pass over the current snapshot. Returns `true` if any group had data.
    ///
    /// `scratch` is reusable batch storage; anything already in it is
    /// discarded, never dispatched.
    pub fn drain_cycle(&self, scratch: &mut Vec<T>, metrics: &WorkerMetrics) -> bool {
        scratch.clear();
        let snapshot = self.list.load_full();
        let mut has_data = false;
        for group in &snapshot.groups {
            has_data |= self.consume_group(group, scratch, metrics);
        }
        metrics.record_cycle(has_data);
        has_data
    }

    /// Closes registration, flushes every group once, then fires each sink's
    /// `on_exit` in registration order. Returns the number of groups exited,
    /// or 0 if the targets were already closed. `scratch` is cleared first,
    /// as in [`drain_cycle`](Self::drain_cycle).
    pub fn close_and_flush(&self, scratch: &mut Vec<T>, metrics: &WorkerMetrics) -> usize {
        scratch.clear();
        let mut current = self.list.load_full();
        let closed = loop {
            if current.closed {
                return 0;
            }
            let next = Arc::new(TargetList {
                groups: current.groups.clone(),
                closed: true,
            });
            let previous = self.list.compare_and_swap(&current, Arc::clone(&next));
            if Arc::ptr_eq(&*previous, &current) {
                break next;
            }
            current = arc_swap::Guard::into_inner(previous);
        };

        let mut flushed = 0;
        for group in &closed.groups {
            if self.consume_group(group, scratch, metrics) {
                flushed += 1;
            }
        }
        debug!(worker = %self.owner, groups = closed.groups.len(), flushed, "final flush complete");

        let mut exited = 0;
        for group in &closed.groups {
            self.isolate("on_exit", || group.sink.on_exit());
            exited += 1;
        }
        debug_assert_exit_once!(exited, closed.groups.len());
        exited
    }

    fn consume_group(&self, group: &Group<T>, scratch: &mut Vec<T>, metrics: &WorkerMetrics) -> bool {
        debug_assert_scratch_empty!(scratch);

        group.channels.drain_into(scratch);
        if scratch.is_empty() {
            self.isolate("nothing_to_consume", || group.sink.nothing_to_consume());
            return false;
        }

        let items = scratch.len();
        metrics.record_batch(items);
        trace!(worker = %self.owner, items, "dispatching batch");

        let failure = match panic::catch_unwind(AssertUnwindSafe(|| group.sink.consume(&scratch[..]))) {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => {
                error!(worker = %self.owner, items, "sink panicked while consuming batch");
                Some(SinkError::from_panic(&*payload))
            }
        };

        if let Some(e) = failure {
            metrics.record_sink_error();
            self.isolate("on_error", || group.sink.on_error(&scratch[..], e));
        }

        scratch.clear();
        true
    }

    /// Runs a sink hook, containing any panic to this group.
    fn isolate(&self, hook: &'static str, f: impl FnOnce()) {
        if panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
            error!(worker = %self.owner, hook, "sink hook panicked");
        }
    }
}

impl<T> std::fmt::Debug for ConsumeTargets<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let list = self.list.load();
        f.debug_struct("ConsumeTargets")
            .field("owner", &self.owner)
            .field("groups", &list.groups.len())
            .field("closed", &list.closed)
            .field("size", &self.size.load(Ordering::Relaxed))
            .finish()
    }
}
