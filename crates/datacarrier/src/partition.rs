//! Lane selection for [`Channels::offer`](crate::Channels::offer).

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Picks the lane an item is written to.
///
/// Results at or beyond `lanes` wrap modulo the lane count.
pub trait Partitioner<T>: Send + Sync {
    fn partition(&self, lanes: usize, item: &T) -> usize;
}

/// Rotates through lanes on every call so concurrent producers spread across
/// independent cursors.
#[derive(Debug, Default)]
pub struct RoundRobin {
    next: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Partitioner<T> for RoundRobin {
    #[inline]
    fn partition(&self, lanes: usize, _item: &T) -> usize {
        self.next.fetch_add(1, Ordering::Relaxed) % lanes
    }
}

/// Pins each producer thread to one lane, keeping a thread's writes in a
/// single lane's slot order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProducerThread;

impl<T> Partitioner<T> for ProducerThread {
    fn partition(&self, lanes: usize, _item: &T) -> usize {
        let mut hasher = DefaultHasher::new();
        thread::current().id().hash(&mut hasher);
        (hasher.finish() % lanes as u64) as usize
    }
}
