use crate::invariants::debug_assert_cursor_in_range;
use crate::sync::{spin_loop, AtomicUsize, Ordering};
use crossbeam_utils::CachePadded;

// =============================================================================
// WRAPAROUND PROTOCOL
// =============================================================================
//
// The counter holds "one past the last issued index". Each call does a single
// `fetch_add(1)` and inspects the post-increment value `next`:
//
// - `next <= last`: the caller owns index `next - 1`. No further atomics.
// - `next > last`:  the counter has run off the end. The caller tries to CAS
//   the counter from exactly `next` back to `start`. The winner returns `last`
//   (the slot that `next - 1 == last` would have named on the first overflow).
//   Losers, and a winner-less round where the counter kept moving, issue a
//   spin hint and increment again.
//
// No caller ever observes an index outside `[start, end)`. Two callers can be
// handed the same index only across the wrap boundary, which the slot buffer
// already tolerates (overwrite or reject per strategy).
//
// =============================================================================

/// Lock-free counter that cycles through `[start, end)`.
///
/// Every call to [`next`](Self::next) advances the shared position by one and
/// wraps back to `start` after `end - 1`, without taking a lock. The backing
/// atomic is cache-padded so producers hammering one cursor do not false-share
/// with neighbouring fields.
#[derive(Debug)]
pub struct RotatingCursor {
    value: CachePadded<AtomicUsize>,
    start: usize,
    end: usize,
}

impl RotatingCursor {
    /// Creates a cursor over `[start, end)` positioned at `start`.
    ///
    /// # Panics
    ///
    /// Panics if the range is empty (`start >= end`).
    pub fn new(start: usize, end: usize) -> Self {
        assert!(start < end, "rotating cursor range [{start}, {end}) is empty");
        Self {
            value: CachePadded::new(AtomicUsize::new(start)),
            start,
            end,
        }
    }

    /// Creates a cursor over slot indices `[0, capacity)`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self::new(0, capacity)
    }

    /// Returns the next index and advances the cursor by one.
    pub fn next(&self) -> usize {
        let last = self.end - 1;
        loop {
            let next = self.value.fetch_add(1, Ordering::AcqRel) + 1;
            if next <= last {
                let index = next - 1;
                debug_assert_cursor_in_range!(index, self.start, self.end);
                return index;
            }
            if self
                .value
                .compare_exchange(next, self.start, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return last;
            }
            // Another caller is mid-wrap; let it finish before bumping again
            spin_loop();
        }
    }

    /// Raw position of the counter. May read past `end - 1` while a wrap is in flight.
    #[inline]
    pub fn current(&self) -> usize {
        self.value.load(Ordering::Acquire)
    }

    #[inline]
    pub fn start(&self) -> usize {
        self.start
    }

    #[inline]
    pub fn end(&self) -> usize {
        self.end
    }

    /// Number of distinct indices the cursor cycles through.
    #[inline]
    pub fn span(&self) -> usize {
        self.end - self.start
    }
}
