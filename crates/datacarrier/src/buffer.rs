use crate::invariants::debug_assert_drain_window;
use crate::sync::{AtomicPtr, AtomicU8, Ordering};
use crate::{BufferMetrics, BufferMetricsSnapshot, OverflowStrategy, RotatingCursor};
use std::marker::PhantomData;
use std::ptr;

// =============================================================================
// SLOT OWNERSHIP PROTOCOL
// =============================================================================
//
// Each slot is an `AtomicPtr<T>`: null means empty, non-null points at a boxed
// item owned by the slot. Ownership only ever moves through a single atomic
// read-modify-write, so exactly one party holds any given box:
//
// **Producer (`save`):**
// - `OverwriteAlways`: `swap(new)`. A non-null result is the displaced
//   occupant; the producer now owns it and drops it.
// - `DropIfOccupied`: `compare_exchange(null, new)`. Failure leaves the
//   occupant untouched and hands the new item back.
//
// **Consumer (`drain`):**
// - A relaxed load skips empty slots without writing the cache line.
// - `swap(null)` takes the occupant. Because take-and-clear is one atomic step,
//   a producer racing the drain either lands before the swap (and is drained
//   now) or after it (and is drained next time). Nothing is cleared unseen.
//
// AcqRel on every RMW pairs the producer's box initialisation with the
// consumer's read of it.
//
// =============================================================================

/// Fixed-capacity ring of item slots fed by a [`RotatingCursor`].
///
/// Any number of producers may call [`save`](Self::save) concurrently; the
/// owning worker calls [`drain`](Self::drain). Capacity never changes after
/// construction.
pub struct SlotBuffer<T> {
    slots: Box<[AtomicPtr<T>]>,
    cursor: RotatingCursor,
    strategy: AtomicU8,
    metrics: Option<BufferMetrics>,
    _owns: PhantomData<T>,
}

// Safety: items are moved between threads through the slots but never shared,
// so `T: Send` is sufficient for both.
unsafe impl<T: Send> Send for SlotBuffer<T> {}
unsafe impl<T: Send> Sync for SlotBuffer<T> {}

impl<T> SlotBuffer<T> {
    /// Creates an empty buffer with `capacity` slots.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, strategy: OverflowStrategy) -> Self {
        let slots = (0..capacity)
            .map(|_| AtomicPtr::new(ptr::null_mut()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        Self {
            slots,
            cursor: RotatingCursor::with_capacity(capacity),
            strategy: AtomicU8::new(strategy.as_u8()),
            metrics: None,
            _owns: PhantomData,
        }
    }

    /// Same as [`new`](Self::new) with per-buffer counters switched on.
    pub fn with_metrics(capacity: usize, strategy: OverflowStrategy) -> Self {
        let mut buffer = Self::new(capacity, strategy);
        buffer.metrics = Some(BufferMetrics::new());
        buffer
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn strategy(&self) -> OverflowStrategy {
        OverflowStrategy::from_u8(self.strategy.load(Ordering::Relaxed))
    }

    /// Swaps the overflow policy. Applies to `save` calls that start afterwards.
    pub fn set_strategy(&self, strategy: OverflowStrategy) {
        self.strategy.store(strategy.as_u8(), Ordering::Relaxed);
    }

    // ---------------------------------------------------------------------
    // PRODUCER API
    // ---------------------------------------------------------------------

    /// Writes `item` into the next cursor slot.
    ///
    /// Returns `false` only under [`OverflowStrategy::DropIfOccupied`] when
    /// that slot still holds an undrained item; the new item is dropped.
    #[inline]
    pub fn save(&self, item: T) -> bool {
        self.try_save(item).is_ok()
    }

    /// Like [`save`](Self::save) but hands a rejected item back to the caller.
    pub fn try_save(&self, item: T) -> Result<(), T> {
        let slot = &self.slots[self.cursor.next()];

        match self.strategy() {
            OverflowStrategy::DropIfOccupied => {
                // Cheap pre-check so a full buffer doesn't allocate per rejected item
                if !slot.load(Ordering::Acquire).is_null() {
                    self.record(BufferMetrics::record_rejected);
                    return Err(item);
                }
                let boxed = Box::into_raw(Box::new(item));
                match slot.compare_exchange(
                    ptr::null_mut(),
                    boxed,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        self.record(BufferMetrics::record_saved);
                        Ok(())
                    }
                    Err(_) => {
                        self.record(BufferMetrics::record_rejected);
                        // SAFETY: `boxed` came from Box::into_raw above and was
                        // never published, so this is the only owner.
                        Err(*unsafe { Box::from_raw(boxed) })
                    }
                }
            }
            OverflowStrategy::OverwriteAlways => {
                let boxed = Box::into_raw(Box::new(item));
                let displaced = slot.swap(boxed, Ordering::AcqRel);
                if !displaced.is_null() {
                    self.record(BufferMetrics::record_overwritten);
                    // SAFETY: the swap transferred ownership of the previous
                    // occupant to this call; nobody else can reach it now.
                    drop(unsafe { Box::from_raw(displaced) });
                }
                self.record(BufferMetrics::record_saved);
                Ok(())
            }
        }
    }

    // ---------------------------------------------------------------------
    // CONSUMER API
    // ---------------------------------------------------------------------

    /// Moves every occupied slot in `[from, to)` into `out`, in index order,
    /// leaving those slots empty. Returns the number of items moved.
    ///
    /// # Panics
    ///
    /// Panics if `from > to` or `to > capacity()`.
    pub fn drain(&self, out: &mut Vec<T>, from: usize, to: usize) -> usize {
        debug_assert_drain_window!(from, to, self.capacity());
        let window = &self.slots[from..to];

        let mut moved = 0;
        for slot in window {
            if slot.load(Ordering::Relaxed).is_null() {
                continue;
            }
            let taken = slot.swap(ptr::null_mut(), Ordering::AcqRel);
            if taken.is_null() {
                continue;
            }
            // SAFETY: the swap moved sole ownership of the box to us and left
            // the slot empty, so no producer or later drain can see it.
            out.push(*unsafe { Box::from_raw(taken) });
            moved += 1;
        }

        if moved > 0 {
            if let Some(m) = &self.metrics {
                m.add_drained(moved as u64);
            }
        }
        moved
    }

    /// Drains the whole buffer into `out`.
    #[inline]
    pub fn drain_all(&self, out: &mut Vec<T>) -> usize {
        self.drain(out, 0, self.capacity())
    }

    /// Counts occupied slots. Linear scan; racy under concurrent writers.
    pub fn occupied(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| !slot.load(Ordering::Acquire).is_null())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.occupied() == 0
    }

    /// Counter snapshot, or all zeros when metrics are disabled.
    pub fn metrics(&self) -> BufferMetricsSnapshot {
        self.metrics
            .as_ref()
            .map(BufferMetrics::snapshot)
            .unwrap_or_default()
    }

    #[inline]
    fn record(&self, event: fn(&BufferMetrics)) {
        if let Some(m) = &self.metrics {
            event(m);
        }
    }
}

impl<T> Drop for SlotBuffer<T> {
    fn drop(&mut self) {
        for slot in self.slots.iter() {
            let occupant = slot.swap(ptr::null_mut(), Ordering::Acquire);
            if !occupant.is_null() {
                // SAFETY: `&mut self` means no concurrent producer or drain.
                drop(unsafe { Box::from_raw(occupant) });
            }
        }
    }
}

impl<T> std::fmt::Debug for SlotBuffer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotBuffer")
            .field("capacity", &self.capacity())
            .field("strategy", &self.strategy())
            .field("cursor", &self.cursor.current())
            .finish_non_exhaustive()
    }
}
