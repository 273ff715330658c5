//! Debug assertion macros for carrier invariants.
//!
//! Only active in debug builds (`#[cfg(debug_assertions)]`), so there is zero
//! overhead in release builds.

// =============================================================================
// INV-CUR-01: Cursor Range
// =============================================================================

/// Assert that a cursor-issued index lies in `[start, end)`.
///
/// Used in: `RotatingCursor::next()` before returning
macro_rules! debug_assert_cursor_in_range {
    ($value:expr, $start:expr, $end:expr) => {
        debug_assert!(
            $value >= $start && $value < $end,
            "INV-CUR-01 violated: cursor issued {} outside [{}, {})",
            $value,
            $start,
            $end
        )
    };
}

// =============================================================================
// INV-BUF-01: Drain Window
// =============================================================================

/// Assert that a drain window is well formed and within the slot array.
///
/// Used in: `SlotBuffer::drain()`
macro_rules! debug_assert_drain_window {
    ($from:expr, $to:expr, $capacity:expr) => {
        debug_assert!(
            $from <= $to && $to <= $capacity,
            "INV-BUF-01 violated: drain window [{}, {}) outside capacity {}",
            $from,
            $to,
            $capacity
        )
    };
}

// =============================================================================
// INV-GRP-01: Scratch Reuse
// =============================================================================

/// Assert that the shared scratch batch is empty before a group drains into it.
///
/// **Invariant**: items never survive from one dispatch into the next
///
/// Used in: `ConsumeTargets::consume_group()`
macro_rules! debug_assert_scratch_empty {
    ($scratch:expr) => {
        debug_assert!(
            $scratch.is_empty(),
            "INV-GRP-01 violated: scratch batch carried {} items into a new dispatch",
            $scratch.len()
        )
    };
}

// =============================================================================
// INV-GRP-02: Exit Once
// =============================================================================

/// Assert that the final pass exits each group exactly once.
///
/// Used in: `ConsumeTargets::close_and_flush()`
macro_rules! debug_assert_exit_once {
    ($exited:expr, $groups:expr) => {
        debug_assert!(
            $exited == $groups,
            "INV-GRP-02 violated: {} exit hooks fired for {} groups",
            $exited,
            $groups
        )
    };
}

pub(crate) use debug_assert_cursor_in_range;
pub(crate) use debug_assert_drain_window;
pub(crate) use debug_assert_exit_once;
pub(crate) use debug_assert_scratch_empty;
