/// What a worker does after a cycle in which no group had data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdlePause {
    /// Busy-wait for this many spin hints, then cycle again
    Spin(u32),
    /// Give up the time slice (thread or task), then cycle again
    Yield,
    /// Backoff exhausted: take the interruptible idle sleep
    Sleep,
}

/// Escalating pause schedule for [`IdleStrategy::SpinThenSleep`](crate::IdleStrategy).
///
/// Hands out doubling spin counts, then a few yields, then `Sleep` until
/// [`reset`](Self::reset). The caller decides how to spin, yield, or sleep,
/// so the thread worker and the Tokio worker share one schedule.
#[derive(Debug, Default)]
pub struct IdleBackoff {
    step: u32,
}

impl IdleBackoff {
    /// Spin rounds of 1, 2, 4 .. 64 hints
    const SPIN_STEPS: u32 = 7;
    const YIELD_STEPS: u32 = 4;

    pub fn new() -> Self {
        Self::default()
    }

    /// Next pause in the schedule. Sticks at `Sleep` once exhausted.
    pub fn next_pause(&mut self) -> IdlePause {
        let step = self.step;
        if step < Self::SPIN_STEPS {
            self.step += 1;
            IdlePause::Spin(1 << step)
        } else if step < Self::SPIN_STEPS + Self::YIELD_STEPS {
            self.step += 1;
            IdlePause::Yield
        } else {
            IdlePause::Sleep
        }
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.step >= Self::SPIN_STEPS + Self::YIELD_STEPS
    }

    /// Start over; called after a cycle that found data.
    #[inline]
    pub fn reset(&mut self) {
        self.step = 0;
    }

    /// Number of non-sleeping pauses before the schedule reaches `Sleep`.
    pub const fn busy_pauses() -> u32 {
        Self::SPIN_STEPS + Self::YIELD_STEPS
    }
}
