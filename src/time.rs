//! Virtual simulated time.
//!
//! The kernel never reads the wall clock. All ordering is driven by a
//! single picosecond counter shared (via an `Rc<Cell<u64>>` handle) between
//! the scheduler, every clock, and the contexts handed to components —
//! never a process-wide `static`, so multiple kernels can exist side by
//! side on one thread without interference.

use std::cell::Cell;
use std::rc::Rc;

/// A cloneable handle onto the simulation's current time, in picoseconds.
///
/// Cloning shares the same underlying cell; advancing time through any
/// handle is visible through all of them.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    now_ps: Rc<Cell<u64>>,
}

impl VirtualClock {
    /// A fresh clock, starting at time zero.
    pub fn new() -> Self {
        VirtualClock {
            now_ps: Rc::new(Cell::new(0)),
        }
    }

    /// Current simulated time, in picoseconds.
    pub fn now(&self) -> u64 {
        self.now_ps.get()
    }

    /// Advance to `t`. Only the scheduler calls this; it is a contract
    /// violation to move time backwards.
    pub(crate) fn advance_to(&self, t: u64) {
        debug_assert!(
            t >= self.now_ps.get(),
            "virtual time must be monotonically non-decreasing"
        );
        self.now_ps.set(t);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_zero() {
        let clock = VirtualClock::new();
        assert_eq!(clock.now(), 0);
    }

    #[test]
    fn shared_handles_observe_the_same_advance() {
        let clock = VirtualClock::new();
        let handle = clock.clone();
        clock.advance_to(42);
        assert_eq!(handle.now(), 42);
    }
}
