//! Time-based suspension: `await` a `Delay` to resume after `n`
//! picoseconds of simulated time have passed.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll, Waker};

use crate::scheduler::Scheduler;

enum DelayState {
    NotStarted(u64),
    Scheduled,
}

/// A future that resolves once `scheduler` has advanced by the requested
/// number of picoseconds from the moment it was first polled.
pub struct Delay {
    scheduler: Scheduler,
    state: DelayState,
}

impl Delay {
    pub(crate) fn new(scheduler: Scheduler, ps: u64) -> Self {
        Delay {
            scheduler,
            state: DelayState::NotStarted(ps),
        }
    }
}

impl Future for Delay {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();
        match this.state {
            DelayState::NotStarted(0) => Poll::Ready(()),
            DelayState::NotStarted(ps) => {
                let waker: Waker = cx.waker().clone();
                let fire_at = this.scheduler.now() + ps;
                this.scheduler.schedule_async(fire_at, 0, move || waker.wake());
                this.state = DelayState::Scheduled;
                Poll::Pending
            }
            DelayState::Scheduled => Poll::Ready(()),
        }
    }
}

/// `await` this to suspend for `ps` picoseconds of simulated time.
pub fn delay(scheduler: &Scheduler, ps: u64) -> Delay {
    Delay::new(scheduler.clone(), ps)
}

/// `await` this to suspend for `ns` nanoseconds (1 ns = 1000 ps).
pub fn delay_ns(scheduler: &Scheduler, ns: u64) -> Delay {
    delay(scheduler, ns.saturating_mul(1_000))
}

/// `await` this to suspend for `us` microseconds (1 us = 1e6 ps).
pub fn delay_us(scheduler: &Scheduler, us: u64) -> Delay {
    delay(scheduler, us.saturating_mul(1_000_000))
}

/// `await` this to suspend for `ms` milliseconds (1 ms = 1e9 ps).
pub fn delay_ms(scheduler: &Scheduler, ms: u64) -> Delay {
    delay(scheduler, ms.saturating_mul(1_000_000_000))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::task::Task;

    #[test]
    fn delay_resumes_at_the_precise_target_time() {
        let scheduler = Scheduler::new();
        let sched = scheduler.clone();
        let task = Task::spawn(async move {
            delay_ns(&sched, 5).await;
            Ok::<_, Failure>(sched.now())
        });
        task.start();
        scheduler.run_until_idle();
        assert_eq!(task.result(), Ok(5_000));
    }

    #[test]
    fn zero_delay_resolves_without_scheduling() {
        let scheduler = Scheduler::new();
        let sched = scheduler.clone();
        let task = Task::spawn(async move {
            delay(&sched, 0).await;
            Ok::<_, Failure>(())
        });
        task.start();
        assert!(task.is_done());
    }
}
