//! Level-latched and phase-latched event primitives.
//!
//! `Event` is a boolean latch: `trigger()` wakes every current waiter and
//! leaves the latch set, so any wait registered afterwards resolves
//! immediately without suspending, until `reset()` clears it. `PhaseEvent`
//! is the four-bucket (rising/positive-mid/falling/negative-mid)
//! non-latching variant a `Clock` drives every period.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::contract_violation;
use crate::task::pump_ready_queue;

#[derive(Default)]
struct EventInner {
    fired: bool,
    waiters: VecDeque<Waker>,
}

/// A level-latched event: `trigger()` wakes every task currently waiting
/// on it and leaves the latch set, so an `await` registered afterwards
/// resolves immediately without suspending. `reset()` clears the latch
/// for reuse.
#[derive(Clone, Default)]
pub struct Event {
    inner: Rc<RefCell<EventInner>>,
}

impl Event {
    pub fn new() -> Self {
        Event::default()
    }

    /// Set the latch and wake every current waiter, in the order they
    /// registered (FIFO, property 4). The latch stays set after this
    /// returns: a wait registered later observes `fired` already true and
    /// resolves without suspending, until `reset()` runs. Waking happens
    /// through the trampoline: each waiter's `Waker::wake()` only enqueues
    /// its resume, so this drains that queue once after all waiters have
    /// been woken, rather than driving the first resumed task before the
    /// rest have even been notified.
    pub fn trigger(&self) {
        let waiters: Vec<Waker> = {
            let mut inner = self.inner.borrow_mut();
            inner.fired = true;
            std::mem::take(&mut inner.waiters).into_iter().collect()
        };
        for waker in waiters {
            waker.wake();
        }
        pump_ready_queue();
    }

    /// Clear the latch back to untriggered. It is a contract violation to
    /// call this while waiters are queued, since that would silently drop
    /// their wakeup instead of resolving it.
    pub fn reset(&self) {
        let mut inner = self.inner.borrow_mut();
        if !inner.waiters.is_empty() {
            contract_violation("Event::reset called while waiters are queued");
        }
        inner.fired = false;
    }

    /// An awaitable that resolves the next time `trigger()` runs.
    pub fn wait(&self) -> EventWait {
        EventWait {
            inner: Rc::clone(&self.inner),
            registered: false,
        }
    }
}

pub struct EventWait {
    inner: Rc<RefCell<EventInner>>,
    registered: bool,
}

impl Future for EventWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.fired {
            return Poll::Ready(());
        }
        if !self.registered {
            inner.waiters.push_back(cx.waker().clone());
            self.registered = true;
        }
        Poll::Pending
    }
}

/// The four phases a [`crate::clock::Clock`] drives each period, matching
/// edge-triggered RTL semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    RisingEdge,
    PositiveMid,
    FallingEdge,
    NegativeMid,
}

impl Phase {
    fn index(self) -> usize {
        match self {
            Phase::RisingEdge => 0,
            Phase::PositiveMid => 1,
            Phase::FallingEdge => 2,
            Phase::NegativeMid => 3,
        }
    }
}

#[derive(Default)]
struct PhaseInner {
    waiters: [VecDeque<Waker>; 4],
}

/// A non-latching, per-phase event driven once per clock period. Unlike
/// [`Event`], waiters register against a specific phase bucket and are
/// only woken when that bucket's `trigger_phase` runs.
#[derive(Clone, Default)]
pub struct PhaseEvent {
    inner: Rc<RefCell<PhaseInner>>,
}

impl PhaseEvent {
    pub fn new() -> Self {
        PhaseEvent::default()
    }

    /// Wake every waiter registered against `phase`. Called by the clock
    /// that owns this event at the appropriate point in its period.
    pub fn trigger_phase(&self, phase: Phase) {
        let waiters: Vec<Waker> = {
            let mut inner = self.inner.borrow_mut();
            std::mem::take(&mut inner.waiters[phase.index()])
                .into_iter()
                .collect()
        };
        for waker in waiters {
            waker.wake();
        }
        // Drained once per bucket so a waiter re-registering into a later
        // bucket during its own resumption still observes ordering
        // guarantee 5 (phases fire strictly in rising/pos-mid/falling/
        // neg-mid order within one period).
        pump_ready_queue();
    }

    /// An awaitable that resolves the next time `phase` fires.
    pub fn wait(&self, phase: Phase) -> PhaseEventWait {
        PhaseEventWait {
            inner: Rc::clone(&self.inner),
            phase,
            registered: false,
        }
    }
}

pub struct PhaseEventWait {
    inner: Rc<RefCell<PhaseInner>>,
    phase: Phase,
    registered: bool,
}

impl Future for PhaseEventWait {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.registered {
            // We only ever get polled again after being woken, at which
            // point our waker has already been removed from the bucket.
            return Poll::Ready(());
        }
        let mut inner = self.inner.borrow_mut();
        inner.waiters[self.phase.index()].push_back(cx.waker().clone());
        self.registered = true;
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;
    use crate::error::Failure;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn waiters_fire_in_fifo_order() {
        let event = Event::new();
        let order: Rc<StdRefCell<Vec<u32>>> = Rc::new(StdRefCell::new(Vec::new()));

        let mut tasks = Vec::new();
        for id in 0..3u32 {
            let event = event.clone();
            let order = Rc::clone(&order);
            let task = Task::spawn(async move {
                event.wait().await;
                order.borrow_mut().push(id);
                Ok::<_, Failure>(())
            });
            task.start();
            tasks.push(task);
        }

        event.trigger();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert!(tasks.iter().all(|t| t.is_done()));
    }

    #[test]
    fn a_wait_registered_after_trigger_resolves_without_suspending() {
        let event = Event::new();
        event.trigger();

        let resolved = Rc::new(StdRefCell::new(false));
        let resolved_clone = Rc::clone(&resolved);
        let task = Task::spawn(async move {
            event.wait().await;
            *resolved_clone.borrow_mut() = true;
            Ok::<_, Failure>(())
        });
        task.start();
        assert!(*resolved.borrow());
    }

    #[test]
    fn reset_clears_the_latch_so_a_later_wait_suspends_again() {
        let event = Event::new();
        event.trigger();
        event.reset();

        let resolved = Rc::new(StdRefCell::new(false));
        let resolved_clone = Rc::clone(&resolved);
        let event_clone = event.clone();
        let task = Task::spawn(async move {
            event_clone.wait().await;
            *resolved_clone.borrow_mut() = true;
            Ok::<_, Failure>(())
        });
        task.start();
        assert!(!*resolved.borrow());

        event.trigger();
        assert!(*resolved.borrow());
    }

    #[test]
    #[should_panic]
    fn reset_while_waiters_are_queued_is_a_contract_violation() {
        let event = Event::new();
        let event_clone = event.clone();
        let task = Task::spawn(async move {
            event_clone.wait().await;
            Ok::<_, Failure>(())
        });
        task.start();
        event.reset();
    }

    #[test]
    fn phase_event_only_wakes_its_own_bucket() {
        let phase_event = PhaseEvent::new();
        let fired = Rc::new(StdRefCell::new(false));

        let fired_clone = Rc::clone(&fired);
        let pe = phase_event.clone();
        let task = Task::spawn(async move {
            pe.wait(Phase::FallingEdge).await;
            *fired_clone.borrow_mut() = true;
            Ok::<_, Failure>(())
        });
        task.start();

        phase_event.trigger_phase(Phase::RisingEdge);
        assert!(!*fired.borrow());

        phase_event.trigger_phase(Phase::FallingEdge);
        assert!(*fired.borrow());
    }
}
