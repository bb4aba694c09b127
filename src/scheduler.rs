//! The priority-ordered event queue driving virtual time forward.
//!
//! Two min-heaps back the scheduler: one for clock-phase events (ordered
//! by `(time, clock_id, step)`) and one for everything else — delays,
//! TLM wakeups, user-scheduled callbacks — ordered by `(time, priority,
//! sequence)`. A third, unordered immediate queue holds zero-delay
//! callbacks that must run before time advances again at all. Every tie
//! is broken by a monotonically increasing sequence number so that two
//! events scheduled for the same instant always run in the order they
//! were scheduled (property 1).

use std::cell::RefCell;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;

use crate::task::pump_ready_queue;
use crate::time::VirtualClock;

type Callback = Box<dyn FnOnce()>;

struct ClockEntry {
    time_ps: u64,
    clock_id: u64,
    step: u64,
    seq: u64,
    callback: Callback,
}

impl PartialEq for ClockEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for ClockEntry {}
impl PartialOrd for ClockEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ClockEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
impl ClockEntry {
    fn key(&self) -> (u64, u64, u64, u64) {
        (self.time_ps, self.clock_id, self.step, self.seq)
    }
}

struct AsyncEntry {
    time_ps: u64,
    priority: i64,
    seq: u64,
    callback: Callback,
}

impl PartialEq for AsyncEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for AsyncEntry {}
impl PartialOrd for AsyncEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for AsyncEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}
impl AsyncEntry {
    fn key(&self) -> (u64, i64, u64) {
        (self.time_ps, self.priority, self.seq)
    }
}

struct SchedulerInner {
    clock_events: BinaryHeap<Reverse<ClockEntry>>,
    async_events: BinaryHeap<Reverse<AsyncEntry>>,
    immediate: VecDeque<Callback>,
    next_seq: u64,
}

/// A cloneable handle onto the shared event queues and virtual clock.
#[derive(Clone)]
pub struct Scheduler {
    inner: Rc<RefCell<SchedulerInner>>,
    clock: VirtualClock,
}

impl Scheduler {
    pub fn new() -> Self {
        Scheduler {
            inner: Rc::new(RefCell::new(SchedulerInner {
                clock_events: BinaryHeap::new(),
                async_events: BinaryHeap::new(),
                immediate: VecDeque::new(),
                next_seq: 0,
            })),
            clock: VirtualClock::new(),
        }
    }

    /// Current simulated time, in picoseconds.
    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    pub(crate) fn virtual_clock(&self) -> VirtualClock {
        self.clock.clone()
    }

    fn next_seq(&self) -> u64 {
        let mut inner = self.inner.borrow_mut();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        seq
    }

    /// Schedule `callback` to run at `time_ps`, among the non-clock
    /// priority queue. Lower `priority` values run first among events at
    /// the same time.
    pub fn schedule_async(&self, time_ps: u64, priority: i64, callback: impl FnOnce() + 'static) {
        let seq = self.next_seq();
        self.inner.borrow_mut().async_events.push(Reverse(AsyncEntry {
            time_ps,
            priority,
            seq,
            callback: Box::new(callback),
        }));
    }

    /// Schedule a clock-phase callback at `time_ps`, tagged with the
    /// owning clock's id and the phase step within its period.
    pub fn schedule_clock(
        &self,
        time_ps: u64,
        clock_id: u64,
        step: u64,
        callback: impl FnOnce() + 'static,
    ) {
        let seq = self.next_seq();
        self.inner.borrow_mut().clock_events.push(Reverse(ClockEntry {
            time_ps,
            clock_id,
            step,
            seq,
            callback: Box::new(callback),
        }));
    }

    /// Queue `callback` to run before time advances again, in the order
    /// queued.
    pub fn post_immediate(&self, callback: impl FnOnce() + 'static) {
        self.inner.borrow_mut().immediate.push_back(Box::new(callback));
    }

    /// Run every immediate callback queued as of this call, in a single
    /// snapshot pass: callbacks posted by ones running in this pass are
    /// deferred to the next `drain_immediate`, not executed now. Then
    /// drain the task trampoline once.
    pub fn drain_immediate(&self) {
        let pending: Vec<Callback> = {
            let mut inner = self.inner.borrow_mut();
            std::mem::take(&mut inner.immediate).into_iter().collect()
        };
        for cb in pending {
            cb();
        }
        pump_ready_queue();
    }

    /// The time of the next pending clock or async event, if any.
    pub fn peek_next_time(&self) -> Option<u64> {
        let inner = self.inner.borrow();
        let clock_time = inner.clock_events.peek().map(|Reverse(e)| e.time_ps);
        let async_time = inner.async_events.peek().map(|Reverse(e)| e.time_ps);
        match (clock_time, async_time) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        }
    }

    /// Advance the virtual clock to `time_ps`. Never moves it backwards
    /// (enforced by `VirtualClock::advance_to`).
    pub(crate) fn set_current_time(&self, time_ps: u64) {
        self.clock.advance_to(time_ps);
    }

    /// Pop every clock-phase event due at exactly `time_ps`, in priority
    /// order (by clock id, then step, then schedule order), without
    /// running them.
    pub fn pop_due_clock_events(&self, time_ps: u64) -> Vec<Callback> {
        let mut inner = self.inner.borrow_mut();
        let mut due = Vec::new();
        while matches!(inner.clock_events.peek(), Some(Reverse(e)) if e.time_ps == time_ps) {
            if let Some(Reverse(entry)) = inner.clock_events.pop() {
                due.push(entry.callback);
            }
        }
        due
    }

    /// Pop every async event due at exactly `time_ps`, in priority order,
    /// without running them.
    pub fn pop_due_async_events(&self, time_ps: u64) -> Vec<Callback> {
        let mut inner = self.inner.borrow_mut();
        let mut due = Vec::new();
        while matches!(inner.async_events.peek(), Some(Reverse(e)) if e.time_ps == time_ps) {
            if let Some(Reverse(entry)) = inner.async_events.pop() {
                due.push(entry.callback);
            }
        }
        due
    }

    /// Drop every pending clock event, async event, and immediate
    /// callback, and reset the schedule-order counter. Virtual time is
    /// left untouched — this is for reusing a scheduler across multiple
    /// simulation runs in the same process, not for rewinding time.
    pub fn clear(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.clock_events.clear();
        inner.async_events.clear();
        inner.immediate.clear();
        inner.next_seq = 0;
    }

    /// Advance to the next scheduled instant and run every event due at
    /// that instant: all clock-phase events first (ordered by clock id
    /// then step), then all other events (ordered by priority). Returns
    /// `false` if nothing was pending.
    ///
    /// Clock events run before same-instant async events because a
    /// clock's phase is what user tasks typically condition their
    /// delay/TLM waits on; running it first means a task woken this
    /// instant sees pins already updated for the new phase.
    pub fn advance_next(&self) -> bool {
        self.drain_immediate();
        let Some(time_ps) = self.peek_next_time() else {
            return false;
        };
        self.set_current_time(time_ps);

        for callback in self.pop_due_clock_events(time_ps) {
            callback();
            self.drain_immediate();
        }

        for callback in self.pop_due_async_events(time_ps) {
            callback();
            self.drain_immediate();
        }

        pump_ready_queue();
        true
    }

    /// Run `advance_next` until both event queues and the immediate queue
    /// are empty.
    pub fn run_until_idle(&self) {
        self.drain_immediate();
        while self.advance_next() {}
    }

    /// `true` if there is nothing left to run: no pending clock events,
    /// async events, or immediate callbacks.
    pub fn is_idle(&self) -> bool {
        let inner = self.inner.borrow();
        inner.clock_events.is_empty() && inner.async_events.is_empty() && inner.immediate.is_empty()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Scheduler::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;

    #[test]
    fn events_at_the_same_time_run_in_scheduling_order() {
        let scheduler = Scheduler::new();
        let order = Rc::new(StdRefCell::new(Vec::new()));

        for id in 0..3 {
            let order = Rc::clone(&order);
            scheduler.schedule_async(10, 0, move || order.borrow_mut().push(id));
        }

        scheduler.run_until_idle();
        assert_eq!(*order.borrow(), vec![0, 1, 2]);
        assert_eq!(scheduler.now(), 10);
    }

    #[test]
    fn lower_priority_runs_first_at_the_same_time() {
        let scheduler = Scheduler::new();
        let order = Rc::new(StdRefCell::new(Vec::new()));

        let o1 = Rc::clone(&order);
        scheduler.schedule_async(5, 10, move || o1.borrow_mut().push("low-priority-number"));
        let o2 = Rc::clone(&order);
        scheduler.schedule_async(5, -10, move || o2.borrow_mut().push("high-priority-number"));

        scheduler.run_until_idle();
        assert_eq!(*order.borrow(), vec!["high-priority-number", "low-priority-number"]);
    }

    #[test]
    fn clock_events_precede_async_events_at_the_same_instant() {
        let scheduler = Scheduler::new();
        let order = Rc::new(StdRefCell::new(Vec::new()));

        let o1 = Rc::clone(&order);
        scheduler.schedule_async(7, 0, move || o1.borrow_mut().push("async"));
        let o2 = Rc::clone(&order);
        scheduler.schedule_clock(7, 0, 0, move || o2.borrow_mut().push("clock"));

        scheduler.run_until_idle();
        assert_eq!(*order.borrow(), vec!["clock", "async"]);
    }

    #[test]
    fn time_never_moves_backwards() {
        let scheduler = Scheduler::new();
        scheduler.schedule_async(100, 0, || {});
        scheduler.schedule_async(5, 0, || {});
        scheduler.run_until_idle();
        assert_eq!(scheduler.now(), 100);
    }

    #[test]
    fn an_immediate_callback_posted_during_a_drain_waits_for_the_next_drain() {
        let scheduler = Scheduler::new();
        let order = Rc::new(StdRefCell::new(Vec::new()));

        let o1 = Rc::clone(&order);
        let inner_scheduler = scheduler.clone();
        scheduler.post_immediate(move || {
            o1.borrow_mut().push("first");
            let o2 = Rc::clone(&o1);
            inner_scheduler.post_immediate(move || o2.borrow_mut().push("deferred"));
        });

        scheduler.drain_immediate();
        assert_eq!(*order.borrow(), vec!["first"]);

        scheduler.drain_immediate();
        assert_eq!(*order.borrow(), vec!["first", "deferred"]);
    }

    #[test]
    fn clear_drops_pending_events_but_leaves_virtual_time_alone() {
        let scheduler = Scheduler::new();
        scheduler.schedule_async(10, 0, || {});
        scheduler.schedule_clock(10, 0, 0, || {});
        scheduler.post_immediate(|| {});
        scheduler.run_until_idle();
        assert_eq!(scheduler.now(), 10);

        scheduler.schedule_async(20, 0, || panic!("must not run after clear"));
        scheduler.clear();
        assert!(scheduler.is_idle());
        assert_eq!(scheduler.now(), 10);

        scheduler.run_until_idle();
        assert_eq!(scheduler.now(), 10);
    }
}
