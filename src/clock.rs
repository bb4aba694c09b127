//! Free-running, self-scheduling multi-phase clocks.
//!
//! A `Clock` re-arms itself with the scheduler every period: it never
//! needs an external driver once started. Each period fires its four
//! phases — rising edge, positive mid, falling edge, negative mid — in
//! that order, matching edge-triggered RTL semantics.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::{Phase, PhaseEvent, PhaseEventWait};
use crate::scheduler::Scheduler;

static NEXT_CLOCK_ID: AtomicU64 = AtomicU64::new(0);

/// The timing offsets of the four phases within one period, in
/// picoseconds measured from the period's start (its rising edge).
#[derive(Debug, Clone, Copy)]
pub struct ClockStep {
    pub rising_edge: u64,
    pub positive_mid: u64,
    pub falling_edge: u64,
    pub negative_mid: u64,
}

impl ClockStep {
    /// A symmetric 50%-duty-cycle clock: edges at 0 and half the period,
    /// sampling points at the quarter marks.
    pub fn symmetric(period_ps: u64) -> Self {
        ClockStep {
            rising_edge: 0,
            positive_mid: period_ps / 4,
            falling_edge: period_ps / 2,
            negative_mid: (period_ps * 3) / 4,
        }
    }
}

struct ClockEvents {
    rising_edge: PhaseEvent,
    positive_mid: PhaseEvent,
    falling_edge: PhaseEvent,
    negative_mid: PhaseEvent,
    current_level: Cell<bool>,
    dut_drive_callback: Option<Box<dyn Fn(bool)>>,
}

impl Default for ClockEvents {
    fn default() -> Self {
        ClockEvents {
            rising_edge: PhaseEvent::new(),
            positive_mid: PhaseEvent::new(),
            falling_edge: PhaseEvent::new(),
            negative_mid: PhaseEvent::new(),
            current_level: Cell::new(false),
            dut_drive_callback: None,
        }
    }
}

/// A periodic, self-scheduling clock driving four [`PhaseEvent`]s.
#[derive(Clone)]
pub struct Clock {
    scheduler: Scheduler,
    id: u64,
    period_ps: u64,
    step: ClockStep,
    events: Rc<ClockEvents>,
}

impl Clock {
    /// A new clock with a symmetric 50% duty cycle, not yet running.
    pub fn new(scheduler: &Scheduler, period_ps: u64) -> Self {
        Clock::with_step(scheduler, period_ps, ClockStep::symmetric(period_ps))
    }

    /// A new clock with explicit phase offsets, not yet running.
    pub fn with_step(scheduler: &Scheduler, period_ps: u64, step: ClockStep) -> Self {
        Clock::build(scheduler, period_ps, step, None)
    }

    /// A clock that also drives a DUT input pin: `dut_drive` is called with
    /// `true` on every `RisingEdge`/`PositiveMid` step and `false` on every
    /// `FallingEdge`/`NegativeMid` step, before that step's phase event
    /// fires.
    pub fn with_drive(
        scheduler: &Scheduler,
        period_ps: u64,
        dut_drive: impl Fn(bool) + 'static,
    ) -> Self {
        Clock::build(
            scheduler,
            period_ps,
            ClockStep::symmetric(period_ps),
            Some(Box::new(dut_drive)),
        )
    }

    fn build(
        scheduler: &Scheduler,
        period_ps: u64,
        step: ClockStep,
        dut_drive_callback: Option<Box<dyn Fn(bool)>>,
    ) -> Self {
        Clock {
            scheduler: scheduler.clone(),
            id: NEXT_CLOCK_ID.fetch_add(1, Ordering::Relaxed),
            period_ps,
            step,
            events: Rc::new(ClockEvents {
                dut_drive_callback,
                ..ClockEvents::default()
            }),
        }
    }

    pub fn period_ps(&self) -> u64 {
        self.period_ps
    }

    /// The level this clock drove at its most recent step: `true` from
    /// `RisingEdge` through `PositiveMid`, `false` from `FallingEdge`
    /// through `NegativeMid`.
    pub fn current_level(&self) -> bool {
        self.events.current_level.get()
    }

    /// Arm the scheduler for this period's four phases and schedule the
    /// next period's arming right after the last one fires. Calling this
    /// more than once without an intervening period boundary would
    /// double-schedule, so it is only ever called from `start` and from
    /// the negative-mid callback itself.
    pub fn start(&self) {
        self.arm_period(self.scheduler.now());
    }

    fn arm_period(&self, period_start: u64) {
        self.arm_phase(period_start, Phase::RisingEdge, self.step.rising_edge, 0);
        self.arm_phase(period_start, Phase::PositiveMid, self.step.positive_mid, 1);
        self.arm_phase(period_start, Phase::FallingEdge, self.step.falling_edge, 2);
        self.arm_phase(period_start, Phase::NegativeMid, self.step.negative_mid, 3);
    }

    fn arm_phase(&self, period_start: u64, phase: Phase, offset: u64, step_index: u64) {
        let clock = self.clone();
        let time_ps = period_start + offset;
        self.scheduler.schedule_clock(time_ps, self.id, step_index, move || {
            clock.fire(phase, period_start);
        });
    }

    fn fire(&self, phase: Phase, period_start: u64) {
        let level = matches!(phase, Phase::RisingEdge | Phase::PositiveMid);
        self.events.current_level.set(level);
        if let Some(drive) = &self.events.dut_drive_callback {
            drive(level);
        }

        match phase {
            Phase::RisingEdge => self.events.rising_edge.trigger_phase(Phase::RisingEdge),
            Phase::PositiveMid => self.events.positive_mid.trigger_phase(Phase::PositiveMid),
            Phase::FallingEdge => self.events.falling_edge.trigger_phase(Phase::FallingEdge),
            Phase::NegativeMid => {
                self.events.negative_mid.trigger_phase(Phase::NegativeMid);
                self.arm_period(period_start + self.period_ps);
            }
        }
    }

    pub fn rising_edge(&self) -> PhaseEventWait {
        self.events.rising_edge.wait(Phase::RisingEdge)
    }

    pub fn positive_mid(&self) -> PhaseEventWait {
        self.events.positive_mid.wait(Phase::PositiveMid)
    }

    pub fn falling_edge(&self) -> PhaseEventWait {
        self.events.falling_edge.wait(Phase::FallingEdge)
    }

    pub fn negative_mid(&self) -> PhaseEventWait {
        self.events.negative_mid.wait(Phase::NegativeMid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::task::Task;
    use std::cell::RefCell;

    #[test]
    fn phases_fire_in_order_each_period() {
        let scheduler = Scheduler::new();
        let clock = Clock::new(&scheduler, 1_000);
        let order = Rc::new(RefCell::new(Vec::new()));

        {
            let order = Rc::clone(&order);
            let clock = clock.clone();
            let task = Task::spawn(async move {
                clock.rising_edge().await;
                order.borrow_mut().push("rising");
                clock.positive_mid().await;
                order.borrow_mut().push("positive_mid");
                clock.falling_edge().await;
                order.borrow_mut().push("falling");
                clock.negative_mid().await;
                order.borrow_mut().push("negative_mid");
                Ok::<_, Failure>(())
            });
            task.start();
        }

        clock.start();
        // A free-running clock never idles the scheduler on its own, so
        // tests bound the number of steps instead of running to idle.
        for _ in 0..4 {
            scheduler.advance_next();
        }

        assert_eq!(
            *order.borrow(),
            vec!["rising", "positive_mid", "falling", "negative_mid"]
        );
    }

    #[test]
    fn the_clock_drives_a_dut_pin_high_on_rising_and_low_on_falling() {
        let scheduler = Scheduler::new();
        let levels = Rc::new(RefCell::new(Vec::new()));
        let levels_clone = Rc::clone(&levels);
        let clock = Clock::with_drive(&scheduler, 1_000, move |level| {
            levels_clone.borrow_mut().push(level);
        });

        clock.start();
        for _ in 0..4 {
            scheduler.advance_next();
        }

        assert_eq!(*levels.borrow(), vec![true, true, false, false]);
        assert!(!clock.current_level());
    }

    #[test]
    fn clock_free_runs_across_multiple_periods() {
        let scheduler = Scheduler::new();
        let clock = Clock::new(&scheduler, 100);
        let count = Rc::new(RefCell::new(0u32));

        {
            let count = Rc::clone(&count);
            let clock = clock.clone();
            let task = Task::spawn(async move {
                for _ in 0..3 {
                    clock.rising_edge().await;
                    *count.borrow_mut() += 1;
                }
                Ok::<_, Failure>(())
            });
            task.start();
        }

        clock.start();
        // Three rising edges span periods [0, 100) .. up to the third
        // rising edge at t=200; one clock step advances one phase.
        for _ in 0..9 {
            scheduler.advance_next();
        }
        assert_eq!(*count.borrow(), 3);
        assert_eq!(scheduler.now(), 200);
    }
}
