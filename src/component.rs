//! The context handed to every component and the trait components
//! implement to plug into the kernel.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::clock::Clock;
use crate::delay::{delay, delay_ms, delay_ns, delay_us, Delay};
use crate::dut::Dut;
use crate::error::Failure;
use crate::scheduler::Scheduler;

/// Everything a running component needs: the scheduler (for delays and
/// user-scheduled callbacks) and, if one was attached, the DUT it drives.
#[derive(Clone)]
pub struct Context {
    scheduler: Scheduler,
    dut: Option<Rc<RefCell<dyn Dut>>>,
}

impl Context {
    pub(crate) fn new(scheduler: Scheduler, dut: Option<Rc<RefCell<dyn Dut>>>) -> Self {
        Context { scheduler, dut }
    }

    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn delay(&self, ps: u64) -> Delay {
        delay(&self.scheduler, ps)
    }

    pub fn delay_ns(&self, ns: u64) -> Delay {
        delay_ns(&self.scheduler, ns)
    }

    pub fn delay_us(&self, us: u64) -> Delay {
        delay_us(&self.scheduler, us)
    }

    pub fn delay_ms(&self, ms: u64) -> Delay {
        delay_ms(&self.scheduler, ms)
    }

    pub fn new_clock(&self, period_ps: u64) -> Clock {
        Clock::new(&self.scheduler, period_ps)
    }

    /// A clock wired to drive a DUT input pin; see [`Clock::with_drive`].
    pub fn new_clock_with_drive(&self, period_ps: u64, dut_drive: impl Fn(bool) + 'static) -> Clock {
        Clock::with_drive(&self.scheduler, period_ps, dut_drive)
    }

    /// The attached DUT, if the kernel was given one.
    pub fn dut(&self) -> Option<Rc<RefCell<dyn Dut>>> {
        self.dut.clone()
    }
}

/// A component plugs into the kernel by producing its own root coroutine.
///
/// The environment calls `build_phase` then `connect_phase` on every
/// component before creating root tasks from their `run_phase` coroutines.
/// Both hooks default to no-ops; most components only need `run_phase`.
///
/// The `Rc<Self>` receiver on `run_phase` is what lets it return a
/// `'static` boxed future without borrowing `self`: implementations that
/// need shared mutable state put it behind their own `RefCell`/`Cell`
/// fields and clone `self` (the `Rc`) into the returned `async` block.
pub trait SimulationComponent {
    /// Construct child components and local state. No-op by default.
    fn build_phase(&self) {}

    /// Wire this component to others (queues, clocks, DUT handles) after
    /// every component has run `build_phase`. No-op by default.
    fn connect_phase(&self) {}

    fn run_phase(self: Rc<Self>, ctx: Context) -> Pin<Box<dyn Future<Output = Result<(), Failure>>>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Task;

    struct Counter {
        ticks: RefCell<u32>,
        target: u32,
    }

    impl SimulationComponent for Counter {
        fn run_phase(self: Rc<Self>, ctx: Context) -> Pin<Box<dyn Future<Output = Result<(), Failure>>>> {
            Box::pin(async move {
                while *self.ticks.borrow() < self.target {
                    ctx.delay_ns(1).await;
                    *self.ticks.borrow_mut() += 1;
                }
                Ok(())
            })
        }
    }

    #[test]
    fn the_kernel_runs_build_then_connect_before_starting_run_phase() {
        use crate::kernel::Kernel;

        struct Lifecycle {
            log: RefCell<Vec<&'static str>>,
        }

        impl SimulationComponent for Lifecycle {
            fn build_phase(&self) {
                self.log.borrow_mut().push("build");
            }

            fn connect_phase(&self) {
                self.log.borrow_mut().push("connect");
            }

            fn run_phase(
                self: Rc<Self>,
                _ctx: Context,
            ) -> Pin<Box<dyn Future<Output = Result<(), Failure>>>> {
                self.log.borrow_mut().push("run");
                Box::pin(async { Ok(()) })
            }
        }

        let component = Rc::new(Lifecycle {
            log: RefCell::new(Vec::new()),
        });
        let mut kernel = Kernel::new();
        kernel.spawn_component(Rc::clone(&component));
        kernel.start_root_tasks();

        assert_eq!(*component.log.borrow(), vec!["build", "connect", "run"]);
    }

    #[test]
    fn a_component_drives_its_own_root_task_via_the_context() {
        let scheduler = Scheduler::new();
        let ctx = Context::new(scheduler.clone(), None);
        let component = Rc::new(Counter {
            ticks: RefCell::new(0),
            target: 3,
        });
        let fut = Rc::clone(&component).run_phase(ctx);
        let task = Task::spawn(async move { fut.await });
        task.start();
        scheduler.run_until_idle();
        assert!(task.is_done());
        assert_eq!(*component.ticks.borrow(), 3);
    }
}
