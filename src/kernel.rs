//! The outer driving loop: start every registered root task, step the
//! scheduler forward cycle by cycle, and surface the first failure any
//! of them raises.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::component::{Context, SimulationComponent};
use crate::dut::{Dut, WaveformSink};
use crate::error::Failure;
use crate::scheduler::Scheduler;
use crate::task::{pump_ready_queue, Task};

/// A JSON-serializable summary of one [`Kernel::run`] call, for harnesses
/// and CI that want a machine-readable result alongside the tracing logs.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub cycles_requested: u64,
    pub steps_run: u64,
    pub final_time_ps: u64,
    pub all_roots_done: bool,
    pub failure: Option<Failure>,
}

impl RunReport {
    /// `0` on success, matching [`crate::error::SimError::exit_code`]'s
    /// verification-failure code, for harnesses that only have the report.
    pub fn exit_code(&self) -> i32 {
        if self.failure.is_some() {
            1
        } else {
            0
        }
    }
}

/// A discrete-event kernel driving a fixed set of root tasks against a
/// shared scheduler, for up to a caller-chosen number of cycles.
///
/// "Cycle" here means one scheduler step (`Scheduler::advance_next`) —
/// one batch of same-instant events. A kernel wired to a free-running
/// `Clock` never idles on its own (the clock keeps re-arming itself), so
/// the cycle bound is what actually stops the run; `Scheduler::
/// run_until_idle` is only safe for scenarios with no free-running clock.
pub struct Kernel {
    scheduler: Scheduler,
    dut: Option<Rc<RefCell<dyn Dut>>>,
    waveform: Option<Rc<RefCell<dyn WaveformSink>>>,
    clocks: Vec<Clock>,
    roots: Vec<Task<()>>,
}

impl Kernel {
    pub fn new() -> Self {
        Kernel {
            scheduler: Scheduler::new(),
            dut: None,
            waveform: None,
            clocks: Vec::new(),
            roots: Vec::new(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn attach_dut(&mut self, dut: Rc<RefCell<dyn Dut>>) {
        self.dut = Some(dut);
    }

    pub fn attach_waveform(&mut self, sink: Rc<RefCell<dyn WaveformSink>>) {
        self.waveform = Some(sink);
    }

    /// Register a clock so [`Kernel::initialise`] self-schedules its first
    /// event. A clock not registered here still runs if started directly,
    /// but then `initialise` won't arm it.
    pub fn register_clock(&mut self, clock: Clock) {
        self.clocks.push(clock);
    }

    pub fn context(&self) -> Context {
        Context::new(self.scheduler.clone(), self.dut.clone())
    }

    /// Ask every registered clock to self-schedule its first event. Call
    /// this once before [`Kernel::start_root_tasks`]/[`Kernel::run`].
    pub fn initialise(&self) {
        for clock in &self.clocks {
            clock.start();
        }
    }

    /// Register a component's root coroutine. Not started until
    /// [`Kernel::start_root_tasks`] or [`Kernel::run`]. Calls `build_phase`
    /// then `connect_phase` on the component before spawning its
    /// `run_phase` coroutine, per the component lifecycle.
    pub fn spawn_component<C>(&mut self, component: Rc<C>)
    where
        C: SimulationComponent + 'static,
    {
        component.build_phase();
        component.connect_phase();
        let ctx = self.context();
        let future = component.run_phase(ctx);
        self.spawn_future(future);
    }

    fn eval_dut(&self) {
        if let Some(dut) = &self.dut {
            dut.borrow_mut().eval();
        }
    }

    fn dump_waveform(&self, time_ps: u64) {
        if let Some(sink) = &self.waveform {
            sink.borrow_mut().dump(time_ps);
        }
    }

    /// Register a bare future as a root task, for tests and small
    /// harnesses that don't need the full `SimulationComponent` trait.
    pub fn spawn_future(&mut self, future: Pin<Box<dyn Future<Output = Result<(), Failure>>>>) {
        let task = Task::spawn(async move { future.await });
        self.roots.push(task);
    }

    /// Start every registered root task, driving each to its first
    /// suspension point, then drain the trampoline once so tasks that
    /// woke each other up synchronously all get to run.
    pub fn start_root_tasks(&self) {
        for task in &self.roots {
            task.start();
        }
        pump_ready_queue();
    }

    /// `check_exception` is a no-op on an unfinished task, so this needs
    /// no `is_done()` guard: every root is checked every cycle regardless
    /// of whether it has completed yet.
    fn first_failure(&self) -> Option<Failure> {
        self.roots.iter().find_map(|task| task.check_exception().err())
    }

    /// Drive one batch of same-instant events: advance time to the next
    /// pending instant, run its clock events then its async events (each
    /// followed by a DUT eval), drain the immediate queue once, eval the
    /// DUT again, and dump a waveform sample. Returns `false` if nothing
    /// was pending.
    fn run_one_cycle(&self) -> Result<bool, Failure> {
        let Some(time_ps) = self.scheduler.peek_next_time() else {
            return Ok(false);
        };
        self.scheduler.set_current_time(time_ps);

        for callback in self.scheduler.pop_due_clock_events(time_ps) {
            callback();
            pump_ready_queue();
        }
        if let Some(failure) = self.first_failure() {
            return Err(failure);
        }

        for callback in self.scheduler.pop_due_async_events(time_ps) {
            callback();
            pump_ready_queue();
            self.eval_dut();
        }
        if let Some(failure) = self.first_failure() {
            return Err(failure);
        }

        self.scheduler.drain_immediate();
        self.eval_dut();
        if let Some(failure) = self.first_failure() {
            return Err(failure);
        }

        self.dump_waveform(time_ps);
        Ok(true)
    }

    /// Run for up to `cycles` scheduler steps, stopping early if the
    /// scheduler goes idle or a root task fails. Returns the first
    /// failure encountered, if any.
    pub fn run(&mut self, cycles: u64) -> Result<(), Failure> {
        info!(cycles, "starting kernel run");

        for step in 0..cycles {
            if let Some(failure) = self.first_failure() {
                info!(step, %failure, "halting: a root task failed");
                return Err(failure);
            }
            match self.run_one_cycle() {
                Ok(true) => {}
                Ok(false) => {
                    debug!(step, "scheduler idle, stopping early");
                    break;
                }
                Err(failure) => {
                    info!(step, %failure, "halting: a root task failed");
                    return Err(failure);
                }
            }
        }

        if let Some(failure) = self.first_failure() {
            return Err(failure);
        }
        Ok(())
    }

    /// `true` once every registered root task has completed.
    pub fn all_roots_done(&self) -> bool {
        self.roots.iter().all(|t| t.is_done())
    }

    /// Like [`Kernel::run`], but returns a [`RunReport`] instead of a bare
    /// `Result`, for callers that want a serializable summary regardless
    /// of whether the run failed.
    pub fn run_report(&mut self, cycles: u64) -> RunReport {
        let mut steps_run = 0;
        let mut failure = None;

        for step in 0..cycles {
            steps_run = step;
            if let Some(f) = self.first_failure() {
                failure = Some(f);
                break;
            }
            match self.run_one_cycle() {
                Ok(true) => {
                    steps_run = step + 1;
                }
                Ok(false) => {
                    steps_run = step + 1;
                    break;
                }
                Err(f) => {
                    failure = Some(f);
                    steps_run = step + 1;
                    break;
                }
            }
        }
        if failure.is_none() {
            failure = self.first_failure();
        }

        RunReport {
            cycles_requested: cycles,
            steps_run,
            final_time_ps: self.scheduler.now(),
            all_roots_done: self.all_roots_done(),
            failure,
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delay::delay_ns;

    #[test]
    fn run_stops_as_soon_as_a_root_task_fails() {
        let mut kernel = Kernel::new();
        let scheduler = kernel.scheduler().clone();
        kernel.spawn_future(Box::pin(async move {
            delay_ns(&scheduler, 1).await;
            Err(Failure::verification("mismatch"))
        }));
        kernel.start_root_tasks();

        let result = kernel.run(10);
        assert_eq!(result, Err(Failure::verification("mismatch")));
    }

    #[test]
    fn run_completes_successfully_when_all_roots_finish() {
        let mut kernel = Kernel::new();
        let scheduler = kernel.scheduler().clone();
        kernel.spawn_future(Box::pin(async move {
            delay_ns(&scheduler, 1).await;
            Ok(())
        }));
        kernel.start_root_tasks();

        let result = kernel.run(10);
        assert!(result.is_ok());
        assert!(kernel.all_roots_done());
    }

    #[test]
    fn run_respects_the_cycle_budget_against_a_free_running_source() {
        let mut kernel = Kernel::new();
        let scheduler = kernel.scheduler().clone();
        kernel.spawn_future(Box::pin(async move {
            loop {
                delay_ns(&scheduler, 1).await;
            }
        }));
        kernel.start_root_tasks();

        let result = kernel.run(5);
        assert!(result.is_ok());
        assert!(!kernel.all_roots_done());
    }

    #[test]
    fn initialise_arms_registered_clocks_and_the_loop_evals_the_dut_and_dumps_waveforms() {
        struct CountingDut {
            evals: u32,
            clk: u64,
        }
        impl Dut for CountingDut {
            fn eval(&mut self) {
                self.evals += 1;
            }
            fn set_input(&mut self, name: &str, value: u64) {
                if name == "clk" {
                    self.clk = value;
                }
            }
            fn get_output(&self, _name: &str) -> u64 {
                0
            }
        }

        struct RecordingWaveform {
            dumps: Vec<u64>,
        }
        impl WaveformSink for RecordingWaveform {
            fn dump(&mut self, time_ps: u64) {
                self.dumps.push(time_ps);
            }
        }

        let mut kernel = Kernel::new();
        let dut = Rc::new(RefCell::new(CountingDut { evals: 0, clk: 0 }));
        kernel.attach_dut(dut.clone());
        let waveform = Rc::new(RefCell::new(RecordingWaveform { dumps: Vec::new() }));
        kernel.attach_waveform(waveform.clone());

        let scheduler = kernel.scheduler().clone();
        let dut_for_clock = Rc::clone(&dut);
        let clock = Clock::with_drive(&scheduler, 1_000, move |level| {
            dut_for_clock.borrow_mut().set_input("clk", level as u64);
        });
        kernel.register_clock(clock);

        kernel.initialise();
        kernel.start_root_tasks();
        let result = kernel.run(4);

        assert!(result.is_ok());
        assert_eq!(dut.borrow().clk, 0);
        assert_eq!(dut.borrow().evals, 4);
        assert_eq!(waveform.borrow().dumps, vec![0, 250, 500, 750]);
    }

    #[test]
    fn run_report_serializes_a_failure_to_json() {
        let mut kernel = Kernel::new();
        let scheduler = kernel.scheduler().clone();
        kernel.spawn_future(Box::pin(async move {
            delay_ns(&scheduler, 1).await;
            Err(Failure::verification("mismatch"))
        }));
        kernel.start_root_tasks();

        let report = kernel.run_report(10);
        assert_eq!(report.exit_code(), 1);
        assert!(report.failure.is_some());

        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"kind\":\"Verification\""));
        assert!(json.contains("\"message\":\"mismatch\""));
    }
}
