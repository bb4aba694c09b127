//! Cooperative, lazily-started tasks with a trampoline executor.
//!
//! There is no generic async runtime here (see `SPEC_FULL.md` §9): each
//! [`Task`] drives its own future directly, using a hand-rolled `Waker`
//! backed by an `Rc`. The one piece of genuinely global machinery is the
//! trampoline queue below — every `Waker::wake()` enqueues a resume thunk
//! rather than driving the future recursively, so an await-chain of
//! arbitrary depth never grows the native call stack.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

use crate::error::{contract_violation, Failure};

thread_local! {
    static READY: RefCell<VecDeque<Box<dyn FnOnce()>>> = RefCell::new(VecDeque::new());
}

/// Enqueue a resume thunk instead of running it now. Called only from
/// waker implementations.
fn enqueue(thunk: Box<dyn FnOnce()>) {
    READY.with(|q| q.borrow_mut().push_back(thunk));
}

/// Drain the trampoline queue until empty.
///
/// Every outer driving point (`Task::start`, the scheduler after each
/// event group, `when_all`'s counter future) calls this after whatever
/// triggered new wakeups, so a resumed task never runs from inside
/// another task's `wake()`.
pub fn pump_ready_queue() {
    loop {
        let next = READY.with(|q| q.borrow_mut().pop_front());
        match next {
            Some(thunk) => thunk(),
            None => break,
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T, Failure>>>>;

struct Inner<T> {
    future: Option<BoxFuture<T>>,
    result: Option<Result<T, Failure>>,
    continuation: Option<Waker>,
    started: bool,
}

/// A lazily-started, single-shot cooperative task.
///
/// Nothing runs until [`Task::start`] is called, or the task is `.await`ed
/// from inside another task (which starts it implicitly on first poll).
/// Cloning a `Task` shares the same underlying future and result slot —
/// it is a handle, not a new task.
pub struct Task<T> {
    inner: Rc<RefCell<Inner<T>>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Task {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> Task<T> {
    /// Wrap `future` in a new, unstarted task.
    pub fn spawn<F>(future: F) -> Self
    where
        F: Future<Output = Result<T, Failure>> + 'static,
    {
        Task {
            inner: Rc::new(RefCell::new(Inner {
                future: Some(Box::pin(future)),
                result: None,
                continuation: None,
                started: false,
            })),
        }
    }

    /// Begin execution, driving the future to its first suspension point
    /// (or completion). Calling `start` a second time is a contract
    /// violation — a task runs exactly once.
    pub fn start(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.started {
                contract_violation("Task::start called on an already-started task");
            }
            inner.started = true;
        }
        drive(&self.inner);
        pump_ready_queue();
    }

    /// `true` once the future has resolved, successfully or not.
    pub fn is_done(&self) -> bool {
        self.inner.borrow().result.is_some()
    }

    /// Propagate a stored failure, if there is one. A no-op on a task that
    /// hasn't completed yet — callers that want to poll this alongside
    /// other tasks every cycle don't need to guard it with `is_done()`
    /// first, and a successful result is left in the slot untouched.
    pub fn check_exception(&self) -> Result<(), Failure> {
        match self.inner.borrow().result {
            Some(Err(ref failure)) => Err(failure.clone()),
            _ => Ok(()),
        }
    }

    /// Read the completed result without consuming it.
    ///
    /// Requires `T: Clone` because, unlike `.await`ing the task directly,
    /// this accessor may be called more than once (e.g. from
    /// `when_all_ready`, which hands callers the finished task handles
    /// rather than their outputs). Panics if the task has not completed.
    pub fn result(&self) -> Result<T, Failure>
    where
        T: Clone,
    {
        self.inner
            .borrow()
            .result
            .clone()
            .unwrap_or_else(|| contract_violation("Task::result on an unfinished task"))
    }
}

impl<T: 'static> Future for Task<T> {
    type Output = Result<T, Failure>;

    /// Never drives the wrapped future inline. On first poll it records
    /// the waker and schedules the initial drive onto the trampoline
    /// queue, then returns `Pending` immediately — even if the future
    /// would have completed synchronously. This is what keeps a chain of
    /// N nested `child.await`s from recursing N native stack frames deep:
    /// each link hands control back to the nearest `pump_ready_queue`
    /// instead of polling its child in place.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = self.inner.borrow_mut();
        if let Some(result) = inner.result.take() {
            return Poll::Ready(result);
        }
        if !inner.started {
            inner.started = true;
            inner.continuation = Some(cx.waker().clone());
            drop(inner);
            let target = Rc::clone(&self.inner);
            enqueue(Box::new(move || drive(&target)));
            return Poll::Pending;
        }
        inner.continuation = Some(cx.waker().clone());
        Poll::Pending
    }
}

/// Drive `inner`'s future one step: poll it once, store the output if it
/// completed, and wake whoever is awaiting this task. Never calls itself
/// recursively — resumption after this step happens via the trampoline.
fn drive<T: 'static>(inner: &Rc<RefCell<Inner<T>>>) {
    let waker = task_waker(Rc::clone(inner));
    let mut cx = Context::from_waker(&waker);

    let mut future_slot = {
        let mut guard = inner.borrow_mut();
        match guard.future.take() {
            Some(f) => f,
            None => return, // already completed; a stray wake after Ready
        }
    };

    match future_slot.as_mut().poll(&mut cx) {
        Poll::Ready(result) => {
            let continuation = {
                let mut guard = inner.borrow_mut();
                guard.result = Some(result);
                guard.continuation.take()
            };
            if let Some(waker) = continuation {
                waker.wake();
            }
        }
        Poll::Pending => {
            inner.borrow_mut().future = Some(future_slot);
        }
    }
}

fn task_waker<T: 'static>(inner: Rc<RefCell<Inner<T>>>) -> Waker {
    let raw = Rc::into_raw(inner) as *const ();
    unsafe { Waker::from_raw(RawWaker::new(raw, vtable::<T>())) }
}

fn vtable<T: 'static>() -> &'static RawWakerVTable {
    &RawWakerVTable::new(
        clone_raw::<T>,
        wake_raw::<T>,
        wake_by_ref_raw::<T>,
        drop_raw::<T>,
    )
}

unsafe fn clone_raw<T: 'static>(ptr: *const ()) -> RawWaker {
    let rc = Rc::from_raw(ptr as *const RefCell<Inner<T>>);
    let cloned = Rc::clone(&rc);
    std::mem::forget(rc);
    RawWaker::new(Rc::into_raw(cloned) as *const (), vtable::<T>())
}

unsafe fn wake_raw<T: 'static>(ptr: *const ()) {
    let rc = Rc::from_raw(ptr as *const RefCell<Inner<T>>);
    enqueue(Box::new(move || drive(&rc)));
}

unsafe fn wake_by_ref_raw<T: 'static>(ptr: *const ()) {
    let rc = Rc::from_raw(ptr as *const RefCell<Inner<T>>);
    let cloned = Rc::clone(&rc);
    std::mem::forget(rc);
    enqueue(Box::new(move || drive(&cloned)));
}

unsafe fn drop_raw<T: 'static>(ptr: *const ()) {
    drop(Rc::from_raw(ptr as *const RefCell<Inner<T>>));
}
