//! Structured concurrency: `await` on a whole group of tasks at once.
//!
//! `when_all` fails fast — the first child failure is propagated and the
//! remaining children are left to finish on their own time (they are not
//! cancelled; this kernel has no cancellation primitive). `when_all_ready`
//! never fails: it waits for every child to reach a terminal state and
//! hands back the finished task handles for the caller to inspect.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::error::Failure;
use crate::task::Task;

struct CounterInner {
    remaining: u64,
    waker: Option<Waker>,
}

/// Shared countdown reaching zero once every child has completed.
///
/// Starts at `n + 1` rather than `n`: the extra count is released only
/// after every child has been `.start()`ed, which avoids the race where
/// the last-spawned child completes synchronously (e.g. it never
/// suspends) and wakes the counter before the remaining children have
/// even been registered.
struct Counter {
    inner: Rc<RefCell<CounterInner>>,
}

impl Counter {
    fn new(n: u64) -> Self {
        Counter {
            inner: Rc::new(RefCell::new(CounterInner {
                remaining: n + 1,
                waker: None,
            })),
        }
    }

    fn count_down(&self) {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            inner.remaining -= 1;
            if inner.remaining == 0 {
                inner.waker.take()
            } else {
                None
            }
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn wait(&self) -> CounterWait {
        CounterWait {
            inner: Rc::clone(&self.inner),
        }
    }
}

struct CounterWait {
    inner: Rc<RefCell<CounterInner>>,
}

impl Future for CounterWait {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.remaining == 0 {
            Poll::Ready(())
        } else {
            inner.waker = Some(cx.waker().clone());
            Poll::Pending
        }
    }
}

/// Start every task in `tasks`, wait for all of them to finish, and
/// return the first failure encountered (in task order) or every output
/// in order if all succeeded.
pub async fn when_all<T: 'static>(tasks: Vec<Task<T>>) -> Result<Vec<T>, Failure> {
    let counter = Counter::new(tasks.len() as u64);
    for task in &tasks {
        let counter_handle = counter.inner.clone();
        let t = task.clone();
        t.start();
        watch_completion(t, counter_handle);
    }
    counter.count_down(); // release the +1
    counter.wait().await;

    let mut outputs = Vec::with_capacity(tasks.len());
    let mut first_err = None;
    for task in tasks {
        match task.await {
            Ok(value) => outputs.push(value),
            Err(err) => {
                if first_err.is_none() {
                    first_err = Some(err);
                }
            }
        }
    }
    match first_err {
        Some(err) => Err(err),
        None => Ok(outputs),
    }
}

/// Start every task in `tasks` and wait for all of them to reach a
/// terminal state, regardless of success or failure. Never fails itself;
/// callers inspect each returned handle with `result`.
pub async fn when_all_ready<T: 'static>(tasks: Vec<Task<T>>) -> Vec<Task<T>> {
    let counter = Counter::new(tasks.len() as u64);
    for task in &tasks {
        let counter_handle = counter.inner.clone();
        let t = task.clone();
        t.start();
        watch_completion(t, counter_handle);
    }
    counter.count_down();
    counter.wait().await;
    tasks
}

/// Poll `task` to completion purely to trigger `counter.count_down()` at
/// the right moment; the task's actual output is collected separately by
/// the caller once the whole group is done.
fn watch_completion<T: 'static>(task: Task<T>, counter: Rc<RefCell<CounterInner>>) {
    if task.is_done() {
        Counter { inner: counter }.count_down();
        return;
    }
    let waiter = Task::spawn(async move {
        let _ = task.await;
        Counter { inner: counter }.count_down();
        Ok::<_, Failure>(())
    });
    waiter.start();
}

/// Heterogeneous, fixed-arity `when_all` over tasks of different output
/// types. Each task is started before any of them is awaited, so they
/// run concurrently up to their first suspension point; the first
/// failure (in argument order) is returned, otherwise a tuple of every
/// output. Supports 1 through 6 tasks — for a larger or dynamic-size
/// group use [`when_all`] over a homogeneous `Vec`.
#[macro_export]
macro_rules! when_all {
    ($t0:expr) => {{
        async move {
            let t0 = $t0;
            t0.start();
            match t0.await {
                Ok(v0) => Ok((v0,)),
                Err(e) => Err(e),
            }
        }
    }};
    ($t0:expr, $t1:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            t0.start();
            t1.start();
            match (t0.await, t1.await) {
                (Ok(v0), Ok(v1)) => Ok((v0, v1)),
                (Err(e), _) => Err(e),
                (_, Err(e)) => Err(e),
            }
        }
    }};
    ($t0:expr, $t1:expr, $t2:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            let t2 = $t2;
            t0.start();
            t1.start();
            t2.start();
            match (t0.await, t1.await, t2.await) {
                (Ok(v0), Ok(v1), Ok(v2)) => Ok((v0, v1, v2)),
                (Err(e), _, _) => Err(e),
                (_, Err(e), _) => Err(e),
                (_, _, Err(e)) => Err(e),
            }
        }
    }};
    ($t0:expr, $t1:expr, $t2:expr, $t3:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            let t2 = $t2;
            let t3 = $t3;
            t0.start();
            t1.start();
            t2.start();
            t3.start();
            match (t0.await, t1.await, t2.await, t3.await) {
                (Ok(v0), Ok(v1), Ok(v2), Ok(v3)) => Ok((v0, v1, v2, v3)),
                (Err(e), _, _, _) => Err(e),
                (_, Err(e), _, _) => Err(e),
                (_, _, Err(e), _) => Err(e),
                (_, _, _, Err(e)) => Err(e),
            }
        }
    }};
    ($t0:expr, $t1:expr, $t2:expr, $t3:expr, $t4:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            let t2 = $t2;
            let t3 = $t3;
            let t4 = $t4;
            t0.start();
            t1.start();
            t2.start();
            t3.start();
            t4.start();
            match (t0.await, t1.await, t2.await, t3.await, t4.await) {
                (Ok(v0), Ok(v1), Ok(v2), Ok(v3), Ok(v4)) => Ok((v0, v1, v2, v3, v4)),
                (Err(e), _, _, _, _) => Err(e),
                (_, Err(e), _, _, _) => Err(e),
                (_, _, Err(e), _, _) => Err(e),
                (_, _, _, Err(e), _) => Err(e),
                (_, _, _, _, Err(e)) => Err(e),
            }
        }
    }};
    ($t0:expr, $t1:expr, $t2:expr, $t3:expr, $t4:expr, $t5:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            let t2 = $t2;
            let t3 = $t3;
            let t4 = $t4;
            let t5 = $t5;
            t0.start();
            t1.start();
            t2.start();
            t3.start();
            t4.start();
            t5.start();
            match (t0.await, t1.await, t2.await, t3.await, t4.await, t5.await) {
                (Ok(v0), Ok(v1), Ok(v2), Ok(v3), Ok(v4), Ok(v5)) => Ok((v0, v1, v2, v3, v4, v5)),
                (Err(e), _, _, _, _, _) => Err(e),
                (_, Err(e), _, _, _, _) => Err(e),
                (_, _, Err(e), _, _, _) => Err(e),
                (_, _, _, Err(e), _, _) => Err(e),
                (_, _, _, _, Err(e), _) => Err(e),
                (_, _, _, _, _, Err(e)) => Err(e),
            }
        }
    }};
}

/// Heterogeneous, fixed-arity `when_all_ready`. Never fails; hands back
/// the finished task handles (same arity rules as [`when_all!`]).
#[macro_export]
macro_rules! when_all_ready {
    ($t0:expr) => {{
        async move {
            let t0 = $t0;
            t0.start();
            let h0 = t0.clone();
            let _ = t0.await;
            (h0,)
        }
    }};
    ($t0:expr, $t1:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            t0.start();
            t1.start();
            let (h0, h1) = (t0.clone(), t1.clone());
            let _ = (t0.await, t1.await);
            (h0, h1)
        }
    }};
    ($t0:expr, $t1:expr, $t2:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            let t2 = $t2;
            t0.start();
            t1.start();
            t2.start();
            let (h0, h1, h2) = (t0.clone(), t1.clone(), t2.clone());
            let _ = (t0.await, t1.await, t2.await);
            (h0, h1, h2)
        }
    }};
    ($t0:expr, $t1:expr, $t2:expr, $t3:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            let t2 = $t2;
            let t3 = $t3;
            t0.start();
            t1.start();
            t2.start();
            t3.start();
            let (h0, h1, h2, h3) = (t0.clone(), t1.clone(), t2.clone(), t3.clone());
            let _ = (t0.await, t1.await, t2.await, t3.await);
            (h0, h1, h2, h3)
        }
    }};
    ($t0:expr, $t1:expr, $t2:expr, $t3:expr, $t4:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            let t2 = $t2;
            let t3 = $t3;
            let t4 = $t4;
            t0.start();
            t1.start();
            t2.start();
            t3.start();
            t4.start();
            let (h0, h1, h2, h3, h4) = (t0.clone(), t1.clone(), t2.clone(), t3.clone(), t4.clone());
            let _ = (t0.await, t1.await, t2.await, t3.await, t4.await);
            (h0, h1, h2, h3, h4)
        }
    }};
    ($t0:expr, $t1:expr, $t2:expr, $t3:expr, $t4:expr, $t5:expr) => {{
        async move {
            let t0 = $t0;
            let t1 = $t1;
            let t2 = $t2;
            let t3 = $t3;
            let t4 = $t4;
            let t5 = $t5;
            t0.start();
            t1.start();
            t2.start();
            t3.start();
            t4.start();
            t5.start();
            let (h0, h1, h2, h3, h4, h5) = (
                t0.clone(),
                t1.clone(),
                t2.clone(),
                t3.clone(),
                t4.clone(),
                t5.clone(),
            );
            let _ = (t0.await, t1.await, t2.await, t3.await, t4.await, t5.await);
            (h0, h1, h2, h3, h4, h5)
        }
    }};
}
