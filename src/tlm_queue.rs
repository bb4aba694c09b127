//! An unbounded, single-producer/single-consumer transaction-level queue.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

use crate::task::pump_ready_queue;

struct QueueInner<T> {
    fifo: VecDeque<T>,
    waiters: VecDeque<Waker>,
}

impl<T> Default for QueueInner<T> {
    fn default() -> Self {
        QueueInner {
            fifo: VecDeque::new(),
            waiters: VecDeque::new(),
        }
    }
}

/// An unbounded FIFO queue between simulation components. Backpressure and
/// a bounded/blocking variant are out of scope (see `SPEC_FULL.md`
/// Non-goals); `blocking_put` below is a plain `put` alias kept for
/// familiarity with testbenches ported from elsewhere.
pub struct TlmQueue<T> {
    inner: Rc<RefCell<QueueInner<T>>>,
}

impl<T> Clone for TlmQueue<T> {
    fn clone(&self) -> Self {
        TlmQueue {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Default for TlmQueue<T> {
    fn default() -> Self {
        TlmQueue {
            inner: Rc::new(RefCell::new(QueueInner::default())),
        }
    }
}

impl<T> TlmQueue<T> {
    pub fn new() -> Self {
        TlmQueue::default()
    }

    /// Push a value and wake the oldest waiter, if any.
    pub fn put(&self, value: T) {
        let waker = {
            let mut inner = self.inner.borrow_mut();
            inner.fifo.push_back(value);
            inner.waiters.pop_front()
        };
        if let Some(waker) = waker {
            waker.wake();
            pump_ready_queue();
        }
    }

    /// Alias for [`TlmQueue::put`] — there is no bounded/backpressured
    /// variant.
    pub fn blocking_put(&self, value: T) {
        self.put(value);
    }

    /// An awaitable resolving to the next value in FIFO order.
    pub fn get(&self) -> QueueGet<T> {
        QueueGet {
            inner: Rc::clone(&self.inner),
            registered: false,
        }
    }

    /// Non-blocking pop; `None` if the queue is currently empty.
    pub fn try_get(&self) -> Option<T> {
        self.inner.borrow_mut().fifo.pop_front()
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().fifo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().fifo.is_empty()
    }
}

pub struct QueueGet<T> {
    inner: Rc<RefCell<QueueInner<T>>>,
    registered: bool,
}

impl<T> Future for QueueGet<T> {
    type Output = T;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut inner = self.inner.borrow_mut();
        if let Some(value) = inner.fifo.pop_front() {
            return Poll::Ready(value);
        }
        if !self.registered {
            inner.waiters.push_back(cx.waker().clone());
            self.registered = true;
        }
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Failure;
    use crate::task::Task;

    #[test]
    fn values_are_delivered_in_fifo_order() {
        let queue: TlmQueue<u32> = TlmQueue::new();
        queue.put(1);
        queue.put(2);
        queue.put(3);
        assert_eq!(queue.try_get(), Some(1));
        assert_eq!(queue.try_get(), Some(2));
        assert_eq!(queue.try_get(), Some(3));
        assert_eq!(queue.try_get(), None);
    }

    #[test]
    fn a_waiting_consumer_wakes_on_put() {
        let queue: TlmQueue<u32> = TlmQueue::new();
        let consumer = queue.clone();
        let task = Task::spawn(async move { Ok::<_, Failure>(consumer.get().await) });
        task.start();
        assert!(!task.is_done());

        queue.put(99);
        assert!(task.is_done());
        assert_eq!(task.result(), Ok(99));
    }
}
