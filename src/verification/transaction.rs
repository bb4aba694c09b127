//! Framework-level transaction: a payload travelling from a sequencer to
//! a driver, with a response slot the driver (or downstream monitor)
//! fills in and a done event the originator can await.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::event::Event;

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(0);

/// A single transaction: request payload `P`, optional response `R`.
///
/// `txn_id` is drawn from a process-wide monotonic counter so logs from
/// concurrently in-flight transactions can be told apart even though the
/// kernel itself is single-threaded.
pub struct Transaction<P, R> {
    pub txn_id: u64,
    pub payload: P,
    pub response: Option<R>,
    pub done: Event,
}

impl<P, R> Transaction<P, R> {
    pub fn new(payload: P) -> Self {
        Transaction {
            txn_id: NEXT_TXN_ID.fetch_add(1, Ordering::Relaxed),
            payload,
            response: None,
            done: Event::new(),
        }
    }

    /// Fill in the response and wake anyone awaiting `done`.
    pub fn complete(&mut self, response: R) {
        self.response = Some(response);
        self.done.trigger();
    }
}
