//! A generator of transactions feeding a single downstream driver through
//! a `TlmQueue`, matching a producer-pushes/one-listener-drains shape.

use crate::tlm_queue::TlmQueue;

/// The producer side of a driver's input queue. Generic over the item
/// type so a testbench can sequence anything a `Driver` consumes.
pub struct Sequencer<T> {
    queue: TlmQueue<T>,
}

impl<T> Default for Sequencer<T> {
    fn default() -> Self {
        Sequencer {
            queue: TlmQueue::new(),
        }
    }
}

impl<T> Clone for Sequencer<T> {
    fn clone(&self) -> Self {
        Sequencer {
            queue: self.queue.clone(),
        }
    }
}

impl<T> Sequencer<T> {
    pub fn new() -> Self {
        Sequencer::default()
    }

    /// The queue a paired `Driver` should drain from.
    pub fn queue(&self) -> TlmQueue<T> {
        self.queue.clone()
    }

    /// Hand a transaction to the driver, in order.
    pub fn send(&self, item: T) {
        self.queue.put(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_arrive_at_the_paired_queue_in_order() {
        let seq: Sequencer<u32> = Sequencer::new();
        let queue = seq.queue();
        seq.send(1);
        seq.send(2);
        assert_eq!(queue.try_get(), Some(1));
        assert_eq!(queue.try_get(), Some(2));
    }
}
