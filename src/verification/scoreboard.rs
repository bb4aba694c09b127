//! Comparing observed transactions against expectations.

use crate::error::{fatal, Failure};

/// Checks one observed value per call, raising a [`Failure::Verification`]
/// on mismatch via [`fatal`].
pub trait Scoreboard<T> {
    fn check(&mut self, actual: T) -> Result<(), Failure>;
}

/// A scoreboard comparing observed values against a fixed expected
/// sequence, in order — the common case for directed tests.
pub struct SequenceScoreboard<T> {
    expected: std::collections::VecDeque<T>,
}

impl<T> SequenceScoreboard<T> {
    pub fn new(expected: impl IntoIterator<Item = T>) -> Self {
        SequenceScoreboard {
            expected: expected.into_iter().collect(),
        }
    }

    pub fn is_drained(&self) -> bool {
        self.expected.is_empty()
    }
}

impl<T: PartialEq + std::fmt::Debug> Scoreboard<T> for SequenceScoreboard<T> {
    fn check(&mut self, actual: T) -> Result<(), Failure> {
        match self.expected.pop_front() {
            Some(expected) if expected == actual => Ok(()),
            Some(expected) => Err(fatal(format!("expected {expected:?}, got {actual:?}"))),
            None => Err(fatal(format!("unexpected extra value {actual:?}"))),
        }
    }
}
