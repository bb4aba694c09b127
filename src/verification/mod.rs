//! A thin, DUT-agnostic verification framework layered on the kernel:
//! transactions, a sequencer/driver/monitor hookup, and scoreboards.
//! Concrete DUT bindings stay out of scope — everything here is generic
//! over the transaction payload type.

mod driver;
mod scoreboard;
mod sequencer;
mod transaction;

pub use driver::{Driver, Monitor};
pub use scoreboard::{Scoreboard, SequenceScoreboard};
pub use sequencer::Sequencer;
pub use transaction::Transaction;
