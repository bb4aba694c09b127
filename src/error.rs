//! Failure taxonomy for the kernel (spec §7).
//!
//! Three categories: a verification check failing, misuse of a core
//! primitive, and everything else. Verification and Runtime failures are
//! captured per-task and re-raised at the next `await`/`check_exception`;
//! Contract failures are programmer errors and panic at the misuse site.

use serde::Serialize;
use thiserror::Error;

/// A failure captured inside a [`crate::task::Task`]'s result slot.
///
/// Cloneable so that [`crate::task::Task::check_exception`] and
/// [`crate::task::Task::result`] can be called repeatedly by the kernel
/// without consuming the stored outcome.
/// Serializable so a [`crate::kernel::RunReport`] can carry the failure
/// verbatim into a JSON test-log line instead of flattening it to text.
///
/// `Contract` is never returned from a task: misuse of a core primitive
/// (double `start()`, a `reset()` with queued waiters, ...) panics at the
/// call site instead. The variant exists so the display text for a
/// contract panic's payload shares this enum's `Display` impl.
#[derive(Debug, Clone, Error, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "message")]
pub enum Failure {
    /// A check in user code (typically a scoreboard) detected a mismatch.
    #[error("verification failure: {0}")]
    Verification(String),
    /// Misuse of a core primitive. Only ever seen as a panic payload.
    #[error("contract violation: {0}")]
    Contract(String),
    /// Any other failure raised by user code during a task's execution.
    #[error("runtime failure: {0}")]
    Runtime(String),
}

impl Failure {
    pub fn verification(msg: impl Into<String>) -> Self {
        Failure::Verification(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Failure::Contract(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Failure::Runtime(msg.into())
    }
}

/// Panic with a [`Failure::Contract`] describing the violated invariant.
///
/// Used at misuse sites (double `start()`, `reset()` with pending waiters)
/// where the condition indicates a programming error, not a simulated
/// failure — matching how the standard library panics on `unwrap()` of
/// `None` rather than returning a `Result`.
#[track_caller]
pub fn contract_violation(msg: impl Into<String>) -> ! {
    panic!("{}", Failure::contract(msg))
}

impl From<anyhow::Error> for Failure {
    fn from(err: anyhow::Error) -> Self {
        Failure::Runtime(err.to_string())
    }
}

/// Raise a [`Failure::Verification`], the core primitive described in
/// spec §7 ("a fatal helper that logs and raises a distinguished
/// VerificationFailure").
pub fn fatal(msg: impl Into<String>) -> Failure {
    let failure = Failure::verification(msg);
    tracing::error!(%failure, "verification failure");
    failure
}

/// Top-level error for the CLI harness binary (spec §6/§7 ambient
/// surface) — not part of the core kernel, which only ever produces
/// [`Failure`].
#[derive(Debug, Error)]
pub enum SimError {
    #[error(transparent)]
    Kernel(#[from] Failure),
    #[error("invalid CLI arguments: {0}")]
    Cli(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl SimError {
    /// Exit code taxonomy for the harness (spec §6): 0 only on success,
    /// distinct nonzero codes per failure class.
    pub fn exit_code(&self) -> i32 {
        match self {
            SimError::Kernel(Failure::Verification(_)) => 1,
            SimError::Cli(_) => 2,
            SimError::Kernel(Failure::Runtime(_) | Failure::Contract(_)) => 3,
            SimError::Io(_) => 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verification_failure_round_trips_through_display() {
        let f = fatal("mismatch at cycle 4");
        assert_eq!(f.to_string(), "verification failure: mismatch at cycle 4");
    }

    #[test]
    fn exit_codes_are_distinguished_by_class() {
        let v = SimError::Kernel(Failure::verification("x"));
        let r = SimError::Kernel(Failure::runtime("y"));
        let c = SimError::Cli("bad flag".into());
        assert_ne!(v.exit_code(), r.exit_code());
        assert_ne!(v.exit_code(), c.exit_code());
        assert_eq!(v.exit_code(), 1);
    }
}
