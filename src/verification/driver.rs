//! DUT-agnostic driver and monitor contracts. Concrete pin-wiring is left
//! to the (out-of-scope) DUT-specific implementation.

use std::future::Future;
use std::pin::Pin;

/// Applies one transaction to the DUT. Manual `async fn` desugaring
/// (a boxed future) rather than a proc-macro, since this crate keeps its
/// async traits dependency-free.
pub trait Driver<T> {
    fn drive<'a>(&'a mut self, txn: T) -> Pin<Box<dyn Future<Output = ()> + 'a>>
    where
        T: 'a;
}

/// Samples the DUT and produces one observed transaction.
pub trait Monitor<T> {
    fn sample<'a>(&'a mut self) -> Pin<Box<dyn Future<Output = T> + 'a>>;
}
