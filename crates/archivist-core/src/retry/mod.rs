//! Retry policy for navigation-class operations.
//!
//! Bounded attempts with a fixed backoff; once the budget is spent the last
//! error is returned to the caller, which treats it as fatal.

mod policy;
mod run;

pub use policy::{ErrorKind, RetryDecision, RetryPolicy};
pub use run::{run_with_retry, Exhausted};
