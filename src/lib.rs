//! Run-time guarantees about participation in transactional execution.
//!
//! Txguard gives storage adapters and application code four tightly coupled
//! pieces: an immutable transaction stack propagated along asynchronous call
//! chains ([`context`]), a nesting-rule enforcer over that stack ([`nesting`]),
//! a retry/backoff engine ([`retry`]), and a seed-deterministic chaos injector
//! ([`chaos`]) used to prove, under repeatable injected faults, that retried
//! operations really are safe to retry.
//!
//! The crate does not open storage transactions itself and offers no
//! distributed-transaction guarantees; it supplies the run-time stack,
//! assertions, and test machinery that adapters build on.

pub mod chaos;
pub mod context;
pub mod errors;
pub mod isolation;
pub mod nesting;
pub mod retry;
pub mod stack;

// Re-export key types and functions for easier access
pub use chaos::{
    chaos_enabled, chaos_seed, configure, inject_after, inject_before, inject_before_wrapping,
    ChaosDraw, ChaosKey, ChaosProfile,
};
pub use context::{
    active_frame, current_stack, in_transaction, transaction_depth, transactional, with_frame,
    StackFrame,
};
pub use errors::{FailureKind, Result, TxguardError};
pub use isolation::IsolationLevel;
pub use nesting::{assert_no_active_transaction, check_frame, check_nesting, NestingViolation};
pub use retry::{retry, RetryPolicy};
pub use stack::PersistentStack;

/// Txguard prelude
pub mod prelude {
    pub use crate::chaos::*;
    pub use crate::context::*;
    pub use crate::errors::*;
    pub use crate::isolation::*;
    pub use crate::nesting::*;
    pub use crate::retry::*;
    pub use crate::stack::*;
}
