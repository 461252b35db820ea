use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::nesting::NestingViolation;

#[derive(Error, Debug)]
pub enum TxguardError {
    #[error("transaction nesting violation: {0}")]
    NestingViolation(#[from] NestingViolation),

    #[error("operation must not run inside an active transaction")]
    NeverViolation,

    #[error("chaos fault injected at site `{site}` (profile `{profile}`, seed {seed})")]
    ChaosInjected {
        /// Name of the injection site that fired.
        site: String,
        /// Name of the chaos profile bound to the site.
        profile: String,
        /// Global seed snapshot the site's key was constructed under.
        seed: u64,
    },

    #[error("transaction conflict detected")]
    Conflict,

    #[error("storage error: {0}")]
    Storage(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("other error: {0}")]
    Other(String),
}

impl TxguardError {
    /// Returns the [`FailureKind`] used by the retry engine to match this
    /// failure against a policy's retryable set.
    pub fn kind(&self) -> FailureKind {
        match self {
            TxguardError::NestingViolation(_) => FailureKind::Nesting,
            TxguardError::NeverViolation => FailureKind::Never,
            TxguardError::ChaosInjected { .. } => FailureKind::ChaosInjected,
            TxguardError::Conflict => FailureKind::Conflict,
            TxguardError::Storage(_) => FailureKind::Storage,
            TxguardError::Cancelled => FailureKind::Cancelled,
            TxguardError::InvalidConfig(_) => FailureKind::InvalidConfig,
            TxguardError::Other(_) => FailureKind::Other,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, TxguardError::Cancelled)
    }
}

/// Classification key for failures, used to decide retryability.
///
/// A [`crate::retry::RetryPolicy`] holds a set of these; the retry engine
/// re-invokes an operation only when the surfaced error's kind is a member.
/// [`FailureKind::Cancelled`] is special-cased: it is never retried even when
/// a policy (mis)lists it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    /// A nesting-rule rejection. Fatal to the attempted call, never retried.
    Nesting,
    /// A tx-never guard failure. Fatal, never retried.
    Never,
    /// A deliberately injected chaos fault. Often configured as retryable.
    ChaosInjected,
    /// A transaction conflict reported by the storage engine.
    Conflict,
    /// A storage-layer failure.
    Storage,
    /// Cancellation or shutdown. Always propagated immediately.
    Cancelled,
    /// A rejected configuration value.
    InvalidConfig,
    /// Anything else.
    Other,
}

pub type Result<T> = std::result::Result<T, TxguardError>;
