use log::debug;
use thiserror::Error;

use crate::context::{active_frame, StackFrame};
use crate::errors::{Result, TxguardError};
use crate::isolation::IsolationLevel;

/// The reason a proposed transaction was rejected by the nesting rules.
///
/// The rules boil down to: a write frame rejects every new transaction, a
/// read frame rejects writes, and only read-inside-read nests. The variants
/// keep the distinctions apart because adapters surface them differently
/// (a `WriteInsideWrite` usually points at a missing `tx-repeat` refactor,
/// an `ElevatedIsolationInsideWrite` at an isolation-level mismatch).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NestingViolation {
    #[error("a write transaction cannot start inside an active write transaction")]
    WriteInsideWrite,

    #[error(
        "a transaction at READ_COMMITTED or stricter cannot start inside an active write transaction"
    )]
    ElevatedIsolationInsideWrite,

    #[error("a read-only transaction cannot start inside an active write transaction")]
    ReadInsideWrite,

    #[error("a write transaction cannot start inside an active read-only transaction")]
    WriteInsideRead,
}

/// Evaluates the nesting rules for a proposed frame against an active one.
///
/// Pure function over the top of the transaction stack. Rules are evaluated
/// in order and the first match wins; no match means accept:
///
/// 1. write active, write proposed → [`NestingViolation::WriteInsideWrite`]
/// 2. write active, proposed isolation ≥ `ReadCommitted` →
///    [`NestingViolation::ElevatedIsolationInsideWrite`]
/// 3. write active, read proposed → [`NestingViolation::ReadInsideWrite`]
/// 4. read active, write proposed → [`NestingViolation::WriteInsideRead`]
/// 5. no active frame, or read-inside-read → accept
///
/// Rules 1–3 together mean an active write frame rejects *any* new
/// transaction; the split only decides which reason the caller sees.
pub fn check_frame(
    active: Option<&StackFrame>,
    proposed: &StackFrame,
) -> std::result::Result<(), NestingViolation> {
    let Some(active) = active else {
        return Ok(());
    };

    if !active.read_only {
        if !proposed.read_only {
            return Err(NestingViolation::WriteInsideWrite);
        }
        if proposed.isolation >= IsolationLevel::ReadCommitted {
            return Err(NestingViolation::ElevatedIsolationInsideWrite);
        }
        return Err(NestingViolation::ReadInsideWrite);
    }

    if !proposed.read_only {
        return Err(NestingViolation::WriteInsideRead);
    }

    Ok(())
}

/// Checks whether a transaction with the given mode and isolation level may
/// start on the current call chain.
///
/// Side-effect free: acceptance does not push anything. The caller pushes the
/// frame (via [`crate::context::with_frame`] or
/// [`crate::context::transactional`]) only after acceptance, and the scoped
/// extension guarantees the push is undone on every exit path.
pub fn check_nesting(read_only: bool, isolation: IsolationLevel) -> Result<()> {
    let proposed = StackFrame::new(read_only, isolation);
    let active = active_frame();
    check_frame(active.as_ref(), &proposed).map_err(|violation| {
        debug!(
            "nesting check rejected (active={:?}, proposed={:?}): {}",
            active, proposed, violation
        );
        TxguardError::from(violation)
    })
}

/// Asserts that no transaction is active on the current call chain.
///
/// Guards tx-never operations: long-running or non-idempotent external
/// calls that must not run with a transaction open. Fails inside any active
/// frame, read or write.
pub fn assert_no_active_transaction() -> Result<()> {
    match active_frame() {
        None => Ok(()),
        Some(frame) => {
            debug!("never-guard tripped inside active frame {:?}", frame);
            Err(TxguardError::NeverViolation)
        }
    }
}
