use std::future::Future;

use log::trace;

use crate::errors::Result;
use crate::isolation::IsolationLevel;
use crate::nesting::check_nesting;
use crate::stack::PersistentStack;

/// One entry on the logical transaction stack.
///
/// A frame records the read/write mode and isolation level of one active
/// transaction. Frames are plain immutable values; the stack they live on is
/// a [`PersistentStack`], so pushing a frame for a child scope never disturbs
/// the view of any other execution branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackFrame {
    /// Whether the transaction only reads.
    pub read_only: bool,
    /// The isolation level the transaction was opened with.
    pub isolation: IsolationLevel,
}

impl StackFrame {
    pub fn new(read_only: bool, isolation: IsolationLevel) -> Self {
        Self {
            read_only,
            isolation,
        }
    }
}

tokio::task_local! {
    /// The logical transaction stack of the current asynchronous call chain.
    ///
    /// Absent by default; set for the dynamic extent of a scoped block by
    /// [`with_frame`]. Child tasks spawned without an explicit scope do not
    /// inherit it, which matches the rule that a transaction frame belongs to
    /// the block that opened it, not to everything the block ever spawns.
    static TX_STACK: PersistentStack<StackFrame>;
}

/// Returns the current logical transaction stack.
///
/// Outside any transactional block this is the empty stack; callers never
/// observe an "unset" state distinct from empty.
pub fn current_stack() -> PersistentStack<StackFrame> {
    TX_STACK
        .try_with(PersistentStack::clone)
        .unwrap_or_default()
}

/// Returns the top frame of the current transaction stack, if any.
pub fn active_frame() -> Option<StackFrame> {
    TX_STACK
        .try_with(|stack| stack.peek().copied())
        .ok()
        .flatten()
}

/// Number of transaction frames active on the current call chain.
pub fn transaction_depth() -> usize {
    TX_STACK.try_with(PersistentStack::len).unwrap_or(0)
}

/// Whether any transaction frame is active on the current call chain.
pub fn in_transaction() -> bool {
    transaction_depth() > 0
}

/// Runs `fut` with `frame` pushed onto the current transaction stack.
///
/// The extension lasts exactly for the dynamic extent of `fut`: the prior
/// stack is a separate immutable value, so it is "restored" on every exit
/// path (success, early return, error, or cancellation) simply because
/// nothing was ever mutated. Sibling branches scoped from the same ancestor
/// stack never observe each other's frames.
///
/// This is the raw extension primitive; transaction-opening callers normally
/// go through [`transactional`], which validates nesting first.
pub async fn with_frame<F>(frame: StackFrame, fut: F) -> F::Output
where
    F: Future,
{
    let extended = current_stack().push(frame);
    trace!(
        "entering transaction frame (read_only={}, isolation={:?}, depth={})",
        frame.read_only,
        frame.isolation,
        extended.len()
    );
    TX_STACK.scope(extended, fut).await
}

/// Opens a transactional block: validates nesting against the current
/// context, then runs `fut` under the new frame.
///
/// Returns the nesting rejection without polling `fut` when the proposed
/// `(read_only, isolation)` pair is not allowed to start here. The frame is
/// active only while `fut` runs; the caller is expected to bracket the real
/// storage-engine transaction (begin/commit/rollback) inside `fut`.
///
/// # Examples
///
/// ```no_run
/// use txguard::prelude::*;
///
/// # async fn demo() -> txguard::Result<()> {
/// let total = transactional(true, IsolationLevel::ReadCommitted, async {
///     // read-only work; nested read-only transactions are still allowed
///     Ok(42_u64)
/// })
/// .await?;
/// assert_eq!(total, 42);
/// # Ok(())
/// # }
/// ```
pub async fn transactional<T, F>(
    read_only: bool,
    isolation: IsolationLevel,
    fut: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    check_nesting(read_only, isolation)?;
    with_frame(StackFrame::new(read_only, isolation), fut).await
}
