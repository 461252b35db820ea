use serde::{Deserialize, Serialize};

/// Defines the isolation levels a transaction frame can carry.
///
/// The levels are totally ordered from least to most strict, and the derived
/// [`Ord`] reflects that ordering: `ReadUncommitted < ReadCommitted <
/// RepeatableRead < Serializable`. The nesting enforcer relies on this order
/// to reject elevated-isolation transactions proposed inside a write frame.
///
/// Unlike an STM, which can never expose a dirty read, this crate fronts
/// arbitrary storage engines, so the full SQL ladder is represented.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum IsolationLevel {
    /// **Read Uncommitted:**
    ///
    /// The weakest level. A transaction may observe changes from concurrent
    /// transactions that have not yet committed (dirty reads). Offered only
    /// because some storage engines expose it; most adapters never propose it.
    ReadUncommitted,
    /// **Read Committed:**
    ///
    /// Any data read is committed at the moment it is read. Re-reading the
    /// same item within one transaction may observe different values if a
    /// concurrent transaction commits in between. Prevents dirty reads but
    /// allows non-repeatable reads and phantom reads.
    ReadCommitted,
    /// **Repeatable Read:**
    ///
    /// Once a transaction has read a data item, subsequent reads of the same
    /// item within that transaction return the same value. Prevents
    /// non-repeatable reads; phantom reads remain possible.
    RepeatableRead,
    /// **Serializable:**
    ///
    /// The strictest level: transactions produce the same result as if they
    /// had executed one after another serially. Prevents dirty reads,
    /// non-repeatable reads, and phantom reads. How the underlying engine
    /// achieves this (locking, SSI validation) is its own concern; this crate
    /// only orders the level against the others.
    Serializable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_totally_ordered() {
        assert!(IsolationLevel::ReadUncommitted < IsolationLevel::ReadCommitted);
        assert!(IsolationLevel::ReadCommitted < IsolationLevel::RepeatableRead);
        assert!(IsolationLevel::RepeatableRead < IsolationLevel::Serializable);
    }

    #[test]
    fn elevated_means_at_least_read_committed() {
        assert!(IsolationLevel::ReadCommitted >= IsolationLevel::ReadCommitted);
        assert!(IsolationLevel::Serializable >= IsolationLevel::ReadCommitted);
        assert!(IsolationLevel::ReadUncommitted < IsolationLevel::ReadCommitted);
    }
}
