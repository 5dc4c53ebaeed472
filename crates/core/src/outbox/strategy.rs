//! Pluggable enqueue/dequeue strategy for the outbox list.

use outpost_domain::{Transaction, TransactionId};

/// Pure list operations used by the state machine.
///
/// Implementations must not drop or reorder transactions other than the one
/// being removed; head-of-line blocking depends on it.
pub trait QueueStrategy: Send + Sync {
    /// Insert a freshly stamped transaction.
    fn enqueue(&self, outbox: Vec<Transaction>, txn: Transaction) -> Vec<Transaction>;

    /// Remove the transaction that just completed.
    fn dequeue(&self, outbox: Vec<Transaction>, completed: TransactionId) -> Vec<Transaction>;

    /// Next transaction to send.
    fn peek<'a>(&self, outbox: &'a [Transaction]) -> Option<&'a Transaction> {
        outbox.first()
    }
}

/// Strict append / remove-by-id.
#[derive(Debug, Clone, Copy, Default)]
pub struct FifoStrategy;

impl QueueStrategy for FifoStrategy {
    fn enqueue(&self, mut outbox: Vec<Transaction>, txn: Transaction) -> Vec<Transaction> {
        outbox.push(txn);
        outbox
    }

    fn dequeue(&self, mut outbox: Vec<Transaction>, completed: TransactionId) -> Vec<Transaction> {
        outbox.retain(|txn| txn.id != completed);
        outbox
    }
}
