use std::collections::HashMap;
use std::sync::RwLock;

use crate::error::ChainError;
use crate::transaction::Transaction;

/// Concurrent staging area for validated, not-yet-mined transactions,
/// keyed by transaction id.
///
/// The pool performs no validation of its own; callers validate before
/// inserting. All operations are safe under concurrent callers (the mining
/// thread and any number of inbound handlers); selection takes the read
/// lock only.
#[derive(Debug, Default)]
pub struct Mempool {
    inner: RwLock<HashMap<String, Transaction>>,
}

impl Mempool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a transaction. Rejects duplicates by id.
    pub fn add(&self, tx: Transaction) -> Result<(), ChainError> {
        let mut pool = self.inner.write().expect("mempool lock poisoned");
        if pool.contains_key(&tx.id) {
            return Err(ChainError::DuplicateTransaction);
        }
        pool.insert(tx.id.clone(), tx);
        Ok(())
    }

    /// Remove every listed id. Idempotent: ids not present are ignored,
    /// since the same transaction may be evicted twice during concurrent
    /// mining and reorgs.
    pub fn remove_many<I, S>(&self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut pool = self.inner.write().expect("mempool lock poisoned");
        for id in ids {
            pool.remove(id.as_ref());
        }
    }

    /// Up to `n` transactions ordered by descending fee; ties in arbitrary
    /// order. Does not mutate the pool.
    pub fn select_top_by_fee(&self, n: usize) -> Vec<Transaction> {
        let pool = self.inner.read().expect("mempool lock poisoned");
        let mut txs: Vec<Transaction> = pool.values().cloned().collect();
        txs.sort_by(|a, b| b.fee.cmp(&a.fee));
        txs.truncate(n);
        txs
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .read()
            .expect("mempool lock poisoned")
            .contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.inner.read().expect("mempool lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids currently staged (for the mempool listing endpoint).
    pub fn ids(&self) -> Vec<String> {
        self.inner
            .read()
            .expect("mempool lock poisoned")
            .keys()
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(fee: i64) -> Transaction {
        Transaction::new_unsigned("sender", "recipient", 10, fee)
    }

    #[test]
    fn add_rejects_duplicate_id() {
        let pool = Mempool::new();
        let t = tx(1);
        pool.add(t.clone()).unwrap();
        assert_eq!(pool.add(t), Err(ChainError::DuplicateTransaction));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn remove_many_is_idempotent() {
        let pool = Mempool::new();
        let t = tx(1);
        let id = t.id.clone();
        pool.add(t).unwrap();

        pool.remove_many([id.as_str(), "missing"]);
        assert!(pool.is_empty());
        // Removing again is a no-op.
        pool.remove_many([id.as_str()]);
        assert!(pool.is_empty());
    }

    #[test]
    fn select_top_by_fee_orders_and_does_not_mutate() {
        let pool = Mempool::new();
        for fee in [3, 10, 1, 7] {
            pool.add(tx(fee)).unwrap();
        }

        let top = pool.select_top_by_fee(3);
        let fees: Vec<i64> = top.iter().map(|t| t.fee).collect();
        assert_eq!(fees, vec![10, 7, 3]);
        assert_eq!(pool.len(), 4);
    }

    #[test]
    fn select_returns_all_when_fewer_than_n() {
        let pool = Mempool::new();
        pool.add(tx(2)).unwrap();
        assert_eq!(pool.select_top_by_fee(10).len(), 1);
        assert!(Mempool::new().select_top_by_fee(10).is_empty());
    }
}
