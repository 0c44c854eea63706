use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ChainError;
use crate::transaction::Transaction;

/// An ordered batch of transactions plus proof-of-work metadata.
///
/// The block id is the SHA-256 of the header fields and doubles as the PoW
/// target: a valid id carries `difficulty` leading zero hex chars. The
/// transaction list is bound to the header through the Merkle root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the header; empty until mined.
    pub id: String,
    /// Id of the block this one extends; empty only for genesis.
    pub prev_hash: String,
    pub merkle_root: String,
    /// Unix timestamp (UTC); 0 for genesis so every node derives the same
    /// genesis id.
    pub timestamp: i64,
    pub nonce: u64,
    /// Required count of leading zero hex chars in `id`.
    pub difficulty: u32,
    /// Coinbase first, then the included transfers.
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Create an unmined block extending `prev_hash`. The nonce starts at 0
    /// and the id is left empty; the miner fills both in.
    pub fn new(
        prev_hash: String,
        transactions: Vec<Transaction>,
        timestamp: i64,
        difficulty: u32,
    ) -> Self {
        let merkle_root = compute_merkle_root(&transactions);
        Self {
            id: String::new(),
            prev_hash,
            merkle_root,
            timestamp,
            nonce: 0,
            difficulty,
            transactions,
        }
    }

    /// The first block in every chain: no predecessor, no transactions,
    /// difficulty 0. Fully deterministic so independent nodes agree on it.
    pub fn genesis() -> Self {
        let mut block = Self::new(String::new(), Vec::new(), 0, 0);
        block.id = block.compute_hash();
        block
    }

    /// Hash of the header fields (everything except `id` and the
    /// transaction bodies, which are covered via `merkle_root`).
    pub fn compute_hash(&self) -> String {
        let preimage = format!(
            "{}:{}:{}:{}:{}",
            self.prev_hash, self.merkle_root, self.timestamp, self.nonce, self.difficulty
        );
        let mut hasher = Sha256::new();
        hasher.update(preimage.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// PoW predicate: does the id carry the required zero prefix?
    pub fn meets_difficulty(&self) -> bool {
        self.id
            .chars()
            .take(self.difficulty as usize)
            .all(|c| c == '0')
            && self.id.len() >= self.difficulty as usize
    }

    /// Structural self-validation: id integrity, PoW, each contained
    /// transaction, and the Merkle binding. Only the first slot may hold a
    /// coinbase; anywhere else its signature exemption would let a peer
    /// mint funds. Chain-context rules (prev hash, mandated difficulty,
    /// reward) live in the ledger.
    pub fn validate(&self, tx_max_age_secs: i64) -> Result<(), ChainError> {
        if self.id != self.compute_hash() {
            return Err(ChainError::InvalidBlock("id does not match content".into()));
        }
        if !self.meets_difficulty() {
            return Err(ChainError::InvalidBlock(
                "id does not satisfy the difficulty prefix".into(),
            ));
        }
        let mut seen = HashSet::with_capacity(self.transactions.len());
        for (index, tx) in self.transactions.iter().enumerate() {
            if !seen.insert(tx.id.as_str()) {
                return Err(ChainError::InvalidBlock(format!(
                    "duplicate transaction {}",
                    tx.id
                )));
            }
            if tx.is_coinbase() {
                if index != 0 {
                    return Err(ChainError::InvalidBlock(format!(
                        "coinbase transaction {} outside the first slot",
                        tx.id
                    )));
                }
                continue;
            }
            if let Err(e) = tx.validate(tx_max_age_secs) {
                return Err(ChainError::InvalidBlock(format!(
                    "contains invalid transaction {}: {e}",
                    tx.id
                )));
            }
        }
        if self.merkle_root != compute_merkle_root(&self.transactions) {
            return Err(ChainError::InvalidBlock(
                "merkle root does not match transactions".into(),
            ));
        }
        Ok(())
    }
}

/// Iterative pairwise hashing of transaction hashes down to one root.
/// An odd node is paired with itself; the empty list yields the empty
/// string (genesis only).
pub fn compute_merkle_root(transactions: &[Transaction]) -> String {
    if transactions.is_empty() {
        return String::new();
    }

    let mut level: Vec<String> = transactions.iter().map(|tx| tx.hash()).collect();

    while level.len() > 1 {
        let mut next = Vec::with_capacity(level.len().div_ceil(2));
        for pair in level.chunks(2) {
            let right = pair.get(1).unwrap_or(&pair[0]);
            next.push(hash_pair(&pair[0], right));
        }
        level = next;
    }

    level.remove(0)
}

fn hash_pair(left: &str, right: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(left.as_bytes());
    hasher.update(right.as_bytes());
    hex::encode(hasher.finalize())
}

/// Brute-force a nonce until the block satisfies its own difficulty.
/// Test-only stand-in for the miner's search loop.
#[cfg(test)]
pub(crate) fn solve(mut block: Block) -> Block {
    loop {
        block.id = block.compute_hash();
        if block.meets_difficulty() {
            return block;
        }
        block.nonce += 1;
    }
}
