use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::block::{Block, compute_merkle_root};
use crate::config::Policy;
use crate::error::{ChainError, RuleKind};
use crate::mempool::Mempool;
use crate::transaction::Transaction;

/// The authoritative ordered block sequence and its chain-weight counter.
///
/// All mutation funnels through `append_block` and `adopt`; the surrounding
/// node keeps the whole struct behind one mutex so template construction,
/// append and reorg are mutually exclusive. `blocks` and `cumulative_work`
/// are only ever updated together under that lock.
#[derive(Debug)]
pub struct Blockchain {
    pub blocks: Vec<Block>,
    /// Sum of all included blocks' difficulties; the fork-choice metric.
    pub cumulative_work: u64,
    policy: Policy,
}

/// Wire form of a whole chain, answered to peers that fall behind and
/// consumed by fork adoption.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub blocks: Vec<Block>,
    pub cumulative_work: u64,
}

impl ChainSnapshot {
    pub fn deserialize(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }
}

impl Blockchain {
    /// Seed a new chain with the deterministic genesis block.
    pub fn new(policy: Policy) -> Self {
        let genesis = Block::genesis();
        let cumulative_work = u64::from(genesis.difficulty);
        Self {
            blocks: vec![genesis],
            cumulative_work,
            policy,
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// The latest block in the chain.
    pub fn tip(&self) -> &Block {
        self.blocks
            .last()
            .expect("chain always holds at least the genesis block")
    }

    pub fn height(&self) -> usize {
        self.blocks.len()
    }

    /// Miner payout for a block including these (non-coinbase) transactions:
    /// base subsidy plus the sum of their fees.
    pub fn calculate_reward(&self, transactions: &[Transaction]) -> i64 {
        self.policy.base_reward + transactions.iter().map(|tx| tx.fee).sum::<i64>()
    }

    /// Mandated difficulty for the next block. Constant under the reference
    /// policy; a retargeting scheme would derive it from recent block
    /// timestamps without changing any caller.
    pub fn calculate_difficulty(&self) -> u32 {
        self.policy.difficulty
    }

    /// Synthesize an unmined block extending the current tip: coinbase
    /// paying the mandated reward first, then the given transactions.
    /// The caller holds the chain lock while reading the tip here.
    pub fn build_template(&self, transactions: Vec<Transaction>, miner_address: &str) -> Block {
        let reward = self.calculate_reward(&transactions);
        let coinbase = Transaction::coinbase(miner_address, reward);

        let mut txs = Vec::with_capacity(1 + transactions.len());
        txs.push(coinbase);
        txs.extend(transactions);

        Block::new(
            self.tip().id.clone(),
            txs,
            Utc::now().timestamp(),
            self.calculate_difficulty(),
        )
    }

    /// Chain-context validation for a block offered at the tip. Check
    /// order is fixed (prev hash, difficulty, reward, then structure) so
    /// rejection reasons are deterministic.
    pub fn validate_for_append(&self, block: &Block) -> Result<(), ChainError> {
        if block.prev_hash != self.tip().id {
            return Err(ChainError::ChainRuleViolation(RuleKind::StaleTip));
        }
        if block.difficulty != self.calculate_difficulty() {
            return Err(ChainError::ChainRuleViolation(RuleKind::WrongDifficulty));
        }
        match block.transactions.split_first() {
            Some((coinbase, rest))
                if coinbase.is_coinbase() && coinbase.amount == self.calculate_reward(rest) => {}
            _ => return Err(ChainError::ChainRuleViolation(RuleKind::WrongReward)),
        }
        block.validate(self.policy.tx_max_age_secs)
    }

    /// Validate and append a block at the tip, then evict its transactions
    /// from the mempool. State is untouched on any validation error.
    pub fn append_block(&mut self, block: Block, mempool: &Mempool) -> Result<(), ChainError> {
        self.validate_for_append(&block)?;

        let ids: Vec<String> = block.transactions.iter().map(|tx| tx.id.clone()).collect();
        info!(
            "appended block {} at height {} ({} txs)",
            block.id,
            self.blocks.len(),
            block.transactions.len()
        );
        self.cumulative_work += u64::from(block.difficulty);
        self.blocks.push(block);
        mempool.remove_many(&ids);
        Ok(())
    }

    /// Account balance by full-chain replay: credit as recipient, debit
    /// (amount plus fee) as sender. O(chain length × block size); the
    /// correctness reference for any cached index.
    pub fn derive_balance(&self, address: &str) -> i64 {
        let mut balance = 0;
        for block in &self.blocks {
            for tx in &block.transactions {
                if tx.sender == address {
                    balance -= tx.amount + tx.fee;
                }
                if tx.recipient == address {
                    balance += tx.amount;
                }
            }
        }
        balance
    }

    /// Structural validation of a full chain: genesis shape, hash linkage,
    /// id integrity, PoW, Merkle binding, and coinbase placement and reward
    /// per block. Transaction staleness is deliberately not rechecked for
    /// historical blocks. Returns the recomputed cumulative work.
    pub fn validate_structure(&self, blocks: &[Block]) -> Result<u64, ChainError> {
        let genesis = blocks
            .first()
            .ok_or_else(|| ChainError::InvalidBlock("chain is empty".into()))?;
        if !genesis.prev_hash.is_empty() || genesis.id != genesis.compute_hash() {
            return Err(ChainError::InvalidBlock("malformed genesis block".into()));
        }

        let mut work = u64::from(genesis.difficulty);
        for (prev, block) in blocks.iter().zip(blocks.iter().skip(1)) {
            if block.prev_hash != prev.id {
                return Err(ChainError::InvalidBlock(format!(
                    "broken linkage at block {}",
                    block.id
                )));
            }
            if block.id != block.compute_hash() {
                return Err(ChainError::InvalidBlock(format!(
                    "block {} id does not match content",
                    block.id
                )));
            }
            if !block.meets_difficulty() {
                return Err(ChainError::InvalidBlock(format!(
                    "block {} does not satisfy its difficulty",
                    block.id
                )));
            }
            if block.merkle_root != compute_merkle_root(&block.transactions) {
                return Err(ChainError::InvalidBlock(format!(
                    "block {} merkle root does not match transactions",
                    block.id
                )));
            }
            // Every non-genesis block pays exactly the mandated reward
            // through a single coinbase in the first slot; without this an
            // otherwise well-formed candidate chain could mint any amount.
            match block.transactions.split_first() {
                Some((coinbase, rest)) if coinbase.is_coinbase() => {
                    if rest.iter().any(|tx| tx.is_coinbase()) {
                        return Err(ChainError::InvalidBlock(format!(
                            "block {} carries more than one coinbase",
                            block.id
                        )));
                    }
                    if coinbase.amount != self.calculate_reward(rest) {
                        return Err(ChainError::InvalidBlock(format!(
                            "block {} coinbase does not pay the mandated reward",
                            block.id
                        )));
                    }
                }
                _ => {
                    return Err(ChainError::InvalidBlock(format!(
                        "block {} does not start with a coinbase",
                        block.id
                    )));
                }
            }
            work += u64::from(block.difficulty);
        }
        Ok(work)
    }

    /// Decide whether a candidate chain should replace the current one:
    /// it must be structurally valid and carry strictly more cumulative
    /// work. Ties favor the incumbent. Returns the candidate's recomputed
    /// work on success.
    pub fn should_adopt(&self, candidate: &[Block]) -> Result<u64, ChainError> {
        let work = self.validate_structure(candidate)?;
        if work <= self.cumulative_work {
            return Err(ChainError::ChainRuleViolation(RuleKind::NotHeavier));
        }
        Ok(work)
    }

    /// Replace the current chain with a heavier candidate (reorg).
    ///
    /// Finds the last common block by scanning both chains from the tail,
    /// rolls our blocks past it back into the mempool (coinbases are
    /// discarded; they are not spendable until mined again), then applies
    /// the candidate's blocks, evicting their transactions as each lands.
    /// With no common block the chains grew from different genesis blocks
    /// and adoption is refused rather than guessing a splice point.
    pub fn adopt(&mut self, candidate: Vec<Block>, mempool: &Mempool) -> Result<(), ChainError> {
        let work = self.should_adopt(&candidate)?;

        let mut pivot = None;
        'search: for i in (0..self.blocks.len()).rev() {
            for j in (0..candidate.len()).rev() {
                if self.blocks[i].id == candidate[j].id {
                    pivot = Some((i, j));
                    break 'search;
                }
            }
        }
        let Some((ours, theirs)) = pivot else {
            return Err(ChainError::IncompatibleChain);
        };

        while self.blocks.len() > ours + 1 {
            if let Some(popped) = self.blocks.pop() {
                debug!("rolling back block {}", popped.id);
                for tx in popped.transactions {
                    if tx.is_coinbase() {
                        continue;
                    }
                    // Already staged again by a concurrent path is fine.
                    let _ = mempool.add(tx);
                }
            }
        }

        for block in candidate.into_iter().skip(theirs + 1) {
            let ids: Vec<String> = block.transactions.iter().map(|tx| tx.id.clone()).collect();
            mempool.remove_many(&ids);
            self.blocks.push(block);
        }

        info!(
            "adopted competing chain: height {}, cumulative work {} -> {}",
            self.blocks.len(),
            self.cumulative_work,
            work
        );
        self.cumulative_work = work;
        Ok(())
    }

    /// Full structural self-check, including the work counter.
    pub fn is_valid(&self) -> bool {
        self.validate_structure(&self.blocks)
            .map(|work| work == self.cumulative_work)
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> ChainSnapshot {
        ChainSnapshot {
            blocks: self.blocks.clone(),
            cumulative_work: self.cumulative_work,
        }
    }

    /// Serialize the chain for a peer that fell behind.
    pub fn serialize(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.snapshot())
    }
}
