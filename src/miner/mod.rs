use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::ChainError;

use crate::blockchain::Block;
use crate::config::Policy;
use crate::node::{Message, NodeState};

/// Background proof-of-work worker.
///
/// One long-lived thread per miner: each iteration drains the top-fee
/// transactions from the mempool, asks the ledger for a template, searches
/// for a nonce, and appends the solved block. The stop flag is polled on
/// every nonce attempt so cancellation latency is bounded; the chain lock
/// is held only while building the template and for the final append,
/// never across the search.
pub struct Miner {
    address: String,
    max_txs: usize,
    backoff: Duration,
    grace: Duration,
    state: Arc<NodeState>,
    stop: AtomicBool,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Miner {
    pub fn new(address: String, policy: &Policy, state: Arc<NodeState>) -> Self {
        Self {
            address,
            max_txs: policy.max_txs_per_block,
            backoff: Duration::from_secs(policy.miner_backoff_secs),
            grace: Duration::from_secs(policy.restart_grace_secs),
            state,
            stop: AtomicBool::new(false),
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the mining loop. A no-op if it is already running.
    pub fn run(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.stop.store(false, Ordering::SeqCst);

        let miner = Arc::clone(self);
        let handle = thread::spawn(move || {
            info!("miner started for address {}", miner.address);
            miner.mining_loop();
            miner.running.store(false, Ordering::SeqCst);
            info!("miner stopped");
        });
        *self.handle.lock().expect("miner handle poisoned") = Some(handle);
    }

    /// Signal cancellation of any in-flight search and wait for the worker
    /// to exit. No new search starts until `run` is called again.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.lock().expect("miner handle poisoned").take() {
            let _ = handle.join();
        }
    }

    /// Stop, wait out the grace delay so the network can settle, then
    /// resume. Used after adopting a competing chain.
    pub fn restart(self: &Arc<Self>) {
        self.stop();
        thread::sleep(self.grace);
        self.run();
    }

    /// `restart` on a detached thread. Inbound handlers use this after a
    /// reorg so the response returns before the grace delay elapses.
    pub fn resume_after_grace(self: &Arc<Self>) {
        let miner = Arc::clone(self);
        thread::spawn(move || miner.restart());
    }

    fn mining_loop(&self) {
        while !self.stop.load(Ordering::SeqCst) {
            let transactions = self.state.mempool.select_top_by_fee(self.max_txs);
            if transactions.is_empty() {
                self.idle_sleep();
                continue;
            }

            let template = {
                let chain = self.state.chain.lock().expect("chain mutex poisoned");
                chain.build_template(transactions, &self.address)
            };

            let Some(block) = self.proof_of_work(template) else {
                // Cancelled mid-search; the candidate is discarded.
                continue;
            };

            let appended = {
                let mut chain = self.state.chain.lock().expect("chain mutex poisoned");
                chain.append_block(block.clone(), &self.state.mempool)
            };
            match appended {
                Ok(()) => {
                    info!("mined block {} (nonce {})", block.id, block.nonce);
                    self.state.broadcaster.broadcast(&Message::NewBlock(block));
                }
                Err(ChainError::InvalidBlock(reason)) => {
                    // A staged transaction aged out while pooled; it can
                    // never be mined now, so drop the batch instead of
                    // re-selecting it forever.
                    let ids: Vec<String> = block
                        .transactions
                        .iter()
                        .skip(1)
                        .map(|tx| tx.id.clone())
                        .collect();
                    self.state.mempool.remove_many(&ids);
                    warn!("discarding unminable transactions: {reason}");
                }
                Err(e) => {
                    // Lost the race to a concurrent append or reorg; mine
                    // again against the new tip.
                    debug!("mined block rejected, restarting: {e}");
                }
            }
        }
    }

    /// Brute-force nonce search over an exclusively owned candidate block.
    /// Checks the stop flag on every attempt.
    fn proof_of_work(&self, mut block: Block) -> Option<Block> {
        debug!(
            "mining over {} txs at difficulty {}",
            block.transactions.len(),
            block.difficulty
        );
        block.nonce = 0;
        loop {
            if self.stop.load(Ordering::SeqCst) {
                return None;
            }
            block.id = block.compute_hash();
            if block.meets_difficulty() {
                return Some(block);
            }
            block.nonce += 1;
        }
    }

    /// Sleep out the empty-mempool backoff in short slices so a stop
    /// request still takes effect promptly.
    fn idle_sleep(&self) {
        let started = Instant::now();
        while started.elapsed() < self.backoff {
            if self.stop.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(Duration::from_millis(50));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::Blockchain;
    use crate::node::testing::RecordingBroadcaster;
    use crate::transaction::Transaction;
    use crate::wallet::{generate_keypair_hex, sign_transaction};

    fn policy(difficulty: u32) -> Policy {
        Policy {
            difficulty,
            miner_backoff_secs: 1,
            restart_grace_secs: 0,
            ..Policy::default()
        }
    }

    fn setup(difficulty: u32) -> (Arc<NodeState>, std::sync::mpsc::Receiver<Message>) {
        let (broadcaster, rx) = RecordingBroadcaster::channel();
        let state = Arc::new(NodeState::new(
            Blockchain::new(policy(difficulty)),
            broadcaster,
        ));
        (state, rx)
    }

    fn staged_transfer(state: &NodeState) -> Transaction {
        let (sk, _pk, address) = generate_keypair_hex();
        let mut tx = Transaction::new_unsigned(&address, "recipient", 10, 1);
        sign_transaction(&mut tx, &sk).expect("sign");
        state.mempool.add(tx.clone()).unwrap();
        tx
    }

    #[test]
    fn mines_appends_and_broadcasts() {
        let (state, rx) = setup(1);
        let tx = staged_transfer(&state);

        let miner = Arc::new(Miner::new("miner".into(), &policy(1), Arc::clone(&state)));
        miner.run();

        // Low difficulty: the block lands well within the timeout.
        let msg = rx
            .recv_timeout(Duration::from_secs(30))
            .expect("mined block broadcast");
        assert!(matches!(msg, Message::NewBlock(_)));
        miner.stop();

        let chain = state.chain.lock().unwrap();
        assert_eq!(chain.height(), 2);
        assert_eq!(chain.tip().transactions[0].amount, 1001);
        assert!(!state.mempool.contains(&tx.id));
        assert_eq!(chain.derive_balance("miner"), 1001);
    }

    #[test]
    fn stop_interrupts_a_running_search() {
        // Difficulty high enough that the search cannot finish.
        let (state, rx) = setup(12);
        staged_transfer(&state);

        let miner = Arc::new(Miner::new("miner".into(), &policy(12), Arc::clone(&state)));
        miner.run();
        assert!(miner.is_running());

        thread::sleep(Duration::from_millis(200));
        miner.stop();

        assert!(!miner.is_running());
        assert!(rx.try_recv().is_err());
        assert_eq!(state.chain.lock().unwrap().height(), 1);
    }

    #[test]
    fn run_twice_is_a_noop_and_restart_resumes() {
        let (state, _rx) = setup(12);
        staged_transfer(&state);

        let miner = Arc::new(Miner::new("miner".into(), &policy(12), Arc::clone(&state)));
        miner.run();
        miner.run(); // second call must not spawn another worker
        assert!(miner.is_running());

        miner.restart();
        assert!(miner.is_running());
        miner.stop();
        assert!(!miner.is_running());
    }

    #[test]
    fn resume_after_grace_runs_the_miner_off_thread() {
        let (state, _rx) = setup(12);
        staged_transfer(&state);

        let miner = Arc::new(Miner::new("miner".into(), &policy(12), Arc::clone(&state)));
        miner.run();
        miner.stop();
        assert!(!miner.is_running());

        // Grace is 0 under the test policy; the resume lands shortly after
        // the call returns.
        miner.resume_after_grace();
        let started = Instant::now();
        while !miner.is_running() && started.elapsed() < Duration::from_secs(5) {
            thread::sleep(Duration::from_millis(10));
        }
        assert!(miner.is_running());
        miner.stop();
    }

    #[test]
    fn idles_on_empty_mempool() {
        let (state, rx) = setup(1);
        let miner = Arc::new(Miner::new("miner".into(), &policy(1), Arc::clone(&state)));
        miner.run();
        thread::sleep(Duration::from_millis(200));
        miner.stop();

        // Nothing staged, nothing mined.
        assert_eq!(state.chain.lock().unwrap().height(), 1);
        assert!(rx.try_recv().is_err());
    }
}
