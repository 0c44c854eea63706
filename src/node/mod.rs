use std::sync::{Arc, Mutex};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::blockchain::{Block, Blockchain, ChainSnapshot};
use crate::error::ChainError;
use crate::mempool::Mempool;
use crate::transaction::Transaction;

/// Payloads the engine exchanges with its peers. Transport and gossip are
/// external collaborators; the core only produces and consumes these typed
/// messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    NewTransaction(Transaction),
    NewBlock(Block),
    ChainRequest,
    ChainResponse(ChainSnapshot),
}

impl Message {
    pub fn kind(&self) -> &'static str {
        match self {
            Message::NewTransaction(_) => "new_transaction",
            Message::NewBlock(_) => "new_block",
            Message::ChainRequest => "chain_request",
            Message::ChainResponse(_) => "chain_response",
        }
    }
}

/// Outbound seam to the dissemination layer. The default implementation
/// only logs; tests substitute a recording one.
pub trait Broadcaster: Send + Sync {
    fn broadcast(&self, msg: &Message);
}

/// Stand-in broadcaster for a node running without a network layer.
pub struct LogBroadcaster;

impl Broadcaster for LogBroadcaster {
    fn broadcast(&self, msg: &Message) {
        debug!("broadcasting {} message (no transport attached)", msg.kind());
    }
}

/// Shared mutable core of the node: the ledger behind its single exclusive
/// lock, the internally synchronized mempool, and the broadcast seam.
/// Accessed in parallel by the miner thread and the inbound handlers.
pub struct NodeState {
    pub chain: Mutex<Blockchain>,
    pub mempool: Mempool,
    pub broadcaster: Arc<dyn Broadcaster>,
}

impl NodeState {
    pub fn new(chain: Blockchain, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self {
            chain: Mutex::new(chain),
            mempool: Mempool::new(),
            broadcaster,
        }
    }

    /// Stage a transaction received from a wallet or a peer: validate it,
    /// authorize it against the sender's derived balance, insert it into
    /// the mempool and announce it.
    pub fn submit_transaction(&self, tx: Transaction) -> Result<(), ChainError> {
        if tx.is_coinbase() {
            return Err(ChainError::InvalidTransaction(
                "coinbase transactions cannot be submitted".into(),
            ));
        }

        {
            let chain = self.chain.lock().expect("chain mutex poisoned");
            tx.validate(chain.policy().tx_max_age_secs)?;
            if chain.derive_balance(&tx.sender) < tx.amount + tx.fee {
                return Err(ChainError::InsufficientBalance);
            }
        }

        self.mempool.add(tx.clone())?;
        info!("staged transaction {} (fee {})", tx.id, tx.fee);
        self.broadcaster.broadcast(&Message::NewTransaction(tx));
        Ok(())
    }

    /// Accept a peer-mined block at the tip. A `StaleTip` violation means
    /// this node may be behind; the caller reacts by requesting a chain
    /// snapshot from the sender.
    pub fn accept_peer_block(&self, block: Block) -> Result<(), ChainError> {
        let mut chain = self.chain.lock().expect("chain mutex poisoned");
        let result = chain.append_block(block, &self.mempool);
        if let Err(e) = &result {
            warn!("rejected peer block: {e}");
        }
        result
    }

    /// Accept a peer's full chain snapshot: adopt it if it is valid and
    /// strictly heavier than ours.
    pub fn accept_chain_snapshot(&self, snapshot: ChainSnapshot) -> Result<(), ChainError> {
        let mut chain = self.chain.lock().expect("chain mutex poisoned");
        let result = chain.adopt(snapshot.blocks, &self.mempool);
        if let Err(e) = &result {
            warn!("refused chain snapshot: {e}");
        }
        result
    }

    /// Serialized chain snapshot for a peer that fell behind.
    pub fn serialize_chain(&self) -> Result<String, serde_json::Error> {
        self.chain.lock().expect("chain mutex poisoned").serialize()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::mpsc;

    /// Broadcaster that hands every message to a channel, so tests can
    /// assert on what the core announced.
    pub struct RecordingBroadcaster {
        tx: std::sync::Mutex<mpsc::Sender<Message>>,
    }

    impl RecordingBroadcaster {
        pub fn channel() -> (Arc<Self>, mpsc::Receiver<Message>) {
            let (tx, rx) = mpsc::channel();
            (
                Arc::new(Self {
                    tx: std::sync::Mutex::new(tx),
                }),
                rx,
            )
        }
    }

    impl Broadcaster for RecordingBroadcaster {
        fn broadcast(&self, msg: &Message) {
            let _ = self.tx.lock().expect("sender poisoned").send(msg.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::RecordingBroadcaster;
    use super::*;
    use crate::blockchain::block::solve;
    use crate::config::Policy;
    use crate::wallet::{generate_keypair_hex, sign_transaction};

    fn policy() -> Policy {
        Policy {
            difficulty: 1,
            ..Policy::default()
        }
    }

    fn state_with_funded(address_sk: Option<&(String, String)>) -> Arc<NodeState> {
        // (sk, address): mine one block paying the address so it can spend.
        let (broadcaster, _rx) = RecordingBroadcaster::channel();
        let state = Arc::new(NodeState::new(Blockchain::new(policy()), broadcaster));
        if let Some((_sk, address)) = address_sk {
            let mut chain = state.chain.lock().unwrap();
            let block = solve(chain.build_template(Vec::new(), address));
            chain.append_block(block, &state.mempool).unwrap();
        }
        state
    }

    fn keypair() -> (String, String) {
        let (sk, _pk, address) = generate_keypair_hex();
        (sk, address)
    }

    fn transfer(sk: &str, sender: &str, amount: i64, fee: i64) -> Transaction {
        let mut tx = Transaction::new_unsigned(sender, "recipient", amount, fee);
        sign_transaction(&mut tx, sk).expect("sign");
        tx
    }

    #[test]
    fn submit_stages_and_broadcasts() {
        let funded = keypair();
        let (broadcaster, rx) = RecordingBroadcaster::channel();
        let state = Arc::new(NodeState::new(Blockchain::new(policy()), broadcaster));
        {
            let mut chain = state.chain.lock().unwrap();
            let block = solve(chain.build_template(Vec::new(), &funded.1));
            chain.append_block(block, &state.mempool).unwrap();
        }

        let tx = transfer(&funded.0, &funded.1, 10, 1);
        state.submit_transaction(tx.clone()).unwrap();
        assert!(state.mempool.contains(&tx.id));

        let msg = rx.try_recv().unwrap();
        assert!(matches!(msg, Message::NewTransaction(t) if t.id == tx.id));
    }

    #[test]
    fn submit_rejects_insufficient_balance() {
        let state = state_with_funded(None);
        let (sk, address) = keypair();
        let tx = transfer(&sk, &address, 10, 1);
        assert_eq!(
            state.submit_transaction(tx),
            Err(ChainError::InsufficientBalance)
        );
        assert!(state.mempool.is_empty());
    }

    #[test]
    fn submit_rejects_duplicate() {
        let funded = keypair();
        let state = state_with_funded(Some(&funded));
        let tx = transfer(&funded.0, &funded.1, 10, 1);
        state.submit_transaction(tx.clone()).unwrap();
        assert_eq!(
            state.submit_transaction(tx),
            Err(ChainError::DuplicateTransaction)
        );
    }

    #[test]
    fn submit_rejects_coinbase_from_the_wire() {
        let state = state_with_funded(None);
        let tx = Transaction::coinbase("miner", 1000);
        assert!(matches!(
            state.submit_transaction(tx),
            Err(ChainError::InvalidTransaction(_))
        ));
    }

    #[test]
    fn submit_rejects_invalid_before_balance() {
        // A malformed amount fails validation even with no balance at all.
        let state = state_with_funded(None);
        let (sk, address) = keypair();
        let mut tx = Transaction::new_unsigned(&address, "recipient", -5, 0);
        sign_transaction(&mut tx, &sk).expect("sign");
        assert!(matches!(
            state.submit_transaction(tx),
            Err(ChainError::InvalidTransaction(_))
        ));
        assert!(state.mempool.is_empty());
    }

    #[test]
    fn peer_block_and_snapshot_flow() {
        let state = state_with_funded(None);

        // A peer mined a block on the same genesis.
        let peer_block = {
            let chain = state.chain.lock().unwrap();
            solve(chain.build_template(Vec::new(), "peer"))
        };
        state.accept_peer_block(peer_block).unwrap();

        // A second block arriving with a stale parent reports StaleTip.
        let stale = {
            let chain = state.chain.lock().unwrap();
            let mut b = chain.build_template(Vec::new(), "peer");
            b.prev_hash = chain.blocks[0].id.clone();
            solve(b)
        };
        let err = state.accept_peer_block(stale).unwrap_err();
        assert_eq!(
            err,
            ChainError::ChainRuleViolation(crate::error::RuleKind::StaleTip)
        );

        // Snapshot roundtrip through the wire form.
        let json = state.serialize_chain().unwrap();
        let snapshot = ChainSnapshot::deserialize(&json).unwrap();
        assert_eq!(snapshot.blocks.len(), 2);
    }
}
