use std::env;
use std::str::FromStr;

/// Economic and timing parameters of the engine. Read once at startup;
/// everything that consumes a `Policy` gets its own clone so the values
/// stay fixed for the lifetime of the node.
#[derive(Debug, Clone)]
pub struct Policy {
    /// Base block subsidy paid to the miner before fees.
    pub base_reward: i64,
    /// Mandated PoW difficulty (leading zero hex chars) for every
    /// non-genesis block. Constant by default; see
    /// `Blockchain::calculate_difficulty` for the retarget seam.
    pub difficulty: u32,
    /// Maximum non-coinbase transactions per block.
    pub max_txs_per_block: usize,
    /// Reject transactions older than this many seconds.
    pub tx_max_age_secs: i64,
    /// Miner sleep when the mempool is empty.
    pub miner_backoff_secs: u64,
    /// Delay between stopping and restarting the miner after a reorg.
    pub restart_grace_secs: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            base_reward: 1000,
            difficulty: 5,
            max_txs_per_block: 10,
            tx_max_age_secs: 60,
            miner_backoff_secs: 20,
            restart_grace_secs: 5,
        }
    }
}

impl Policy {
    /// Build a policy from environment variables, falling back to the
    /// defaults above for anything unset or unparsable.
    pub fn from_env() -> Self {
        let d = Policy::default();
        Self {
            base_reward: env_or("BASE_REWARD", d.base_reward),
            difficulty: env_or("DIFFICULTY", d.difficulty),
            max_txs_per_block: env_or("MAX_TXS_PER_BLOCK", d.max_txs_per_block),
            tx_max_age_secs: env_or("TX_MAX_AGE_SECS", d.tx_max_age_secs),
            miner_backoff_secs: env_or("MINER_BACKOFF_SECS", d.miner_backoff_secs),
            restart_grace_secs: env_or("RESTART_GRACE_SECS", d.restart_grace_secs),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
