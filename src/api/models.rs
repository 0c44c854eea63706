use std::sync::Arc;

use actix_web::HttpResponse;
use serde::Serialize;

use crate::blockchain::Block;
use crate::error::{ChainError, RuleKind};
use crate::miner::Miner;
use crate::node::NodeState;

/// Shared application state: the engine core plus the miner controlling it.
pub struct AppState {
    pub node: Arc<NodeState>,
    pub miner: Arc<Miner>,
}

/// Map engine errors onto HTTP statuses: rule violations and refused
/// snapshots are conflicts, everything else is a bad request.
pub fn error_response(err: &ChainError) -> HttpResponse {
    match err {
        ChainError::ChainRuleViolation(_) | ChainError::IncompatibleChain => {
            HttpResponse::Conflict().json(ErrorResponse {
                error: err.to_string(),
            })
        }
        _ => HttpResponse::BadRequest().json(ErrorResponse {
            error: err.to_string(),
        }),
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/* ---------- Chain API Models ---------- */

#[derive(Serialize)]
pub struct ChainResponse<'a> {
    pub height: usize,
    pub cumulative_work: u64,
    pub difficulty: u32,
    pub blocks: &'a [Block],
}

#[derive(Serialize)]
pub struct ValidateResponse {
    pub valid: bool,
    pub height: usize,
    pub cumulative_work: u64,
}

/* ---------- TX API Models ---------- */

#[derive(Serialize)]
pub struct NewTxResponse {
    pub id: String,
}

#[derive(Serialize)]
pub struct MempoolResponse {
    pub size: usize,
    pub transactions: Vec<String>, // ids only, for brevity
}

/* ---------- Peer API Models ---------- */

#[derive(Serialize)]
pub struct PeerBlockResponse {
    pub accepted: bool,
    /// True when the block's parent is unknown at our tip; the peer should
    /// send a full chain snapshot.
    pub behind: bool,
}

impl PeerBlockResponse {
    pub fn from_result(result: &Result<(), ChainError>) -> Self {
        match result {
            Ok(()) => Self {
                accepted: true,
                behind: false,
            },
            Err(e) => Self {
                accepted: false,
                behind: matches!(e, ChainError::ChainRuleViolation(RuleKind::StaleTip)),
            },
        }
    }
}

#[derive(Serialize)]
pub struct PeerChainResponse {
    pub adopted: bool,
}

/* ---------- Miner API Models ---------- */

#[derive(Serialize)]
pub struct MinerResponse {
    pub mining: bool,
}

/* ---------- Misc Models ---------- */

#[derive(Serialize)]
pub struct BalanceResponse {
    pub address: String,
    pub balance: i64,
}

#[derive(Serialize)]
pub struct StatsResponse {
    pub height: usize,
    pub difficulty: u32,
    pub cumulative_work: u64,
    pub mempool_size: usize,
    pub mining: bool,
}

#[derive(Serialize)]
pub struct WalletResponse {
    pub private_key: String,
    pub public_key: String,
    pub address: String,
}
