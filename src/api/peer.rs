use actix_web::{HttpResponse, Responder, post, web};
use log::info;

use super::models::{AppState, PeerBlockResponse, PeerChainResponse, error_response};
use crate::blockchain::{Block, ChainSnapshot};

/// Accept a block mined by a peer. The miner is stopped first so it never
/// finishes a search against a tip that just moved, and resumed after.
/// A stale-parent rejection is reported as `behind: true` so the peer can
/// follow up with a full chain snapshot.
#[post("/peer/block/")]
pub async fn post_peer_block(state: web::Data<AppState>, body: web::Json<Block>) -> impl Responder {
    let block = body.into_inner();
    info!("peer block {} received", block.id);

    // Interrupt any in-flight search so the miner never completes work
    // against a tip that just moved; resume only if it was running.
    let was_mining = state.miner.is_running();
    state.miner.stop();
    let result = state.node.accept_peer_block(block);
    if was_mining {
        state.miner.run();
    }

    let response = PeerBlockResponse::from_result(&result);
    match result {
        Ok(()) => HttpResponse::Ok().json(response),
        Err(_) => HttpResponse::Conflict().json(response),
    }
}

/// Accept a peer's full chain snapshot; adopted only if strictly heavier.
/// After a successful reorg the miner resumes once the grace delay has
/// elapsed; the delay runs off the worker thread so the response is not
/// held up.
#[post("/peer/chain/")]
pub async fn post_peer_chain(
    state: web::Data<AppState>,
    body: web::Json<ChainSnapshot>,
) -> impl Responder {
    let snapshot = body.into_inner();
    info!(
        "peer chain snapshot received ({} blocks, work {})",
        snapshot.blocks.len(),
        snapshot.cumulative_work
    );

    let was_mining = state.miner.is_running();
    state.miner.stop();
    match state.node.accept_chain_snapshot(snapshot) {
        Ok(()) => {
            if was_mining {
                state.miner.resume_after_grace();
            }
            HttpResponse::Ok().json(PeerChainResponse { adopted: true })
        }
        Err(e) => {
            if was_mining {
                state.miner.run();
            }
            error_response(&e)
        }
    }
}
