mod balance;
mod chain;
mod health;
mod miner;
pub mod models;
mod peer;
mod stats;
mod tx;
mod wallet;

use actix_web::web::{self, ServiceConfig};

pub use models::AppState;

pub fn init_routes(cfg: &mut ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(health::health_check)
            .service(chain::get_chain)
            .service(chain::validate_chain)
            .service(tx::post_transaction)
            .service(tx::get_mempool)
            .service(peer::post_peer_block)
            .service(peer::post_peer_chain)
            .service(miner::start_miner)
            .service(miner::stop_miner)
            .service(balance::get_balance)
            .service(stats::get_stats)
            .service(wallet::create_wallet),
    );
}
