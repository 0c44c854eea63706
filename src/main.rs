mod api;
mod blockchain;
mod config;
mod error;
mod mempool;
mod miner;
mod node;
mod transaction;
mod wallet;

use std::env;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use dotenvy::dotenv;
use log::info;

use api::AppState;
use blockchain::Blockchain;
use config::Policy;
use miner::Miner;
use node::{LogBroadcaster, NodeState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let _ = dotenv();
    env_logger::init();

    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);

    let policy = Policy::from_env();
    let miner_address = env::var("MINER_ADDRESS").unwrap_or_else(|_| {
        let (_sk, _pk, address) = wallet::generate_keypair_hex();
        info!("MINER_ADDRESS not set; mining to ephemeral address {address}");
        address
    });
    let autostart = env::var("MINER_AUTOSTART")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let state = Arc::new(NodeState::new(
        Blockchain::new(policy.clone()),
        Arc::new(LogBroadcaster),
    ));
    let miner = Arc::new(Miner::new(miner_address, &policy, Arc::clone(&state)));
    if autostart {
        miner.run();
    }

    println!("⛓️ Starting node API at http://{host}:{port}");

    let app_state = web::Data::new(AppState {
        node: state,
        miner,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(api::init_routes)
    })
    .bind((host.as_str(), port))?
    .run()
    .await
}
