use actix_web::{HttpResponse, Responder, post, web};
use log::info;

use super::models::{AppState, MinerResponse};

#[post("/miner/start/")]
pub async fn start_miner(state: web::Data<AppState>) -> impl Responder {
    state.miner.run();
    info!("miner start requested");
    HttpResponse::Ok().json(MinerResponse { mining: true })
}

#[post("/miner/stop/")]
pub async fn stop_miner(state: web::Data<AppState>) -> impl Responder {
    state.miner.stop();
    info!("miner stop requested");
    HttpResponse::Ok().json(MinerResponse { mining: false })
}
