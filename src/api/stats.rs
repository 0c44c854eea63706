use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, StatsResponse};

#[get("/stats/")]
pub async fn get_stats(state: web::Data<AppState>) -> impl Responder {
    let (height, difficulty, cumulative_work) = {
        let chain = state.node.chain.lock().expect("chain mutex poisoned");
        (
            chain.height(),
            chain.calculate_difficulty(),
            chain.cumulative_work,
        )
    };

    HttpResponse::Ok().json(StatsResponse {
        height,
        difficulty,
        cumulative_work,
        mempool_size: state.node.mempool.len(),
        mining: state.miner.is_running(),
    })
}
