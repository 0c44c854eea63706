use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, ChainResponse, ValidateResponse};

/// Get the full chain (also the snapshot payload for lagging peers).
#[get("/chain/")]
pub async fn get_chain(state: web::Data<AppState>) -> impl Responder {
    let chain = state.node.chain.lock().expect("chain mutex poisoned");
    HttpResponse::Ok().json(ChainResponse {
        height: chain.height(),
        cumulative_work: chain.cumulative_work,
        difficulty: chain.calculate_difficulty(),
        blocks: &chain.blocks,
    })
}

/// Structural self-check of the whole chain.
#[get("/chain/validate/")]
pub async fn validate_chain(state: web::Data<AppState>) -> impl Responder {
    let chain = state.node.chain.lock().expect("chain mutex poisoned");
    HttpResponse::Ok().json(ValidateResponse {
        valid: chain.is_valid(),
        height: chain.height(),
        cumulative_work: chain.cumulative_work,
    })
}
