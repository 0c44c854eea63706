use actix_web::{HttpResponse, Responder, get, web};

use super::models::{AppState, BalanceResponse};

/// Account balance derived by full-chain replay.
#[get("/balance/{address}/")]
pub async fn get_balance(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    let address = path.into_inner();
    let balance = {
        let chain = state.node.chain.lock().expect("chain mutex poisoned");
        chain.derive_balance(&address)
    };
    HttpResponse::Ok().json(BalanceResponse { address, balance })
}
