use actix_web::{HttpResponse, Responder, get, post, web};
use log::debug;

use super::models::{AppState, MempoolResponse, NewTxResponse, error_response};
use crate::transaction::Transaction;

/// Submit a signed transaction. Validation, balance authorization and the
/// broadcast all happen in the core; this handler only maps the result.
#[post("/tx/")]
pub async fn post_transaction(
    state: web::Data<AppState>,
    body: web::Json<Transaction>,
) -> impl Responder {
    let tx = body.into_inner();
    let id = tx.id.clone();
    debug!("POST /tx/ - received transaction {id}");

    match state.node.submit_transaction(tx) {
        Ok(()) => HttpResponse::Ok().json(NewTxResponse { id }),
        Err(e) => error_response(&e),
    }
}

/// List current mempool (ids only to keep it compact).
#[get("/mempool/")]
pub async fn get_mempool(state: web::Data<AppState>) -> impl Responder {
    let transactions = state.node.mempool.ids();
    HttpResponse::Ok().json(MempoolResponse {
        size: transactions.len(),
        transactions,
    })
}
