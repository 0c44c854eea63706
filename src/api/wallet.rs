use actix_web::{HttpResponse, Responder, post};

use super::models::WalletResponse;
use crate::wallet::generate_keypair_hex;

/// Create a fresh keypair (dev convenience; nothing is stored server-side).
#[post("/wallet/")]
pub async fn create_wallet() -> impl Responder {
    let (private_key, public_key, address) = generate_keypair_hex();
    HttpResponse::Ok().json(WalletResponse {
        private_key,
        public_key,
        address,
    })
}
