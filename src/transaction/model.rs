use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::ChainError;
use crate::wallet::verify_signature_hex;

/// Reserved sender address of the reward-paying transaction a miner puts
/// first in every block it mines.
pub const COINBASE_SENDER: &str = "coinbase";

/// A signed value transfer between two addresses.
///
/// `sender` doubles as the hex-encoded compressed secp256k1 public key the
/// signature is verified against. Amounts are signed integers so malformed
/// negative submissions survive deserialization and are rejected by
/// `validate` instead of by a parse error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// SHA-256 over the full content, signature included.
    pub id: String,
    pub sender: String,
    pub recipient: String,
    pub amount: i64,
    pub fee: i64,
    /// Unix timestamp (UTC) of creation.
    pub timestamp: i64,
    /// Hex-encoded DER ECDSA signature over `sighash()`. Empty for coinbase.
    pub signature: String,
}

impl Transaction {
    /// Create an unsigned transaction stamped with the current time.
    /// The id is recomputed when a signature is attached.
    pub fn new_unsigned(sender: &str, recipient: &str, amount: i64, fee: i64) -> Self {
        let mut tx = Self {
            id: String::new(),
            sender: sender.to_string(),
            recipient: recipient.to_string(),
            amount,
            fee,
            timestamp: Utc::now().timestamp(),
            signature: String::new(),
        };
        tx.id = tx.compute_id();
        tx
    }

    /// Create the coinbase transaction paying `reward` to `miner`.
    pub fn coinbase(miner: &str, reward: i64) -> Self {
        Self::new_unsigned(COINBASE_SENDER, miner, reward, 0)
    }

    pub fn is_coinbase(&self) -> bool {
        self.sender == COINBASE_SENDER
    }

    /// Content identity: SHA-256 over all fields including the signature.
    pub fn compute_id(&self) -> String {
        let preimage = format!(
            "{}:{}:{}:{}:{}:{}",
            self.sender, self.recipient, self.amount, self.fee, self.timestamp, self.signature
        );
        sha256_hex(preimage.as_bytes())
    }

    /// Canonical signing payload. Excludes the signature so attaching one
    /// cannot change the digest that was signed.
    pub fn signing_payload(&self) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            self.sender, self.recipient, self.amount, self.fee, self.timestamp
        )
    }

    /// SHA-256 of the signing payload; the message passed to ECDSA.
    pub fn sighash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(self.signing_payload().as_bytes());
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest[..]);
        out
    }

    /// Hash of the signing payload, hex-encoded. This is the Merkle leaf
    /// for the transaction (distinct from `id`, which covers the signature).
    pub fn hash(&self) -> String {
        sha256_hex(self.signing_payload().as_bytes())
    }

    /// Self-validation: id integrity, value bounds, timestamp window and
    /// signature. Checks run in a fixed order and the first failure wins.
    /// Coinbase transactions skip signature verification; their reward
    /// equality is enforced by the ledger at append time.
    pub fn validate(&self, max_age_secs: i64) -> Result<(), ChainError> {
        if self.id != self.compute_id() {
            return Err(ChainError::InvalidTransaction(
                "id does not match content".into(),
            ));
        }
        if self.amount <= 0 {
            return Err(ChainError::InvalidTransaction(
                "amount must be greater than zero".into(),
            ));
        }
        if self.fee < 0 {
            return Err(ChainError::InvalidTransaction(
                "fee cannot be negative".into(),
            ));
        }
        let now = Utc::now().timestamp();
        if self.timestamp > now {
            return Err(ChainError::InvalidTransaction(
                "timestamp is in the future".into(),
            ));
        }
        if now - self.timestamp > max_age_secs {
            return Err(ChainError::InvalidTransaction("timestamp is too old".into()));
        }
        if !self.is_coinbase() {
            let ok = verify_signature_hex(&self.sender, &self.signature, self.sighash())
                .unwrap_or(false);
            if !ok {
                return Err(ChainError::InvalidTransaction("invalid signature".into()));
            }
        }
        Ok(())
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::{generate_keypair_hex, sign_transaction};

    fn signed_tx(amount: i64, fee: i64) -> Transaction {
        let (sk, _pk, address) = generate_keypair_hex();
        let mut tx = Transaction::new_unsigned(&address, "recipient", amount, fee);
        sign_transaction(&mut tx, &sk).expect("sign");
        tx
    }

    #[test]
    fn id_is_deterministic() {
        let tx = Transaction::new_unsigned("a", "b", 10, 1);
        assert_eq!(tx.id, tx.compute_id());
        assert_eq!(tx.compute_id(), tx.compute_id());
    }

    #[test]
    fn signing_payload_excludes_signature() {
        let mut tx = Transaction::new_unsigned("a", "b", 10, 1);
        let before = tx.sighash();
        tx.signature = "deadbeef".into();
        assert_eq!(before, tx.sighash());
        assert_ne!(tx.id, tx.compute_id()); // id does cover the signature
    }

    #[test]
    fn coinbase_shape() {
        let tx = Transaction::coinbase("miner", 1000);
        assert!(tx.is_coinbase());
        assert_eq!(tx.fee, 0);
        assert_eq!(tx.amount, 1000);
        assert!(tx.signature.is_empty());
    }

    #[test]
    fn valid_signed_transaction_passes() {
        let tx = signed_tx(10, 1);
        assert!(tx.validate(60).is_ok());
    }

    #[test]
    fn rejects_negative_amount() {
        let (sk, _pk, address) = generate_keypair_hex();
        let mut tx = Transaction::new_unsigned(&address, "b", -5, 0);
        sign_transaction(&mut tx, &sk).expect("sign");
        let err = tx.validate(60).unwrap_err();
        assert!(matches!(err, ChainError::InvalidTransaction(_)));
    }

    #[test]
    fn rejects_negative_fee() {
        let (sk, _pk, address) = generate_keypair_hex();
        let mut tx = Transaction::new_unsigned(&address, "b", 5, -1);
        sign_transaction(&mut tx, &sk).expect("sign");
        assert!(tx.validate(60).is_err());
    }

    #[test]
    fn rejects_tampered_id() {
        let mut tx = signed_tx(10, 1);
        tx.amount = 999;
        let err = tx.validate(60).unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidTransaction("id does not match content".into())
        );
    }

    #[test]
    fn rejects_future_timestamp() {
        let (sk, _pk, address) = generate_keypair_hex();
        let mut tx = Transaction::new_unsigned(&address, "b", 10, 0);
        tx.timestamp += 3600;
        sign_transaction(&mut tx, &sk).expect("sign");
        let err = tx.validate(60).unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidTransaction("timestamp is in the future".into())
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let (sk, _pk, address) = generate_keypair_hex();
        let mut tx = Transaction::new_unsigned(&address, "b", 10, 0);
        tx.timestamp -= 3600;
        sign_transaction(&mut tx, &sk).expect("sign");
        let err = tx.validate(60).unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidTransaction("timestamp is too old".into())
        );
    }

    #[test]
    fn rejects_bad_signature() {
        let mut tx = signed_tx(10, 1);
        // Re-sign with a different key: payload unchanged, signature wrong.
        let (other_sk, _pk, _addr) = generate_keypair_hex();
        sign_transaction(&mut tx, &other_sk).expect("sign");
        let err = tx.validate(60).unwrap_err();
        assert_eq!(
            err,
            ChainError::InvalidTransaction("invalid signature".into())
        );
    }

    #[test]
    fn coinbase_skips_signature_check() {
        let tx = Transaction::coinbase("miner", 1000);
        assert!(tx.validate(60).is_ok());
    }
}
