use std::sync::Arc;
use std::time::Duration;

use cosmwasm_std::Uint128;
use sha2::{Digest, Sha256};

/// A single charge the engine asks the payment provider to make.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRequest {
    /// Total in minor currency units
    pub amount: Uint128,
    pub denom: String,
    /// Opaque provider handle for the participant's payment method
    pub payment_token: String,
    /// Stable for the logical request; the provider must dedupe on it.
    pub idempotency_key: String,
    /// The adapter must give up and report `TimedOut` after this long.
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentReceipt {
    /// Provider reference for the charge, used for refunds and reconciliation.
    pub reference: String,
    pub amount: Uint128,
    pub denom: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentOutcome {
    Succeeded(PaymentReceipt),
    Declined { reason: String },
    TimedOut,
}

/// Boundary to the payment provider.
///
/// `authorize` moves money and is not idempotent on its own: the engine calls it at
/// most once per allocation and never retries it.
pub trait PaymentAuthorizer: Send + Sync {
    fn authorize(&self, request: &PaymentRequest) -> PaymentOutcome;

    /// Compensating action for a charge whose entries could not be recorded.
    fn refund(&self, receipt: &PaymentReceipt) -> Result<(), String>;
}

impl<T: PaymentAuthorizer + ?Sized> PaymentAuthorizer for Arc<T> {
    fn authorize(&self, request: &PaymentRequest) -> PaymentOutcome {
        (**self).authorize(request)
    }

    fn refund(&self, receipt: &PaymentReceipt) -> Result<(), String> {
        (**self).refund(receipt)
    }
}

/// Key for a request that did not bring its own.
///
/// `sha256( pool_id || 0x00 || email || 0x00 || nonce )`, hex. The nonce is fresh
/// for every allocation, so two purchases with the same contents are two charges.
pub fn derive_idempotency_key(pool_id: &str, email: &str, nonce: &[u8; 16]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(pool_id.as_bytes());
    hasher.update([0x00]);
    hasher.update(email.as_bytes());
    hasher.update([0x00]);
    hasher.update(nonce);
    hex::encode(hasher.finalize())
}
