use cosmwasm_std::{OverflowError, StdError};
use thiserror::Error;

/// Coarse classification used by callers to decide how to report a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input shape. User-correctable, nothing happened.
    Validation,
    /// Pool or per-participant limits. User-correctable, nothing happened.
    Capacity,
    /// Authorization declined or timed out. No entries were recorded.
    Payment,
    /// A charge went through but the result is not durable. Needs reconciliation.
    Persistence,
    /// Contract violation inside the engine. Never reachable by user input.
    DrawPrecondition,
    Internal,
}

#[derive(Error, Debug)]
pub enum RaffleError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("{0}")]
    Overflow(#[from] OverflowError),

    #[error("raffle {pool_id} not found")]
    PoolNotFound { pool_id: String },

    #[error("ticket quantity must be between 1 and {max}, got {quantity}")]
    InvalidQuantity { quantity: u32, max: u32 },

    #[error("invalid email: {email}")]
    InvalidEmail { email: String },

    #[error("name is required")]
    InvalidName,

    #[error("payment method required")]
    MissingPaymentToken,

    #[error("only {remaining} entries remaining")]
    InsufficientCapacity { remaining: u32 },

    #[error("this email cannot add {requested} more entries; only {allowed} allowed")]
    PerParticipantCapExceeded { requested: u32, allowed: u32 },

    #[error("payment failed: {reason}")]
    PaymentFailed { reason: String },

    #[error("could not record entries for payment {payment_reference} (refunded: {refunded}): {reason}")]
    CommitFailed {
        payment_reference: String,
        refunded: bool,
        reason: String,
    },

    #[error("entries for {email} in {pool_id} ({quantity} tickets, payment {payment_reference}) were not persisted: {reason}")]
    Persistence {
        pool_id: String,
        email: String,
        quantity: u32,
        payment_reference: String,
        /// Draw this purchase triggered, held in memory but not yet saved
        draw_id: Option<u64>,
        reason: String,
    },

    #[error("state store failure: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("draw precondition violated for {pool_id}: {entries} entries, capacity {capacity}")]
    DrawPrecondition {
        pool_id: String,
        entries: u32,
        capacity: u32,
    },

    #[error("invalid config: {reason}")]
    InvalidConfig { reason: String },

    #[error("lock poisoned: {what}")]
    LockPoisoned { what: String },
}

impl RaffleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RaffleError::PoolNotFound { .. }
            | RaffleError::InvalidQuantity { .. }
            | RaffleError::InvalidEmail { .. }
            | RaffleError::InvalidName
            | RaffleError::MissingPaymentToken => ErrorKind::Validation,
            RaffleError::InsufficientCapacity { .. }
            | RaffleError::PerParticipantCapExceeded { .. } => ErrorKind::Capacity,
            RaffleError::PaymentFailed { .. } => ErrorKind::Payment,
            RaffleError::Persistence { .. } | RaffleError::Store(_) => ErrorKind::Persistence,
            RaffleError::DrawPrecondition { .. } => ErrorKind::DrawPrecondition,
            RaffleError::Std(_)
            | RaffleError::Overflow(_)
            | RaffleError::CommitFailed { .. }
            | RaffleError::InvalidConfig { .. }
            | RaffleError::LockPoisoned { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the caller can fix the request and try again with a new payment.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Validation | ErrorKind::Capacity | ErrorKind::Payment
        )
    }

    /// Message safe to show to the participant. Operational failures collapse
    /// into a generic message; the details go to the alert log instead.
    pub fn public_message(&self) -> String {
        if self.is_user_correctable() {
            self.to_string()
        } else {
            "raffle entry could not be completed; support has been notified".to_string()
        }
    }
}
