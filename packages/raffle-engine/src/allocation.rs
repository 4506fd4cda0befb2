//! The allocation transaction: validate, authorize, commit, draw-if-full.
//!
//! [`run`] operates on a pool the caller has already locked. Persisting the
//! outcome is the caller's last step (see `RaffleHouse::allocate`), still under
//! the same pool lock.

use std::time::Duration;

use cosmwasm_std::{Event, Timestamp, Uint128};
use raffle_common::{DrawResult, Pool};

use crate::config::RaffleConfig;
use crate::draw;
use crate::env::RaffleEnv;
use crate::error::RaffleError;
use crate::ledger::{self, Participant};
use crate::payment::{
    derive_idempotency_key, PaymentAuthorizer, PaymentOutcome, PaymentReceipt, PaymentRequest,
};
use crate::ALERT_TARGET;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllocationRequest {
    pub pool_id: String,
    pub quantity: u32,
    pub name: String,
    pub email: String,
    /// Provider handle for the participant's payment method
    pub payment_token: String,
    /// Caller-supplied key for provider-side deduplication. Reuse it when
    /// retrying the same purchase; a fresh key is generated when absent.
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AllocationReceipt {
    pub pool_id: String,
    pub quantity: u32,
    pub amount_charged: Uint128,
    pub denom: String,
    pub payment_reference: String,
    /// Entries in the pool once the transaction finished (0 after a draw)
    pub pool_entries: u32,
    pub draw: Option<DrawResult>,
    pub events: Vec<Event>,
}

/// Admission and payment policy shared by every pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPolicy {
    pub denom: String,
    pub max_tickets_per_request: u32,
    pub payment_timeout: Duration,
}

impl From<&RaffleConfig> for EntryPolicy {
    fn from(config: &RaffleConfig) -> Self {
        Self {
            denom: config.denom.clone(),
            max_tickets_per_request: config.max_tickets_per_request,
            payment_timeout: config.payment_timeout(),
        }
    }
}

/// State of a transaction after its entries were committed, before persisting.
#[derive(Debug)]
pub struct Committed {
    pub participant: Participant,
    pub payment: PaymentReceipt,
    pub draw: Option<DrawResult>,
    pub at: Timestamp,
}

pub fn run<P, E>(
    pool: &mut Pool,
    request: &AllocationRequest,
    policy: &EntryPolicy,
    authorizer: &P,
    env: &E,
) -> Result<Committed, RaffleError>
where
    P: PaymentAuthorizer + ?Sized,
    E: RaffleEnv + ?Sized,
{
    // 1. Validate
    if request.payment_token.trim().is_empty() {
        return Err(RaffleError::MissingPaymentToken);
    }
    let participant = ledger::validate(
        pool,
        &request.name,
        &request.email,
        request.quantity,
        policy.max_tickets_per_request,
    )?;
    let amount = pool
        .ticket_price
        .checked_mul(Uint128::from(request.quantity))?;

    // 2. Authorize. Nothing has been written yet, so a failure needs no cleanup.
    let payment_request = PaymentRequest {
        amount,
        denom: policy.denom.clone(),
        payment_token: request.payment_token.clone(),
        idempotency_key: request.idempotency_key.clone().unwrap_or_else(|| {
            derive_idempotency_key(&pool.id, &participant.email, &env.request_nonce())
        }),
        timeout: policy.payment_timeout,
    };
    let payment = match authorizer.authorize(&payment_request) {
        PaymentOutcome::Succeeded(receipt) => receipt,
        PaymentOutcome::Declined { reason } => {
            tracing::warn!(pool_id = %pool.id, %amount, %reason, "payment declined");
            return Err(RaffleError::PaymentFailed { reason });
        }
        PaymentOutcome::TimedOut => {
            tracing::warn!(pool_id = %pool.id, %amount, "payment timed out");
            return Err(RaffleError::PaymentFailed {
                reason: "payment provider timed out".to_string(),
            });
        }
    };

    // 3. Commit. The money has moved: on failure refund before reporting.
    let at = env.now();
    commit_or_refund(pool, &participant, request.quantity, &payment, at, authorizer)?;

    // 4. Draw if full
    let draw = if draw::should_draw(pool) {
        match draw::draw(pool, env.draw_seed(), at) {
            Ok(result) => Some(result),
            Err(err) => {
                tracing::error!(
                    target: ALERT_TARGET,
                    pool_id = %pool.id,
                    payment_reference = %payment.reference,
                    error = %err,
                    "draw failed on a full pool"
                );
                return Err(err);
            }
        }
    } else {
        None
    };

    Ok(Committed {
        participant,
        payment,
        draw,
        at,
    })
}

/// Record the paid entries, or hand the charge back if they cannot be recorded.
pub(crate) fn commit_or_refund<P>(
    pool: &mut Pool,
    participant: &Participant,
    quantity: u32,
    payment: &PaymentReceipt,
    at: Timestamp,
    authorizer: &P,
) -> Result<(), RaffleError>
where
    P: PaymentAuthorizer + ?Sized,
{
    let Err(err) = ledger::commit(pool, participant, quantity, at) else {
        return Ok(());
    };
    let refunded = match authorizer.refund(payment) {
        Ok(()) => {
            tracing::warn!(
                pool_id = %pool.id,
                payment_reference = %payment.reference,
                error = %err,
                "commit rejected; payment refunded"
            );
            true
        }
        Err(reason) => {
            tracing::error!(
                target: ALERT_TARGET,
                pool_id = %pool.id,
                email = %participant.email,
                payment_reference = %payment.reference,
                %reason,
                "refund failed after rejected commit; manual reconciliation required"
            );
            false
        }
    };
    Err(RaffleError::CommitFailed {
        payment_reference: payment.reference.clone(),
        refunded,
        reason: err.to_string(),
    })
}

pub fn purchase_event(pool: &Pool, quantity: u32, payment: &PaymentReceipt, at: Timestamp) -> Event {
    Event::new("raffle_tickets_purchased")
        .add_attribute("pool_id", pool.id.clone())
        .add_attribute("quantity", quantity.to_string())
        .add_attribute("amount", payment.amount.to_string())
        .add_attribute("denom", payment.denom.clone())
        .add_attribute("payment_reference", payment.reference.clone())
        .add_attribute("entries", pool.entry_count().to_string())
        .add_attribute("capacity", pool.capacity.to_string())
        .add_attribute("timestamp", at.seconds().to_string())
}

pub fn draw_event(result: &DrawResult) -> Event {
    let mut event = Event::new("raffle_draw_result")
        .add_attribute("draw_id", result.id.to_string())
        .add_attribute("pool_id", result.pool_id.clone())
        .add_attribute("entry_count", result.entry_count.to_string());
    for (rank, winner, prize) in result.placements() {
        event = event
            .add_attribute(format!("winner_{rank}"), winner.name.clone())
            .add_attribute(format!("prize_{rank}"), prize.to_string());
    }
    event
        .add_attribute("seed", result.seed.clone())
        .add_attribute("entries_digest", result.entries_digest.clone())
        .add_attribute("timestamp", result.drawn_at.seconds().to_string())
}
