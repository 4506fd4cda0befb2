//! Entry ledger: admission rules for a pool's entry sequence and the append that
//! records purchased tickets.
//!
//! `commit` is only ever called by the allocation transaction while it holds the
//! pool lock, after `validate` passed for the same pool state.

use cosmwasm_std::Timestamp;
use raffle_common::{Entry, Pool};

use crate::error::RaffleError;

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;
const MAX_LABEL_LEN: usize = 63;
const LOCAL_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~.";

/// Normalised participant identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub name: String,
    /// Trimmed and lower-cased
    pub email: String,
}

/// Check a purchase of `quantity` tickets against the pool's current entries.
///
/// Shape checks run before limit checks, so a malformed request never reports a
/// capacity figure.
pub fn validate(
    pool: &Pool,
    name: &str,
    email: &str,
    quantity: u32,
    max_per_request: u32,
) -> Result<Participant, RaffleError> {
    if quantity < 1 || quantity > max_per_request {
        return Err(RaffleError::InvalidQuantity {
            quantity,
            max: max_per_request,
        });
    }

    let name = name.trim();
    if name.is_empty() {
        return Err(RaffleError::InvalidName);
    }

    let email = normalize_email(email);
    if !is_valid_email(&email) {
        return Err(RaffleError::InvalidEmail { email });
    }

    let remaining = pool.remaining();
    if quantity > remaining {
        return Err(RaffleError::InsufficientCapacity { remaining });
    }

    let allowed = participant_allowance(pool, &email);
    if quantity > allowed {
        return Err(RaffleError::PerParticipantCapExceeded {
            requested: quantity,
            allowed,
        });
    }

    Ok(Participant {
        name: name.to_string(),
        email,
    })
}

/// Append `quantity` identical entries stamped with `now`.
///
/// Either every entry is appended or the pool is left untouched.
pub fn commit(
    pool: &mut Pool,
    participant: &Participant,
    quantity: u32,
    now: Timestamp,
) -> Result<(), RaffleError> {
    let remaining = pool.remaining();
    if quantity == 0 || quantity > remaining {
        return Err(RaffleError::InsufficientCapacity { remaining });
    }

    let entry = Entry {
        name: participant.name.clone(),
        email: participant.email.clone(),
        created_at: now,
    };
    pool.entries
        .extend(std::iter::repeat(entry).take(quantity as usize));
    Ok(())
}

/// How many more tickets `email` may hold in this pool. A single participant
/// may hold up to the whole pool.
pub fn participant_allowance(pool: &Pool, email: &str) -> u32 {
    pool.capacity.saturating_sub(pool.entries_for(email))
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

/// Syntactic address check: `local@domain.tld` with RFC 5321 length limits,
/// dot-atom local part and LDH domain labels.
pub fn is_valid_email(email: &str) -> bool {
    if email.is_empty() || email.len() > MAX_EMAIL_LEN {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };

    if local.is_empty()
        || local.len() > MAX_LOCAL_LEN
        || local.starts_with('.')
        || local.ends_with('.')
        || local.contains("..")
        || !local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || LOCAL_SPECIALS.contains(c))
    {
        return false;
    }

    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && label.len() <= MAX_LABEL_LEN
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .map(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()))
        .unwrap_or(false);

    labels_ok && tld_ok
}
