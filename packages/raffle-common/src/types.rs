use std::collections::BTreeMap;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::{Timestamp, Uint128};

/// Number of places paid out by every draw.
pub const WINNER_COUNT: usize = 3;

/// One purchased ticket. Entries are never edited after they are recorded.
#[cw_serde]
pub struct Entry {
    pub name: String,
    /// Trimmed, lower-cased address. Used as the per-pool identity key.
    pub email: String,
    pub created_at: Timestamp,
}

/// A fixed-capacity raffle and its current round of entries.
#[cw_serde]
pub struct Pool {
    pub id: String,
    pub capacity: u32,
    /// Price of a single ticket in minor currency units (cents)
    pub ticket_price: Uint128,
    /// Prize amounts for 1st, 2nd and 3rd place, in minor currency units
    pub prizes: [Uint128; WINNER_COUNT],
    /// Insertion order is draw eligibility order.
    pub entries: Vec<Entry>,
}

impl Pool {
    pub fn entry_count(&self) -> u32 {
        self.entries.len() as u32
    }

    pub fn remaining(&self) -> u32 {
        self.capacity.saturating_sub(self.entry_count())
    }

    /// Number of entries currently held by `email` (already normalised).
    pub fn entries_for(&self, email: &str) -> u32 {
        self.entries.iter().filter(|e| e.email == email).count() as u32
    }
}

/// Outcome of one draw. Appended to the history and never mutated.
#[cw_serde]
pub struct DrawResult {
    /// Position in the draw history, starting at 0.
    pub id: u64,
    pub pool_id: String,
    /// Winning entries in rank order: 1st, 2nd, 3rd.
    pub winners: Vec<Entry>,
    /// The pool's prize sequence at draw time.
    pub prizes: [Uint128; WINNER_COUNT],
    /// Number of entries the winners were drawn from.
    pub entry_count: u32,
    /// Hex-encoded 32 byte seed that drove the shuffle.
    pub seed: String,
    /// Hex-encoded sha256 over the ordered entry set at draw time.
    pub entries_digest: String,
    pub drawn_at: Timestamp,
}

impl DrawResult {
    /// `(rank, winner, prize)` triples, rank starting at 1.
    pub fn placements(&self) -> impl Iterator<Item = (u8, &Entry, Uint128)> + '_ {
        self.winners
            .iter()
            .zip(self.prizes.iter())
            .enumerate()
            .map(|(i, (entry, prize))| (i as u8 + 1, entry, *prize))
    }
}

/// Everything that has to survive a restart.
#[cw_serde]
#[derive(Default)]
pub struct RegistryState {
    pub pools: BTreeMap<String, Pool>,
    /// Append-only, ordered by occurrence.
    pub draws: Vec<DrawResult>,
}

/// Read-only view of a pool for status displays.
#[cw_serde]
pub struct PoolStatus {
    pub pool_id: String,
    pub entries: u32,
    pub capacity: u32,
    pub remaining: u32,
    pub ticket_price: Uint128,
    pub prizes: [Uint128; WINNER_COUNT],
}
