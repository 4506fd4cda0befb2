use cosmwasm_std::Timestamp;
use raffle_common::{entries_digest, select_winners, DrawResult, Pool};

use crate::error::RaffleError;

pub fn should_draw(pool: &Pool) -> bool {
    pool.entries.len() == pool.capacity as usize
}

/// Draw three winners from a full pool and reset it.
///
/// The winners are the first three entries of a Fisher–Yates shuffle driven by
/// `seed`, paired with the pool's prizes in rank order. The result is returned
/// with `id` 0; the journal assigns the history position when it appends it.
pub fn draw(pool: &mut Pool, seed: [u8; 32], now: Timestamp) -> Result<DrawResult, RaffleError> {
    if !should_draw(pool) {
        return Err(RaffleError::DrawPrecondition {
            pool_id: pool.id.clone(),
            entries: pool.entry_count(),
            capacity: pool.capacity,
        });
    }

    let winners = select_winners(&pool.entries, &seed);
    if winners.len() != pool.prizes.len() {
        return Err(RaffleError::DrawPrecondition {
            pool_id: pool.id.clone(),
            entries: pool.entry_count(),
            capacity: pool.capacity,
        });
    }

    let result = DrawResult {
        id: 0,
        pool_id: pool.id.clone(),
        winners,
        prizes: pool.prizes,
        entry_count: pool.entry_count(),
        seed: hex::encode(seed),
        entries_digest: hex::encode(entries_digest(&pool.entries)),
        drawn_at: now,
    };
    pool.entries.clear();

    Ok(result)
}
