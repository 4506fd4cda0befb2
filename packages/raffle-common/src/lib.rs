pub mod shuffle;
pub mod types;

pub use shuffle::{entries_digest, select_winners, shuffle, DrawRng};
pub use types::{DrawResult, Entry, Pool, PoolStatus, RegistryState, WINNER_COUNT};
