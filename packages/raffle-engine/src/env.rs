use std::time::{SystemTime, UNIX_EPOCH};

use cosmwasm_std::Timestamp;
use rand::RngCore;

/// Clock and entropy the engine runs against.
pub trait RaffleEnv: Send + Sync {
    fn now(&self) -> Timestamp;

    /// Fresh 32 byte seed for one draw.
    fn draw_seed(&self) -> [u8; 32];

    /// Unique per call; distinguishes purchases that carry identical contents.
    fn request_nonce(&self) -> [u8; 16];
}

/// Wall clock and the thread-local OS-seeded RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemEnv;

impl RaffleEnv for SystemEnv {
    fn now(&self) -> Timestamp {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Timestamp::from_nanos(since_epoch.as_nanos() as u64)
    }

    fn draw_seed(&self) -> [u8; 32] {
        let mut seed = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut seed);
        seed
    }

    fn request_nonce(&self) -> [u8; 16] {
        let mut nonce = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut nonce);
        nonce
    }
}
