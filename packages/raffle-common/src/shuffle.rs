use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};

use crate::types::{Entry, WINNER_COUNT};

/// Domain prefix for the entry-set digest.
const DIGEST_PREFIX: u8 = 0x00;
/// Domain prefix for each entry inside the digest.
const ENTRY_PREFIX: u8 = 0x01;
/// Domain prefix for randomness stream blocks.
const STREAM_PREFIX: u8 = 0x02;

/// Deterministic random stream used to drive a draw.
///
/// Block `k` of the stream is `sha256( 0x02 || seed || k_u64_be )`. Publishing the
/// seed next to the draw result lets anyone regenerate the exact same stream and
/// replay the shuffle.
pub struct DrawRng {
    seed: [u8; 32],
    counter: u64,
    block: [u8; 32],
    cursor: usize,
}

impl DrawRng {
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            counter: 0,
            block: [0u8; 32],
            cursor: 32,
        }
    }

    fn refill(&mut self) {
        let mut hasher = Sha256::new();
        hasher.update([STREAM_PREFIX]);
        hasher.update(self.seed);
        hasher.update(self.counter.to_be_bytes());
        self.block = hasher.finalize().into();
        self.counter += 1;
        self.cursor = 0;
    }
}

impl RngCore for DrawRng {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.fill_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.fill_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        let mut written = 0;
        while written < dest.len() {
            if self.cursor == self.block.len() {
                self.refill();
            }
            let take = (dest.len() - written).min(self.block.len() - self.cursor);
            dest[written..written + take]
                .copy_from_slice(&self.block[self.cursor..self.cursor + take]);
            written += take;
            self.cursor += take;
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Uniform in-place Fisher–Yates shuffle.
///
/// Walks from the last slot down, swapping each slot with a uniformly chosen slot
/// at or below it. Indices are sampled as `u64` so a given stream yields the same
/// permutation on 32 and 64 bit targets.
pub fn shuffle<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i as u64) as usize;
        items.swap(i, j);
    }
}

/// Pick the winners for a full pool: shuffle a copy of the entries with the stream
/// seeded by `seed` and take the first three in rank order.
///
/// Returns fewer than three winners only if fewer entries are given.
pub fn select_winners(entries: &[Entry], seed: &[u8; 32]) -> Vec<Entry> {
    let mut order = entries.to_vec();
    let mut rng = DrawRng::new(*seed);
    shuffle(&mut order, &mut rng);
    order.truncate(WINNER_COUNT);
    order
}

/// Digest of the ordered entry set a draw was made from.
///
/// `sha256( 0x00 || count_u32_be || for each entry: 0x01 || len || name || len || email || created_at_nanos_be )`
pub fn entries_digest(entries: &[Entry]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update([DIGEST_PREFIX]);
    hasher.update((entries.len() as u32).to_be_bytes());
    for entry in entries {
        hasher.update([ENTRY_PREFIX]);
        hasher.update((entry.name.len() as u32).to_be_bytes());
        hasher.update(entry.name.as_bytes());
        hasher.update((entry.email.len() as u32).to_be_bytes());
        hasher.update(entry.email.as_bytes());
        hasher.update(entry.created_at.nanos().to_be_bytes());
    }
    hasher.finalize().into()
}
