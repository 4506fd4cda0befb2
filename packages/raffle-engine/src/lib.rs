pub mod allocation;
pub mod config;
pub mod draw;
pub mod env;
pub mod error;
pub mod house;
pub mod ledger;
pub mod payment;
pub mod registry;
pub mod store;

/// `tracing` target for conditions that need an operator: paid but unrecorded
/// or unpersisted allocations, failed refunds, failed draws.
pub const ALERT_TARGET: &str = "raffle::alert";

pub use allocation::{AllocationReceipt, AllocationRequest, EntryPolicy};
pub use config::{PoolConfig, RaffleConfig};
pub use env::{RaffleEnv, SystemEnv};
pub use error::{ErrorKind, RaffleError};
pub use house::RaffleHouse;
pub use payment::{PaymentAuthorizer, PaymentOutcome, PaymentReceipt, PaymentRequest};
pub use registry::PoolRegistry;
pub use store::{JsonFileStore, MemoryStore, StateStore, StorageStore, StoreError};
