use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;

use cosmwasm_schema::cw_serde;
use cosmwasm_std::Uint128;
use raffle_common::WINNER_COUNT;

use crate::error::RaffleError;

pub const DEFAULT_MAX_TICKETS_PER_REQUEST: u32 = 10;
pub const DEFAULT_PAYMENT_TIMEOUT_SECONDS: u64 = 30;
pub const DEFAULT_DENOM: &str = "usd";

#[cw_serde]
pub struct PoolConfig {
    pub id: String,
    pub capacity: u32,
    /// Price of one ticket in minor currency units
    pub ticket_price: Uint128,
    /// Prize amounts for 1st, 2nd and 3rd place
    pub prizes: [Uint128; WINNER_COUNT],
}

#[cw_serde]
pub struct RaffleConfig {
    /// Currency charged for tickets, e.g. "usd"
    pub denom: String,
    /// Upper bound on tickets bought in a single request
    #[serde(default = "default_max_tickets")]
    pub max_tickets_per_request: u32,
    /// How long the payment authorizer may take before the charge counts as failed
    #[serde(default = "default_payment_timeout")]
    pub payment_timeout_seconds: u64,
    pub pools: Vec<PoolConfig>,
}

fn default_max_tickets() -> u32 {
    DEFAULT_MAX_TICKETS_PER_REQUEST
}

fn default_payment_timeout() -> u64 {
    DEFAULT_PAYMENT_TIMEOUT_SECONDS
}

fn pool(id: &str, capacity: u32, ticket_price: u128, prizes: [u128; WINNER_COUNT]) -> PoolConfig {
    PoolConfig {
        id: id.to_string(),
        capacity,
        ticket_price: Uint128::new(ticket_price),
        prizes: prizes.map(Uint128::new),
    }
}

impl Default for RaffleConfig {
    /// The three standing raffles, priced in cents.
    fn default() -> Self {
        Self {
            denom: DEFAULT_DENOM.to_string(),
            max_tickets_per_request: DEFAULT_MAX_TICKETS_PER_REQUEST,
            payment_timeout_seconds: DEFAULT_PAYMENT_TIMEOUT_SECONDS,
            pools: vec![
                pool("10-ticket", 10, 1_000, [7_500, 1_000, 200]),
                pool("100-ticket", 100, 1_000, [75_000, 10_000, 2_000]),
                pool("100-ticket-high", 100, 10_000, [750_000, 100_000, 20_000]),
            ],
        }
    }
}

impl RaffleConfig {
    /// Read and validate a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, RaffleError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| RaffleError::InvalidConfig {
            reason: format!("cannot read {}: {e}", path.display()),
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, RaffleError> {
        let config: RaffleConfig =
            serde_json::from_str(raw).map_err(|e| RaffleError::InvalidConfig {
                reason: e.to_string(),
            })?;
        config.validate()?;
        Ok(config)
    }

    /// JSON schema for config files, for editors and deploy-time checks.
    pub fn json_schema() -> schemars::schema::RootSchema {
        schemars::schema_for!(RaffleConfig)
    }

    pub fn payment_timeout(&self) -> Duration {
        Duration::from_secs(self.payment_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), RaffleError> {
        if self.denom.trim().is_empty() {
            return Err(invalid("denom must not be empty"));
        }
        if self.max_tickets_per_request == 0 {
            return Err(invalid("max_tickets_per_request must be at least 1"));
        }
        if self.pools.is_empty() {
            return Err(invalid("at least one pool is required"));
        }

        let mut seen = BTreeSet::new();
        for pool in &self.pools {
            if pool.id.trim().is_empty() {
                return Err(invalid("pool id must not be empty"));
            }
            if !seen.insert(pool.id.as_str()) {
                return Err(invalid(&format!("duplicate pool id {}", pool.id)));
            }
            // A full pool has to pay out three distinct places
            if (pool.capacity as usize) < WINNER_COUNT {
                return Err(invalid(&format!(
                    "pool {} capacity {} is below {WINNER_COUNT}",
                    pool.id, pool.capacity
                )));
            }
            if pool.ticket_price.is_zero() {
                return Err(invalid(&format!("pool {} ticket price must be positive", pool.id)));
            }
        }
        Ok(())
    }
}

fn invalid(reason: &str) -> RaffleError {
    RaffleError::InvalidConfig {
        reason: reason.to_string(),
    }
}
