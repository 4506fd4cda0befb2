use std::collections::BTreeMap;

use raffle_common::{Pool, RegistryState};

use crate::config::PoolConfig;
use crate::error::RaffleError;

/// Static catalog of pool definitions, fixed at startup.
#[derive(Debug, Clone)]
pub struct PoolRegistry {
    definitions: BTreeMap<String, PoolConfig>,
}

impl PoolRegistry {
    pub fn new(pools: &[PoolConfig]) -> Self {
        let definitions = pools
            .iter()
            .map(|p| (p.id.clone(), p.clone()))
            .collect();
        Self { definitions }
    }

    pub fn get_pool(&self, pool_id: &str) -> Result<&PoolConfig, RaffleError> {
        self.definitions
            .get(pool_id)
            .ok_or_else(|| RaffleError::PoolNotFound {
                pool_id: pool_id.to_string(),
            })
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.definitions.keys().map(String::as_str)
    }

    pub fn definitions(&self) -> impl Iterator<Item = &PoolConfig> {
        self.definitions.values()
    }

    /// An empty pool for every definition.
    pub fn initial_state(&self) -> RegistryState {
        RegistryState {
            pools: self
                .definitions
                .values()
                .map(|d| (d.id.clone(), empty_pool(d)))
                .collect(),
            draws: vec![],
        }
    }

    /// Merge loaded state with the catalog.
    ///
    /// The catalog wins on capacity, price and prizes; entries and draw history
    /// come from the loaded state. Pools missing from the loaded state start empty.
    /// A stored pool that is unknown or already full, or a history whose ids are
    /// not its positions, is refused.
    pub fn reconcile(&self, loaded: RegistryState) -> Result<RegistryState, RaffleError> {
        let RegistryState { mut pools, draws } = loaded;

        if let Some(stray) = pools.keys().find(|id| !self.definitions.contains_key(*id)) {
            return Err(RaffleError::InvalidConfig {
                reason: format!("stored pool {stray} is not configured"),
            });
        }

        if let Some((position, draw)) = draws
            .iter()
            .enumerate()
            .find(|(i, d)| d.id != *i as u64)
        {
            return Err(RaffleError::InvalidConfig {
                reason: format!(
                    "stored draw history out of order: id {} at position {position}",
                    draw.id
                ),
            });
        }

        let mut reconciled = BTreeMap::new();
        for definition in self.definitions.values() {
            let mut pool = empty_pool(definition);
            if let Some(stored) = pools.remove(&definition.id) {
                if stored.entries.len() >= definition.capacity as usize {
                    return Err(RaffleError::InvalidConfig {
                        reason: format!(
                            "stored pool {} holds {} entries but capacity is {}",
                            definition.id,
                            stored.entries.len(),
                            definition.capacity
                        ),
                    });
                }
                pool.entries = stored.entries;
            }
            reconciled.insert(definition.id.clone(), pool);
        }

        Ok(RegistryState {
            pools: reconciled,
            draws,
        })
    }
}

fn empty_pool(definition: &PoolConfig) -> Pool {
    Pool {
        id: definition.id.clone(),
        capacity: definition.capacity,
        ticket_price: definition.ticket_price,
        prizes: definition.prizes,
        entries: vec![],
    }
}
