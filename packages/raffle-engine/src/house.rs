use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use raffle_common::{DrawResult, Pool, PoolStatus, RegistryState};

use crate::allocation::{self, AllocationReceipt, AllocationRequest, Committed, EntryPolicy};
use crate::config::RaffleConfig;
use crate::env::{RaffleEnv, SystemEnv};
use crate::error::RaffleError;
use crate::ledger;
use crate::payment::PaymentAuthorizer;
use crate::registry::PoolRegistry;
use crate::store::{StateStore, StoreError};
use crate::ALERT_TARGET;

const DEFAULT_HISTORY_LIMIT: u32 = 20;
const MAX_HISTORY_LIMIT: u32 = 100;

struct PoolSlot {
    pool: Mutex<Pool>,
    /// Mirror of `pool.entries.len()` for lock-free status reads.
    entries: AtomicU32,
}

/// The store plus the last state handed to it.
struct Journal<S> {
    store: S,
    snapshot: RegistryState,
    /// Set when the latest save failed; cleared by the next successful save.
    dirty: bool,
}

impl<S: StateStore> Journal<S> {
    fn save(&mut self) -> Result<(), StoreError> {
        let result = self.store.save(&self.snapshot);
        self.dirty = result.is_err();
        result
    }
}

/// A journaled transaction whose save failed.
struct Unsaved {
    /// History id given to the transaction's draw, if it triggered one
    draw_id: Option<u64>,
    reason: String,
}

/// Owns the live raffle state and runs allocation transactions against it.
///
/// Every pool has its own lock, held for the whole transaction including the
/// payment call and the save, so two requests for one pool can never both see the
/// same remaining capacity. Requests for different pools run in parallel and only
/// meet briefly on the journal lock. Locks are always taken pool first, journal
/// second.
pub struct RaffleHouse<S, P, E = SystemEnv> {
    registry: PoolRegistry,
    policy: EntryPolicy,
    slots: BTreeMap<String, PoolSlot>,
    journal: Mutex<Journal<S>>,
    authorizer: P,
    env: E,
}

impl<S: StateStore, P: PaymentAuthorizer> RaffleHouse<S, P, SystemEnv> {
    pub fn open(config: &RaffleConfig, store: S, authorizer: P) -> Result<Self, RaffleError> {
        Self::open_with_env(config, store, authorizer, SystemEnv)
    }
}

impl<S: StateStore, P: PaymentAuthorizer, E: RaffleEnv> RaffleHouse<S, P, E> {
    /// Validate the config, load saved state and reconcile it with the catalog.
    pub fn open_with_env(
        config: &RaffleConfig,
        store: S,
        authorizer: P,
        env: E,
    ) -> Result<Self, RaffleError> {
        config.validate()?;
        let registry = PoolRegistry::new(&config.pools);

        let snapshot = match store.load()? {
            Some(loaded) => registry.reconcile(loaded)?,
            None => registry.initial_state(),
        };

        let slots = snapshot
            .pools
            .values()
            .map(|pool| {
                let slot = PoolSlot {
                    entries: AtomicU32::new(pool.entry_count()),
                    pool: Mutex::new(pool.clone()),
                };
                (pool.id.clone(), slot)
            })
            .collect();

        tracing::info!(
            pools = config.pools.len(),
            draws = snapshot.draws.len(),
            "raffle house opened"
        );

        Ok(Self {
            registry,
            policy: EntryPolicy::from(config),
            slots,
            journal: Mutex::new(Journal {
                store,
                snapshot,
                dirty: false,
            }),
            authorizer,
            env,
        })
    }

    pub fn registry(&self) -> &PoolRegistry {
        &self.registry
    }

    pub fn policy(&self) -> &EntryPolicy {
        &self.policy
    }

    /// Buy tickets: validate, charge, record, draw if the pool filled, persist.
    pub fn allocate(&self, request: AllocationRequest) -> Result<AllocationReceipt, RaffleError> {
        let slot = self
            .slots
            .get(&request.pool_id)
            .ok_or_else(|| RaffleError::PoolNotFound {
                pool_id: request.pool_id.clone(),
            })?;
        let mut pool = lock(&slot.pool, &request.pool_id)?;

        let committed =
            match allocation::run(&mut pool, &request, &self.policy, &self.authorizer, &self.env) {
                Ok(committed) => committed,
                Err(err) => {
                    if err.is_user_correctable() {
                        tracing::debug!(pool_id = %request.pool_id, error = %err, "allocation rejected");
                    }
                    return Err(err);
                }
            };
        slot.entries.store(pool.entry_count(), Ordering::Release);

        let Committed {
            participant,
            payment,
            draw,
            at,
        } = committed;

        let draw = self.persist(&pool, draw).map_err(|unsaved| {
            tracing::error!(
                target: ALERT_TARGET,
                pool_id = %pool.id,
                email = %participant.email,
                quantity = request.quantity,
                payment_reference = %payment.reference,
                draw_id = ?unsaved.draw_id,
                reason = %unsaved.reason,
                "paid allocation not persisted; manual reconciliation required"
            );
            RaffleError::Persistence {
                pool_id: pool.id.clone(),
                email: participant.email.clone(),
                quantity: request.quantity,
                payment_reference: payment.reference.clone(),
                draw_id: unsaved.draw_id,
                reason: unsaved.reason,
            }
        })?;

        tracing::info!(
            pool_id = %pool.id,
            quantity = request.quantity,
            amount = %payment.amount,
            entries = pool.entry_count(),
            "tickets purchased"
        );

        let mut events = vec![allocation::purchase_event(
            &pool,
            request.quantity,
            &payment,
            at,
        )];
        if let Some(result) = &draw {
            tracing::info!(
                pool_id = %result.pool_id,
                draw_id = result.id,
                seed = %result.seed,
                "pool drawn"
            );
            events.push(allocation::draw_event(result));
        }

        Ok(AllocationReceipt {
            pool_id: pool.id.clone(),
            quantity: request.quantity,
            amount_charged: payment.amount,
            denom: payment.denom,
            payment_reference: payment.reference,
            pool_entries: pool.entry_count(),
            draw,
            events,
        })
    }

    /// Copy `pool` and any fresh draw into the snapshot and save it.
    ///
    /// The draw gets its history id here so ids follow the order draws were
    /// journaled, across all pools.
    fn persist(&self, pool: &Pool, draw: Option<DrawResult>) -> Result<Option<DrawResult>, Unsaved> {
        let mut journal = self.journal.lock().map_err(|_| Unsaved {
            draw_id: None,
            reason: "journal lock poisoned".to_string(),
        })?;

        let draw = draw.map(|mut result| {
            result.id = journal.snapshot.draws.len() as u64;
            journal.snapshot.draws.push(result.clone());
            result
        });
        journal.snapshot.pools.insert(pool.id.clone(), pool.clone());
        journal.save().map_err(|err| Unsaved {
            draw_id: draw.as_ref().map(|result| result.id),
            reason: err.to_string(),
        })?;

        Ok(draw)
    }

    /// Retry saving the in-memory state after a persistence failure.
    pub fn flush(&self) -> Result<(), RaffleError> {
        let mut journal = lock(&self.journal, "journal")?;
        if !journal.dirty {
            return Ok(());
        }
        journal.save().map_err(|err| {
            tracing::error!(
                target: ALERT_TARGET,
                draws = journal.snapshot.draws.len(),
                error = %err,
                "flush failed"
            );
            RaffleError::Store(err)
        })?;
        tracing::info!("raffle state flushed");
        Ok(())
    }

    /// True when everything in memory has been saved.
    pub fn is_durable(&self) -> bool {
        self.journal.lock().map(|j| !j.dirty).unwrap_or(false)
    }

    /// Entry counts per pool. Reads counters only, so values may trail an
    /// in-flight transaction.
    pub fn status(&self) -> Vec<PoolStatus> {
        self.registry
            .definitions()
            .map(|definition| {
                let entries = self
                    .slots
                    .get(&definition.id)
                    .map(|slot| slot.entries.load(Ordering::Acquire))
                    .unwrap_or(0);
                PoolStatus {
                    pool_id: definition.id.clone(),
                    entries,
                    capacity: definition.capacity,
                    remaining: definition.capacity.saturating_sub(entries),
                    ticket_price: definition.ticket_price,
                    prizes: definition.prizes,
                }
            })
            .collect()
    }

    pub fn pool_status(&self, pool_id: &str) -> Result<PoolStatus, RaffleError> {
        self.registry.get_pool(pool_id)?;
        self.status()
            .into_iter()
            .find(|s| s.pool_id == pool_id)
            .ok_or_else(|| RaffleError::PoolNotFound {
                pool_id: pool_id.to_string(),
            })
    }

    /// Draws in occurrence order, `start_after` exclusive.
    pub fn draw_history(
        &self,
        start_after: Option<u64>,
        limit: Option<u32>,
    ) -> Result<Vec<DrawResult>, RaffleError> {
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).min(MAX_HISTORY_LIMIT) as usize;
        let start = start_after
            .map(|id| usize::try_from(id.saturating_add(1)).unwrap_or(usize::MAX))
            .unwrap_or(0);

        let journal = lock(&self.journal, "journal")?;
        Ok(journal
            .snapshot
            .draws
            .iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect())
    }

    /// Tickets `email` currently holds in the open round of `pool_id`.
    pub fn tickets_held(&self, pool_id: &str, email: &str) -> Result<u32, RaffleError> {
        let slot = self
            .slots
            .get(pool_id)
            .ok_or_else(|| RaffleError::PoolNotFound {
                pool_id: pool_id.to_string(),
            })?;
        let pool = lock(&slot.pool, pool_id)?;
        Ok(pool.entries_for(&ledger::normalize_email(email)))
    }

    /// Copy of the state as last handed to the store.
    pub fn snapshot(&self) -> Result<RegistryState, RaffleError> {
        Ok(lock(&self.journal, "journal")?.snapshot.clone())
    }

    pub fn into_store(self) -> Result<S, RaffleError> {
        self.journal
            .into_inner()
            .map(|journal| journal.store)
            .map_err(|_| RaffleError::LockPoisoned {
                what: "journal".to_string(),
            })
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>, RaffleError> {
    mutex.lock().map_err(|_| RaffleError::LockPoisoned {
        what: what.to_string(),
    })
}
