//! Durable state adapters.
//!
//! The engine reads the full [`RegistryState`] once when a house is opened and
//! writes it back after every allocation. Stores do not need transactions of
//! their own: the house serialises every write through its journal lock.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use cosmwasm_std::{Order, StdError, StdResult, Storage};
use cw2::{get_contract_version, set_contract_version};
use cw_storage_plus::{Item, Map};
use raffle_common::{DrawResult, Pool, RegistryState};
use thiserror::Error;

const STATE_NAME: &str = "crates.io:raffle-engine";
const STATE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const POOLS: Map<&str, Pool> = Map::new("pools");
pub const DRAWS: Map<u64, DrawResult> = Map::new("draws");
pub const DRAW_COUNT: Item<u64> = Item::new("draw_count");

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Std(#[from] StdError),

    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("stored state belongs to {found}, expected {expected}")]
    ForeignState { found: String, expected: String },

    #[error("draw history would shrink from {stored} to {given}")]
    HistoryRewound { stored: u64, given: u64 },

    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },
}

pub trait StateStore: Send {
    /// `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<RegistryState>, StoreError>;

    fn save(&mut self, state: &RegistryState) -> Result<(), StoreError>;
}

/// Keeps the last saved state in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    state: Option<RegistryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: RegistryState) -> Self {
        Self { state: Some(state) }
    }

    pub fn state(&self) -> Option<&RegistryState> {
        self.state.as_ref()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> Result<Option<RegistryState>, StoreError> {
        Ok(self.state.clone())
    }

    fn save(&mut self, state: &RegistryState) -> Result<(), StoreError> {
        self.state = Some(state.clone());
        Ok(())
    }
}

/// Whole state as one pretty-printed JSON document.
///
/// Saves write a sibling `.tmp` file and rename it over the target, so a crash
/// mid-write leaves the previous document intact.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    fn io_error(path: &Path, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> Result<Option<RegistryState>, StoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(Self::io_error(&self.path, e)),
        };
        Ok(Some(serde_json::from_str(&raw)?))
    }

    fn save(&mut self, state: &RegistryState) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| Self::io_error(parent, e))?;
        }

        let body = serde_json::to_vec_pretty(state)?;
        let tmp = self.tmp_path();
        let mut file = fs::File::create(&tmp).map_err(|e| Self::io_error(&tmp, e))?;
        file.write_all(&body)
            .and_then(|_| file.sync_all())
            .map_err(|e| Self::io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| Self::io_error(&self.path, e))
    }
}

/// Keyed store on any `cosmwasm_std::Storage` backend.
///
/// Pools live under `pools/{id}`, draws under `draws/{id}`. Draw history is
/// append-only: a save only writes draws beyond the stored count.
pub struct StorageStore<S> {
    storage: S,
}

impl<S: Storage> StorageStore<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn into_inner(self) -> S {
        self.storage
    }
}

impl<S: Storage + Send> StateStore for StorageStore<S> {
    fn load(&self) -> Result<Option<RegistryState>, StoreError> {
        let stored = match get_contract_version(&self.storage) {
            Ok(version) => version,
            Err(StdError::NotFound { .. }) => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if stored.contract != STATE_NAME {
            return Err(StoreError::ForeignState {
                found: stored.contract,
                expected: STATE_NAME.to_string(),
            });
        }

        let pools = POOLS
            .range(&self.storage, None, None, Order::Ascending)
            .collect::<StdResult<_>>()?;
        let draws = DRAWS
            .range(&self.storage, None, None, Order::Ascending)
            .map(|r| r.map(|(_, draw)| draw))
            .collect::<StdResult<_>>()?;

        Ok(Some(RegistryState { pools, draws }))
    }

    fn save(&mut self, state: &RegistryState) -> Result<(), StoreError> {
        let stored = DRAW_COUNT.may_load(&self.storage)?.unwrap_or(0);
        let given = state.draws.len() as u64;
        if given < stored {
            return Err(StoreError::HistoryRewound { stored, given });
        }

        for (id, pool) in &state.pools {
            POOLS.save(&mut self.storage, id, pool)?;
        }
        for draw in state.draws.iter().skip(stored as usize) {
            DRAWS.save(&mut self.storage, draw.id, draw)?;
        }
        DRAW_COUNT.save(&mut self.storage, &given)?;
        set_contract_version(&mut self.storage, STATE_NAME, STATE_VERSION)?;

        Ok(())
    }
}
