//! Store contracts consumed by the engine, plus an in-memory implementation.
//!
//! Real deployments back these traits with a database. The engine only ever
//! reads domain records and lazily creates settings records.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Result, VigilError};
use crate::model::DomainRecord;
use crate::settings::UserSettings;

#[async_trait]
pub trait DomainStore: Send + Sync {
    async fn list_domains(&self) -> Result<Vec<DomainRecord>>;

    async fn get_domain(&self, name: &str, owner_id: i64) -> Result<Option<DomainRecord>>;
}

#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Returns the owner's settings, creating the default record on first
    /// access. Must be idempotent under concurrent callers.
    async fn get_or_create_settings(&self, owner_id: i64) -> Result<UserSettings>;
}

/// On-disk layout read by [`MemoryStore::from_json_file`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSnapshot {
    pub domains: Vec<DomainRecord>,
    pub settings: Vec<UserSettings>,
}

/// Thread-safe in-memory store.
///
/// Settings creation happens under the write lock, so concurrent first
/// access for the same owner yields exactly one record.
#[derive(Debug, Default)]
pub struct MemoryStore {
    domains: RwLock<Vec<DomainRecord>>,
    settings: RwLock<HashMap<i64, UserSettings>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Result<Self> {
        let store = Self::new();
        for domain in snapshot.domains {
            store.add_domain(domain)?;
        }
        for settings in snapshot.settings {
            store.put_settings(settings);
        }
        Ok(store)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_snapshot(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let store = Self::from_json(&content)?;
        debug!(
            path = %path.as_ref().display(),
            domains = store.domain_count(),
            owners = store.settings_count(),
            "Loaded store snapshot"
        );
        Ok(store)
    }

    /// Adds a domain. Names are unique per owner.
    pub fn add_domain(&self, domain: DomainRecord) -> Result<()> {
        let mut domains = self.write_domains();
        if domains
            .iter()
            .any(|d| d.owner_id == domain.owner_id && d.name.eq_ignore_ascii_case(&domain.name))
        {
            return Err(VigilError::Store(format!(
                "domain {} already registered for owner {}",
                domain.name, domain.owner_id
            )));
        }
        domains.push(domain);
        Ok(())
    }

    pub fn put_settings(&self, settings: UserSettings) {
        self.write_settings().insert(settings.owner_id, settings);
    }

    pub fn domain_count(&self) -> usize {
        self.read_domains().len()
    }

    pub fn settings_count(&self) -> usize {
        self.read_settings().len()
    }

    fn read_domains(&self) -> RwLockReadGuard<'_, Vec<DomainRecord>> {
        self.domains.read().unwrap_or_else(|poisoned| {
            warn!("Domain store read lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_domains(&self) -> RwLockWriteGuard<'_, Vec<DomainRecord>> {
        self.domains.write().unwrap_or_else(|poisoned| {
            warn!("Domain store write lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn read_settings(&self) -> RwLockReadGuard<'_, HashMap<i64, UserSettings>> {
        self.settings.read().unwrap_or_else(|poisoned| {
            warn!("Settings store read lock poisoned, recovering");
            poisoned.into_inner()
        })
    }

    fn write_settings(&self) -> RwLockWriteGuard<'_, HashMap<i64, UserSettings>> {
        self.settings.write().unwrap_or_else(|poisoned| {
            warn!("Settings store write lock poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl DomainStore for MemoryStore {
    async fn list_domains(&self) -> Result<Vec<DomainRecord>> {
        Ok(self.read_domains().clone())
    }

    async fn get_domain(&self, name: &str, owner_id: i64) -> Result<Option<DomainRecord>> {
        Ok(self
            .read_domains()
            .iter()
            .find(|d| d.owner_id == owner_id && d.name.eq_ignore_ascii_case(name))
            .cloned())
    }
}

#[async_trait]
impl SettingsStore for MemoryStore {
    async fn get_or_create_settings(&self, owner_id: i64) -> Result<UserSettings> {
        if let Some(existing) = self.read_settings().get(&owner_id) {
            return Ok(existing.clone());
        }

        // Re-check under the write lock; another caller may have won the race.
        let mut settings = self.write_settings();
        let entry = settings.entry(owner_id).or_insert_with(|| {
            debug!(owner_id, "Creating default settings");
            UserSettings::new(owner_id)
        });
        Ok(entry.clone())
    }
}
