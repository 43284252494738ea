//! Registry of per-tenant stores.
//!
//! Stores are created on first use for a `(realm, storage)` pair and kept
//! until explicitly invalidated. Callers invalidate after changing a
//! realm or storage definition; nothing is refreshed automatically.

use std::collections::HashMap;
use std::sync::Arc;

use ds_model::Realm;
use ds_store::{StoreError, StoreResult};
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::TenantConfig;
use crate::directory::{DirectoryClient, LdapDirectory, MemoryDirectory};
use crate::reader::LdapReaderStore;
use crate::resolver::TenantResolver;
use crate::writer::LdapWriterStore;

/// Creates the directory client of a tenant.
pub trait DirectoryConnector: Send + Sync {
    /// Client for the tenant described by `config`.
    fn connect(&self, config: Arc<TenantConfig>) -> Arc<dyn DirectoryClient>;
}

/// Connects through pooled `ldap3` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct LdapConnector;

impl DirectoryConnector for LdapConnector {
    fn connect(&self, config: Arc<TenantConfig>) -> Arc<dyn DirectoryClient> {
        Arc::new(LdapDirectory::new(config))
    }
}

/// Serves every tenant from one in-process directory.
#[derive(Clone, Default)]
pub struct MemoryConnector(pub Arc<MemoryDirectory>);

impl DirectoryConnector for MemoryConnector {
    fn connect(&self, _config: Arc<TenantConfig>) -> Arc<dyn DirectoryClient> {
        self.0.clone()
    }
}

/// Reader and writer of one tenant.
pub struct TenantStores {
    /// Reader store.
    pub reader: Arc<LdapReaderStore>,
    /// Writer store.
    pub writer: Arc<LdapWriterStore>,
}

impl TenantStores {
    /// Resolved configuration the stores run with.
    #[must_use]
    pub fn config(&self) -> &TenantConfig {
        self.reader.config()
    }
}

type TenantKey = (String, String);

/// Cache of [`TenantStores`] keyed by realm and storage name.
pub struct StoreRegistry {
    resolver: TenantResolver,
    connector: Box<dyn DirectoryConnector>,
    stores: Mutex<HashMap<TenantKey, Arc<TenantStores>>>,
}

impl StoreRegistry {
    /// Creates an empty registry.
    pub fn new(resolver: TenantResolver, connector: impl DirectoryConnector + 'static) -> Self {
        Self {
            resolver,
            connector: Box::new(connector),
            stores: Mutex::new(HashMap::new()),
        }
    }

    /// Stores of a tenant, created on first use.
    ///
    /// ## Errors
    ///
    /// Returns `StoreError::Configuration` if the realm has no such storage
    /// or its configuration doesn't resolve.
    pub fn get_or_create(&self, realm: &Realm, storage_name: &str) -> StoreResult<Arc<TenantStores>> {
        let key = (realm.name.clone(), storage_name.to_string());
        let mut stores = self.stores.lock();
        if let Some(existing) = stores.get(&key) {
            return Ok(existing.clone());
        }

        let storage = realm.user_storage(storage_name).ok_or_else(|| {
            StoreError::Configuration(format!(
                "Realm {} has no user storage named {storage_name}",
                realm.name
            ))
        })?;
        let resolved = self.resolver.resolve(realm, storage)?;
        let engine = Arc::new(resolved.engine()?);
        let config = Arc::new(resolved.config);
        let directory = self.connector.connect(config.clone());

        let reader = Arc::new(LdapReaderStore::new(config.clone(), engine.clone(), directory.clone()));
        let writer = Arc::new(LdapWriterStore::new(config, engine, directory, reader.clone()));
        let created = Arc::new(TenantStores { reader, writer });
        stores.insert(key, created.clone());

        info!(realm = %realm.name, storage = storage_name, "Tenant stores created");
        Ok(created)
    }

    /// Drops the stores of one tenant. Returns whether any were cached.
    pub fn invalidate(&self, realm: &str, storage_name: &str) -> bool {
        let removed = self
            .stores
            .lock()
            .remove(&(realm.to_string(), storage_name.to_string()))
            .is_some();
        debug!(realm, storage = storage_name, removed, "Tenant stores invalidated");
        removed
    }

    /// Drops the stores of every storage of a realm. Returns how many were cached.
    pub fn invalidate_realm(&self, realm: &str) -> usize {
        let mut stores = self.stores.lock();
        let before = stores.len();
        stores.retain(|(cached_realm, _), _| cached_realm != realm);
        let removed = before - stores.len();
        debug!(realm, removed, "Realm stores invalidated");
        removed
    }

    /// Number of cached tenants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    /// Checks if no tenant is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}
