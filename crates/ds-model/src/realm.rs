//! Tenant definitions.
//!
//! A realm is the top-level tenant. It owns one or more user storages and
//! the application branch shared by all of them. Both carry free-form
//! properties and optional mapping overrides; the directory layer resolves
//! them against global defaults.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::kind::EntityKind;

/// Per-kind mapping overrides, each rule in its textual form.
pub type MappingOverrides = BTreeMap<EntityKind, Vec<String>>;

/// A sub-tenant of a realm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStorage {
    /// Storage name, unique within the realm.
    pub name: String,
    /// Branch holding the users of this storage.
    pub user_source: Option<String>,
    /// Branch holding the organizations of this storage.
    pub organization_source: Option<String>,
    /// Branch holding the address sub-entries of this storage.
    pub address_source: Option<String>,
    /// Free-form configuration overrides.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Mapping overrides.
    #[serde(default)]
    pub mappings: MappingOverrides,
}

impl UserStorage {
    /// Creates a storage with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the user, organization and address branches.
    #[must_use]
    pub fn with_sources(
        mut self,
        user_source: impl Into<String>,
        organization_source: impl Into<String>,
        address_source: impl Into<String>,
    ) -> Self {
        self.user_source = Some(user_source.into());
        self.organization_source = Some(organization_source.into());
        self.address_source = Some(address_source.into());
        self
    }

    /// Sets a configuration property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the mapping override for one entity kind.
    #[must_use]
    pub fn with_mapping(mut self, kind: EntityKind, rules: Vec<String>) -> Self {
        self.mappings.insert(kind, rules);
        self
    }
}

/// A top-level tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Realm {
    // === Identity ===
    /// Realm name.
    pub name: String,

    // === Directory ===
    /// Directory server host or URL.
    pub url: Option<String>,
    /// Directory server port.
    pub port: Option<u16>,
    /// Branch holding the applications of the realm.
    pub app_source: Option<String>,

    // === Tenants ===
    /// User storages of the realm.
    #[serde(default)]
    pub user_storages: Vec<UserStorage>,

    // === Overrides ===
    /// Free-form configuration overrides.
    #[serde(default)]
    pub properties: HashMap<String, String>,
    /// Mapping overrides.
    #[serde(default)]
    pub mappings: MappingOverrides,
}

impl Realm {
    /// Creates a realm with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Sets the directory server.
    #[must_use]
    pub fn with_server(mut self, url: impl Into<String>, port: u16) -> Self {
        self.url = Some(url.into());
        self.port = Some(port);
        self
    }

    /// Sets the application branch.
    #[must_use]
    pub fn with_app_source(mut self, app_source: impl Into<String>) -> Self {
        self.app_source = Some(app_source.into());
        self
    }

    /// Adds a user storage.
    #[must_use]
    pub fn with_user_storage(mut self, storage: UserStorage) -> Self {
        self.user_storages.push(storage);
        self
    }

    /// Sets a configuration property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the mapping override for one entity kind.
    #[must_use]
    pub fn with_mapping(mut self, kind: EntityKind, rules: Vec<String>) -> Self {
        self.mappings.insert(kind, rules);
        self
    }

    /// Finds a user storage by name (case-insensitive).
    #[must_use]
    pub fn user_storage(&self, name: &str) -> Option<&UserStorage> {
        self.user_storages
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}
