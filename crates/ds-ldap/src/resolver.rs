//! Tenant config resolver.
//!
//! Every setting of a (realm, user storage) pair is looked up at three
//! levels, first match wins:
//!
//! 1. the user storage (its fields, then its `properties`)
//! 2. the realm (its fields, then its `properties`)
//! 3. the [`GlobalDefaults`]
//!
//! Mapping rule sets follow the same order per entity kind; an empty
//! override list counts as absent.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use ds_model::{EntityKind, Realm, UserStorage};
use tracing::debug;

use crate::config::{keys, split_list, DirectoryAttributes, GlobalDefaults, TenantConfig};
use crate::error::{ConfigError, ConfigResult, MappingResult};
use crate::mapping::{MappingEngine, MappingRuleSet};

/// Output of [`TenantResolver::resolve`].
#[derive(Debug, Clone)]
pub struct ResolvedTenant {
    /// Resolved configuration.
    pub config: TenantConfig,
    /// Active rule set per entity kind.
    pub mappings: BTreeMap<EntityKind, MappingRuleSet>,
}

impl ResolvedTenant {
    /// Builds the mapping engine of the tenant.
    pub fn engine(&self) -> MappingResult<MappingEngine> {
        MappingEngine::new(&self.config, self.mappings.clone())
    }
}

/// Resolves tenant configuration against global defaults.
#[derive(Debug, Clone, Default)]
pub struct TenantResolver {
    defaults: GlobalDefaults,
}

/// Property lookup across the three levels.
struct Levels<'a> {
    storage: &'a UserStorage,
    realm: &'a Realm,
    defaults: &'a GlobalDefaults,
}

impl<'a> Levels<'a> {
    fn get(&self, key: &str) -> Option<&str> {
        [
            &self.storage.properties,
            &self.realm.properties,
            &self.defaults.properties,
        ]
        .into_iter()
        .find_map(|props| props.get(key))
        .map(String::as_str)
        .filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str) -> String {
        self.get(key).unwrap_or_default().to_string()
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            Some(value) => value
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::invalid(key, value, e.to_string())),
            None => Ok(default),
        }
    }

    fn mapping(&self, kind: EntityKind) -> (&'static str, &'a [String]) {
        let non_empty = |rules: Option<&'a Vec<String>>| rules.filter(|r| !r.is_empty());
        if let Some(rules) = non_empty(self.storage.mappings.get(&kind)) {
            ("storage", rules)
        } else if let Some(rules) = non_empty(self.realm.mappings.get(&kind)) {
            ("realm", rules)
        } else {
            ("global", self.defaults.mappings.get(&kind).map(Vec::as_slice).unwrap_or_default())
        }
    }
}

impl TenantResolver {
    /// Creates a resolver.
    #[must_use]
    pub const fn new(defaults: GlobalDefaults) -> Self {
        Self { defaults }
    }

    /// Creates a resolver from environment defaults.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(GlobalDefaults::from_env())
    }

    /// Global defaults in use.
    #[must_use]
    pub const fn defaults(&self) -> &GlobalDefaults {
        &self.defaults
    }

    /// Resolves the configuration and rule sets of a tenant.
    ///
    /// ## Errors
    ///
    /// Fails when a required setting is missing at every level, a value
    /// can't be parsed, the URL is insecure and not allowed, or a rule set
    /// doesn't validate.
    pub fn resolve(&self, realm: &Realm, storage: &UserStorage) -> ConfigResult<ResolvedTenant> {
        let levels = Levels {
            storage,
            realm,
            defaults: &self.defaults,
        };

        let config = self.resolve_config(&levels)?;

        let mut mappings = BTreeMap::new();
        for kind in EntityKind::ALL {
            let (level, rules) = levels.mapping(kind);
            debug!(realm = %realm.name, storage = %storage.name, %kind, level, "Mapping resolved");
            let set = MappingRuleSet::parse(kind, rules).map_err(|source| ConfigError::Mapping { kind, source })?;
            mappings.insert(kind, set);
        }

        Ok(ResolvedTenant { config, mappings })
    }

    fn resolve_config(&self, levels: &Levels<'_>) -> ConfigResult<TenantConfig> {
        let realm = levels.realm;
        let storage = levels.storage;

        let host = realm
            .url
            .as_deref()
            .or_else(|| levels.get(keys::URL))
            .ok_or_else(|| ConfigError::Missing(keys::URL.to_string()))?;
        let url = if host.contains("://") {
            host.to_string()
        } else {
            let port = match realm.port {
                Some(port) => port,
                None => levels.parse(keys::PORT, 636u16)?,
            };
            format!("ldaps://{host}:{port}")
        };

        let branch = |field: &Option<String>, key: &str| {
            field
                .as_deref()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| levels.get(key))
                .map(String::from)
        };

        let mut builder = TenantConfig::builder()
            .tenant(&realm.name, &storage.name)
            .url(url)
            .bind(levels.string(keys::BIND_DN), levels.string(keys::BIND_PASSWORD))
            .pool_size(levels.parse(keys::POOL_SIZE, 10usize)?)
            .timeouts(
                Duration::from_secs(levels.parse(keys::CONNECTION_TIMEOUT, 5u64)?),
                Duration::from_secs(levels.parse(keys::OPERATION_TIMEOUT, 30u64)?),
            )
            .allow_insecure(levels.parse(keys::ALLOW_INSECURE, false)?)
            .group_patterns(
                levels.string(keys::GROUP_SOURCE_PATTERN),
                levels.string(keys::GROUP_MANAGER_SOURCE_PATTERN),
            )
            .group_filter_pattern(levels.string(keys::GROUP_FILTER_PATTERN))
            .attributes(DirectoryAttributes {
                member: levels.string(keys::MEMBER_ATTRIBUTE),
                certificate: levels.string(keys::CERTIFICATE_ATTRIBUTE),
                properties: levels.string(keys::PROPERTIES_ATTRIBUTE),
                gpg_key: levels.string(keys::GPG_KEY_ATTRIBUTE),
                password: levels.string(keys::PASSWORD_ATTRIBUTE),
                password_reset: levels.string(keys::PASSWORD_RESET_ATTRIBUTE),
                mail: levels.string(keys::MAIL_ATTRIBUTE),
            })
            .unique_emails(levels.parse(keys::UNIQUE_EMAILS, false)?)
            .paged_search(
                levels.parse(keys::PAGED_SEARCH, false)?,
                levels.parse(keys::PAGE_SIZE, 500i32)?,
            )
            .app_managed_attributes(
                levels
                    .get(keys::APP_MANAGED_ATTRIBUTE_KEYS)
                    .map(split_list)
                    .unwrap_or_default(),
            );

        if let Some(source) = branch(&storage.user_source, keys::USER_SOURCE) {
            builder = builder.user_source(source);
        }
        if let Some(source) = branch(&storage.organization_source, keys::ORGANIZATION_SOURCE) {
            builder = builder.organization_source(source);
        }
        if let Some(source) = branch(&storage.address_source, keys::ADDRESS_SOURCE) {
            builder = builder.address_source(source);
        }
        if let Some(source) = branch(&realm.app_source, keys::APP_SOURCE) {
            builder = builder.app_source(source);
        }

        for kind in EntityKind::ALL {
            if let Some(classes) = levels.get(&keys::object_classes(kind)) {
                builder = builder.object_classes(kind, split_list(classes));
            }
            if let Some(rdn) = levels.get(&keys::rdn_attribute(kind)) {
                builder = builder.rdn_attribute(kind, rdn.trim());
            }
        }

        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{realm, ADDRESSES, APPLICATIONS, USERS};

    fn resolve(realm: &Realm) -> ConfigResult<ResolvedTenant> {
        TenantResolver::default().resolve(realm, &realm.user_storages[0])
    }

    fn first_rule(resolved: &ResolvedTenant, kind: EntityKind) -> String {
        resolved.mappings[&kind].iter().next().unwrap().to_string()
    }

    #[test]
    fn resolves_branches_and_defaults() {
        let resolved = resolve(&realm()).unwrap();
        let config = resolved.config;

        assert_eq!(config.realm, "domaine1");
        assert_eq!(config.user_storage, "default");
        assert_eq!(config.url, "ldap://localhost:10389");
        assert_eq!(config.user_source, USERS);
        assert_eq!(config.address_source.as_deref(), Some(ADDRESSES));
        assert_eq!(config.app_source, APPLICATIONS);
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.attributes.member, "uniqueMember");
        assert_eq!(config.rdn_attribute(EntityKind::Address), "l");
        assert_eq!(config.object_classes(EntityKind::Group), vec!["top", "groupOfUniqueNames"]);
    }

    #[test]
    fn host_without_scheme_becomes_ldaps() {
        let mut realm = realm();
        realm.url = Some("ldap.insee.fr".into());
        realm.port = None;

        let config = resolve(&realm).unwrap().config;
        assert_eq!(config.url, "ldaps://ldap.insee.fr:636");

        realm.port = Some(1636);
        assert_eq!(resolve(&realm).unwrap().config.url, "ldaps://ldap.insee.fr:1636");
    }

    #[test]
    fn insecure_url_needs_explicit_allowance() {
        let mut realm = realm();
        realm.properties.remove(keys::ALLOW_INSECURE);

        assert_eq!(resolve(&realm).unwrap_err(), ConfigError::InsecureProtocol);
    }

    #[test]
    fn storage_overrides_realm_overrides_global() {
        let mut realm = realm().with_property(keys::POOL_SIZE, "4").with_property(keys::UNIQUE_EMAILS, "true");
        realm.user_storages[0] = realm.user_storages[0].clone().with_property(keys::POOL_SIZE, "2");

        let config = resolve(&realm).unwrap().config;

        assert_eq!(config.pool_size, 2);
        assert!(config.unique_emails);
        assert!(!config.paged_search);
    }

    #[test]
    fn invalid_values_are_reported() {
        let realm = realm().with_property(keys::POOL_SIZE, "many");

        let err = resolve(&realm).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref key, .. } if key == keys::POOL_SIZE));
    }

    #[test]
    fn missing_user_source_fails() {
        let mut realm = realm();
        realm.user_storages[0].user_source = None;

        assert_eq!(
            resolve(&realm).unwrap_err(),
            ConfigError::Missing("user_source".into())
        );
    }

    #[test]
    fn mapping_fallback() {
        let global = resolve(&realm()).unwrap();
        assert_eq!(first_rule(&global, EntityKind::User), "username:uid,Text,rw");

        let realm_level = realm().with_mapping(EntityKind::User, vec!["username:cn".into()]);
        let resolved = resolve(&realm_level).unwrap();
        assert_eq!(first_rule(&resolved, EntityKind::User), "username:cn,Text,rw");
        assert_eq!(resolved.mappings[&EntityKind::Group], global.mappings[&EntityKind::Group]);

        let mut storage_level = realm_level.clone();
        storage_level.user_storages[0] = storage_level.user_storages[0]
            .clone()
            .with_mapping(EntityKind::User, vec!["username:employeeNumber".into()]);
        let resolved = resolve(&storage_level).unwrap();
        assert_eq!(first_rule(&resolved, EntityKind::User), "username:employeeNumber,Text,rw");
    }

    #[test]
    fn empty_override_falls_through() {
        let realm = realm().with_mapping(EntityKind::Group, Vec::new());

        let resolved = resolve(&realm).unwrap();
        assert_eq!(resolved.mappings[&EntityKind::Group].len(), 3);
    }

    #[test]
    fn invalid_mapping_is_a_configuration_error() {
        let realm = realm().with_mapping(EntityKind::Group, vec!["colour:cn".into()]);

        let err = resolve(&realm).unwrap_err();
        assert!(matches!(err, ConfigError::Mapping { kind: EntityKind::Group, .. }));
    }

    #[test]
    fn engine_is_built_from_resolution() {
        let resolved = resolve(&realm()).unwrap();
        let engine = resolved.engine().unwrap();

        assert_eq!(engine.attribute_for(EntityKind::User, "mail"), Some("mail"));
    }
}
