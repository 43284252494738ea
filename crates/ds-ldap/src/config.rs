//! Tenant configuration.
//!
//! [`GlobalDefaults`] holds the process-wide defaults, loaded from the
//! environment. [`TenantConfig`] is the resolved, immutable view of one
//! (realm, user storage) pair, built by [`crate::resolver::TenantResolver`].
//!
//! ## Security Requirements
//!
//! Connection URLs must use `ldaps://`. Plain `ldap://` is rejected unless
//! the tenant explicitly sets `allow_insecure`.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use ds_model::EntityKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

/// Property keys understood at storage, realm and global level.
pub mod keys {
    /// Server host or URL, when the realm doesn't name one.
    pub const URL: &str = "url";
    /// User branch, when the storage doesn't name one.
    pub const USER_SOURCE: &str = "user_source";
    /// Organization branch, when the storage doesn't name one.
    pub const ORGANIZATION_SOURCE: &str = "organization_source";
    /// Address branch, when the storage doesn't name one.
    pub const ADDRESS_SOURCE: &str = "address_source";
    /// Application branch, when the realm doesn't name one.
    pub const APP_SOURCE: &str = "app_source";
    /// Bind DN of the service account.
    pub const BIND_DN: &str = "bind_dn";
    /// Bind password of the service account.
    pub const BIND_PASSWORD: &str = "bind_password";
    /// Default server port.
    pub const PORT: &str = "port";
    /// Maximum pooled connections.
    pub const POOL_SIZE: &str = "pool_size";
    /// Connection timeout in seconds.
    pub const CONNECTION_TIMEOUT: &str = "connection_timeout_secs";
    /// Per-operation timeout in seconds.
    pub const OPERATION_TIMEOUT: &str = "operation_timeout_secs";
    /// Accept `ldap://` URLs.
    pub const ALLOW_INSECURE: &str = "allow_insecure";
    /// Group container pattern.
    pub const GROUP_SOURCE_PATTERN: &str = "group_source_pattern";
    /// Manager group pattern.
    pub const GROUP_MANAGER_SOURCE_PATTERN: &str = "group_manager_source_pattern";
    /// Group name wildcard pattern.
    pub const GROUP_FILTER_PATTERN: &str = "group_filter_pattern";
    /// Reject duplicate user emails.
    pub const UNIQUE_EMAILS: &str = "unique_emails";
    /// Use the simple-paged-results control.
    pub const PAGED_SEARCH: &str = "paged_search";
    /// Page size for paged searches.
    pub const PAGE_SIZE: &str = "page_size";
    /// Comma-separated attributes applications may manage on users.
    pub const APP_MANAGED_ATTRIBUTE_KEYS: &str = "app_managed_attribute_keys";
    /// Group membership attribute.
    pub const MEMBER_ATTRIBUTE: &str = "member_attribute";
    /// Certificate attribute.
    pub const CERTIFICATE_ATTRIBUTE: &str = "certificate_attribute";
    /// Multi-valued properties attribute.
    pub const PROPERTIES_ATTRIBUTE: &str = "properties_attribute";
    /// GPG key attribute.
    pub const GPG_KEY_ATTRIBUTE: &str = "gpg_key_attribute";
    /// Password attribute.
    pub const PASSWORD_ATTRIBUTE: &str = "password_attribute";
    /// Password-reset flag attribute.
    pub const PASSWORD_RESET_ATTRIBUTE: &str = "password_reset_attribute";
    /// Email attribute.
    pub const MAIL_ATTRIBUTE: &str = "mail_attribute";

    /// `<kind>_object_classes`, comma-separated.
    #[must_use]
    pub fn object_classes(kind: ds_model::EntityKind) -> String {
        format!("{kind}_object_classes")
    }

    /// `<kind>_rdn_attribute`.
    #[must_use]
    pub fn rdn_attribute(kind: ds_model::EntityKind) -> String {
        format!("{kind}_rdn_attribute")
    }
}

/// Prefix of the certificate correlation id in the properties attribute.
pub const CERTIFICATE_ID_MARKER: &str = "certificateId$";

// ============================================================================
// Global Defaults
// ============================================================================

/// Process-wide defaults, the last level of the configuration fallback.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalDefaults {
    /// Remaining property defaults, keyed as in [`keys`].
    pub properties: HashMap<String, String>,
    /// Default mapping rules per entity kind, in textual form.
    pub mappings: BTreeMap<EntityKind, Vec<String>>,
}

impl Default for GlobalDefaults {
    fn default() -> Self {
        let mut properties: HashMap<String, String> = [
            (keys::PORT, "636"),
            (keys::POOL_SIZE, "10"),
            (keys::CONNECTION_TIMEOUT, "5"),
            (keys::OPERATION_TIMEOUT, "30"),
            (keys::ALLOW_INSECURE, "false"),
            (keys::GROUP_SOURCE_PATTERN, "ou={app}_Objets,ou={app},{app_source}"),
            (
                keys::GROUP_MANAGER_SOURCE_PATTERN,
                "cn=Gestionnaires_{app},ou={app},{app_source}",
            ),
            (keys::GROUP_FILTER_PATTERN, "*_{app}"),
            (keys::UNIQUE_EMAILS, "false"),
            (keys::PAGED_SEARCH, "false"),
            (keys::PAGE_SIZE, "500"),
            (keys::MEMBER_ATTRIBUTE, "uniqueMember"),
            (keys::CERTIFICATE_ATTRIBUTE, "userCertificate;binary"),
            (keys::PROPERTIES_ATTRIBUTE, "inseePropriete"),
            (keys::GPG_KEY_ATTRIBUTE, "inseeClefChiffrement"),
            (keys::PASSWORD_ATTRIBUTE, "userPassword"),
            (keys::PASSWORD_RESET_ATTRIBUTE, "pwdReset"),
            (keys::MAIL_ATTRIBUTE, "mail"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        for (kind, classes, rdn) in [
            (EntityKind::User, "top,person,inetOrgPerson", "uid"),
            (EntityKind::Organization, "top,organization", "uid"),
            (EntityKind::Group, "top,groupOfUniqueNames", "cn"),
            (EntityKind::Application, "top,organizationalUnit", "ou"),
            (EntityKind::Address, "top,locality", "l"),
        ] {
            properties.insert(keys::object_classes(kind), classes.to_string());
            properties.insert(keys::rdn_attribute(kind), rdn.to_string());
        }

        Self {
            properties,
            mappings: default_mappings(),
        }
    }
}

fn default_mappings() -> BTreeMap<EntityKind, Vec<String>> {
    let rules = |rules: &[&str]| rules.iter().map(|r| (*r).to_string()).collect::<Vec<_>>();
    BTreeMap::from([
        (
            EntityKind::User,
            rules(&[
                "username:uid,Text,rw",
                "last_name:sn,Text,rw",
                "first_name:givenName,Text,rw",
                "mail:mail,Text,rw",
                "habilitations:inseeGroupeDefaut,TextList,rw",
                "address:inseeAdressePostaleDN,AddressRef,rw",
                "organization:inseeOrganisationDN,OrganizationRef,rw",
                "password_reset:pwdReset,Flag,ro",
                "certificate:userCertificate;binary,Binary,ro",
                "attributes.common_name:cn,Text,rw",
                "attributes.description:description,Text,rw",
                "attributes.properties:inseePropriete,TextList,rw",
            ]),
        ),
        (
            EntityKind::Organization,
            rules(&[
                "identifier:uid,Text,rw",
                "address:inseeAdressePostaleDN,AddressRef,rw",
                "organization:inseeOrganisationDN,OrganizationRef,rw",
                "gpg_key:inseeClefChiffrement,Binary,ro",
                "attributes.description:description,Text,rw",
                "attributes.mail:mail,Text,rw",
            ]),
        ),
        (
            EntityKind::Group,
            rules(&[
                "name:cn,Text,rw",
                "description:description,Text,rw",
                "members:uniqueMember,MemberRefs,rw",
            ]),
        ),
        (
            EntityKind::Application,
            rules(&["name:ou,Text,rw", "attributes.description:description,Text,rw"]),
        ),
        (
            EntityKind::Address,
            rules(&["id:l,Text,rw", "lines:postalAddress,Joined,rw"]),
        ),
    ])
}

impl GlobalDefaults {
    /// Loads defaults from the environment.
    ///
    /// Every key of [`keys`] can be set as `DS_<KEY>` (upper case), and
    /// every default mapping as `DS_<KIND>_MAPPING` with rules separated
    /// by `|` (attribute options such as `;binary` use `;`). Unset variables keep the built-in value.
    #[must_use]
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), "Loaded .env file"),
            Err(e) => debug!(error = %e, "No .env file loaded"),
        }

        let mut defaults = Self::default();

        let known: Vec<String> = defaults.properties.keys().cloned().chain(
            [
                keys::URL,
                keys::BIND_DN,
                keys::BIND_PASSWORD,
                keys::APP_SOURCE,
                keys::APP_MANAGED_ATTRIBUTE_KEYS,
            ]
                .into_iter()
                .map(String::from),
        )
        .collect();
        for key in known {
            if let Ok(value) = std::env::var(format!("DS_{}", key.to_uppercase())) {
                defaults.properties.insert(key, value);
            }
        }

        for kind in EntityKind::ALL {
            let var = format!("DS_{}_MAPPING", kind.as_str().to_uppercase());
            if let Ok(value) = std::env::var(&var) {
                let rules: Vec<String> = value
                    .split('|')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from)
                    .collect();
                if !rules.is_empty() {
                    defaults.mappings.insert(kind, rules);
                }
            }
        }

        defaults
    }

    /// Sets a default property.
    #[must_use]
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Gets a default property.
    #[must_use]
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

// ============================================================================
// Tenant Configuration
// ============================================================================

/// Names of the attributes the writer touches directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryAttributes {
    /// Group membership attribute.
    pub member: String,
    /// Certificate attribute.
    pub certificate: String,
    /// Multi-valued properties attribute.
    pub properties: String,
    /// GPG key attribute.
    pub gpg_key: String,
    /// Password attribute.
    pub password: String,
    /// Password-reset flag attribute.
    pub password_reset: String,
    /// Email attribute.
    pub mail: String,
}

impl Default for DirectoryAttributes {
    fn default() -> Self {
        Self {
            member: "uniqueMember".to_string(),
            certificate: "userCertificate;binary".to_string(),
            properties: "inseePropriete".to_string(),
            gpg_key: "inseeClefChiffrement".to_string(),
            password: "userPassword".to_string(),
            password_reset: "pwdReset".to_string(),
            mail: "mail".to_string(),
        }
    }
}

/// Resolved configuration of one (realm, user storage) pair.
///
/// Built once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    // === Identity ===
    /// Realm name.
    pub realm: String,
    /// User storage name.
    pub user_storage: String,

    // === Connection ===
    /// Server URL.
    pub url: String,
    /// Bind DN for the service account.
    pub bind_dn: String,
    /// Bind password.
    #[serde(skip_serializing, default)]
    pub bind_password: String,
    /// Maximum pooled connections.
    pub pool_size: usize,
    /// Connection timeout.
    pub connection_timeout: Duration,
    /// Per-operation timeout.
    pub operation_timeout: Duration,

    // === Branches ===
    /// Branch holding users.
    pub user_source: String,
    /// Branch holding organizations.
    pub organization_source: Option<String>,
    /// Branch holding addresses.
    pub address_source: Option<String>,
    /// Branch holding applications.
    pub app_source: String,
    /// Group container pattern (`{app}`, `{app_source}` placeholders).
    pub group_source_pattern: String,
    /// Manager group pattern (`{app}`, `{app_source}` placeholders).
    pub group_manager_source_pattern: String,
    /// Group name pattern (`*` wildcard, `{app}` placeholder).
    pub group_filter_pattern: String,

    // === Schema ===
    /// Object classes per entity kind.
    pub object_classes: BTreeMap<EntityKind, Vec<String>>,
    /// RDN attribute per entity kind.
    pub rdn_attributes: BTreeMap<EntityKind, String>,
    /// Attributes written outside mapping rules.
    pub attributes: DirectoryAttributes,

    // === Features ===
    /// Reject duplicate user emails.
    pub unique_emails: bool,
    /// Use the simple-paged-results control.
    pub paged_search: bool,
    /// Page size for paged searches.
    pub page_size: i32,
    /// Attributes applications may manage on users; empty allows any.
    pub app_managed_attributes: Vec<String>,
}

impl TenantConfig {
    /// Creates a new configuration builder.
    #[must_use]
    pub fn builder() -> TenantConfigBuilder {
        TenantConfigBuilder::new()
    }

    /// Object classes of an entity kind.
    #[must_use]
    pub fn object_classes(&self, kind: EntityKind) -> &[String] {
        self.object_classes
            .get(&kind)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// RDN attribute of an entity kind.
    #[must_use]
    pub fn rdn_attribute(&self, kind: EntityKind) -> &str {
        self.rdn_attributes
            .get(&kind)
            .map(String::as_str)
            .unwrap_or_else(|| default_rdn(kind))
    }

    /// Whether applications may manage `attribute` on users.
    #[must_use]
    pub fn allows_app_managed_attribute(&self, attribute: &str) -> bool {
        self.app_managed_attributes.is_empty()
            || self
                .app_managed_attributes
                .iter()
                .any(|a| a.eq_ignore_ascii_case(attribute))
    }

    /// Validates the configuration.
    ///
    /// ## Security
    ///
    /// This method enforces LDAPS-only connections unless
    /// `allow_insecure` is set.
    pub fn validate(&self, allow_insecure: bool) -> ConfigResult<()> {
        validate_url(&self.url, allow_insecure)?;

        if self.user_source.is_empty() {
            return Err(ConfigError::Missing("user_source".to_string()));
        }
        if self.app_source.is_empty() {
            return Err(ConfigError::Missing("app_source".to_string()));
        }
        if self.pool_size == 0 {
            return Err(ConfigError::invalid(keys::POOL_SIZE, "0", "must be at least 1"));
        }
        if !self.group_source_pattern.contains("{app}") {
            return Err(ConfigError::invalid(
                keys::GROUP_SOURCE_PATTERN,
                &self.group_source_pattern,
                "must contain {app}",
            ));
        }
        if !self.group_manager_source_pattern.contains("{app}") {
            return Err(ConfigError::invalid(
                keys::GROUP_MANAGER_SOURCE_PATTERN,
                &self.group_manager_source_pattern,
                "must contain {app}",
            ));
        }
        for kind in EntityKind::ALL {
            if self.object_classes(kind).is_empty() {
                return Err(ConfigError::Missing(keys::object_classes(kind)));
            }
        }
        Ok(())
    }
}

/// Built-in RDN attribute of an entity kind.
#[must_use]
pub const fn default_rdn(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::User | EntityKind::Organization => "uid",
        EntityKind::Group => "cn",
        EntityKind::Application => "ou",
        EntityKind::Address => "l",
    }
}

/// Validates that a URL uses LDAPS.
fn validate_url(url: &str, allow_insecure: bool) -> ConfigResult<()> {
    let url_lower = url.to_lowercase();

    let rest = if let Some(rest) = url_lower.strip_prefix("ldaps://") {
        rest
    } else if let Some(rest) = url_lower.strip_prefix("ldap://") {
        if !allow_insecure {
            return Err(ConfigError::InsecureProtocol);
        }
        rest
    } else {
        return Err(ConfigError::InsecureProtocol);
    };

    if rest.is_empty() {
        return Err(ConfigError::invalid("url", url, "missing host"));
    }
    Ok(())
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for tenant configuration.
#[derive(Debug, Default)]
pub struct TenantConfigBuilder {
    realm: Option<String>,
    user_storage: Option<String>,
    url: Option<String>,
    bind_dn: String,
    bind_password: String,
    pool_size: usize,
    connection_timeout: Duration,
    operation_timeout: Duration,
    allow_insecure: bool,
    user_source: Option<String>,
    organization_source: Option<String>,
    address_source: Option<String>,
    app_source: Option<String>,
    group_source_pattern: String,
    group_manager_source_pattern: String,
    group_filter_pattern: String,
    object_classes: BTreeMap<EntityKind, Vec<String>>,
    rdn_attributes: BTreeMap<EntityKind, String>,
    attributes: DirectoryAttributes,
    unique_emails: bool,
    paged_search: bool,
    page_size: i32,
    app_managed_attributes: Vec<String>,
}

impl TenantConfigBuilder {
    /// Creates a new builder with defaults.
    #[must_use]
    pub fn new() -> Self {
        let defaults = GlobalDefaults::default();
        let split = |key: &str| -> Vec<String> {
            defaults
                .property(key)
                .map(split_list)
                .unwrap_or_default()
        };
        Self {
            pool_size: 10,
            connection_timeout: Duration::from_secs(5),
            operation_timeout: Duration::from_secs(30),
            group_source_pattern: defaults
                .property(keys::GROUP_SOURCE_PATTERN)
                .unwrap_or_default()
                .to_string(),
            group_manager_source_pattern: defaults
                .property(keys::GROUP_MANAGER_SOURCE_PATTERN)
                .unwrap_or_default()
                .to_string(),
            group_filter_pattern: defaults
                .property(keys::GROUP_FILTER_PATTERN)
                .unwrap_or_default()
                .to_string(),
            object_classes: EntityKind::ALL
                .into_iter()
                .map(|kind| (kind, split(&keys::object_classes(kind))))
                .collect(),
            rdn_attributes: EntityKind::ALL
                .into_iter()
                .map(|kind| (kind, default_rdn(kind).to_string()))
                .collect(),
            page_size: 500,
            ..Default::default()
        }
    }

    /// Sets the realm and user storage names.
    #[must_use]
    pub fn tenant(mut self, realm: impl Into<String>, user_storage: impl Into<String>) -> Self {
        self.realm = Some(realm.into());
        self.user_storage = Some(user_storage.into());
        self
    }

    /// Sets the connection URL.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the service account credentials.
    #[must_use]
    pub fn bind(mut self, dn: impl Into<String>, password: impl Into<String>) -> Self {
        self.bind_dn = dn.into();
        self.bind_password = password.into();
        self
    }

    /// Sets the pool size.
    #[must_use]
    pub const fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Sets the connection and operation timeouts.
    #[must_use]
    pub const fn timeouts(mut self, connection: Duration, operation: Duration) -> Self {
        self.connection_timeout = connection;
        self.operation_timeout = operation;
        self
    }

    /// Accepts `ldap://` URLs.
    #[must_use]
    pub const fn allow_insecure(mut self, allow: bool) -> Self {
        self.allow_insecure = allow;
        self
    }

    /// Sets the user branch.
    #[must_use]
    pub fn user_source(mut self, dn: impl Into<String>) -> Self {
        self.user_source = Some(dn.into());
        self
    }

    /// Sets the organization branch.
    #[must_use]
    pub fn organization_source(mut self, dn: impl Into<String>) -> Self {
        self.organization_source = Some(dn.into());
        self
    }

    /// Sets the address branch.
    #[must_use]
    pub fn address_source(mut self, dn: impl Into<String>) -> Self {
        self.address_source = Some(dn.into());
        self
    }

    /// Sets the application branch.
    #[must_use]
    pub fn app_source(mut self, dn: impl Into<String>) -> Self {
        self.app_source = Some(dn.into());
        self
    }

    /// Sets the group container and manager group patterns.
    #[must_use]
    pub fn group_patterns(
        mut self,
        source: impl Into<String>,
        manager: impl Into<String>,
    ) -> Self {
        self.group_source_pattern = source.into();
        self.group_manager_source_pattern = manager.into();
        self
    }

    /// Sets the group name pattern.
    #[must_use]
    pub fn group_filter_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.group_filter_pattern = pattern.into();
        self
    }

    /// Sets the object classes of an entity kind.
    #[must_use]
    pub fn object_classes(mut self, kind: EntityKind, classes: Vec<String>) -> Self {
        self.object_classes.insert(kind, classes);
        self
    }

    /// Sets the RDN attribute of an entity kind.
    #[must_use]
    pub fn rdn_attribute(mut self, kind: EntityKind, attribute: impl Into<String>) -> Self {
        self.rdn_attributes.insert(kind, attribute.into());
        self
    }

    /// Sets the attributes written outside mapping rules.
    #[must_use]
    pub fn attributes(mut self, attributes: DirectoryAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Enables unique email enforcement.
    #[must_use]
    pub const fn unique_emails(mut self, enabled: bool) -> Self {
        self.unique_emails = enabled;
        self
    }

    /// Enables paged searches with the given page size.
    #[must_use]
    pub const fn paged_search(mut self, enabled: bool, page_size: i32) -> Self {
        self.paged_search = enabled;
        self.page_size = page_size;
        self
    }

    /// Restricts the attributes applications may manage.
    #[must_use]
    pub fn app_managed_attributes(mut self, attributes: Vec<String>) -> Self {
        self.app_managed_attributes = attributes;
        self
    }

    /// Builds and validates the configuration.
    ///
    /// ## Errors
    ///
    /// Returns an error if:
    /// - Required fields are missing
    /// - The URL does not use LDAPS and insecure URLs aren't allowed
    pub fn build(self) -> ConfigResult<TenantConfig> {
        let config = TenantConfig {
            realm: self
                .realm
                .ok_or_else(|| ConfigError::Missing("realm".to_string()))?,
            user_storage: self
                .user_storage
                .ok_or_else(|| ConfigError::Missing("user_storage".to_string()))?,
            url: self
                .url
                .ok_or_else(|| ConfigError::Missing("url".to_string()))?,
            bind_dn: self.bind_dn,
            bind_password: self.bind_password,
            pool_size: self.pool_size,
            connection_timeout: self.connection_timeout,
            operation_timeout: self.operation_timeout,
            user_source: self
                .user_source
                .ok_or_else(|| ConfigError::Missing("user_source".to_string()))?,
            organization_source: self.organization_source,
            address_source: self.address_source,
            app_source: self
                .app_source
                .ok_or_else(|| ConfigError::Missing("app_source".to_string()))?,
            group_source_pattern: self.group_source_pattern,
            group_manager_source_pattern: self.group_manager_source_pattern,
            group_filter_pattern: self.group_filter_pattern,
            object_classes: self.object_classes,
            rdn_attributes: self.rdn_attributes,
            attributes: self.attributes,
            unique_emails: self.unique_emails,
            paged_search: self.paged_search,
            page_size: self.page_size,
            app_managed_attributes: self.app_managed_attributes,
        };

        // Validate configuration (includes LDAPS check)
        config.validate(self.allow_insecure)?;

        Ok(config)
    }
}

/// Splits a comma-separated list, dropping blanks.
#[must_use]
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
