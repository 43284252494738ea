//! Common test utilities and fixtures.

use std::sync::Arc;

use ds_ldap::{GlobalDefaults, MemoryConnector, MemoryDirectory, StoreRegistry, TenantResolver, TenantStores};
use ds_model::{ProviderRequest, Realm, UserStorage};
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};

pub const REALM: &str = "domaine1";
pub const USERS: &str = "ou=contacts,ou=clients_domaine1,o=insee,c=fr";
pub const ORGANIZATIONS: &str = "ou=organisations,ou=clients_domaine1,o=insee,c=fr";
pub const ADDRESSES: &str = "ou=adresses,ou=clients_domaine1,o=insee,c=fr";
pub const APPLICATIONS: &str = "ou=Applications,o=insee,c=fr";
pub const PARTNERS: &str = "ou=contacts,ou=partenaires,o=insee,c=fr";

/// Test environment over one in-process directory.
pub struct TestEnv {
    /// Shared directory tree.
    pub directory: Arc<MemoryDirectory>,
    /// Registry resolving tenant stores.
    pub registry: StoreRegistry,
    /// Realm under test.
    pub realm: Realm,
}

impl TestEnv {
    /// Creates an environment with the default realm.
    pub fn new() -> Self {
        Self::with_realm(realm())
    }

    /// Creates an environment with a custom realm.
    pub fn with_realm(realm: Realm) -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter("ds_ldap=debug")
            .with_test_writer()
            .try_init();

        let directory = Arc::new(MemoryDirectory::new());
        for branch in [USERS, ORGANIZATIONS, ADDRESSES, APPLICATIONS, PARTNERS] {
            directory.ensure_branch(branch);
        }
        let registry = StoreRegistry::new(
            TenantResolver::new(GlobalDefaults::default()),
            MemoryConnector(directory.clone()),
        );
        Self {
            directory,
            registry,
            realm,
        }
    }

    /// Stores of the `default` storage.
    pub fn stores(&self) -> anyhow::Result<Arc<TenantStores>> {
        self.storage("default")
    }

    /// Stores of a named storage.
    pub fn storage(&self, name: &str) -> anyhow::Result<Arc<TenantStores>> {
        Ok(self.registry.get_or_create(&self.realm, name)?)
    }
}

/// Realm with a `default` storage and a `partners` storage sharing
/// organizations and addresses.
pub fn realm() -> Realm {
    Realm::new(REALM)
        .with_server("ldap://localhost:10389", 10389)
        .with_app_source(APPLICATIONS)
        .with_property("allow_insecure", "true")
        .with_user_storage(UserStorage::new("default").with_sources(USERS, ORGANIZATIONS, ADDRESSES))
        .with_user_storage(UserStorage::new("partners").with_sources(PARTNERS, ORGANIZATIONS, ADDRESSES))
}

/// Request carrying a correlation id.
pub fn request() -> ProviderRequest {
    ProviderRequest::new().with_correlation_id("it-1").with_requester("integration")
}

/// Self-signed DER certificate.
pub fn certificate(common_name: &str, to_year: i32) -> anyhow::Result<Vec<u8>> {
    let key = KeyPair::generate()?;
    let mut params = CertificateParams::new(vec![format!("{}.example.org", common_name.replace(' ', "-"))])?;
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, common_name);
    params.distinguished_name = dn;
    params.not_before = rcgen::date_time_ymd(2020, 1, 1);
    params.not_after = rcgen::date_time_ymd(to_year, 1, 1);
    Ok(params.self_signed(&key)?.der().to_vec())
}
