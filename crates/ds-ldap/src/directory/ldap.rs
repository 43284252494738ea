//! ldap3-backed directory client.
//!
//! ## Security Requirements
//!
//! Connections use LDAPS (TLS from connection start) unless the tenant
//! explicitly allows plain LDAP. STARTTLS is NOT supported to prevent
//! downgrade attacks.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ldap3::adapters::{Adapter, EntriesOnly, PagedResults};
use ldap3::exop::PasswordModify;
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, SearchEntry, SearchOptions};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument, warn};

use super::{result_code, Attribute, DirectoryClient, DirectoryEntry, Modification, SearchRequest, SearchScope};
use crate::config::TenantConfig;
use crate::error::{DirectoryError, DirectoryResult};
use crate::filter::Filter;
use crate::naming;

/// Bounded pool of bound connections.
///
/// At most `pool_size` connections are in use at once; idle connections
/// are reused, broken ones are dropped and replaced on demand.
pub struct LdapConnectionPool {
    config: Arc<TenantConfig>,
    semaphore: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<Ldap>>>,
}

impl LdapConnectionPool {
    /// Creates a pool. No connection is opened until first use.
    ///
    /// ## Security
    ///
    /// The URL scheme is validated when the configuration is built.
    #[must_use]
    pub fn new(config: Arc<TenantConfig>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.pool_size)),
            idle: Arc::new(Mutex::new(Vec::with_capacity(config.pool_size))),
            config,
        }
    }

    /// Gets a connection, waiting while the pool is at capacity.
    pub async fn get(&self) -> DirectoryResult<LdapConnection> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| DirectoryError::PoolExhausted)?;

        let reused = self.idle.lock().pop();
        let ldap = match reused {
            Some(ldap) => ldap,
            None => self.create_connection().await?,
        };

        Ok(LdapConnection {
            ldap: Some(ldap),
            idle: Arc::clone(&self.idle),
            _permit: permit,
        })
    }

    /// Opens and binds a new connection.
    async fn create_connection(&self) -> DirectoryResult<Ldap> {
        let settings = LdapConnSettings::new().set_conn_timeout(self.config.connection_timeout);

        let (conn, mut ldap) = LdapConnAsync::with_settings(settings, &self.config.url)
            .await
            .map_err(|e| DirectoryError::connection(e.to_string()))?;

        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!(error = %e, "LDAP connection driver error");
            }
        });

        ldap.simple_bind(&self.config.bind_dn, &self.config.bind_password)
            .await
            .map_err(|e| DirectoryError::Bind(e.to_string()))?
            .success()
            .map_err(|e| DirectoryError::Bind(format!("Bind failed: {e}")))?;

        debug!(url = %self.config.url, realm = %self.config.realm, "LDAP connection established");
        Ok(ldap)
    }

    /// Number of idle connections.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// Tenant configuration.
    #[must_use]
    pub fn config(&self) -> &TenantConfig {
        &self.config
    }
}

/// A connection taken from the pool.
///
/// When dropped, the connection goes back to the pool unless it was
/// discarded.
pub struct LdapConnection {
    ldap: Option<Ldap>,
    idle: Arc<Mutex<Vec<Ldap>>>,
    _permit: OwnedSemaphorePermit,
}

impl LdapConnection {
    /// The underlying connection.
    pub fn ldap_mut(&mut self) -> DirectoryResult<&mut Ldap> {
        self.ldap
            .as_mut()
            .ok_or_else(|| DirectoryError::connection("connection discarded"))
    }

    /// Drops the connection instead of returning it to the pool.
    pub fn discard(&mut self) {
        self.ldap = None;
    }

    /// Converts a client result, discarding the connection on failure.
    fn outcome<T>(&mut self, result: Result<T, LdapError>) -> DirectoryResult<T> {
        result.map_err(|e| {
            self.discard();
            match e {
                LdapError::Timeout { .. } => DirectoryError::Timeout,
                other => DirectoryError::from(other),
            }
        })
    }
}

impl Drop for LdapConnection {
    fn drop(&mut self) {
        if let Some(ldap) = self.ldap.take() {
            self.idle.lock().push(ldap);
        }
    }
}

/// Directory client over an [`LdapConnectionPool`].
pub struct LdapDirectory {
    pool: LdapConnectionPool,
    operation_timeout: Duration,
    paged_search: bool,
    page_size: i32,
}

impl LdapDirectory {
    /// Creates a client for a tenant.
    #[must_use]
    pub fn new(config: Arc<TenantConfig>) -> Self {
        Self {
            operation_timeout: config.operation_timeout,
            paged_search: config.paged_search,
            page_size: config.page_size,
            pool: LdapConnectionPool::new(config),
        }
    }

    /// Checks connectivity with a base search of the user branch.
    pub async fn test_connection(&self) -> DirectoryResult<()> {
        let base = self.pool.config().user_source.clone();
        self.search(&SearchRequest::base(base)).await.map(|_| ())
    }

    /// The connection pool.
    #[must_use]
    pub const fn pool(&self) -> &LdapConnectionPool {
        &self.pool
    }

    async fn search_paged(
        &self,
        conn: &mut LdapConnection,
        request: &SearchRequest,
        filter: &str,
    ) -> DirectoryResult<Vec<DirectoryEntry>> {
        let adapters: Vec<Box<dyn Adapter<_, _>>> = vec![
            Box::new(EntriesOnly::new()),
            Box::new(PagedResults::new(self.page_size)),
        ];
        let timeout = self.operation_timeout;
        let limit = request.size_limit.unwrap_or(usize::MAX);
        let ldap = conn.ldap_mut()?;
        let streamed = async {
            let mut stream = ldap
                .with_timeout(timeout)
                .streaming_search_with(
                    adapters,
                    &request.base,
                    request.scope.to_ldap3(),
                    filter,
                    request.attributes.clone(),
                )
                .await?;
            let mut entries = Vec::new();
            while entries.len() < limit {
                let Some(entry) = stream.next().await? else {
                    return Ok::<_, LdapError>((entries, Some(stream.finish().await)));
                };
                entries.push(DirectoryEntry::from_search_entry(SearchEntry::construct(entry)));
            }
            Ok::<_, LdapError>((entries, None))
        }
        .await;

        let (entries, result) = conn.outcome(streamed)?;
        match result {
            Some(result) => check(&request.base, result.rc, result.text)?,
            None => {
                // The server is still sending pages of the unfinished search.
                conn.discard();
                debug!(base = %request.base, limit, "Paged search stopped at size limit");
            }
        }
        Ok(entries)
    }
}

fn check(dn: &str, rc: u32, text: String) -> DirectoryResult<()> {
    if rc == result_code::SUCCESS {
        Ok(())
    } else {
        Err(DirectoryError::operation(dn, rc, text))
    }
}

fn to_ldap3_attribute(attribute: Attribute) -> (Vec<u8>, HashSet<Vec<u8>>) {
    (attribute.name.into_bytes(), attribute.values.into_iter().collect())
}

fn to_ldap3_mod(modification: Modification) -> Mod<Vec<u8>> {
    match modification {
        Modification::Add(a) => {
            let (name, values) = to_ldap3_attribute(a);
            Mod::Add(name, values)
        }
        Modification::Delete(a) => {
            let (name, values) = to_ldap3_attribute(a);
            Mod::Delete(name, values)
        }
        Modification::Replace(a) => {
            let (name, values) = to_ldap3_attribute(a);
            Mod::Replace(name, values)
        }
    }
}

#[async_trait]
impl DirectoryClient for LdapDirectory {
    #[instrument(skip(self, attributes))]
    async fn add(&self, dn: &str, attributes: Vec<Attribute>) -> DirectoryResult<()> {
        let attrs: Vec<_> = attributes.into_iter().map(to_ldap3_attribute).collect();
        let mut conn = self.pool.get().await?;
        let result = conn.ldap_mut()?.with_timeout(self.operation_timeout).add(dn, attrs).await;
        let result = conn.outcome(result)?;
        check(dn, result.rc, result.text)
    }

    #[instrument(skip(self, modifications))]
    async fn modify(&self, dn: &str, modifications: Vec<Modification>) -> DirectoryResult<()> {
        let mods: Vec<_> = modifications.into_iter().map(to_ldap3_mod).collect();
        let mut conn = self.pool.get().await?;
        let result = conn.ldap_mut()?.with_timeout(self.operation_timeout).modify(dn, mods).await;
        let result = conn.outcome(result)?;
        check(dn, result.rc, result.text)
    }

    #[instrument(skip(self))]
    async fn delete(&self, dn: &str) -> DirectoryResult<()> {
        let mut conn = self.pool.get().await?;
        let result = conn.ldap_mut()?.with_timeout(self.operation_timeout).delete(dn).await;
        let result = conn.outcome(result)?;
        check(dn, result.rc, result.text)
    }

    #[instrument(skip(self))]
    async fn delete_subtree(&self, dn: &str) -> DirectoryResult<()> {
        let mut request = SearchRequest::subtree(dn, Filter::any());
        request.attributes = vec!["1.1".to_string()];
        let mut locations: Vec<String> = self.search(&request).await?.into_iter().map(|e| e.dn).collect();
        locations.sort_by_key(|location| std::cmp::Reverse(naming::depth(location)));

        for location in &locations {
            self.delete(location).await?;
        }
        debug!(dn = %dn, removed = locations.len(), "Subtree deleted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(base = %request.base))]
    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>> {
        let filter = request.filter.to_ldap_string();
        let mut conn = self.pool.get().await?;

        if self.paged_search && request.scope != SearchScope::Base {
            return self.search_paged(&mut conn, request, &filter).await;
        }

        let mut options = SearchOptions::new();
        if let Some(limit) = request.size_limit {
            options = options.sizelimit(i32::try_from(limit).unwrap_or(i32::MAX));
        }
        let result = conn
            .ldap_mut()?
            .with_search_options(options)
            .with_timeout(self.operation_timeout)
            .search(&request.base, request.scope.to_ldap3(), &filter, request.attributes.clone())
            .await;
        let ldap3::SearchResult(entries, result) = conn.outcome(result)?;
        if !(request.size_limit.is_some() && result.rc == result_code::SIZE_LIMIT_EXCEEDED) {
            check(&request.base, result.rc, result.text)?;
        }

        Ok(entries
            .into_iter()
            .map(|e| DirectoryEntry::from_search_entry(SearchEntry::construct(e)))
            .collect())
    }

    #[instrument(skip(self, old_password, new_password))]
    async fn password_modify(&self, dn: &str, old_password: &str, new_password: &str) -> DirectoryResult<()> {
        let exop = PasswordModify {
            user_id: Some(dn),
            old_pass: Some(old_password),
            new_pass: Some(new_password),
        };
        let mut conn = self.pool.get().await?;
        let result = conn.ldap_mut()?.with_timeout(self.operation_timeout).extended(exop).await;
        let ldap3::result::ExopResult(_, result) = conn.outcome(result)?;
        check(dn, result.rc, result.text)
    }
}
