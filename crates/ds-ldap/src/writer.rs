//! Writer store.
//!
//! Every write first checks existence through the [`LdapReaderStore`] to
//! decide between `NotFound` and `AlreadyExists`. Multi-entry writes run
//! as a [`Saga`]; membership and application-managed attribute writes
//! accept the idempotent result codes classified in [`crate::idempotency`].
//!
//! ## Security
//!
//! Passwords and certificate bytes are never logged.

use std::sync::Arc;

use async_trait::async_trait;
use ds_model::{Application, EntityKind, Group, Organization, PostalAddress, ProviderRequest, ProviderResponse, User};
use ds_store::{PageRequest, ReaderStore, SearchCriteria, SearchType, StoreError, StoreResult, WriterStore};
use regex::Regex;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::certificate;
use crate::config::TenantConfig;
use crate::directory::{result_code, Attribute, DirectoryClient, DirectoryEntry, Modification};
use crate::error::DirectoryError;
use crate::idempotency::{tolerate, WriteKind};
use crate::mapping::MappingEngine;
use crate::naming::{self, NamingResolver};
use crate::reader::LdapReaderStore;
use crate::saga::Saga;

const FLAG_TRUE: &str = "TRUE";
const FLAG_FALSE: &str = "FALSE";

/// Writer store of one tenant.
pub struct LdapWriterStore {
    config: Arc<TenantConfig>,
    engine: Arc<MappingEngine>,
    directory: Arc<dyn DirectoryClient>,
    reader: Arc<LdapReaderStore>,
}

impl LdapWriterStore {
    /// Creates a writer over `directory`, checking existence through `reader`.
    #[must_use]
    pub fn new(
        config: Arc<TenantConfig>,
        engine: Arc<MappingEngine>,
        directory: Arc<dyn DirectoryClient>,
        reader: Arc<LdapReaderStore>,
    ) -> Self {
        Self {
            config,
            engine,
            directory,
            reader,
        }
    }

    /// Reader used for existence checks.
    #[must_use]
    pub fn reader(&self) -> &LdapReaderStore {
        &self.reader
    }

    fn naming(&self) -> &NamingResolver {
        self.reader.naming()
    }

    fn user_attribute<'a>(&'a self, field: &str, fallback: &'a str) -> &'a str {
        self.engine.attribute_for(EntityKind::User, field).unwrap_or(fallback)
    }

    // === Existence checks ===

    async fn require_user(&self, username: &str) -> StoreResult<User> {
        self.reader
            .get_user(username)
            .await?
            .ok_or_else(|| self.reader.not_found(EntityKind::User, username))
    }

    async fn require_organization(&self, identifier: &str) -> StoreResult<Organization> {
        self.reader
            .get_organization(identifier)
            .await?
            .ok_or_else(|| self.reader.not_found(EntityKind::Organization, identifier))
    }

    async fn require_group(&self, application: &str, group: &str) -> StoreResult<Group> {
        self.reader
            .get_group(application, group)
            .await?
            .ok_or_else(|| self.reader.not_found(EntityKind::Group, group))
    }

    async fn require_application(&self, name: &str) -> StoreResult<Application> {
        self.reader
            .get_application(name)
            .await?
            .ok_or_else(|| self.reader.not_found(EntityKind::Application, name))
    }

    async fn require_user_location(&self, username: &str) -> StoreResult<String> {
        if !self.reader.exists(EntityKind::User, username).await? {
            return Err(self.reader.not_found(EntityKind::User, username));
        }
        self.reader.location(EntityKind::User, username)
    }

    // === Policies ===

    /// Name pattern groups of `application` must match.
    ///
    /// `*` matches any run of characters and `{app}` the application name;
    /// matching ignores case.
    fn group_name_pattern(&self, application: &str) -> StoreResult<Regex> {
        let body = self
            .config
            .group_filter_pattern
            .split("{app}")
            .map(|part| part.split('*').map(regex::escape).collect::<Vec<_>>().join(".*"))
            .collect::<Vec<_>>()
            .join(&regex::escape(application));
        Regex::new(&format!("(?i)^{body}$"))
            .map_err(|e| StoreError::Configuration(format!("Invalid group name pattern: {e}")))
    }

    fn check_group_name(&self, application: &str, group: &str) -> StoreResult<()> {
        if self.group_name_pattern(application)?.is_match(group) {
            return Ok(());
        }
        Err(StoreError::PolicyViolation(format!(
            "Group name '{group}' does not match pattern '{}' of application {application}",
            self.config.group_filter_pattern
        )))
    }

    async fn check_unique_mail(&self, user: &User) -> StoreResult<()> {
        if !self.config.unique_emails {
            return Ok(());
        }
        let Some(mail) = user.mail.as_deref().filter(|m| !m.is_empty()) else {
            return Ok(());
        };
        let criteria = SearchCriteria::new().mail(mail).search_type(SearchType::Exact);
        let page = self.reader.search_users(&criteria, PageRequest::default()).await?;
        if page
            .results
            .iter()
            .any(|other| !other.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(StoreError::PolicyViolation(format!("Email {mail} is already used")));
        }
        Ok(())
    }

    fn check_app_managed_attribute(&self, attribute: &str) -> StoreResult<()> {
        if self.config.allows_app_managed_attribute(attribute) {
            return Ok(());
        }
        Err(StoreError::PolicyViolation(format!(
            "Attribute '{attribute}' cannot be managed by applications"
        )))
    }

    // === Addresses ===

    /// Creates the address sub-entry of a new owner and records its id.
    async fn create_owned_address(&self, saga: &mut Saga, address: &mut Option<PostalAddress>) -> StoreResult<()> {
        drop_empty(address);
        let Some(address) = address.as_mut() else {
            return Ok(());
        };
        let id = Uuid::new_v4().to_string();
        let stored = PostalAddress {
            id: Some(id.clone()),
            lines: address.lines.clone(),
        };
        let location = self.reader.location(EntityKind::Address, &id)?;
        let attributes = self.engine.to_entry(&stored)?;
        saga.step("create address", &location, self.directory.add(&location, attributes))
            .await?;
        address.id = Some(id);
        Ok(())
    }

    /// Updates the owner's address in place, or creates it when the owner has none.
    async fn update_owned_address(
        &self,
        saga: &mut Saga,
        current: Option<&PostalAddress>,
        address: &mut Option<PostalAddress>,
    ) -> StoreResult<()> {
        drop_empty(address);
        let Some(id) = current.and_then(|a| a.id.clone()) else {
            return self.create_owned_address(saga, address).await;
        };
        let Some(updated) = address.as_mut() else {
            return Ok(());
        };
        updated.id = Some(id.clone());
        let location = self.reader.location(EntityKind::Address, &id)?;
        let modifications = self.engine.diff(&*updated)?;
        saga.step("update address", &location, self.directory.modify(&location, modifications))
            .await
    }

    async fn delete_owned_address(&self, saga: &mut Saga, address: Option<&PostalAddress>) -> StoreResult<()> {
        let Some(id) = address.and_then(|a| a.id.as_deref()) else {
            return Ok(());
        };
        let location = self.reader.location(EntityKind::Address, id)?;
        saga.step("delete address", &location, self.directory.delete(&location))
            .await
    }

    // === Groups ===

    async fn change_membership(&self, kind: WriteKind, group_location: &str, member_location: &str) -> StoreResult<()> {
        let value = Attribute::text(self.reader.member_attribute(), [member_location]);
        let modification = match kind {
            WriteKind::DeleteValue => Modification::Delete(value),
            WriteKind::AddValue | WriteKind::Other => Modification::Add(value),
        };
        tolerate(kind, self.directory.modify(group_location, vec![modification]).await)?;
        Ok(())
    }

    async fn ensure_container(&self, saga: &mut Saga, location: &str) -> StoreResult<()> {
        if self.directory.get_entry(location).await?.is_some() {
            return Ok(());
        }
        saga.step("create group container", location, self.directory.add(location, container_entry(location)))
            .await
    }

    async fn modify_certificate(&self, username: &str, modifications: Vec<Modification>) -> StoreResult<()> {
        let location = self.reader.location(EntityKind::User, username)?;
        self.directory
            .modify(&location, modifications)
            .await
            .map_err(|e| StoreError::CertificateUpdateFailed {
                id: username.to_string(),
                message: e.to_string(),
            })
    }

    /// Stored certificate of a user, read without decoding the entry.
    async fn stored_certificate(&self, username: &str) -> StoreResult<StoredCertificate> {
        let location = self.reader.location(EntityKind::User, username)?;
        let entry = self
            .reader
            .entry_of_kind(EntityKind::User, &location)
            .await?
            .ok_or_else(|| self.reader.not_found(EntityKind::User, username))?;
        let attribute = self.user_attribute("certificate", &self.config.attributes.certificate);
        Ok(StoredCertificate {
            der: entry.get_raw(attribute).into_iter().find(|d| !d.is_empty()),
            markers: certificate_markers(&entry, &self.config.attributes.properties),
        })
    }

    /// Puts the stored certificate id markers back into a replace of the
    /// properties attribute. Markers sent by the caller are dropped.
    async fn keep_certificate_markers(&self, location: &str, modifications: &mut Vec<Modification>) -> StoreResult<()> {
        let properties = self.config.attributes.properties.as_str();
        let Some(index) = modifications
            .iter()
            .position(|m| matches!(m, Modification::Replace(a) if a.name.eq_ignore_ascii_case(properties)))
        else {
            return Ok(());
        };
        let stored = self
            .directory
            .get_entry(location)
            .await?
            .map(|entry| certificate_markers(&entry, properties))
            .unwrap_or_default();

        let Modification::Replace(replace) = &mut modifications[index] else {
            return Ok(());
        };
        replace
            .values
            .retain(|v| !std::str::from_utf8(v).is_ok_and(certificate::is_id_marker));
        replace.values.extend(stored.into_iter().map(String::into_bytes));
        if replace.values.is_empty() {
            modifications.remove(index);
        }
        Ok(())
    }

    /// Adds the members from other storages stored on the group at
    /// `location` to a replace of the member attribute.
    async fn keep_foreign_members(&self, location: &str, modifications: &mut [Modification]) -> StoreResult<()> {
        let member_attribute = self.reader.member_attribute();
        let Some(Modification::Replace(replace)) = modifications
            .iter_mut()
            .find(|m| m.attribute().name.eq_ignore_ascii_case(member_attribute))
        else {
            return Ok(());
        };
        let Some(entry) = self.directory.get_entry(location).await? else {
            return Ok(());
        };
        for value in entry.get_raw(member_attribute) {
            let foreign = std::str::from_utf8(&value).map_or(true, |l| !self.naming().is_user_location(l));
            if foreign && !replace.values.contains(&value) {
                replace.values.push(value);
            }
        }
        Ok(())
    }

    async fn modify_gpg_key(&self, identifier: &str, modification: Modification) -> StoreResult<()> {
        let location = self.reader.location(EntityKind::Organization, identifier)?;
        let kind = match modification {
            Modification::Delete(_) => WriteKind::DeleteValue,
            Modification::Add(_) | Modification::Replace(_) => WriteKind::Other,
        };
        tolerate(kind, self.directory.modify(&location, vec![modification]).await).map_err(|e| {
            StoreError::GpgKeyUpdateFailed {
                id: identifier.to_string(),
                message: e.to_string(),
            }
        })
    }

    async fn set_password(&self, username: &str, password: &str, password_reset: bool) -> StoreResult<()> {
        let location = self.require_user_location(username).await?;
        let reset_attribute = self.user_attribute("password_reset", &self.config.attributes.password_reset);
        let modifications = vec![
            Modification::Replace(Attribute::text(self.config.attributes.password.clone(), [password])),
            Modification::Replace(Attribute::text(reset_attribute, [flag(password_reset)])),
        ];
        self.directory.modify(&location, modifications).await?;
        Ok(())
    }
}

/// Certificate bytes and id markers as stored on a user entry.
struct StoredCertificate {
    der: Option<Vec<u8>>,
    markers: Vec<String>,
}

impl StoredCertificate {
    /// Modifications removing the stored bytes and every id marker.
    fn removal(&self, certificate_attribute: &str, properties: &str) -> Vec<Modification> {
        let mut modifications = Vec::with_capacity(2);
        if let Some(der) = &self.der {
            modifications.push(Modification::Delete(Attribute::new(certificate_attribute, vec![der.clone()])));
        }
        if !self.markers.is_empty() {
            modifications.push(Modification::Delete(Attribute::text(properties, self.markers.clone())));
        }
        modifications
    }
}

fn certificate_markers(entry: &DirectoryEntry, properties: &str) -> Vec<String> {
    entry
        .get_attrs(properties)
        .map(|values| values.iter().filter(|v| certificate::is_id_marker(v)).cloned().collect())
        .unwrap_or_default()
}

/// Clears an address that carries no line.
fn drop_empty(address: &mut Option<PostalAddress>) {
    if !address.as_ref().is_some_and(PostalAddress::is_not_empty) {
        *address = None;
    }
}

/// Attributes of a plain container entry.
fn container_entry(location: &str) -> Vec<Attribute> {
    let mut attributes = vec![Attribute::text("objectClass", ["top", "organizationalUnit"])];
    if let (Some((name, _)), Some(value)) = (location.split_once('='), naming::key_of(location)) {
        attributes.push(Attribute::text(name.trim(), [value]));
    }
    attributes
}

const fn flag(value: bool) -> &'static str {
    if value {
        FLAG_TRUE
    } else {
        FLAG_FALSE
    }
}

#[async_trait]
impl WriterStore for LdapWriterStore {
    // === Users ===

    #[instrument(skip(self, user, request), fields(realm = %self.config.realm, username = %user.username))]
    async fn create_user(&self, user: &User, request: &ProviderRequest) -> StoreResult<ProviderResponse> {
        if self.reader.exists(EntityKind::User, &user.username).await? {
            return Err(self.reader.already_exists(EntityKind::User, &user.username));
        }
        self.check_unique_mail(user).await?;

        let location = self.reader.location(EntityKind::User, &user.username)?;
        let mut user = user.clone();
        let mut saga = Saga::new("create_user");
        self.create_owned_address(&mut saga, &mut user.address).await?;

        let attributes = self.engine.to_entry(&user).map_err(|e| saga.fail("create user", e.into()))?;
        saga.step("create user", &location, self.directory.add(&location, attributes))
            .await?;

        info!(dn = %location, "User created");
        Ok(ProviderResponse::ok(&user.username, request))
    }

    #[instrument(skip(self, user, request), fields(realm = %self.config.realm, username = %user.username))]
    async fn update_user(&self, user: &User, request: &ProviderRequest) -> StoreResult<ProviderResponse> {
        let current = self.require_user(&user.username).await?;
        self.check_unique_mail(user).await?;

        let location = self.reader.location(EntityKind::User, &user.username)?;
        let mut updated = user.clone();
        let mut saga = Saga::new("update_user");
        self.update_owned_address(&mut saga, current.address.as_ref(), &mut updated.address)
            .await?;

        let mut modifications = self.engine.diff(&updated).map_err(|e| saga.fail("update user", e.into()))?;
        self.keep_certificate_markers(&location, &mut modifications)
            .await
            .map_err(|e| saga.fail("update user", e))?;
        if !modifications.is_empty() {
            saga.step("update user", &location, self.directory.modify(&location, modifications))
                .await?;
        }
        Ok(ProviderResponse::ok(&user.username, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn delete_user(&self, username: &str, request: &ProviderRequest) -> StoreResult<ProviderResponse> {
        let user = self.require_user(username).await?;
        let location = self.reader.location(EntityKind::User, username)?;
        let mut saga = Saga::new("delete_user");

        for group in &user.groups {
            let group_location = self.naming().group_location(&group.app_name, &group.name);
            let step = format!("remove from group {}", group.name);
            let outcome = match self.require_group(&group.app_name, &group.name).await {
                Ok(_) => {
                    self.change_membership(WriteKind::DeleteValue, &group_location, &location)
                        .await
                }
                Err(e) => Err(e),
            };
            match outcome {
                Err(e) if e.is_not_found() => {
                    warn!(group = %group_location, "Group vanished before membership removal, skipping");
                }
                other => saga.step(&step, &group_location, async { other }).await?,
            }
        }

        self.delete_owned_address(&mut saga, user.address.as_ref()).await?;
        saga.step("delete user", &location, self.directory.delete(&location))
            .await?;

        info!(dn = %location, "User deleted");
        Ok(ProviderResponse::ok(username, request))
    }

    // === Organizations ===

    #[instrument(skip(self, organization, request), fields(realm = %self.config.realm, organization = %organization.identifier))]
    async fn create_organization(
        &self,
        organization: &Organization,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        if self
            .reader
            .exists(EntityKind::Organization, &organization.identifier)
            .await?
        {
            return Err(self
                .reader
                .already_exists(EntityKind::Organization, &organization.identifier));
        }

        let location = self.reader.location(EntityKind::Organization, &organization.identifier)?;
        let mut organization = organization.clone();
        let mut saga = Saga::new("create_organization");
        self.create_owned_address(&mut saga, &mut organization.address).await?;

        let attributes = self
            .engine
            .to_entry(&organization)
            .map_err(|e| saga.fail("create organization", e.into()))?;
        saga.step("create organization", &location, self.directory.add(&location, attributes))
            .await?;

        info!(dn = %location, "Organization created");
        Ok(ProviderResponse::ok(&organization.identifier, request))
    }

    #[instrument(skip(self, organization, request), fields(realm = %self.config.realm, organization = %organization.identifier))]
    async fn update_organization(
        &self,
        organization: &Organization,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        let current = self.require_organization(&organization.identifier).await?;

        let location = self.reader.location(EntityKind::Organization, &organization.identifier)?;
        let mut updated = organization.clone();
        let mut saga = Saga::new("update_organization");
        self.update_owned_address(&mut saga, current.address.as_ref(), &mut updated.address)
            .await?;

        let modifications = self
            .engine
            .diff(&updated)
            .map_err(|e| saga.fail("update organization", e.into()))?;
        if !modifications.is_empty() {
            saga.step("update organization", &location, self.directory.modify(&location, modifications))
                .await?;
        }
        Ok(ProviderResponse::ok(&organization.identifier, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn delete_organization(&self, identifier: &str, request: &ProviderRequest) -> StoreResult<ProviderResponse> {
        let organization = self.require_organization(identifier).await?;
        let location = self.reader.location(EntityKind::Organization, identifier)?;
        let mut saga = Saga::new("delete_organization");

        self.delete_owned_address(&mut saga, organization.address.as_ref())
            .await?;
        saga.step("delete organization", &location, self.directory.delete(&location))
            .await?;

        info!(dn = %location, "Organization deleted");
        Ok(ProviderResponse::ok(identifier, request))
    }

    // === Groups ===

    #[instrument(skip(self, group, request), fields(realm = %self.config.realm, group = %group.name))]
    async fn create_group(
        &self,
        application: &str,
        group: &Group,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        if self.reader.get_group(application, &group.name).await?.is_some() {
            return Err(self.reader.already_exists(EntityKind::Group, &group.name));
        }
        self.check_group_name(application, &group.name)?;

        let container = self.naming().group_container(application);
        let location = self.naming().group_location(application, &group.name);
        let attributes = self.engine.to_entry(group)?;
        let mut saga = Saga::new("create_group");
        self.ensure_container(&mut saga, &container).await?;
        saga.step("create group", &location, self.directory.add(&location, attributes))
            .await?;

        info!(dn = %location, "Group created");
        Ok(ProviderResponse::ok(&group.name, request))
    }

    #[instrument(skip(self, group, request), fields(realm = %self.config.realm, group = %group.name))]
    async fn update_group(
        &self,
        application: &str,
        group: &Group,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        self.require_group(application, &group.name).await?;

        let location = self.naming().group_location(application, &group.name);
        let mut modifications = self.engine.diff(group)?;
        self.keep_foreign_members(&location, &mut modifications).await?;
        if !modifications.is_empty() {
            self.directory.modify(&location, modifications).await?;
        }
        Ok(ProviderResponse::ok(&group.name, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn delete_group(&self, application: &str, group: &str, request: &ProviderRequest) -> StoreResult<ProviderResponse> {
        self.require_group(application, group).await?;

        let location = self.naming().group_location(application, group);
        self.directory.delete(&location).await?;

        info!(dn = %location, "Group deleted");
        Ok(ProviderResponse::ok(group, request))
    }

    // === Applications ===

    #[instrument(skip(self, application, request), fields(realm = %self.config.realm, application = %application.name))]
    async fn create_application(
        &self,
        application: &Application,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        let name = application.name.as_str();
        if self.reader.exists(EntityKind::Application, name).await? {
            return Err(self.reader.already_exists(EntityKind::Application, name));
        }
        for group in &application.groups {
            self.check_group_name(name, &group.name)?;
        }

        let location = self.reader.location(EntityKind::Application, name)?;
        let attributes = self.engine.to_entry(application)?;
        let container = self.naming().group_container(name);
        let mut groups = Vec::with_capacity(application.groups.len());
        for group in &application.groups {
            let group = Group {
                app_name: name.to_string(),
                ..group.clone()
            };
            groups.push((
                self.naming().group_location(name, &group.name),
                group.name.clone(),
                self.engine.to_entry(&group)?,
            ));
        }
        let manager = self.naming().manager_group(name);
        let manager_group = Group::new(name, naming::key_of(&manager).unwrap_or_default());
        let manager_attributes = self.engine.to_entry(&manager_group)?;

        let mut saga = Saga::new("create_application");
        saga.step("create application", &location, self.directory.add(&location, attributes))
            .await?;
        saga.step("create group container", &container, self.directory.add(&container, container_entry(&container)))
            .await?;
        for (group_location, group_name, group_attributes) in groups {
            saga.step(
                &format!("create group {group_name}"),
                &group_location,
                self.directory.add(&group_location, group_attributes),
            )
            .await?;
        }
        saga.step("create manager group", &manager, self.directory.add(&manager, manager_attributes))
            .await?;

        info!(dn = %location, groups = application.groups.len(), "Application created");
        Ok(ProviderResponse::ok(name, request))
    }

    #[instrument(skip(self, application, request), fields(realm = %self.config.realm, application = %application.name))]
    async fn update_application(
        &self,
        application: &Application,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        let name = application.name.as_str();
        let existing = self.require_application(name).await?;
        for group in application.groups.iter().filter(|g| existing.group(&g.name).is_none()) {
            self.check_group_name(name, &group.name)?;
        }

        let location = self.reader.location(EntityKind::Application, name)?;
        let modifications = self.engine.diff(application)?;
        let mut saga = Saga::new("update_application");
        if !modifications.is_empty() {
            saga.step("update application", &location, self.directory.modify(&location, modifications))
                .await?;
        }

        for current in &existing.groups {
            let group_location = self.naming().group_location(name, &current.name);
            match application.group(&current.name) {
                Some(updated) => {
                    let updated = Group {
                        name: current.name.clone(),
                        ..updated.clone()
                    };
                    saga.step(
                        &format!("update group {}", current.name),
                        &group_location,
                        self.update_group(name, &updated, request),
                    )
                    .await?;
                }
                None => {
                    saga.step(
                        &format!("delete group {}", current.name),
                        &group_location,
                        self.delete_group(name, &current.name, request),
                    )
                    .await?;
                }
            }
        }
        for group in application.groups.iter().filter(|g| existing.group(&g.name).is_none()) {
            let group_location = self.naming().group_location(name, &group.name);
            saga.step(
                &format!("create group {}", group.name),
                &group_location,
                self.create_group(name, group, request),
            )
            .await?;
        }

        Ok(ProviderResponse::ok(name, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn delete_application(&self, name: &str, request: &ProviderRequest) -> StoreResult<ProviderResponse> {
        self.require_application(name).await?;

        let location = self.reader.location(EntityKind::Application, name)?;
        self.directory.delete_subtree(&location).await?;

        info!(dn = %location, "Application deleted");
        Ok(ProviderResponse::ok(name, request))
    }

    // === Memberships ===

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn add_user_to_group(
        &self,
        application: &str,
        group: &str,
        username: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        self.require_group(application, group).await?;
        let member = self.require_user_location(username).await?;

        let location = self.naming().group_location(application, group);
        self.change_membership(WriteKind::AddValue, &location, &member).await?;
        Ok(ProviderResponse::ok(username, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn remove_user_from_group(
        &self,
        application: &str,
        group: &str,
        username: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        self.require_group(application, group).await?;
        let member = self.require_user_location(username).await?;

        let location = self.naming().group_location(application, group);
        self.change_membership(WriteKind::DeleteValue, &location, &member).await?;
        Ok(ProviderResponse::ok(username, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn add_user_to_manager_group(
        &self,
        application: &str,
        username: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        let member = self.require_user_location(username).await?;
        let location = self.naming().manager_group(application);
        if self.reader.get_manager_group(application).await?.is_none() {
            return Err(self.reader.not_found(EntityKind::Group, &location));
        }

        self.change_membership(WriteKind::AddValue, &location, &member).await?;
        Ok(ProviderResponse::ok(username, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn remove_user_from_manager_group(
        &self,
        application: &str,
        username: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        let member = self.require_user_location(username).await?;
        let location = self.naming().manager_group(application);
        if self.reader.get_manager_group(application).await?.is_none() {
            return Err(self.reader.not_found(EntityKind::Group, &location));
        }

        self.change_membership(WriteKind::DeleteValue, &location, &member).await?;
        Ok(ProviderResponse::ok(username, request))
    }

    // === Application-managed attributes ===

    #[instrument(skip(self, value, request), fields(realm = %self.config.realm))]
    async fn add_app_managed_attribute(
        &self,
        username: &str,
        attribute: &str,
        value: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        self.check_app_managed_attribute(attribute)?;
        let location = self.require_user_location(username).await?;

        let modification = Modification::Add(Attribute::text(attribute, [value]));
        tolerate(WriteKind::AddValue, self.directory.modify(&location, vec![modification]).await)?;
        Ok(ProviderResponse::ok(username, request))
    }

    #[instrument(skip(self, value, request), fields(realm = %self.config.realm))]
    async fn remove_app_managed_attribute(
        &self,
        username: &str,
        attribute: &str,
        value: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        self.check_app_managed_attribute(attribute)?;
        let location = self.require_user_location(username).await?;

        let modification = Modification::Delete(Attribute::text(attribute, [value]));
        tolerate(WriteKind::DeleteValue, self.directory.modify(&location, vec![modification]).await)?;
        Ok(ProviderResponse::ok(username, request))
    }

    // === Certificates and keys ===

    #[instrument(skip(self, der, request), fields(realm = %self.config.realm))]
    async fn update_user_certificate(
        &self,
        username: &str,
        der: &[u8],
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        let parsed = certificate::parse(der)?;
        let stored = self.stored_certificate(username).await?;

        let certificate_attribute = self.user_attribute("certificate", &self.config.attributes.certificate);
        let properties = &self.config.attributes.properties;
        let mut modifications = stored.removal(certificate_attribute, properties);
        modifications.push(Modification::Add(Attribute::new(certificate_attribute, vec![der.to_vec()])));
        modifications.push(Modification::Add(Attribute::text(
            properties.clone(),
            [certificate::id_marker(&parsed.id)],
        )));

        self.modify_certificate(username, modifications).await?;
        info!(username, certificate = %parsed.id, "Certificate updated");
        Ok(ProviderResponse::ok(username, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn delete_user_certificate(&self, username: &str, request: &ProviderRequest) -> StoreResult<ProviderResponse> {
        let stored = self.stored_certificate(username).await?;
        let certificate_attribute = self.user_attribute("certificate", &self.config.attributes.certificate);
        let modifications = stored.removal(certificate_attribute, &self.config.attributes.properties);
        if modifications.is_empty() {
            return Ok(ProviderResponse::ok(username, request));
        }

        self.modify_certificate(username, modifications).await?;
        info!(username, "Certificate deleted");
        Ok(ProviderResponse::ok(username, request))
    }

    #[instrument(skip(self, key, request), fields(realm = %self.config.realm))]
    async fn update_organization_gpg_key(
        &self,
        identifier: &str,
        key: &[u8],
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        self.require_organization(identifier).await?;

        let attribute = self
            .engine
            .attribute_for(EntityKind::Organization, "gpg_key")
            .unwrap_or(self.config.attributes.gpg_key.as_str());
        self.modify_gpg_key(identifier, Modification::Replace(Attribute::new(attribute, vec![key.to_vec()])))
            .await?;
        Ok(ProviderResponse::ok(identifier, request))
    }

    #[instrument(skip(self, request), fields(realm = %self.config.realm))]
    async fn delete_organization_gpg_key(
        &self,
        identifier: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        let organization = self.require_organization(identifier).await?;
        let Some(key) = organization.gpg_key.filter(|k| !k.is_empty()) else {
            return Ok(ProviderResponse::ok(identifier, request));
        };

        let attribute = self
            .engine
            .attribute_for(EntityKind::Organization, "gpg_key")
            .unwrap_or(self.config.attributes.gpg_key.as_str());
        self.modify_gpg_key(identifier, Modification::Delete(Attribute::new(attribute, vec![key])))
            .await?;
        Ok(ProviderResponse::ok(identifier, request))
    }

    // === Passwords ===

    #[instrument(skip(self, password, request), fields(realm = %self.config.realm))]
    async fn init_password(
        &self,
        username: &str,
        password: &str,
        password_reset: bool,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        self.set_password(username, password, password_reset).await?;
        info!(username, password_reset, "Password initialized");
        Ok(ProviderResponse::ok(username, request))
    }

    #[instrument(skip(self, generated_password, request), fields(realm = %self.config.realm))]
    async fn reinit_password(
        &self,
        username: &str,
        generated_password: &str,
        password_reset: bool,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        self.set_password(username, generated_password, password_reset).await?;
        info!(username, password_reset, "Password reinitialized");
        Ok(ProviderResponse::ok(username, request))
    }

    #[instrument(skip(self, old_password, new_password, request), fields(realm = %self.config.realm))]
    async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse> {
        let location = self.require_user_location(username).await?;

        match self.directory.password_modify(&location, old_password, new_password).await {
            Ok(()) => Ok(ProviderResponse::ok(username, request)),
            Err(DirectoryError::Operation {
                code: result_code::INVALID_CREDENTIALS,
                ..
            }) => Err(StoreError::InvalidCredential(username.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}
