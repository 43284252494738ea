//! Reader store.
//!
//! Lookups read one entry at the location the [`NamingResolver`] computes
//! and convert it through the [`MappingEngine`]. Entries whose object
//! classes don't match the requested kind are treated as absent.
//!
//! Searches turn [`SearchCriteria`] into a template entity, let the engine
//! produce its filter-construction attributes, and combine them according
//! to the [`SearchType`]. Every restriction goes into the directory filter,
//! and the directory stops one entry past the requested page.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use ds_model::{Application, EntityKind, Group, Organization, PostalAddress, User};
use ds_store::{PageRequest, PageResult, ReaderStore, SearchCriteria, SearchType, StoreError, StoreResult};
use tracing::{debug, instrument};

use crate::config::TenantConfig;
use crate::directory::{Attribute, DirectoryClient, DirectoryEntry, SearchRequest};
use crate::filter::Filter;
use crate::mapping::{EntitySchema, MappingEngine};
use crate::naming::NamingResolver;

/// Reader store of one tenant.
pub struct LdapReaderStore {
    config: Arc<TenantConfig>,
    engine: Arc<MappingEngine>,
    naming: NamingResolver,
    directory: Arc<dyn DirectoryClient>,
}

impl LdapReaderStore {
    /// Creates a reader over `directory`.
    #[must_use]
    pub fn new(config: Arc<TenantConfig>, engine: Arc<MappingEngine>, directory: Arc<dyn DirectoryClient>) -> Self {
        let naming = NamingResolver::new(&config);
        Self {
            config,
            engine,
            naming,
            directory,
        }
    }

    /// Tenant configuration.
    #[must_use]
    pub fn config(&self) -> &TenantConfig {
        &self.config
    }

    /// Mapping engine.
    #[must_use]
    pub fn engine(&self) -> &MappingEngine {
        &self.engine
    }

    /// Naming resolver.
    #[must_use]
    pub const fn naming(&self) -> &NamingResolver {
        &self.naming
    }

    /// Checks if the entry of `kind` keyed by `key` exists.
    ///
    /// Groups are keyed by application; use [`ReaderStore::get_group`].
    pub async fn exists(&self, kind: EntityKind, key: &str) -> StoreResult<bool> {
        let location = self.location(kind, key)?;
        Ok(self.entry_of_kind(kind, &location).await?.is_some())
    }

    /// Reads the entry at `location` if it is of `kind`.
    pub async fn entry_of_kind(&self, kind: EntityKind, location: &str) -> StoreResult<Option<DirectoryEntry>> {
        let entry = self.directory.get_entry(location).await?;
        Ok(entry.filter(|e| self.is_kind(kind, e)))
    }

    /// Location of the entry of `kind` keyed by `key`.
    pub(crate) fn location(&self, kind: EntityKind, key: &str) -> StoreResult<String> {
        Ok(self.naming.entry_location(kind, key)?)
    }

    /// Not found error scoped to this tenant.
    pub(crate) fn not_found(&self, kind: EntityKind, id: &str) -> StoreError {
        StoreError::not_found(kind, &self.config.realm, self.storage_scope(kind), id)
    }

    /// Already exists error scoped to this tenant.
    pub(crate) fn already_exists(&self, kind: EntityKind, id: &str) -> StoreError {
        StoreError::already_exists(kind, &self.config.realm, self.storage_scope(kind), id)
    }

    fn storage_scope(&self, kind: EntityKind) -> Option<String> {
        match kind {
            EntityKind::User | EntityKind::Organization | EntityKind::Address => {
                Some(self.config.user_storage.clone())
            }
            EntityKind::Group | EntityKind::Application => None,
        }
    }

    /// Attribute holding group members.
    pub(crate) fn member_attribute(&self) -> &str {
        self.engine
            .attribute_for(EntityKind::Group, "members")
            .unwrap_or(self.config.attributes.member.as_str())
    }

    fn is_kind(&self, kind: EntityKind, entry: &DirectoryEntry) -> bool {
        let matches = entry.has_object_classes(self.engine.object_classes(kind));
        if !matches {
            debug!(dn = %entry.dn, %kind, "Entry excluded, object classes differ");
        }
        matches
    }

    /// Runs a search; a missing base yields no entries.
    async fn search_entries(&self, kind: EntityKind, request: SearchRequest) -> StoreResult<Vec<DirectoryEntry>> {
        match self.directory.search(&request).await {
            Ok(entries) => Ok(entries.into_iter().filter(|e| self.is_kind(kind, e)).collect()),
            Err(e) if e.is_no_such_object() => {
                debug!(base = %request.base, "Search base does not exist");
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Entries of a one-level search, read up to one past the end of `page`.
    async fn search_objects<T: EntitySchema>(&self, base: &str, filter: Filter, page: PageRequest) -> StoreResult<Vec<T>> {
        let filter = Filter::and(vec![Filter::object_classes(self.engine.object_classes(T::KIND)), filter]);
        let limit = page.offset.saturating_add(page.size).saturating_add(1);
        debug!(base, filter = %filter.to_ldap_string(), limit, "Searching entries");
        self.search_entries(T::KIND, SearchRequest::one_level(base, filter).with_size_limit(limit))
            .await?
            .iter()
            .map(|entry| self.engine.to_object::<T>(entry).map_err(StoreError::from))
            .collect()
    }

    fn to_group(&self, entry: &DirectoryEntry, application: &str) -> StoreResult<Group> {
        let mut group: Group = self.engine.to_object(entry)?;
        group.app_name = application.to_string();
        Ok(group)
    }

    /// Replaces an address reference with the stored address, or clears it.
    async fn resolve_address(&self, address: &mut Option<PostalAddress>) -> StoreResult<()> {
        let Some(id) = address.as_ref().and_then(|a| a.id.clone()) else {
            return Ok(());
        };
        *address = self.get_address(&id).await?;
        if address.is_none() {
            debug!(address = %id, "Referenced address does not exist");
        }
        Ok(())
    }

    /// Groups listing `user_location` as a member. Manager groups are left out.
    async fn groups_of(&self, user_location: &str) -> StoreResult<Vec<Group>> {
        let filter = Filter::and(vec![
            Filter::object_classes(self.engine.object_classes(EntityKind::Group)),
            Filter::eq(self.member_attribute(), user_location),
        ]);
        let entries = self
            .search_entries(EntityKind::Group, SearchRequest::subtree(&self.config.app_source, filter))
            .await?;

        let mut groups = Vec::with_capacity(entries.len());
        for entry in &entries {
            if let Some(application) = self.naming.application_of_group(&entry.dn) {
                groups.push(self.to_group(entry, &application)?);
            }
        }
        Ok(groups)
    }

    async fn groups_of_application(&self, application: &str) -> StoreResult<Vec<Group>> {
        let container = self.naming.group_container(application);
        let filter = Filter::object_classes(self.engine.object_classes(EntityKind::Group));
        let entries = self
            .search_entries(EntityKind::Group, SearchRequest::one_level(container, filter))
            .await?;
        entries.iter().map(|entry| self.to_group(entry, application)).collect()
    }

    /// Usernames allowed by the membership criteria, `None` when unrestricted.
    async fn allowed_members(&self, criteria: &SearchCriteria) -> StoreResult<Option<BTreeSet<String>>> {
        let Some(application) = criteria.application.as_deref() else {
            return Ok(None);
        };
        let groups = match criteria.group.as_deref() {
            Some(group) => self.get_group(application, group).await?.into_iter().collect(),
            None => self.groups_of_application(application).await?,
        };
        Ok(Some(
            groups
                .into_iter()
                .flat_map(|g| g.members)
                .map(|m| m.to_lowercase())
                .collect(),
        ))
    }

    fn relation_filters(&self, criteria: &SearchCriteria) -> StoreResult<Vec<Filter>> {
        let mut filters = Vec::new();
        if let Some(organization) = &criteria.organization {
            if let Some(attribute) = self.engine.attribute_for(EntityKind::User, "organization") {
                let location = self.location(EntityKind::Organization, organization)?;
                filters.push(Filter::eq(attribute, location));
            }
        }
        if let Some(habilitation) = &criteria.habilitation {
            if let Some(attribute) = self.engine.attribute_for(EntityKind::User, "habilitations") {
                filters.push(Filter::eq(attribute, habilitation.clone()));
            }
        }
        if let Some(der) = &criteria.certificate {
            let attribute = self
                .engine
                .attribute_for(EntityKind::User, "certificate")
                .unwrap_or(self.config.attributes.certificate.as_str());
            filters.push(Filter::eq_bytes(attribute, der.clone()));
        }
        Ok(filters)
    }
}

/// Filter over the attributes of a search template.
///
/// `None` when the template holds no value.
fn text_filter(attributes: Vec<Attribute>, search_type: SearchType) -> Option<Filter> {
    let mut filters = Vec::new();
    for attribute in attributes {
        for value in &attribute.values {
            let value = String::from_utf8_lossy(value).into_owned();
            filters.push(match search_type {
                SearchType::Exact => Filter::eq(attribute.name.clone(), value),
                SearchType::Substring | SearchType::Compound => Filter::contains(attribute.name.clone(), value),
            });
        }
    }
    if filters.is_empty() {
        return None;
    }
    Some(match search_type {
        SearchType::Compound => Filter::or(filters),
        SearchType::Exact | SearchType::Substring => Filter::and(filters),
    })
}

fn bag(entries: &[(&str, &Option<String>)]) -> std::collections::HashMap<String, Vec<String>> {
    entries
        .iter()
        .filter_map(|(key, value)| value.as_ref().map(|v| ((*key).to_string(), vec![v.clone()])))
        .collect()
}

#[async_trait]
impl ReaderStore for LdapReaderStore {
    #[instrument(skip(self), fields(realm = %self.config.realm, storage = %self.config.user_storage))]
    async fn get_user(&self, username: &str) -> StoreResult<Option<User>> {
        let location = self.location(EntityKind::User, username)?;
        let Some(entry) = self.entry_of_kind(EntityKind::User, &location).await? else {
            return Ok(None);
        };
        let mut user: User = self.engine.to_object(&entry)?;
        self.resolve_address(&mut user.address).await?;
        user.groups = self.groups_of(&location).await?;
        Ok(Some(user))
    }

    #[instrument(skip(self), fields(realm = %self.config.realm, storage = %self.config.user_storage))]
    async fn get_organization(&self, identifier: &str) -> StoreResult<Option<Organization>> {
        let location = self.location(EntityKind::Organization, identifier)?;
        let Some(entry) = self.entry_of_kind(EntityKind::Organization, &location).await? else {
            return Ok(None);
        };
        let mut organization: Organization = self.engine.to_object(&entry)?;
        self.resolve_address(&mut organization.address).await?;
        Ok(Some(organization))
    }

    #[instrument(skip(self), fields(realm = %self.config.realm))]
    async fn get_address(&self, id: &str) -> StoreResult<Option<PostalAddress>> {
        let location = self.location(EntityKind::Address, id)?;
        let Some(entry) = self.entry_of_kind(EntityKind::Address, &location).await? else {
            return Ok(None);
        };
        let mut address: PostalAddress = self.engine.to_object(&entry)?;
        address.id.get_or_insert_with(|| id.to_string());
        Ok(Some(address))
    }

    #[instrument(skip(self), fields(realm = %self.config.realm))]
    async fn get_group(&self, application: &str, group: &str) -> StoreResult<Option<Group>> {
        let location = self.naming.group_location(application, group);
        self.entry_of_kind(EntityKind::Group, &location)
            .await?
            .map(|entry| self.to_group(&entry, application))
            .transpose()
    }

    #[instrument(skip(self), fields(realm = %self.config.realm))]
    async fn get_manager_group(&self, application: &str) -> StoreResult<Option<Group>> {
        let location = self.naming.manager_group(application);
        self.entry_of_kind(EntityKind::Group, &location)
            .await?
            .map(|entry| self.to_group(&entry, application))
            .transpose()
    }

    #[instrument(skip(self), fields(realm = %self.config.realm))]
    async fn get_application(&self, name: &str) -> StoreResult<Option<Application>> {
        let location = self.location(EntityKind::Application, name)?;
        let Some(entry) = self.entry_of_kind(EntityKind::Application, &location).await? else {
            return Ok(None);
        };
        let mut application: Application = self.engine.to_object(&entry)?;
        application.groups = self.groups_of_application(name).await?;
        Ok(Some(application))
    }

    #[instrument(skip(self, criteria), fields(realm = %self.config.realm, storage = %self.config.user_storage))]
    async fn search_users(&self, criteria: &SearchCriteria, page: PageRequest) -> StoreResult<PageResult<User>> {
        let template = User {
            username: criteria.identifier.clone().unwrap_or_default(),
            mail: criteria.mail.clone(),
            attributes: bag(&[
                ("common_name", &criteria.common_name),
                ("description", &criteria.description),
            ]),
            ..User::default()
        };
        let mut filters: Vec<Filter> =
            text_filter(self.engine.to_filter_attributes(&template)?, criteria.search_type)
                .into_iter()
                .collect();
        filters.extend(self.relation_filters(criteria)?);

        if let Some(allowed) = self.allowed_members(criteria).await? {
            if allowed.is_empty() {
                return Ok(PageResult::from_all(Vec::new(), page));
            }
            let attribute = self.naming.rdn_attribute(EntityKind::User);
            filters.push(Filter::or(
                allowed.into_iter().map(|username| Filter::eq(attribute, username)).collect(),
            ));
        }

        let users = self
            .search_objects(&self.config.user_source, Filter::and(filters), page)
            .await?;
        Ok(PageResult::from_all(users, page))
    }

    #[instrument(skip(self, criteria), fields(realm = %self.config.realm, storage = %self.config.user_storage))]
    async fn search_organizations(
        &self,
        criteria: &SearchCriteria,
        page: PageRequest,
    ) -> StoreResult<PageResult<Organization>> {
        let template = Organization {
            identifier: criteria.identifier.clone().unwrap_or_default(),
            attributes: bag(&[("description", &criteria.description), ("mail", &criteria.mail)]),
            ..Organization::default()
        };
        let filter = text_filter(self.engine.to_filter_attributes(&template)?, criteria.search_type)
            .unwrap_or_else(Filter::any);
        let container = self.naming.container(EntityKind::Organization)?;
        let organizations = self.search_objects(container, filter, page).await?;
        Ok(PageResult::from_all(organizations, page))
    }

    #[instrument(skip(self, criteria), fields(realm = %self.config.realm))]
    async fn search_groups(
        &self,
        application: &str,
        criteria: &SearchCriteria,
        page: PageRequest,
    ) -> StoreResult<PageResult<Group>> {
        let template = Group {
            name: criteria.identifier.clone().unwrap_or_default(),
            description: criteria.description.clone(),
            ..Group::default()
        };
        let filter = text_filter(self.engine.to_filter_attributes(&template)?, criteria.search_type)
            .unwrap_or_else(Filter::any);
        let mut groups: Vec<Group> = self
            .search_objects(&self.naming.group_container(application), filter, page)
            .await?;
        for group in &mut groups {
            group.app_name = application.to_string();
        }
        Ok(PageResult::from_all(groups, page))
    }

    #[instrument(skip(self, criteria), fields(realm = %self.config.realm))]
    async fn search_applications(
        &self,
        criteria: &SearchCriteria,
        page: PageRequest,
    ) -> StoreResult<PageResult<Application>> {
        let template = Application {
            name: criteria.identifier.clone().unwrap_or_default(),
            attributes: bag(&[("description", &criteria.description)]),
            ..Application::default()
        };
        let filter = text_filter(self.engine.to_filter_attributes(&template)?, criteria.search_type)
            .unwrap_or_else(Filter::any);
        let applications = self.search_objects(&self.config.app_source, filter, page).await?;
        Ok(PageResult::from_all(applications, page))
    }

    #[instrument(skip(self), fields(realm = %self.config.realm))]
    async fn get_users_in_group(&self, application: &str, group: &str) -> StoreResult<Vec<User>> {
        let found = self
            .get_group(application, group)
            .await?
            .ok_or_else(|| self.not_found(EntityKind::Group, group))?;

        let mut users = Vec::with_capacity(found.members.len());
        for member in &found.members {
            match self.get_user(member).await? {
                Some(user) => users.push(user),
                None => debug!(member = %member, "Group member is not in this user storage"),
            }
        }
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::Modification;
    use crate::test_support::{certificate, fixture, Fixture, ADDRESSES, USERS};

    async fn put<T: EntitySchema>(fx: &Fixture, location: &str, object: &T) {
        let attributes = fx.reader.engine().to_entry(object).unwrap();
        fx.directory.add(location, attributes).await.unwrap();
    }

    async fn put_user(fx: &Fixture, user: &User) {
        let location = fx.reader.location(EntityKind::User, &user.username).unwrap();
        put(fx, &location, user).await;
    }

    async fn put_group(fx: &Fixture, group: &Group) {
        let naming = fx.reader.naming();
        fx.directory.ensure_branch(&naming.group_container(&group.app_name));
        put(fx, &naming.group_location(&group.app_name, &group.name), group).await;
    }

    fn members(app: &str, name: &str, usernames: &[&str]) -> Group {
        let mut group = Group::new(app, name);
        group.members = usernames.iter().map(|u| (*u).to_string()).collect();
        group
    }

    async fn seed_people(fx: &Fixture) {
        for (username, first, last, mail) in [
            ("jdoe", "John", "Doe", "john.doe@insee.fr"),
            ("asmith", "Anna", "Smith", "anna.smith@example.org"),
            ("bdoe", "Bob", "Doe", "bob.doe@example.org"),
        ] {
            put_user(fx, &User::new(username).with_name(first, last).with_mail(mail)).await;
        }
    }

    #[tokio::test]
    async fn missing_user_is_none() {
        let fx = fixture();
        assert!(fx.reader.get_user("nobody").await.unwrap().is_none());
        assert!(!fx.reader.exists(EntityKind::User, "nobody").await.unwrap());
    }

    #[tokio::test]
    async fn entry_of_another_kind_is_not_returned() {
        let fx = fixture();
        let location = format!("uid=intruder,{USERS}");
        fx.directory
            .add(
                &location,
                vec![Attribute::text("objectClass", ["top", "organization"])],
            )
            .await
            .unwrap();

        assert!(fx.reader.get_user("intruder").await.unwrap().is_none());
        let page = fx
            .reader
            .search_users(&SearchCriteria::new(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn user_is_enriched_with_address_and_groups() {
        let fx = fixture();
        let address = PostalAddress::new(vec!["Insee".into(), "88 avenue Verdier".into()]).with_id("addr-1");
        put(&fx, &format!("l=addr-1,{ADDRESSES}"), &address).await;
        put_user(&fx, &User::new("jdoe").with_address(PostalAddress::default().with_id("addr-1"))).await;
        put_group(&fx, &members("Applitest", "Admin_Applitest", &["jdoe"])).await;
        put_group(&fx, &members("Other", "Reader_Other", &["jdoe", "asmith"])).await;
        put_group(&fx, &members("Other", "Writer_Other", &["asmith"])).await;
        put(&fx, &fx.reader.naming().manager_group("Applitest"), &members("Applitest", "Gestionnaires_Applitest", &["jdoe"])).await;

        let user = fx.reader.get_user("jdoe").await.unwrap().unwrap();

        let read_address = user.address.clone().unwrap();
        assert_eq!(read_address.id.as_deref(), Some("addr-1"));
        assert_eq!(read_address.lines[1], "88 avenue Verdier");
        assert_eq!(user.groups.len(), 2);
        assert!(user.is_member_of("Applitest", "Admin_Applitest"));
        assert!(user.is_member_of("Other", "Reader_Other"));
        assert!(!user.is_member_of("Applitest", "Gestionnaires_Applitest"));
    }

    #[tokio::test]
    async fn dangling_address_leaves_relation_empty() {
        let fx = fixture();
        put_user(&fx, &User::new("jdoe").with_address(PostalAddress::default().with_id("gone"))).await;

        let user = fx.reader.get_user("jdoe").await.unwrap().unwrap();
        assert!(user.address.is_none());
        assert!(user.groups.is_empty());
    }

    #[tokio::test]
    async fn search_types_combine_criteria() {
        let fx = fixture();
        seed_people(&fx).await;

        let substring = SearchCriteria::new().identifier("doe").mail("example.org");
        let page = fx.reader.search_users(&substring, PageRequest::default()).await.unwrap();
        assert_eq!(page.results.iter().map(|u| u.username.as_str()).collect::<Vec<_>>(), vec!["bdoe"]);

        let compound = substring.clone().search_type(SearchType::Compound);
        let page = fx.reader.search_users(&compound, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 3);

        let exact = SearchCriteria::new().identifier("doe").search_type(SearchType::Exact);
        assert_eq!(fx.reader.search_users(&exact, PageRequest::default()).await.unwrap().total, 0);

        let exact = SearchCriteria::new().identifier("JDOE").search_type(SearchType::Exact);
        assert_eq!(fx.reader.search_users(&exact, PageRequest::default()).await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn search_by_common_name_uses_attribute_rule() {
        let fx = fixture();
        put_user(&fx, &User::new("jdoe").with_attribute("common_name", vec!["John Doe".into()])).await;
        put_user(&fx, &User::new("asmith").with_attribute("common_name", vec!["Anna Smith".into()])).await;

        let page = fx
            .reader
            .search_users(&SearchCriteria::new().common_name("john"), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].username, "jdoe");
    }

    #[tokio::test]
    async fn search_by_relations() {
        let fx = fixture();
        put_user(&fx, &User::new("jdoe").with_organization("insee").with_habilitation("appli_reader")).await;
        put_user(&fx, &User::new("asmith").with_organization("other")).await;
        put_user(&fx, &User::new("bdoe").with_habilitation("appli_writer")).await;
        put_group(&fx, &members("Applitest", "Admin_Applitest", &["asmith", "bdoe"])).await;
        put_group(&fx, &members("Applitest", "Reader_Applitest", &["bdoe"])).await;

        let by_org = SearchCriteria::new().organization("insee");
        let page = fx.reader.search_users(&by_org, PageRequest::default()).await.unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].username, "jdoe");

        let by_habilitation = SearchCriteria::new().habilitation("appli_writer");
        let page = fx.reader.search_users(&by_habilitation, PageRequest::default()).await.unwrap();
        assert_eq!(page.results[0].username, "bdoe");

        let by_group = SearchCriteria::new().membership("Applitest", Some("Reader_Applitest".into()));
        let page = fx.reader.search_users(&by_group, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 1);

        let by_application = SearchCriteria::new().membership("Applitest", None);
        let page = fx.reader.search_users(&by_application, PageRequest::default()).await.unwrap();
        assert_eq!(page.total, 2);

        let unknown_group = SearchCriteria::new().membership("Applitest", Some("Nope_Applitest".into()));
        assert_eq!(fx.reader.search_users(&unknown_group, PageRequest::default()).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn search_by_certificate_matches_bytes() {
        let fx = fixture();
        let der = certificate("John Doe", 2020, 2099);
        let location = fx.reader.location(EntityKind::User, "jdoe").unwrap();
        put_user(&fx, &User::new("jdoe")).await;
        put_user(&fx, &User::new("asmith")).await;
        fx.directory
            .modify(
                &location,
                vec![Modification::Add(Attribute::new(
                    "userCertificate;binary",
                    vec![der.clone()],
                ))],
            )
            .await
            .unwrap();

        let page = fx
            .reader
            .search_users(&SearchCriteria::new().certificate(der), PageRequest::default())
            .await
            .unwrap();

        assert_eq!(page.total, 1);
        assert!(page.results[0].metadata.certificate.is_some());
    }

    #[tokio::test]
    async fn search_is_paged() {
        let fx = fixture();
        for i in 0..25 {
            put_user(&fx, &User::new(format!("user{i:02}"))).await;
        }

        let before = fx.directory.entries_returned();
        let first = fx.reader.search_users(&SearchCriteria::new(), PageRequest::first(10)).await.unwrap();
        assert_eq!(first.results.len(), 10);
        assert_eq!(first.total, 11);
        assert!(first.has_more_results);
        assert_eq!(fx.directory.entries_returned() - before, 11);

        let single = fx.reader.search_users(&SearchCriteria::new(), PageRequest::at(3, 1)).await.unwrap();
        assert_eq!(single.results[0].username, "user03");
        assert!(single.has_more_results);

        let last = fx
            .reader
            .search_users(&SearchCriteria::new(), PageRequest::at(first.next_offset + 10, 10))
            .await
            .unwrap();
        assert_eq!(last.results.len(), 5);
        assert_eq!(last.total, 25);
        assert!(!last.has_more_results);
    }

    #[tokio::test]
    async fn application_lists_its_groups() {
        let fx = fixture();
        put_group(&fx, &members("Applitest", "Admin_Applitest", &[])).await;
        put_group(&fx, &members("Applitest", "Reader_Applitest", &["jdoe"])).await;

        let application = fx.reader.get_application("Applitest").await.unwrap().unwrap();
        assert_eq!(application.name, "Applitest");
        assert_eq!(application.groups.len(), 2);
        assert!(application.groups.iter().all(|g| g.app_name == "Applitest"));

        let page = fx
            .reader
            .search_groups("Applitest", &SearchCriteria::new().identifier("reader"), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
        assert_eq!(page.results[0].members, vec!["jdoe"]);

        let page = fx
            .reader
            .search_applications(&SearchCriteria::new(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.results.len(), 1);
    }

    #[tokio::test]
    async fn application_without_group_container_has_no_groups() {
        let fx = fixture();
        put(&fx, &fx.reader.location(EntityKind::Application, "Bare").unwrap(), &Application::new("Bare")).await;

        let application = fx.reader.get_application("Bare").await.unwrap().unwrap();
        assert!(application.groups.is_empty());
        let page = fx
            .reader
            .search_groups("Bare", &SearchCriteria::new(), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn users_in_group_skips_foreign_members() {
        let fx = fixture();
        seed_people(&fx).await;
        put_group(&fx, &members("Applitest", "Admin_Applitest", &["jdoe", "asmith"])).await;
        fx.directory
            .modify(
                &fx.reader.naming().group_location("Applitest", "Admin_Applitest"),
                vec![Modification::Add(Attribute::text(
                    "uniqueMember",
                    ["uid=ghost,ou=contacts,ou=clients_domaine2,o=insee,c=fr"],
                ))],
            )
            .await
            .unwrap();

        let users = fx.reader.get_users_in_group("Applitest", "Admin_Applitest").await.unwrap();
        assert_eq!(users.len(), 2);

        put_group(&fx, &members("Applitest", "Reader_Applitest", &[])).await;
        fx.directory
            .modify(
                &fx.reader.naming().group_location("Applitest", "Reader_Applitest"),
                vec![Modification::Add(Attribute::text(
                    "uniqueMember",
                    ["uid=jdoe,ou=partenaires,o=insee,c=fr"],
                ))],
            )
            .await
            .unwrap();
        let users = fx.reader.get_users_in_group("Applitest", "Reader_Applitest").await.unwrap();
        assert!(users.is_empty());
        assert!(fx.reader.get_user("jdoe").await.unwrap().unwrap().groups.iter().all(|g| g.name != "Reader_Applitest"));

        let err = fx.reader.get_users_in_group("Applitest", "Missing").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn manager_group_lookup() {
        let fx = fixture();
        assert!(fx.reader.get_manager_group("Applitest").await.unwrap().is_none());

        fx.directory.ensure_branch(&fx.reader.location(EntityKind::Application, "Applitest").unwrap());
        put(&fx, &fx.reader.naming().manager_group("Applitest"), &members("Applitest", "Gestionnaires_Applitest", &["jdoe"])).await;

        let group = fx.reader.get_manager_group("Applitest").await.unwrap().unwrap();
        assert_eq!(group.members, vec!["jdoe"]);
        assert_eq!(group.app_name, "Applitest");
    }

    #[test]
    fn compound_search_is_a_disjunction() {
        let attributes = vec![Attribute::text("uid", ["jd"]), Attribute::text("mail", ["doe"])];

        assert_eq!(
            text_filter(attributes.clone(), SearchType::Compound).unwrap().to_ldap_string(),
            "(|(uid=*jd*)(mail=*doe*))"
        );
        assert_eq!(
            text_filter(attributes, SearchType::Exact).unwrap().to_ldap_string(),
            "(&(uid=jd)(mail=doe))"
        );
        assert!(text_filter(Vec::new(), SearchType::Substring).is_none());
    }
}
