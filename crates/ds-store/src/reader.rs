//! Reader store trait.

use async_trait::async_trait;
use ds_model::{Application, Group, Organization, PostalAddress, User};

use crate::criteria::{PageRequest, PageResult, SearchCriteria};
use crate::error::StoreResult;

/// Read access to one tenant's entities.
///
/// Lookups return `Ok(None)` when the entry is absent. Missing related
/// entries (address, groups) leave the relation empty.
#[async_trait]
pub trait ReaderStore: Send + Sync {
    /// Gets a user with its address, group memberships and certificate metadata.
    async fn get_user(&self, username: &str) -> StoreResult<Option<User>>;

    /// Gets an organization with its address.
    async fn get_organization(&self, identifier: &str) -> StoreResult<Option<Organization>>;

    /// Gets an address sub-entry by id.
    async fn get_address(&self, id: &str) -> StoreResult<Option<PostalAddress>>;

    /// Gets a group of an application.
    async fn get_group(&self, application: &str, group: &str) -> StoreResult<Option<Group>>;

    /// Gets the manager group of an application.
    async fn get_manager_group(&self, application: &str) -> StoreResult<Option<Group>>;

    /// Gets an application with its groups.
    async fn get_application(&self, name: &str) -> StoreResult<Option<Application>>;

    /// Searches users.
    async fn search_users(
        &self,
        criteria: &SearchCriteria,
        page: PageRequest,
    ) -> StoreResult<PageResult<User>>;

    /// Searches organizations.
    async fn search_organizations(
        &self,
        criteria: &SearchCriteria,
        page: PageRequest,
    ) -> StoreResult<PageResult<Organization>>;

    /// Searches the groups of an application.
    async fn search_groups(
        &self,
        application: &str,
        criteria: &SearchCriteria,
        page: PageRequest,
    ) -> StoreResult<PageResult<Group>>;

    /// Searches applications.
    async fn search_applications(
        &self,
        criteria: &SearchCriteria,
        page: PageRequest,
    ) -> StoreResult<PageResult<Application>>;

    /// Gets the members of a group, resolved to users of this storage.
    async fn get_users_in_group(&self, application: &str, group: &str) -> StoreResult<Vec<User>>;
}
