//! Writer store trait.

use async_trait::async_trait;
use ds_model::{Application, Group, Organization, ProviderRequest, ProviderResponse, User};

use crate::error::StoreResult;

/// Write access to one tenant's entities.
///
/// Multi-step writes are not transactional. A failure after the first
/// committed step is reported as [`crate::StoreError::CascadeFailed`].
#[async_trait]
pub trait WriterStore: Send + Sync {
    // === Users ===

    /// Creates a user, and its address first when one is given.
    ///
    /// ## Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the username is taken.
    async fn create_user(&self, user: &User, request: &ProviderRequest) -> StoreResult<ProviderResponse>;

    /// Updates a user, creating or updating its address.
    ///
    /// ## Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn update_user(&self, user: &User, request: &ProviderRequest) -> StoreResult<ProviderResponse>;

    /// Deletes a user after removing its memberships and address.
    ///
    /// ## Errors
    ///
    /// Returns `StoreError::NotFound` if the user doesn't exist.
    async fn delete_user(&self, username: &str, request: &ProviderRequest) -> StoreResult<ProviderResponse>;

    // === Organizations ===

    /// Creates an organization, and its address first when one is given.
    async fn create_organization(
        &self,
        organization: &Organization,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Updates an organization, creating or updating its address.
    async fn update_organization(
        &self,
        organization: &Organization,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Deletes an organization and its address.
    async fn delete_organization(
        &self,
        identifier: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    // === Groups ===

    /// Creates a group under an application.
    ///
    /// ## Errors
    ///
    /// Returns `StoreError::PolicyViolation` if the name doesn't match the
    /// tenant's group pattern for the application.
    async fn create_group(
        &self,
        application: &str,
        group: &Group,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Updates a group's attributes.
    async fn update_group(
        &self,
        application: &str,
        group: &Group,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Deletes a group.
    async fn delete_group(
        &self,
        application: &str,
        group: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    // === Applications ===

    /// Creates an application, its group branch, its groups and its manager group.
    async fn create_application(
        &self,
        application: &Application,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Updates an application and reconciles its groups.
    async fn update_application(
        &self,
        application: &Application,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Deletes an application and everything beneath it.
    async fn delete_application(&self, name: &str, request: &ProviderRequest) -> StoreResult<ProviderResponse>;

    // === Memberships ===

    /// Adds a user to a group. Succeeds if already a member.
    async fn add_user_to_group(
        &self,
        application: &str,
        group: &str,
        username: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Removes a user from a group. Succeeds if not a member.
    async fn remove_user_from_group(
        &self,
        application: &str,
        group: &str,
        username: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Adds a user to an application's manager group. Succeeds if already a member.
    async fn add_user_to_manager_group(
        &self,
        application: &str,
        username: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Removes a user from an application's manager group. Succeeds if not a member.
    async fn remove_user_from_manager_group(
        &self,
        application: &str,
        username: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    // === Application-managed attributes ===

    /// Adds a value to a user attribute. Succeeds if the value is present.
    async fn add_app_managed_attribute(
        &self,
        username: &str,
        attribute: &str,
        value: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Removes a value from a user attribute. Succeeds if the value is absent.
    async fn remove_app_managed_attribute(
        &self,
        username: &str,
        attribute: &str,
        value: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    // === Certificates and keys ===

    /// Replaces the user's certificate and its correlation id.
    ///
    /// ## Errors
    ///
    /// Returns `StoreError::InvalidCertificate` if `der` doesn't parse.
    async fn update_user_certificate(
        &self,
        username: &str,
        der: &[u8],
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Removes the user's certificate and its correlation id.
    async fn delete_user_certificate(&self, username: &str, request: &ProviderRequest) -> StoreResult<ProviderResponse>;

    /// Replaces the organization's GPG key.
    async fn update_organization_gpg_key(
        &self,
        identifier: &str,
        key: &[u8],
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Removes the organization's GPG key.
    async fn delete_organization_gpg_key(
        &self,
        identifier: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    // === Passwords ===

    /// Sets the user's first password and the password-reset flag.
    async fn init_password(
        &self,
        username: &str,
        password: &str,
        password_reset: bool,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Replaces the user's password with a generated one and sets the reset flag.
    async fn reinit_password(
        &self,
        username: &str,
        generated_password: &str,
        password_reset: bool,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;

    /// Changes the password through the directory's password-modify operation.
    ///
    /// ## Errors
    ///
    /// Returns `StoreError::InvalidCredential` if the old password is wrong.
    async fn change_password(
        &self,
        username: &str,
        old_password: &str,
        new_password: &str,
        request: &ProviderRequest,
    ) -> StoreResult<ProviderResponse>;
}
