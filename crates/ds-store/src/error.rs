//! Store error types.

use ds_model::EntityKind;
use thiserror::Error;

/// Errors surfaced by store operations.
///
/// `NotFound` and `AlreadyExists` always come from an explicit existence
/// check, never from a protocol result code.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Entity not found.
    #[error("{kind} '{id}' not found in realm {realm}{}", storage_suffix(.storage))]
    NotFound {
        /// Kind of entity.
        kind: EntityKind,
        /// Realm name.
        realm: String,
        /// User storage name, for storage-scoped entities.
        storage: Option<String>,
        /// Entity identifier.
        id: String,
    },

    /// Entity already exists.
    #[error("{kind} '{id}' already exists in realm {realm}{}", storage_suffix(.storage))]
    AlreadyExists {
        /// Kind of entity.
        kind: EntityKind,
        /// Realm name.
        realm: String,
        /// User storage name, for storage-scoped entities.
        storage: Option<String>,
        /// Entity identifier.
        id: String,
    },

    /// Storage policy not met (group name pattern, unique email).
    #[error("Policy violation: {0}")]
    PolicyViolation(String),

    /// Old password rejected by the directory.
    #[error("Invalid credentials for user '{0}'")]
    InvalidCredential(String),

    /// Certificate bytes could not be parsed.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// Certificate rotation or removal failed.
    #[error("Certificate update failed for '{id}': {message}")]
    CertificateUpdateFailed {
        /// Username.
        id: String,
        /// Underlying failure.
        message: String,
    },

    /// GPG key update or removal failed.
    #[error("GPG key update failed for '{id}': {message}")]
    GpgKeyUpdateFailed {
        /// Organization identifier.
        id: String,
        /// Underlying failure.
        message: String,
    },

    /// Tenant configuration is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An entry could not be converted to or from a domain object.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// A multi-step write failed after some steps were committed.
    #[error("{operation} failed at step '{failed_step}' (committed: {committed:?}): {source}")]
    CascadeFailed {
        /// Operation name.
        operation: String,
        /// Step that failed.
        failed_step: String,
        /// Locations written by the steps that completed.
        committed: Vec<String>,
        /// Failure of the step.
        #[source]
        source: Box<StoreError>,
    },

    /// Unexpected protocol failure.
    #[error("Store failure: {message}")]
    StoreFailure {
        /// Diagnostic message from the directory.
        message: String,
        /// Protocol result code, when the server returned one.
        code: Option<u32>,
    },
}

fn storage_suffix(storage: &Option<String>) -> String {
    storage
        .as_ref()
        .map(|s| format!(", storage {s}"))
        .unwrap_or_default()
}

impl StoreError {
    /// Creates a not found error.
    #[must_use]
    pub fn not_found(
        kind: EntityKind,
        realm: impl Into<String>,
        storage: Option<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            kind,
            realm: realm.into(),
            storage,
            id: id.into(),
        }
    }

    /// Creates an already exists error.
    #[must_use]
    pub fn already_exists(
        kind: EntityKind,
        realm: impl Into<String>,
        storage: Option<String>,
        id: impl Into<String>,
    ) -> Self {
        Self::AlreadyExists {
            kind,
            realm: realm.into(),
            storage,
            id: id.into(),
        }
    }

    /// Creates a store failure without a result code.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self::StoreFailure {
            message: message.into(),
            code: None,
        }
    }

    /// Checks if this is a not found error.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Checks if this is an already exists error.
    #[must_use]
    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Checks if this is a policy violation.
    #[must_use]
    pub const fn is_policy_violation(&self) -> bool {
        matches!(self, Self::PolicyViolation(_))
    }

    /// Checks if this is a partially applied cascade.
    #[must_use]
    pub const fn is_cascade_failure(&self) -> bool {
        matches!(self, Self::CascadeFailed { .. })
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
