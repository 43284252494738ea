//! Directory, mapping and configuration errors.
//!
//! ## Security Note
//!
//! Error messages must not leak passwords, bind credentials or
//! certificate bytes.

use ds_model::EntityKind;
use ds_store::StoreError;
use thiserror::Error;

use crate::directory::result_code;

/// Errors raised while talking to the directory server.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// The server answered with a non-success result code.
    #[error("Directory operation on '{dn}' failed with result code {code}: {message}")]
    Operation {
        /// Target entry.
        dn: String,
        /// Protocol result code.
        code: u32,
        /// Diagnostic message returned by the server.
        message: String,
    },

    /// Connection failed.
    #[error("Directory connection failed: {0}")]
    Connection(String),

    /// Bind (authentication) failed.
    #[error("Directory bind failed: {0}")]
    Bind(String),

    /// Operation timed out.
    #[error("Directory operation timed out")]
    Timeout,

    /// Pool closed.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Configuration rejected.
    #[error(transparent)]
    Configuration(#[from] ConfigError),

    /// Underlying ldap3 error.
    #[error("LDAP error: {0}")]
    Ldap3(#[from] ldap3::LdapError),
}

impl DirectoryError {
    /// Creates an operation error.
    #[must_use]
    pub fn operation(dn: impl Into<String>, code: u32, message: impl Into<String>) -> Self {
        Self::Operation {
            dn: dn.into(),
            code,
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[must_use]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Protocol result code, when the server returned one.
    #[must_use]
    pub const fn result_code(&self) -> Option<u32> {
        match self {
            Self::Operation { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Checks if the target entry does not exist.
    #[must_use]
    pub const fn is_no_such_object(&self) -> bool {
        matches!(self.result_code(), Some(result_code::NO_SUCH_OBJECT))
    }

    /// Checks if this is a connection-related error.
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout | Self::PoolExhausted
        )
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;

/// Errors raised while converting between entries and domain objects.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// A stored value could not be converted for a field.
    #[error("Malformed value for field '{field}': {value}")]
    MalformedValue {
        /// Domain field.
        field: String,
        /// Offending raw value.
        value: String,
    },

    /// Certificate bytes could not be parsed.
    #[error("Invalid certificate: {0}")]
    InvalidCertificate(String),

    /// A textual rule could not be parsed.
    #[error("Invalid mapping rule '{rule}': {reason}")]
    InvalidRule {
        /// Rule text.
        rule: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A rule names a field the entity doesn't declare.
    #[error("Unknown field '{field}' for {kind}")]
    UnknownField {
        /// Entity kind.
        kind: EntityKind,
        /// Field name.
        field: String,
    },

    /// A rule applies a transform the field's type can't carry.
    #[error("Transform {transform} cannot be applied to field '{field}' of {kind}")]
    IncompatibleTransform {
        /// Entity kind.
        kind: EntityKind,
        /// Field name.
        field: String,
        /// Transform name.
        transform: String,
    },

    /// The tenant has no rule set for an entity kind.
    #[error("No mapping rule set for {0}")]
    MissingRuleSet(EntityKind),

    /// A reference field could not be turned into an entry location.
    #[error("Cannot locate '{field}': {reason}")]
    Location {
        /// Domain field.
        field: String,
        /// Underlying naming failure.
        reason: String,
    },
}

impl MappingError {
    /// Creates a malformed value error.
    #[must_use]
    pub fn malformed(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::MalformedValue {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Errors raised while resolving tenant configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required key has no value at any level.
    #[error("Missing configuration key '{0}'")]
    Missing(String),

    /// A key has a value that can't be used.
    #[error("Invalid value '{value}' for configuration key '{key}': {reason}")]
    Invalid {
        /// Configuration key.
        key: String,
        /// Offending value.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Connection URL must use LDAPS.
    #[error("Security error: only LDAPS is supported. URL must start with 'ldaps://'")]
    InsecureProtocol,

    /// A mapping rule set failed validation.
    #[error("Invalid {kind} mapping: {source}")]
    Mapping {
        /// Entity kind of the rule set.
        kind: EntityKind,
        /// Validation failure.
        #[source]
        source: MappingError,
    },
}

impl ConfigError {
    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(key: impl Into<String>, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for configuration resolution.
pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<DirectoryError> for StoreError {
    fn from(err: DirectoryError) -> Self {
        match err {
            DirectoryError::Configuration(e) => StoreError::Configuration(e.to_string()),
            other => StoreError::StoreFailure {
                code: other.result_code(),
                message: other.to_string(),
            },
        }
    }
}

impl From<MappingError> for StoreError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::InvalidCertificate(msg) => StoreError::InvalidCertificate(msg),
            other => StoreError::Mapping(other.to_string()),
        }
    }
}

impl From<ConfigError> for StoreError {
    fn from(err: ConfigError) -> Self {
        StoreError::Configuration(err.to_string())
    }
}
