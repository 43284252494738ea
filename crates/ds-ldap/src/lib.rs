//! # ds-ldap
//!
//! Directory-protocol backed stores for the identity directory.
//!
//! This crate implements the `ds-store` contracts on top of `ldap3`:
//! per-tenant configuration resolution, entry naming, configurable
//! entity mapping, and the reader and writer stores with their cascades.
//!
//! ## Security
//!
//! Connections use LDAPS unless a tenant explicitly allows plain LDAP.
//! Passwords and certificate bytes are never logged.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod certificate;
pub mod config;
pub mod directory;
pub mod error;
pub mod filter;
pub mod idempotency;
pub mod mapping;
pub mod naming;
pub mod reader;
pub mod registry;
pub mod resolver;
pub mod saga;
pub mod writer;

pub use config::{GlobalDefaults, TenantConfig, TenantConfigBuilder};
pub use directory::{DirectoryClient, LdapDirectory, MemoryDirectory};
pub use error::{ConfigError, DirectoryError, MappingError};
pub use mapping::{MappingEngine, MappingRule, MappingRuleSet};
pub use naming::NamingResolver;
pub use reader::LdapReaderStore;
pub use registry::{DirectoryConnector, LdapConnector, MemoryConnector, StoreRegistry, TenantStores};
pub use resolver::{ResolvedTenant, TenantResolver};
pub use writer::LdapWriterStore;
