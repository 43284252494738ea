//! # ds-model
//!
//! Domain entities exposed by the directory store: people, organizations,
//! groups, applications and postal addresses, together with the tenant
//! definitions (realms and user storages) that scope them.
//!
//! Entities are plain data. How they are laid out in a directory is decided
//! by per-tenant mapping rules, not by this crate.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod address;
pub mod application;
pub mod group;
pub mod kind;
pub mod organization;
pub mod realm;
pub mod response;
pub mod user;

pub use address::PostalAddress;
pub use application::Application;
pub use group::Group;
pub use kind::EntityKind;
pub use organization::Organization;
pub use realm::{Realm, UserStorage};
pub use response::{ProviderRequest, ProviderResponse, ResponseStatus};
pub use user::{CertificateMetadata, User, UserMetadata};
