//! Directory client abstraction.
//!
//! Stores talk to the directory through [`DirectoryClient`]: add, modify,
//! delete, subtree delete, search and the password-modify extended
//! operation. [`LdapDirectory`] drives a real server through a pool of
//! ldap3 connections; [`MemoryDirectory`] keeps a tree in process and
//! answers with the same result codes.

mod ldap;
mod memory;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::DirectoryResult;
use crate::filter::Filter;

pub use ldap::{LdapConnection, LdapConnectionPool, LdapDirectory};
pub use memory::MemoryDirectory;

/// Protocol result codes the stores act on.
pub mod result_code {
    /// Operation succeeded.
    pub const SUCCESS: u32 = 0;
    /// Value to delete is not present.
    pub const NO_SUCH_ATTRIBUTE: u32 = 16;
    /// Value to add is already present.
    pub const ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
    /// More entries matched than the size limit allows.
    pub const SIZE_LIMIT_EXCEEDED: u32 = 4;
    /// Target entry does not exist.
    pub const NO_SUCH_OBJECT: u32 = 32;
    /// Bind or password check rejected.
    pub const INVALID_CREDENTIALS: u32 = 49;
    /// Entry still has children.
    pub const NOT_ALLOWED_ON_NON_LEAF: u32 = 66;
    /// Entry to add already exists.
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
}

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SearchScope {
    /// Only the base entry.
    Base,
    /// Direct children of the base.
    OneLevel,
    /// The base and everything beneath it.
    #[default]
    Subtree,
}

impl SearchScope {
    /// Converts to ldap3 scope.
    #[must_use]
    pub const fn to_ldap3(self) -> ldap3::Scope {
        match self {
            Self::Base => ldap3::Scope::Base,
            Self::OneLevel => ldap3::Scope::OneLevel,
            Self::Subtree => ldap3::Scope::Subtree,
        }
    }
}

/// A search to run against the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    /// Base entry.
    pub base: String,
    /// Scope below the base.
    pub scope: SearchScope,
    /// Filter entries must match.
    pub filter: Filter,
    /// Attributes to return; empty means all user attributes.
    pub attributes: Vec<String>,
    /// Maximum number of entries to return; `None` returns every match.
    pub size_limit: Option<usize>,
}

impl SearchRequest {
    /// Subtree search of `base`.
    #[must_use]
    pub fn subtree(base: impl Into<String>, filter: Filter) -> Self {
        Self {
            base: base.into(),
            scope: SearchScope::Subtree,
            filter,
            attributes: Vec::new(),
            size_limit: None,
        }
    }

    /// One-level search of `base`.
    #[must_use]
    pub fn one_level(base: impl Into<String>, filter: Filter) -> Self {
        Self {
            scope: SearchScope::OneLevel,
            ..Self::subtree(base, filter)
        }
    }

    /// Stops the search after `limit` entries.
    #[must_use]
    pub const fn with_size_limit(mut self, limit: usize) -> Self {
        self.size_limit = Some(limit);
        self
    }

    /// Base-object read of `dn`.
    #[must_use]
    pub fn base(dn: impl Into<String>) -> Self {
        Self {
            scope: SearchScope::Base,
            ..Self::subtree(dn, Filter::any())
        }
    }
}

/// An attribute and its values, as sent to the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    /// Attribute name.
    pub name: String,
    /// Raw values.
    pub values: Vec<Vec<u8>>,
}

impl Attribute {
    /// Attribute with raw values.
    #[must_use]
    pub fn new(name: impl Into<String>, values: Vec<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Attribute with text values.
    #[must_use]
    pub fn text<I, S>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            name,
            values.into_iter().map(|v| v.into().into_bytes()).collect(),
        )
    }

    /// The `objectClass` attribute.
    #[must_use]
    pub fn object_classes(classes: &[String]) -> Self {
        Self::text("objectClass", classes.iter().cloned())
    }
}

/// One change of a modify request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modification {
    /// Add values.
    Add(Attribute),
    /// Delete values; no values deletes the whole attribute.
    Delete(Attribute),
    /// Replace all values; no values removes the attribute.
    Replace(Attribute),
}

impl Modification {
    /// Attribute affected by the change.
    #[must_use]
    pub const fn attribute(&self) -> &Attribute {
        match self {
            Self::Add(a) | Self::Delete(a) | Self::Replace(a) => a,
        }
    }
}

/// An entry returned by a search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Distinguished name.
    pub dn: String,
    /// Text attributes (all values are multi-valued).
    pub attributes: HashMap<String, Vec<String>>,
    /// Binary attributes.
    pub binary_attributes: HashMap<String, Vec<Vec<u8>>>,
}

impl DirectoryEntry {
    /// Creates an entry from an ldap3 search result.
    #[must_use]
    pub fn from_search_entry(entry: ldap3::SearchEntry) -> Self {
        Self {
            dn: entry.dn,
            attributes: entry.attrs,
            binary_attributes: entry.bin_attrs,
        }
    }

    /// Gets the first value of a text attribute.
    #[must_use]
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.get_attrs(name)
            .and_then(|v| v.first())
            .map(String::as_str)
    }

    /// Gets all values of a text attribute. Names match case-insensitively.
    #[must_use]
    pub fn get_attrs(&self, name: &str) -> Option<&Vec<String>> {
        self.attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
    }

    /// Gets all values of an attribute as raw bytes, binary or text.
    #[must_use]
    pub fn get_raw(&self, name: &str) -> Vec<Vec<u8>> {
        if let Some(values) = self
            .binary_attributes
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, values)| values)
        {
            return values.clone();
        }
        self.get_attrs(name)
            .map(|values| values.iter().map(|v| v.clone().into_bytes()).collect())
            .unwrap_or_default()
    }

    /// Checks if the entry has an attribute.
    #[must_use]
    pub fn has_attr(&self, name: &str) -> bool {
        self.get_attrs(name).is_some()
            || self
                .binary_attributes
                .keys()
                .any(|key| key.eq_ignore_ascii_case(name))
    }

    /// Checks if the entry carries every given object class.
    #[must_use]
    pub fn has_object_classes(&self, classes: &[String]) -> bool {
        let present = self.get_attrs("objectClass");
        classes.iter().all(|class| {
            present.is_some_and(|values| values.iter().any(|v| v.eq_ignore_ascii_case(class)))
        })
    }
}

/// Operations the stores need from a directory server.
///
/// Implementations must be thread-safe and support concurrent access.
#[async_trait]
pub trait DirectoryClient: Send + Sync {
    /// Adds an entry.
    async fn add(&self, dn: &str, attributes: Vec<Attribute>) -> DirectoryResult<()>;

    /// Applies modifications to an entry, all or nothing.
    async fn modify(&self, dn: &str, modifications: Vec<Modification>) -> DirectoryResult<()>;

    /// Deletes a leaf entry.
    async fn delete(&self, dn: &str) -> DirectoryResult<()>;

    /// Deletes an entry and everything beneath it.
    async fn delete_subtree(&self, dn: &str) -> DirectoryResult<()>;

    /// Runs a search. A missing base yields a `NO_SUCH_OBJECT` error.
    ///
    /// At most `size_limit` entries are read; reaching it is not an error.
    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>>;

    /// Password-modify extended operation. A wrong old password yields
    /// `INVALID_CREDENTIALS`.
    async fn password_modify(&self, dn: &str, old_password: &str, new_password: &str)
        -> DirectoryResult<()>;

    /// Reads one entry, `None` when it doesn't exist.
    async fn get_entry(&self, dn: &str) -> DirectoryResult<Option<DirectoryEntry>> {
        match self.search(&SearchRequest::base(dn)).await {
            Ok(entries) => Ok(entries.into_iter().next()),
            Err(e) if e.is_no_such_object() => Ok(None),
            Err(e) => Err(e),
        }
    }
}
