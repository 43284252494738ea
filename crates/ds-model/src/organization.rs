//! Organization domain model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::address::PostalAddress;

/// An organization users can be attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organization {
    // === Identity ===
    /// Organization identifier, unique within its storage.
    pub identifier: String,

    // === References ===
    /// Postal address, stored as a sub-entry.
    pub address: Option<PostalAddress>,
    /// Identifier of the parent organization.
    pub organization: Option<String>,

    // === Keys ===
    /// Public GPG key (raw bytes).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpg_key: Option<Vec<u8>>,

    // === Custom Attributes ===
    /// Custom attributes.
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl Organization {
    /// Creates an organization with the given identifier.
    #[must_use]
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..Self::default()
        }
    }

    /// Sets the postal address.
    #[must_use]
    pub fn with_address(mut self, address: PostalAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Sets the parent organization.
    #[must_use]
    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.organization = Some(parent.into());
        self
    }

    /// Sets a single-valued custom attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), vec![value.into()]);
        self
    }
}
