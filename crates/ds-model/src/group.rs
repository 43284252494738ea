//! Group domain model.
//!
//! Groups always belong to an application. Their membership is the list
//! of usernames stored on the group entry; users see the reverse view
//! through [`crate::User::groups`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A group of users owned by an application.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group name, unique within its application.
    pub name: String,
    /// Human readable description.
    pub description: Option<String>,
    /// Name of the owning application.
    pub app_name: String,
    /// Usernames of the members.
    pub members: Vec<String>,
    /// Custom attributes.
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl Group {
    /// Creates a group in the given application.
    #[must_use]
    pub fn new(app_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            app_name: app_name.into(),
            ..Self::default()
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Whether `username` is listed as a member.
    #[must_use]
    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m.eq_ignore_ascii_case(username))
    }
}
