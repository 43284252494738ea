//! Application domain model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::group::Group;

/// An application and the groups it owns.
///
/// Applications live in a realm-wide container shared by every user
/// storage of the realm.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Application {
    /// Application name, unique within the realm.
    pub name: String,
    /// Groups owned by the application.
    #[serde(default)]
    pub groups: Vec<Group>,
    /// Custom attributes.
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,
}

impl Application {
    /// Creates an application without groups.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Adds a group, stamping it with this application's name.
    #[must_use]
    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.push(Group {
            app_name: self.name.clone(),
            ..group
        });
        self
    }

    /// Finds a group by name, ignoring case.
    #[must_use]
    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name.eq_ignore_ascii_case(name))
    }
}
