//! Entity kinds known to the directory store.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The fixed set of entity kinds.
///
/// Every mapping rule set, object-class list and naming pattern is keyed
/// by one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// A person.
    User,
    /// An organization people can be attached to.
    Organization,
    /// A group of users, owned by an application.
    Group,
    /// An application owning groups.
    Application,
    /// A postal address sub-entry.
    Address,
}

impl EntityKind {
    /// All kinds, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::User,
        Self::Organization,
        Self::Group,
        Self::Application,
        Self::Address,
    ];

    /// Lowercase name, as used in configuration keys.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Organization => "organization",
            Self::Group => "group",
            Self::Application => "application",
            Self::Address => "address",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEntityKind(pub String);

impl fmt::Display for UnknownEntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown entity kind '{}'", self.0)
    }
}

impl std::error::Error for UnknownEntityKind {}

impl FromStr for EntityKind {
    type Err = UnknownEntityKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownEntityKind(s.to_string()))
    }
}
