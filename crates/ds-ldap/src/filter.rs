//! Directory search filters.
//!
//! Filters are built as values, rendered to RFC 4515 strings for the
//! server, and evaluated in process by [`crate::directory::MemoryDirectory`].

use crate::directory::DirectoryEntry;

/// A search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// Attribute has a value equal to `value` (case-insensitive).
    Equals { attribute: String, value: String },

    /// Attribute has a value equal to the raw bytes.
    EqualsBytes { attribute: String, value: Vec<u8> },

    /// Attribute has a value containing `value` (case-insensitive).
    Contains { attribute: String, value: String },

    /// Attribute is present.
    Present { attribute: String },

    /// Logical AND of multiple filters.
    And { filters: Vec<Filter> },

    /// Logical OR of multiple filters.
    Or { filters: Vec<Filter> },

    /// Logical NOT of a filter.
    Not { filter: Box<Filter> },
}

impl Filter {
    /// Matches every entry.
    #[must_use]
    pub fn any() -> Self {
        Self::present("objectClass")
    }

    /// Create an equals filter.
    pub fn eq(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Equals {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a binary equals filter.
    pub fn eq_bytes(attribute: impl Into<String>, value: Vec<u8>) -> Self {
        Self::EqualsBytes {
            attribute: attribute.into(),
            value,
        }
    }

    /// Create a contains filter.
    pub fn contains(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Contains {
            attribute: attribute.into(),
            value: value.into(),
        }
    }

    /// Create a presence filter.
    pub fn present(attribute: impl Into<String>) -> Self {
        Self::Present {
            attribute: attribute.into(),
        }
    }

    /// AND of `filters`; a single filter is returned as is.
    #[must_use]
    pub fn and(mut filters: Vec<Filter>) -> Self {
        match filters.len() {
            0 => Self::any(),
            1 => filters.remove(0),
            _ => Self::And { filters },
        }
    }

    /// OR of `filters`; a single filter is returned as is.
    #[must_use]
    pub fn or(mut filters: Vec<Filter>) -> Self {
        match filters.len() {
            0 => Self::any(),
            1 => filters.remove(0),
            _ => Self::Or { filters },
        }
    }

    /// Negation of `filter`.
    #[must_use]
    pub fn not(filter: Filter) -> Self {
        Self::Not {
            filter: Box::new(filter),
        }
    }

    /// AND of one equality per object class.
    #[must_use]
    pub fn object_classes(classes: &[String]) -> Self {
        Self::and(
            classes
                .iter()
                .map(|class| Self::eq("objectClass", class.clone()))
                .collect(),
        )
    }

    /// Renders the RFC 4515 string form.
    #[must_use]
    pub fn to_ldap_string(&self) -> String {
        match self {
            Self::And { filters } => {
                let inner: Vec<String> = filters.iter().map(Self::to_ldap_string).collect();
                format!("(&{})", inner.join(""))
            }
            Self::Or { filters } => {
                let inner: Vec<String> = filters.iter().map(Self::to_ldap_string).collect();
                format!("(|{})", inner.join(""))
            }
            Self::Not { filter } => format!("(!{})", filter.to_ldap_string()),
            Self::Equals { attribute, value } => {
                format!("({}={})", attribute, escape_filter_value(value))
            }
            Self::EqualsBytes { attribute, value } => {
                format!("({}={})", attribute, escape_filter_bytes(value))
            }
            Self::Contains { attribute, value } => {
                format!("({}=*{}*)", attribute, escape_filter_value(value))
            }
            Self::Present { attribute } => format!("({attribute}=*)"),
        }
    }

    /// Evaluates the filter against an entry.
    #[must_use]
    pub fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Self::And { filters } => filters.iter().all(|f| f.matches(entry)),
            Self::Or { filters } => filters.iter().any(|f| f.matches(entry)),
            Self::Not { filter } => !filter.matches(entry),
            Self::Present { attribute } => entry.has_attr(attribute),
            Self::Equals { attribute, value } => entry
                .get_raw(attribute)
                .iter()
                .any(|v| String::from_utf8_lossy(v).eq_ignore_ascii_case(value)),
            Self::EqualsBytes { attribute, value } => {
                entry.get_raw(attribute).iter().any(|v| v == value)
            }
            Self::Contains { attribute, value } => {
                let needle = value.to_lowercase();
                entry
                    .get_raw(attribute)
                    .iter()
                    .any(|v| String::from_utf8_lossy(v).to_lowercase().contains(&needle))
            }
        }
    }
}

/// Escapes special characters in filter values.
#[must_use]
pub fn escape_filter_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\5c"),
            '*' => result.push_str("\\2a"),
            '(' => result.push_str("\\28"),
            ')' => result.push_str("\\29"),
            '\0' => result.push_str("\\00"),
            _ => result.push(c),
        }
    }
    result
}

/// Escapes every byte of a binary assertion value.
fn escape_filter_bytes(value: &[u8]) -> String {
    value.iter().map(|b| format!("\\{b:02x}")).collect()
}
