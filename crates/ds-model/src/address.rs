//! Postal address model.

use serde::{Deserialize, Serialize};

/// Number of lines a postal address carries.
pub const ADDRESS_LINES: usize = 7;

/// A postal address stored as its own sub-entry.
///
/// Users and organizations reference an address by id; the address entry
/// holds the lines.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostalAddress {
    /// Address identifier, generated when the address is first written.
    pub id: Option<String>,
    /// Address lines, in display order.
    pub lines: Vec<String>,
}

impl PostalAddress {
    /// Creates an address without an id from the given lines.
    #[must_use]
    pub fn new(lines: Vec<String>) -> Self {
        Self { id: None, lines }
    }

    /// Sets the address id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Whether at least one line carries text.
    ///
    /// Empty addresses are never written as sub-entries.
    #[must_use]
    pub fn is_not_empty(&self) -> bool {
        self.lines.iter().any(|line| !line.trim().is_empty())
    }

    /// Lines padded (or truncated) to [`ADDRESS_LINES`] entries.
    #[must_use]
    pub fn padded_lines(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.lines.iter().take(ADDRESS_LINES).cloned().collect();
        lines.resize(ADDRESS_LINES, String::new());
        lines
    }
}
