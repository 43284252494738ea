//! Search criteria and pagination.

use serde::{Deserialize, Serialize};

/// How free-text criteria are combined into a directory filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    /// Every criterion must match its attribute exactly.
    Exact,
    /// Every criterion must match as a substring.
    #[default]
    Substring,
    /// Any criterion may match as a substring.
    Compound,
}

/// Criteria for entity searches.
///
/// Only the fields meaningful for the searched kind are used; the others
/// are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    // === Free-text ===
    /// Username, organization identifier, group or application name.
    pub identifier: Option<String>,
    /// Common name.
    pub common_name: Option<String>,
    /// Description.
    pub description: Option<String>,
    /// Email address.
    pub mail: Option<String>,
    /// DER certificate bytes (always matched exactly).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<u8>>,
    /// How free-text criteria combine.
    #[serde(default)]
    pub search_type: SearchType,

    // === Relations ===
    /// Organization the user belongs to.
    pub organization: Option<String>,
    /// Application whose groups the user belongs to.
    pub application: Option<String>,
    /// Group (within `application`) the user belongs to.
    pub group: Option<String>,
    /// Habilitation held by the user.
    pub habilitation: Option<String>,
}

impl SearchCriteria {
    /// Creates empty criteria (matches every entry of the kind).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by identifier.
    #[must_use]
    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    /// Filters by common name.
    #[must_use]
    pub fn common_name(mut self, common_name: impl Into<String>) -> Self {
        self.common_name = Some(common_name.into());
        self
    }

    /// Filters by description.
    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Filters by email.
    #[must_use]
    pub fn mail(mut self, mail: impl Into<String>) -> Self {
        self.mail = Some(mail.into());
        self
    }

    /// Filters by certificate.
    #[must_use]
    pub fn certificate(mut self, der: Vec<u8>) -> Self {
        self.certificate = Some(der);
        self
    }

    /// Sets the search type.
    #[must_use]
    pub const fn search_type(mut self, search_type: SearchType) -> Self {
        self.search_type = search_type;
        self
    }

    /// Restricts to members of an organization.
    #[must_use]
    pub fn organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Restricts to members of an application, or of one of its groups.
    #[must_use]
    pub fn membership(mut self, application: impl Into<String>, group: Option<String>) -> Self {
        self.application = Some(application.into());
        self.group = group;
        self
    }

    /// Restricts to holders of a habilitation.
    #[must_use]
    pub fn habilitation(mut self, habilitation: impl Into<String>) -> Self {
        self.habilitation = Some(habilitation.into());
        self
    }
}

/// A page request: `size` entries starting at `offset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    /// Index of the first entry to return.
    pub offset: usize,
    /// Maximum number of entries to return.
    pub size: usize,
}

impl PageRequest {
    /// Default page size.
    pub const DEFAULT_SIZE: usize = 20;

    /// First page of the given size.
    #[must_use]
    pub const fn first(size: usize) -> Self {
        Self { offset: 0, size }
    }

    /// Page of the given size starting at `offset`.
    #[must_use]
    pub const fn at(offset: usize, size: usize) -> Self {
        Self { offset, size }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(Self::DEFAULT_SIZE)
    }
}

/// One page of search results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageResult<T> {
    /// Entries of the page.
    pub results: Vec<T>,
    /// Number of matching entries read. Searches stop one entry past the
    /// page, so this is the exact count only when `has_more_results` is false.
    pub total: usize,
    /// Page size that was requested.
    pub page_size: usize,
    /// Offset of the next page.
    pub next_offset: usize,
    /// Whether entries remain after this page.
    pub has_more_results: bool,
}

impl<T> PageResult<T> {
    /// Slices `all`, the matches read from the start of the search, according to `page`.
    #[must_use]
    pub fn from_all(all: Vec<T>, page: PageRequest) -> Self {
        let total = all.len();
        let results: Vec<T> = all.into_iter().skip(page.offset).take(page.size).collect();
        let next_offset = page.offset.saturating_add(results.len());
        Self {
            results,
            total,
            page_size: page.size,
            next_offset,
            has_more_results: next_offset < total,
        }
    }

    /// Maps every entry of the page.
    #[must_use]
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PageResult<U> {
        PageResult {
            results: self.results.into_iter().map(f).collect(),
            total: self.total,
            page_size: self.page_size,
            next_offset: self.next_offset,
            has_more_results: self.has_more_results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_page_reports_more_results() {
        let page = PageResult::from_all((0..45).collect::<Vec<_>>(), PageRequest::first(20));

        assert_eq!(page.results.len(), 20);
        assert_eq!(page.total, 45);
        assert_eq!(page.next_offset, 20);
        assert!(page.has_more_results);
    }

    #[test]
    fn last_page_is_partial() {
        let page = PageResult::from_all((0..45).collect::<Vec<_>>(), PageRequest::at(40, 20));

        assert_eq!(page.results, vec![40, 41, 42, 43, 44]);
        assert_eq!(page.next_offset, 45);
        assert!(!page.has_more_results);
    }

    #[test]
    fn offset_past_end_is_empty() {
        let page = PageResult::from_all(vec![1, 2, 3], PageRequest::at(10, 5));

        assert!(page.results.is_empty());
        assert!(!page.has_more_results);
    }

    #[test]
    fn criteria_builder() {
        let criteria = SearchCriteria::new()
            .identifier("jdo")
            .membership("Applitest", Some("Admin_Applitest".into()))
            .search_type(SearchType::Compound);

        assert_eq!(criteria.identifier.as_deref(), Some("jdo"));
        assert_eq!(criteria.group.as_deref(), Some("Admin_Applitest"));
        assert_eq!(criteria.search_type, SearchType::Compound);
    }
}
