//! User domain model.
//!
//! Users are the primary identity entities of a user storage. They may
//! own a postal address, reference an organization and belong to groups
//! of any application of the realm.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::address::PostalAddress;
use crate::group::Group;

/// Details parsed from a user's X.509 certificate.
///
/// Computed at read time, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateMetadata {
    /// Correlation id recovered from the user's properties, if recorded.
    pub id: Option<String>,
    /// Issuer distinguished name.
    pub issuer: String,
    /// Subject distinguished name.
    pub subject: String,
    /// End of the validity period.
    pub expiration: DateTime<Utc>,
    /// Whether the certificate was within its validity period when read.
    pub valid: bool,
}

/// Derived, non-persisted user fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserMetadata {
    /// Parsed certificate details, when the user holds a certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<CertificateMetadata>,
}

/// A person stored in a user storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    // === Identity ===
    /// Unique username within the user storage.
    pub username: String,

    // === Profile ===
    /// Last name.
    pub last_name: Option<String>,
    /// First name.
    pub first_name: Option<String>,
    /// Email address.
    pub mail: Option<String>,
    /// Whether the user must change their password at next login.
    pub password_reset: Option<bool>,

    // === Authorization ===
    /// Habilitations, as `property_role_application` strings.
    #[serde(default)]
    pub habilitations: Vec<String>,
    /// Group memberships. Derived at read time from the group side.
    #[serde(default)]
    pub groups: Vec<Group>,

    // === References ===
    /// Postal address, stored as an owned sub-entry.
    pub address: Option<PostalAddress>,
    /// Identifier of the organization the user belongs to.
    pub organization: Option<String>,

    // === Credentials ===
    /// DER-encoded X.509 certificate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Vec<u8>>,

    // === Custom Attributes ===
    /// Custom attributes, addressed by `attributes.<key>` in mapping rules.
    #[serde(default)]
    pub attributes: HashMap<String, Vec<String>>,

    // === Derived ===
    /// Read-time metadata.
    #[serde(default)]
    pub metadata: UserMetadata,
}

impl User {
    /// Creates a user with the given username.
    #[must_use]
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            ..Self::default()
        }
    }

    /// Sets first and last name.
    #[must_use]
    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }

    /// Sets the email address.
    #[must_use]
    pub fn with_mail(mut self, mail: impl Into<String>) -> Self {
        self.mail = Some(mail.into());
        self
    }

    /// Sets the postal address.
    #[must_use]
    pub fn with_address(mut self, address: PostalAddress) -> Self {
        self.address = Some(address);
        self
    }

    /// Sets the organization reference.
    #[must_use]
    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    /// Sets the certificate.
    #[must_use]
    pub fn with_certificate(mut self, der: Vec<u8>) -> Self {
        self.certificate = Some(der);
        self
    }

    /// Adds a habilitation.
    #[must_use]
    pub fn with_habilitation(mut self, habilitation: impl Into<String>) -> Self {
        self.habilitations.push(habilitation.into());
        self
    }

    /// Sets a custom attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, values: Vec<String>) -> Self {
        self.attributes.insert(key.into(), values);
        self
    }

    /// Gets the first value of a custom attribute.
    #[must_use]
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether the user belongs to `group` of `application` (case-insensitive).
    #[must_use]
    pub fn is_member_of(&self, application: &str, group: &str) -> bool {
        self.groups.iter().any(|g| {
            g.app_name.eq_ignore_ascii_case(application) && g.name.eq_ignore_ascii_case(group)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let user = User::new("jdoe")
            .with_name("John", "Doe")
            .with_mail("john.doe@example.org")
            .with_organization("insee")
            .with_attribute("common_name", vec!["John Doe".into()]);

        assert_eq!(user.username, "jdoe");
        assert_eq!(user.first_name.as_deref(), Some("John"));
        assert_eq!(user.mail.as_deref(), Some("john.doe@example.org"));
        assert_eq!(user.organization.as_deref(), Some("insee"));
        assert_eq!(user.attribute("common_name"), Some("John Doe"));
        assert_eq!(user.attribute("missing"), None);
    }

    #[test]
    fn membership_lookup_ignores_case() {
        let mut user = User::new("jdoe");
        user.groups.push(Group::new("Applitest", "Admin_Applitest"));

        assert!(user.is_member_of("applitest", "admin_applitest"));
        assert!(!user.is_member_of("applitest", "Reader_Applitest"));
    }

    #[test]
    fn metadata_is_omitted_when_empty() {
        let json = serde_json::to_value(User::new("jdoe")).unwrap();
        assert_eq!(json["metadata"], serde_json::json!({}));
        assert!(json.get("certificate").is_none());
    }
}
