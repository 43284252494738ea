//! Mapping rules and rule sets.
//!
//! A rule ties one domain field to one directory attribute:
//!
//! ```text
//! field:attribute,Transform,rw|ro
//! ```
//!
//! `field` is a declared field of the entity or `attributes.<key>` for the
//! free-form attribute bag. Transform and access default to `Text` and
//! `rw`.

use std::fmt;
use std::str::FromStr;

use ds_model::EntityKind;

use super::schema::{self, FieldType};
use crate::error::{MappingError, MappingResult};

/// Prefix of rules addressing the attribute bag.
pub const ATTRIBUTES_PREFIX: &str = "attributes.";

/// Conversion applied between a field and its attribute values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// One string, one value.
    Text,
    /// String list, one value per element.
    TextList,
    /// String list joined by `$` into a single value.
    Joined,
    /// Raw bytes.
    Binary,
    /// Boolean stored as `TRUE` or `FALSE`.
    Flag,
    /// Address id stored as the address entry location.
    AddressRef,
    /// Organization id stored as the organization entry location.
    OrganizationRef,
    /// Usernames stored as user entry locations.
    MemberRefs,
}

impl Transform {
    /// Every transform.
    pub const ALL: [Self; 8] = [
        Self::Text,
        Self::TextList,
        Self::Joined,
        Self::Binary,
        Self::Flag,
        Self::AddressRef,
        Self::OrganizationRef,
        Self::MemberRefs,
    ];

    /// Name used in the textual rule form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "Text",
            Self::TextList => "TextList",
            Self::Joined => "Joined",
            Self::Binary => "Binary",
            Self::Flag => "Flag",
            Self::AddressRef => "AddressRef",
            Self::OrganizationRef => "OrganizationRef",
            Self::MemberRefs => "MemberRefs",
        }
    }

    /// Whether the attribute holds several values.
    #[must_use]
    pub const fn is_multivalued(self) -> bool {
        matches!(self, Self::TextList | Self::MemberRefs)
    }

    /// Whether the transform can carry a field of `field_type`.
    #[must_use]
    pub const fn accepts(self, field_type: FieldType) -> bool {
        match self {
            Self::Text => matches!(field_type, FieldType::Text | FieldType::List),
            Self::TextList | Self::Joined | Self::MemberRefs => matches!(field_type, FieldType::List),
            Self::Binary => matches!(field_type, FieldType::Bytes),
            Self::Flag => matches!(field_type, FieldType::Flag),
            Self::AddressRef | Self::OrganizationRef => matches!(field_type, FieldType::Text),
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Transform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown transform '{s}'"))
    }
}

/// Whether a rule takes part in writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Access {
    /// Read and written.
    #[default]
    ReadWrite,
    /// Only read; writes go through dedicated operations.
    ReadOnly,
}

impl Access {
    /// Short form used in the textual rule form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ReadWrite => "rw",
            Self::ReadOnly => "ro",
        }
    }
}

/// One field/attribute correspondence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRule {
    /// Domain field, or `attributes.<key>`.
    pub domain_field: String,
    /// Directory attribute.
    pub attribute: String,
    /// Conversion.
    pub transform: Transform,
    /// Whether the attribute holds several values.
    pub multivalued: bool,
    /// Read-write or read-only.
    pub access: Access,
}

impl MappingRule {
    /// Creates a read-write rule.
    #[must_use]
    pub fn new(domain_field: impl Into<String>, attribute: impl Into<String>, transform: Transform) -> Self {
        Self {
            domain_field: domain_field.into(),
            attribute: attribute.into(),
            transform,
            multivalued: transform.is_multivalued(),
            access: Access::ReadWrite,
        }
    }

    /// Marks the rule read-only.
    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.access = Access::ReadOnly;
        self
    }

    /// Whether the rule is emitted on writes.
    #[must_use]
    pub const fn is_writable(&self) -> bool {
        matches!(self.access, Access::ReadWrite)
    }

    /// Key in the attribute bag, for `attributes.<key>` rules.
    #[must_use]
    pub fn attribute_key(&self) -> Option<&str> {
        self.domain_field.strip_prefix(ATTRIBUTES_PREFIX)
    }
}

impl fmt::Display for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{},{},{}",
            self.domain_field,
            self.attribute,
            self.transform,
            self.access.as_str()
        )
    }
}

impl FromStr for MappingRule {
    type Err = MappingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| MappingError::InvalidRule {
            rule: s.to_string(),
            reason: reason.to_string(),
        };

        let (field, rest) = s.split_once(':').ok_or_else(|| invalid("missing ':'"))?;
        let field = field.trim();
        if field.is_empty() {
            return Err(invalid("empty field"));
        }

        let mut parts = rest.split(',').map(str::trim);
        let attribute = parts.next().unwrap_or_default();
        if attribute.is_empty() {
            return Err(invalid("empty attribute"));
        }
        let transform = match parts.next() {
            Some(t) if !t.is_empty() => t.parse::<Transform>().map_err(|e| invalid(&e))?,
            _ => Transform::Text,
        };
        let access = match parts.next().map(str::to_ascii_lowercase).as_deref() {
            None | Some("" | "rw") => Access::ReadWrite,
            Some("ro") => Access::ReadOnly,
            Some(other) => return Err(invalid(&format!("unknown access '{other}'"))),
        };
        if parts.next().is_some() {
            return Err(invalid("too many parts"));
        }

        let mut rule = Self::new(field, attribute, transform);
        rule.access = access;
        Ok(rule)
    }
}

/// Validated, immutable rules of one entity kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRuleSet {
    kind: EntityKind,
    rules: Vec<MappingRule>,
}

impl MappingRuleSet {
    /// Validates `rules` against the schema of `kind`.
    pub fn new(kind: EntityKind, rules: Vec<MappingRule>) -> MappingResult<Self> {
        for rule in &rules {
            let field_type = match rule.attribute_key() {
                Some(key) if !key.is_empty() && schema::has_attribute_bag(kind) => FieldType::List,
                Some(_) => {
                    return Err(MappingError::UnknownField {
                        kind,
                        field: rule.domain_field.clone(),
                    })
                }
                None => schema::field_type(kind, &rule.domain_field).ok_or_else(|| {
                    MappingError::UnknownField {
                        kind,
                        field: rule.domain_field.clone(),
                    }
                })?,
            };
            if !rule.transform.accepts(field_type) {
                return Err(MappingError::IncompatibleTransform {
                    kind,
                    field: rule.domain_field.clone(),
                    transform: rule.transform.to_string(),
                });
            }
        }
        Ok(Self { kind, rules })
    }

    /// Parses and validates rules in textual form.
    pub fn parse<S: AsRef<str>>(kind: EntityKind, rules: &[S]) -> MappingResult<Self> {
        let rules = rules
            .iter()
            .map(|r| r.as_ref().parse())
            .collect::<MappingResult<Vec<MappingRule>>>()?;
        Self::new(kind, rules)
    }

    /// Entity kind.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Rules in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = &MappingRule> {
        self.rules.iter()
    }

    /// Rule of a domain field.
    #[must_use]
    pub fn rule_for(&self, domain_field: &str) -> Option<&MappingRule> {
        self.rules.iter().find(|r| r.domain_field == domain_field)
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Checks if the set has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
