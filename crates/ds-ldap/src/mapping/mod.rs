//! Configuration-driven mapping between entities and directory entries.
//!
//! The engine interprets a tenant's [`MappingRuleSet`]s over the field
//! descriptors each entity declares through [`EntitySchema`]:
//!
//! - [`MappingEngine::to_entry`] builds the attributes of a new entry
//! - [`MappingEngine::to_filter_attributes`] builds the same attributes
//!   without object classes, used to derive search filters
//! - [`MappingEngine::to_object`] reads an entry back
//! - [`MappingEngine::diff`] builds the replace modifications of an update

mod rule;
mod schema;

pub use rule::{Access, MappingRule, MappingRuleSet, Transform, ATTRIBUTES_PREFIX};
pub use schema::{EntitySchema, FieldDescriptor, FieldType, FieldValue};

use std::collections::BTreeMap;

use ds_model::EntityKind;
use tracing::debug;

use crate::config::{DirectoryAttributes, TenantConfig};
use crate::directory::{Attribute, DirectoryEntry, Modification};
use crate::error::{MappingError, MappingResult};
use crate::naming::{self, NamingResolver};

/// Separator of [`Transform::Joined`] values. Values holding it are refused on write.
pub const JOINED_SEPARATOR: &str = "$";

const FLAG_TRUE: &str = "TRUE";
const FLAG_FALSE: &str = "FALSE";

/// Converts entities of every kind for one tenant.
#[derive(Debug, Clone)]
pub struct MappingEngine {
    rule_sets: BTreeMap<EntityKind, MappingRuleSet>,
    naming: NamingResolver,
    object_classes: BTreeMap<EntityKind, Vec<String>>,
    attributes: DirectoryAttributes,
}

impl MappingEngine {
    /// Creates an engine; every entity kind needs a rule set.
    pub fn new(config: &TenantConfig, rule_sets: BTreeMap<EntityKind, MappingRuleSet>) -> MappingResult<Self> {
        if let Some(kind) = EntityKind::ALL.into_iter().find(|k| !rule_sets.contains_key(k)) {
            return Err(MappingError::MissingRuleSet(kind));
        }
        Ok(Self {
            rule_sets,
            naming: NamingResolver::new(config),
            object_classes: config.object_classes.clone(),
            attributes: config.attributes.clone(),
        })
    }

    /// Rule set of an entity kind.
    pub fn rule_set(&self, kind: EntityKind) -> MappingResult<&MappingRuleSet> {
        self.rule_sets.get(&kind).ok_or(MappingError::MissingRuleSet(kind))
    }

    /// Attribute mapped to a domain field, if any.
    #[must_use]
    pub fn attribute_for(&self, kind: EntityKind, domain_field: &str) -> Option<&str> {
        self.rule_sets
            .get(&kind)
            .and_then(|set| set.rule_for(domain_field))
            .map(|rule| rule.attribute.as_str())
    }

    /// Object classes of an entity kind.
    #[must_use]
    pub fn object_classes(&self, kind: EntityKind) -> &[String] {
        self.object_classes.get(&kind).map(Vec::as_slice).unwrap_or_default()
    }

    /// Attributes of a new entry, object classes first.
    pub fn to_entry<T: EntitySchema>(&self, object: &T) -> MappingResult<Vec<Attribute>> {
        let mut attributes = vec![Attribute::object_classes(self.object_classes(T::KIND))];
        for attribute in self.to_filter_attributes(object)? {
            merge(&mut attributes, attribute);
        }
        Ok(attributes)
    }

    /// Attributes of the writable fields that hold a value.
    pub fn to_filter_attributes<T: EntitySchema>(&self, object: &T) -> MappingResult<Vec<Attribute>> {
        let mut attributes = Vec::new();
        for rule in self.rule_set(T::KIND)?.iter().filter(|r| r.is_writable()) {
            let values = self.encode(object, rule)?;
            if !values.is_empty() {
                merge(&mut attributes, Attribute::new(rule.attribute.clone(), values));
            }
        }
        Ok(attributes)
    }

    /// One replace per writable field that holds a value.
    ///
    /// Stored values are not read: fields left empty are not touched.
    pub fn diff<T: EntitySchema>(&self, object: &T) -> MappingResult<Vec<Modification>> {
        let mut modifications = Vec::new();
        for rule in self.rule_set(T::KIND)?.iter().filter(|r| r.is_writable()) {
            let values = self.encode(object, rule)?;
            if !values.is_empty() {
                modifications.push(Modification::Replace(Attribute::new(rule.attribute.clone(), values)));
            }
        }
        Ok(modifications)
    }

    /// Builds an entity from an entry. Unmapped attributes are ignored.
    pub fn to_object<T: EntitySchema>(&self, entry: &DirectoryEntry) -> MappingResult<T> {
        let mut object = T::default();
        for rule in self.rule_set(T::KIND)?.iter() {
            let raw = entry.get_raw(&rule.attribute);
            if raw.is_empty() {
                continue;
            }
            let as_list = rule.attribute_key().is_some()
                || T::fields()
                    .iter()
                    .any(|f| f.name == rule.domain_field && f.field_type == FieldType::List);
            let value = self.decode(rule, raw, as_list)?;
            match rule.attribute_key() {
                Some(key) => {
                    if let (Some(bag), FieldValue::List(values)) = (object.attributes_mut(), value) {
                        bag.insert(key.to_string(), values);
                    }
                }
                None => object.write_field(&rule.domain_field, value)?,
            }
        }
        object.after_read(entry, &self.attributes)?;
        Ok(object)
    }

    fn read<T: EntitySchema>(object: &T, rule: &MappingRule) -> Option<FieldValue> {
        match rule.attribute_key() {
            Some(key) => object
                .attributes()
                .and_then(|bag| bag.get(key))
                .filter(|values| values.iter().any(|v| !v.is_empty()))
                .map(|values| FieldValue::List(values.clone())),
            None => object.read_field(&rule.domain_field),
        }
    }

    fn encode<T: EntitySchema>(&self, object: &T, rule: &MappingRule) -> MappingResult<Vec<Vec<u8>>> {
        let Some(value) = Self::read(object, rule) else {
            return Ok(Vec::new());
        };
        let field = rule.domain_field.as_str();

        let values = match (rule.transform, value) {
            (Transform::Text, FieldValue::Text(s)) => vec![s.into_bytes()],
            (Transform::Text, FieldValue::List(v)) => {
                v.into_iter().find(|s| !s.is_empty()).map(String::into_bytes).into_iter().collect()
            }
            (Transform::TextList, FieldValue::List(v)) => v
                .into_iter()
                .filter(|s| !s.is_empty())
                .map(String::into_bytes)
                .collect(),
            (Transform::Joined, FieldValue::List(v)) => {
                if let Some(line) = v.iter().find(|line| line.contains(JOINED_SEPARATOR)) {
                    return Err(MappingError::malformed(field, line.clone()));
                }
                vec![v.join(JOINED_SEPARATOR).into_bytes()]
            }
            (Transform::Binary, FieldValue::Bytes(b)) => vec![b],
            (Transform::Flag, FieldValue::Flag(b)) => {
                vec![if b { FLAG_TRUE } else { FLAG_FALSE }.as_bytes().to_vec()]
            }
            (Transform::AddressRef, FieldValue::Text(id)) => {
                vec![self.locate(field, EntityKind::Address, &id)?.into_bytes()]
            }
            (Transform::OrganizationRef, FieldValue::Text(id)) => {
                vec![self.locate(field, EntityKind::Organization, &id)?.into_bytes()]
            }
            (Transform::MemberRefs, FieldValue::List(v)) => v
                .iter()
                .filter(|u| !u.is_empty())
                .map(|u| self.locate(field, EntityKind::User, u).map(String::into_bytes))
                .collect::<MappingResult<_>>()?,
            (transform, value) => {
                return Err(MappingError::malformed(
                    field,
                    format!("{:?} value for {transform}", value.field_type()),
                ))
            }
        };
        Ok(values)
    }

    fn decode(&self, rule: &MappingRule, raw: Vec<Vec<u8>>, as_list: bool) -> MappingResult<FieldValue> {
        let field = rule.domain_field.as_str();

        let value = match rule.transform {
            Transform::Text if as_list => FieldValue::List(vec![utf8(field, first(raw))?]),
            Transform::Text => FieldValue::Text(utf8(field, first(raw))?),
            Transform::TextList => FieldValue::List(
                raw.into_iter()
                    .map(|v| utf8(field, v))
                    .collect::<MappingResult<_>>()?,
            ),
            Transform::Joined => FieldValue::List(
                utf8(field, first(raw))?
                    .split(JOINED_SEPARATOR)
                    .map(String::from)
                    .collect(),
            ),
            Transform::Binary => FieldValue::Bytes(first(raw)),
            Transform::Flag => {
                let text = utf8(field, first(raw))?;
                if text.eq_ignore_ascii_case(FLAG_TRUE) {
                    FieldValue::Flag(true)
                } else if text.eq_ignore_ascii_case(FLAG_FALSE) {
                    FieldValue::Flag(false)
                } else {
                    return Err(MappingError::malformed(field, text));
                }
            }
            Transform::AddressRef | Transform::OrganizationRef => FieldValue::Text(reference(field, first(raw))?),
            Transform::MemberRefs => {
                let mut members = Vec::with_capacity(raw.len());
                for value in raw {
                    let location = utf8(field, value)?;
                    if !self.naming.is_user_location(&location) {
                        debug!(member = %location, "Member outside this user storage, skipped");
                        continue;
                    }
                    let key = naming::key_of(&location).ok_or_else(|| MappingError::malformed(field, location.clone()))?;
                    members.push(key);
                }
                FieldValue::List(members)
            }
        };
        Ok(value)
    }

    fn locate(&self, field: &str, kind: EntityKind, key: &str) -> MappingResult<String> {
        self.naming
            .entry_location(kind, key)
            .map_err(|e| MappingError::Location {
                field: field.to_string(),
                reason: e.to_string(),
            })
    }
}

fn merge(attributes: &mut Vec<Attribute>, attribute: Attribute) {
    match attributes
        .iter_mut()
        .find(|a| a.name.eq_ignore_ascii_case(&attribute.name))
    {
        Some(existing) => {
            for value in attribute.values {
                if !existing.values.contains(&value) {
                    existing.values.push(value);
                }
            }
        }
        None => attributes.push(attribute),
    }
}

fn utf8(field: &str, raw: Vec<u8>) -> MappingResult<String> {
    String::from_utf8(raw).map_err(|e| MappingError::malformed(field, String::from_utf8_lossy(e.as_bytes())))
}

fn reference(field: &str, raw: Vec<u8>) -> MappingResult<String> {
    let location = utf8(field, raw)?;
    naming::key_of(&location).ok_or_else(|| MappingError::malformed(field, location))
}

fn first(raw: Vec<Vec<u8>>) -> Vec<u8> {
    raw.into_iter().next().unwrap_or_default()
}
