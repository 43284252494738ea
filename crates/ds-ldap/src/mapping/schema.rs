//! Entity schemas.
//!
//! Each entity kind declares its mappable fields once, as an ordered list
//! of typed descriptors, and exposes them by name. The mapping engine is
//! generic over [`EntitySchema`] and never matches on concrete entities.

use std::collections::HashMap;

use ds_model::{Application, EntityKind, Group, Organization, PostalAddress, User};

use crate::certificate;
use crate::config::DirectoryAttributes;
use crate::directory::DirectoryEntry;
use crate::error::{MappingError, MappingResult};

/// Shape of a field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Single string.
    Text,
    /// String list.
    List,
    /// Raw bytes.
    Bytes,
    /// Boolean.
    Flag,
}

/// A field value read from or written to an entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// Single string.
    Text(String),
    /// String list.
    List(Vec<String>),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Boolean.
    Flag(bool),
}

impl FieldValue {
    /// Declared type of the value.
    #[must_use]
    pub const fn field_type(&self) -> FieldType {
        match self {
            Self::Text(_) => FieldType::Text,
            Self::List(_) => FieldType::List,
            Self::Bytes(_) => FieldType::Bytes,
            Self::Flag(_) => FieldType::Flag,
        }
    }
}

/// A declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Field name, as used in rules.
    pub name: &'static str,
    /// Value shape.
    pub field_type: FieldType,
}

const fn field(name: &'static str, field_type: FieldType) -> FieldDescriptor {
    FieldDescriptor { name, field_type }
}

/// Field access for one entity kind.
pub trait EntitySchema: Default + Send + Sync {
    /// Entity kind.
    const KIND: EntityKind;

    /// Declared fields, in order.
    fn fields() -> &'static [FieldDescriptor];

    /// Reads a declared field; `None` when unset or empty.
    fn read_field(&self, name: &str) -> Option<FieldValue>;

    /// Writes a declared field.
    fn write_field(&mut self, name: &str, value: FieldValue) -> MappingResult<()>;

    /// Free-form attribute bag, if the entity has one.
    fn attributes(&self) -> Option<&HashMap<String, Vec<String>>> {
        None
    }

    /// Mutable attribute bag, if the entity has one.
    fn attributes_mut(&mut self) -> Option<&mut HashMap<String, Vec<String>>> {
        None
    }

    /// Computes derived fields once every rule has been applied.
    fn after_read(&mut self, _entry: &DirectoryEntry, _attributes: &DirectoryAttributes) -> MappingResult<()> {
        Ok(())
    }
}

/// Type of a declared field of `kind`.
#[must_use]
pub fn field_type(kind: EntityKind, name: &str) -> Option<FieldType> {
    let fields = match kind {
        EntityKind::User => User::fields(),
        EntityKind::Organization => Organization::fields(),
        EntityKind::Group => Group::fields(),
        EntityKind::Application => Application::fields(),
        EntityKind::Address => PostalAddress::fields(),
    };
    fields.iter().find(|f| f.name == name).map(|f| f.field_type)
}

/// Whether entities of `kind` carry an attribute bag.
#[must_use]
pub const fn has_attribute_bag(kind: EntityKind) -> bool {
    !matches!(kind, EntityKind::Address)
}

fn text(value: &str) -> Option<FieldValue> {
    (!value.is_empty()).then(|| FieldValue::Text(value.to_string()))
}

fn opt_text(value: Option<&String>) -> Option<FieldValue> {
    value.and_then(|v| text(v))
}

fn list(values: &[String]) -> Option<FieldValue> {
    (!values.is_empty()).then(|| FieldValue::List(values.to_vec()))
}

fn mismatch(name: &str, value: &FieldValue) -> MappingError {
    MappingError::malformed(name, format!("{:?} value", value.field_type()))
}

fn unknown(kind: EntityKind, name: &str) -> MappingError {
    MappingError::UnknownField {
        kind,
        field: name.to_string(),
    }
}

fn into_text(name: &str, value: FieldValue) -> MappingResult<String> {
    match value {
        FieldValue::Text(s) => Ok(s),
        other => Err(mismatch(name, &other)),
    }
}

fn into_list(name: &str, value: FieldValue) -> MappingResult<Vec<String>> {
    match value {
        FieldValue::List(v) => Ok(v),
        other => Err(mismatch(name, &other)),
    }
}

fn into_bytes(name: &str, value: FieldValue) -> MappingResult<Vec<u8>> {
    match value {
        FieldValue::Bytes(b) => Ok(b),
        other => Err(mismatch(name, &other)),
    }
}

fn into_flag(name: &str, value: FieldValue) -> MappingResult<bool> {
    match value {
        FieldValue::Flag(b) => Ok(b),
        other => Err(mismatch(name, &other)),
    }
}

/// Sets the id of an owned address, keeping its lines.
fn set_address_id(address: &mut Option<PostalAddress>, id: String) {
    address.get_or_insert_with(PostalAddress::default).id = Some(id);
}

impl EntitySchema for User {
    const KIND: EntityKind = EntityKind::User;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[
            field("username", FieldType::Text),
            field("last_name", FieldType::Text),
            field("first_name", FieldType::Text),
            field("mail", FieldType::Text),
            field("password_reset", FieldType::Flag),
            field("habilitations", FieldType::List),
            field("address", FieldType::Text),
            field("organization", FieldType::Text),
            field("certificate", FieldType::Bytes),
        ];
        FIELDS
    }

    fn read_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "username" => text(&self.username),
            "last_name" => opt_text(self.last_name.as_ref()),
            "first_name" => opt_text(self.first_name.as_ref()),
            "mail" => opt_text(self.mail.as_ref()),
            "password_reset" => self.password_reset.map(FieldValue::Flag),
            "habilitations" => list(&self.habilitations),
            "address" => opt_text(self.address.as_ref().and_then(|a| a.id.as_ref())),
            "organization" => opt_text(self.organization.as_ref()),
            "certificate" => self
                .certificate
                .as_ref()
                .filter(|c| !c.is_empty())
                .map(|c| FieldValue::Bytes(c.clone())),
            _ => None,
        }
    }

    fn write_field(&mut self, name: &str, value: FieldValue) -> MappingResult<()> {
        match name {
            "username" => self.username = into_text(name, value)?,
            "last_name" => self.last_name = Some(into_text(name, value)?),
            "first_name" => self.first_name = Some(into_text(name, value)?),
            "mail" => self.mail = Some(into_text(name, value)?),
            "password_reset" => self.password_reset = Some(into_flag(name, value)?),
            "habilitations" => self.habilitations = into_list(name, value)?,
            "address" => set_address_id(&mut self.address, into_text(name, value)?),
            "organization" => self.organization = Some(into_text(name, value)?),
            "certificate" => self.certificate = Some(into_bytes(name, value)?),
            _ => return Err(unknown(Self::KIND, name)),
        }
        Ok(())
    }

    fn attributes(&self) -> Option<&HashMap<String, Vec<String>>> {
        Some(&self.attributes)
    }

    fn attributes_mut(&mut self) -> Option<&mut HashMap<String, Vec<String>>> {
        Some(&mut self.attributes)
    }

    fn after_read(&mut self, entry: &DirectoryEntry, attributes: &DirectoryAttributes) -> MappingResult<()> {
        let der = match &self.certificate {
            Some(der) => Some(der.clone()),
            None => entry.get_raw(&attributes.certificate).into_iter().next(),
        };
        if let Some(der) = der.filter(|d| !d.is_empty()) {
            let properties = entry.get_attrs(&attributes.properties).cloned().unwrap_or_default();
            self.metadata.certificate = Some(certificate::metadata(&der, &properties)?);
        }
        Ok(())
    }
}

impl EntitySchema for Organization {
    const KIND: EntityKind = EntityKind::Organization;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[
            field("identifier", FieldType::Text),
            field("address", FieldType::Text),
            field("organization", FieldType::Text),
            field("gpg_key", FieldType::Bytes),
        ];
        FIELDS
    }

    fn read_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "identifier" => text(&self.identifier),
            "address" => opt_text(self.address.as_ref().and_then(|a| a.id.as_ref())),
            "organization" => opt_text(self.organization.as_ref()),
            "gpg_key" => self
                .gpg_key
                .as_ref()
                .filter(|k| !k.is_empty())
                .map(|k| FieldValue::Bytes(k.clone())),
            _ => None,
        }
    }

    fn write_field(&mut self, name: &str, value: FieldValue) -> MappingResult<()> {
        match name {
            "identifier" => self.identifier = into_text(name, value)?,
            "address" => set_address_id(&mut self.address, into_text(name, value)?),
            "organization" => self.organization = Some(into_text(name, value)?),
            "gpg_key" => self.gpg_key = Some(into_bytes(name, value)?),
            _ => return Err(unknown(Self::KIND, name)),
        }
        Ok(())
    }

    fn attributes(&self) -> Option<&HashMap<String, Vec<String>>> {
        Some(&self.attributes)
    }

    fn attributes_mut(&mut self) -> Option<&mut HashMap<String, Vec<String>>> {
        Some(&mut self.attributes)
    }
}

impl EntitySchema for Group {
    const KIND: EntityKind = EntityKind::Group;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[
            field("name", FieldType::Text),
            field("description", FieldType::Text),
            field("members", FieldType::List),
        ];
        FIELDS
    }

    fn read_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => text(&self.name),
            "description" => opt_text(self.description.as_ref()),
            "members" => list(&self.members),
            _ => None,
        }
    }

    fn write_field(&mut self, name: &str, value: FieldValue) -> MappingResult<()> {
        match name {
            "name" => self.name = into_text(name, value)?,
            "description" => self.description = Some(into_text(name, value)?),
            "members" => self.members = into_list(name, value)?,
            _ => return Err(unknown(Self::KIND, name)),
        }
        Ok(())
    }

    fn attributes(&self) -> Option<&HashMap<String, Vec<String>>> {
        Some(&self.attributes)
    }

    fn attributes_mut(&mut self) -> Option<&mut HashMap<String, Vec<String>>> {
        Some(&mut self.attributes)
    }
}

impl EntitySchema for Application {
    const KIND: EntityKind = EntityKind::Application;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[field("name", FieldType::Text)];
        FIELDS
    }

    fn read_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "name" => text(&self.name),
            _ => None,
        }
    }

    fn write_field(&mut self, name: &str, value: FieldValue) -> MappingResult<()> {
        match name {
            "name" => self.name = into_text(name, value)?,
            _ => return Err(unknown(Self::KIND, name)),
        }
        Ok(())
    }

    fn attributes(&self) -> Option<&HashMap<String, Vec<String>>> {
        Some(&self.attributes)
    }

    fn attributes_mut(&mut self) -> Option<&mut HashMap<String, Vec<String>>> {
        Some(&mut self.attributes)
    }
}

impl EntitySchema for PostalAddress {
    const KIND: EntityKind = EntityKind::Address;

    fn fields() -> &'static [FieldDescriptor] {
        const FIELDS: &[FieldDescriptor] = &[field("id", FieldType::Text), field("lines", FieldType::List)];
        FIELDS
    }

    fn read_field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => opt_text(self.id.as_ref()),
            "lines" => self.is_not_empty().then(|| FieldValue::List(self.lines.clone())),
            _ => None,
        }
    }

    fn write_field(&mut self, name: &str, value: FieldValue) -> MappingResult<()> {
        match name {
            "id" => self.id = Some(into_text(name, value)?),
            "lines" => self.lines = into_list(name, value)?,
            _ => return Err(unknown(Self::KIND, name)),
        }
        Ok(())
    }
}
