//! In-process directory.
//!
//! Keeps a tree of entries in memory and answers with the result codes a
//! directory server would: 68 on duplicate adds, 32 on missing entries
//! and bases, 66 when deleting a non-leaf, 20 and 16 on value conflicts,
//! 49 on a wrong old password.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use super::{result_code, Attribute, DirectoryClient, DirectoryEntry, Modification, SearchRequest, SearchScope};
use crate::error::{DirectoryError, DirectoryResult};
use crate::naming;

/// A directory held in memory.
#[derive(Debug)]
pub struct MemoryDirectory {
    entries: RwLock<BTreeMap<String, StoredEntry>>,
    password_attribute: String,
    returned: AtomicUsize,
}

#[derive(Debug, Clone)]
struct StoredEntry {
    dn: String,
    attributes: Vec<Attribute>,
}

impl StoredEntry {
    fn attribute_mut(&mut self, name: &str) -> Option<&mut Attribute> {
        self.attributes
            .iter_mut()
            .find(|a| a.name.eq_ignore_ascii_case(name))
    }

    fn values(&self, name: &str) -> &[Vec<u8>] {
        self.attributes
            .iter()
            .find(|a| a.name.eq_ignore_ascii_case(name))
            .map(|a| a.values.as_slice())
            .unwrap_or_default()
    }

    fn remove(&mut self, name: &str) -> bool {
        let before = self.attributes.len();
        self.attributes.retain(|a| !a.name.eq_ignore_ascii_case(name));
        self.attributes.len() != before
    }

    fn to_entry(&self) -> DirectoryEntry {
        let mut entry = DirectoryEntry {
            dn: self.dn.clone(),
            ..DirectoryEntry::default()
        };
        for attribute in &self.attributes {
            let text = if attribute.name.to_ascii_lowercase().ends_with(";binary") {
                None
            } else {
                attribute
                    .values
                    .iter()
                    .map(|v| String::from_utf8(v.clone()).ok())
                    .collect::<Option<Vec<_>>>()
            };
            match text {
                Some(values) => {
                    entry.attributes.insert(attribute.name.clone(), values);
                }
                None => {
                    entry
                        .binary_attributes
                        .insert(attribute.name.clone(), attribute.values.clone());
                }
            }
        }
        entry
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDirectory {
    /// Creates an empty directory checking passwords in `userPassword`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            password_attribute: "userPassword".to_string(),
            returned: AtomicUsize::new(0),
        }
    }

    /// Sets the attribute checked by the password-modify operation.
    #[must_use]
    pub fn with_password_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.password_attribute = attribute.into();
        self
    }

    /// Creates `dn` and its missing ancestors as plain containers.
    pub fn ensure_branch(&self, dn: &str) {
        let mut entries = self.entries.write();
        let mut missing = Vec::new();
        let mut current = Some(dn);
        while let Some(location) = current {
            if entries.contains_key(&key(location)) {
                break;
            }
            missing.push(location.to_string());
            current = naming::parent_of(location);
        }
        for location in missing.into_iter().rev() {
            let mut attributes = vec![Attribute::text("objectClass", ["top", "organizationalUnit"])];
            add_naming_attribute(&location, &mut attributes);
            entries.insert(
                key(&location),
                StoredEntry {
                    dn: location,
                    attributes,
                },
            );
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Checks if the directory holds no entry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Checks if an entry exists.
    #[must_use]
    pub fn contains(&self, dn: &str) -> bool {
        self.entries.read().contains_key(&key(dn))
    }

    /// Number of entries returned by searches so far.
    #[must_use]
    pub fn entries_returned(&self) -> usize {
        self.returned.load(Ordering::Relaxed)
    }

    /// Reads an entry without going through a search.
    #[must_use]
    pub fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        self.entries.read().get(&key(dn)).map(StoredEntry::to_entry)
    }
}

#[async_trait]
impl DirectoryClient for MemoryDirectory {
    async fn add(&self, dn: &str, attributes: Vec<Attribute>) -> DirectoryResult<()> {
        let mut entries = self.entries.write();
        let k = key(dn);
        if entries.contains_key(&k) {
            return Err(DirectoryError::operation(dn, result_code::ENTRY_ALREADY_EXISTS, "Entry already exists"));
        }
        if let Some(parent) = naming::parent_of(dn) {
            if !entries.contains_key(&key(parent)) {
                return Err(DirectoryError::operation(dn, result_code::NO_SUCH_OBJECT, "Parent does not exist"));
            }
        }

        let mut stored = StoredEntry {
            dn: dn.to_string(),
            attributes: Vec::new(),
        };
        for attribute in attributes.into_iter().filter(|a| !a.values.is_empty()) {
            match stored.attribute_mut(&attribute.name) {
                Some(existing) => existing.values.extend(attribute.values),
                None => stored.attributes.push(attribute),
            }
        }
        add_naming_attribute(dn, &mut stored.attributes);

        debug!(dn = %dn, "Entry added");
        entries.insert(k, stored);
        Ok(())
    }

    async fn modify(&self, dn: &str, modifications: Vec<Modification>) -> DirectoryResult<()> {
        let mut entries = self.entries.write();
        let Some(current) = entries.get(&key(dn)) else {
            return Err(no_such_object(dn));
        };

        let mut updated = current.clone();
        for modification in modifications {
            apply(&mut updated, modification)?;
        }

        entries.insert(key(dn), updated);
        Ok(())
    }

    async fn delete(&self, dn: &str) -> DirectoryResult<()> {
        let mut entries = self.entries.write();
        let k = key(dn);
        if !entries.contains_key(&k) {
            return Err(no_such_object(dn));
        }
        if entries.keys().any(|other| is_below(other, &k)) {
            return Err(DirectoryError::operation(
                dn,
                result_code::NOT_ALLOWED_ON_NON_LEAF,
                "Entry has children",
            ));
        }
        entries.remove(&k);
        debug!(dn = %dn, "Entry deleted");
        Ok(())
    }

    async fn delete_subtree(&self, dn: &str) -> DirectoryResult<()> {
        let mut entries = self.entries.write();
        let k = key(dn);
        if !entries.contains_key(&k) {
            return Err(no_such_object(dn));
        }
        let before = entries.len();
        entries.retain(|other, _| other != &k && !is_below(other, &k));
        debug!(dn = %dn, removed = before - entries.len(), "Subtree deleted");
        Ok(())
    }

    async fn search(&self, request: &SearchRequest) -> DirectoryResult<Vec<DirectoryEntry>> {
        let entries = self.entries.read();
        let base = key(&request.base);
        if !entries.contains_key(&base) {
            return Err(no_such_object(&request.base));
        }

        let in_scope = |k: &str, stored: &StoredEntry| match request.scope {
            SearchScope::Base => k == base,
            SearchScope::OneLevel => naming::parent_of(&stored.dn).is_some_and(|p| key(p) == base),
            SearchScope::Subtree => k == base || is_below(k, &base),
        };

        let found: Vec<DirectoryEntry> = entries
            .iter()
            .filter(|(k, stored)| in_scope(k.as_str(), stored))
            .map(|(_, stored)| stored.to_entry())
            .filter(|entry| request.filter.matches(entry))
            .take(request.size_limit.unwrap_or(usize::MAX))
            .collect();
        self.returned.fetch_add(found.len(), Ordering::Relaxed);
        Ok(found)
    }

    async fn password_modify(&self, dn: &str, old_password: &str, new_password: &str) -> DirectoryResult<()> {
        let mut entries = self.entries.write();
        let Some(stored) = entries.get_mut(&key(dn)) else {
            return Err(no_such_object(dn));
        };
        if !stored
            .values(&self.password_attribute)
            .iter()
            .any(|v| v.as_slice() == old_password.as_bytes())
        {
            return Err(DirectoryError::operation(
                dn,
                result_code::INVALID_CREDENTIALS,
                "Invalid credentials",
            ));
        }
        stored.remove(&self.password_attribute);
        stored
            .attributes
            .push(Attribute::text(self.password_attribute.clone(), [new_password]));
        Ok(())
    }
}

fn key(dn: &str) -> String {
    dn.trim().to_lowercase()
}

fn is_below(candidate: &str, base: &str) -> bool {
    candidate.len() > base.len() + 1
        && candidate.ends_with(base)
        && candidate.as_bytes()[candidate.len() - base.len() - 1] == b','
}

fn no_such_object(dn: &str) -> DirectoryError {
    DirectoryError::operation(dn, result_code::NO_SUCH_OBJECT, "No such object")
}

fn same_value(a: &[u8], b: &[u8]) -> bool {
    a == b
        || matches!(
            (std::str::from_utf8(a), std::str::from_utf8(b)),
            (Ok(a), Ok(b)) if a.eq_ignore_ascii_case(b)
        )
}

fn add_naming_attribute(dn: &str, attributes: &mut Vec<Attribute>) {
    let Some(rdn_attribute) = dn.split_once('=').map(|(name, _)| name.trim()) else {
        return;
    };
    let Some(value) = naming::key_of(dn) else {
        return;
    };
    match attributes
        .iter_mut()
        .find(|a| a.name.eq_ignore_ascii_case(rdn_attribute))
    {
        Some(existing) => {
            if !existing.values.iter().any(|v| same_value(v, value.as_bytes())) {
                existing.values.push(value.into_bytes());
            }
        }
        None => attributes.push(Attribute::text(rdn_attribute, [value])),
    }
}

fn apply(entry: &mut StoredEntry, modification: Modification) -> DirectoryResult<()> {
    let dn = entry.dn.clone();
    match modification {
        Modification::Add(attribute) => {
            if attribute.values.is_empty() {
                return Ok(());
            }
            let Some(existing) = entry.attribute_mut(&attribute.name) else {
                entry.attributes.push(attribute);
                return Ok(());
            };
            for value in attribute.values {
                if existing.values.iter().any(|v| same_value(v, &value)) {
                    return Err(DirectoryError::operation(
                        dn,
                        result_code::ATTRIBUTE_OR_VALUE_EXISTS,
                        format!("Value already present in {}", attribute.name),
                    ));
                }
                existing.values.push(value);
            }
        }
        Modification::Delete(attribute) => {
            if attribute.values.is_empty() {
                if !entry.remove(&attribute.name) {
                    return Err(no_such_attribute(dn, &attribute.name));
                }
                return Ok(());
            }
            let Some(existing) = entry.attribute_mut(&attribute.name) else {
                return Err(no_such_attribute(dn, &attribute.name));
            };
            for value in &attribute.values {
                let Some(position) = existing.values.iter().position(|v| same_value(v, value)) else {
                    return Err(no_such_attribute(dn, &attribute.name));
                };
                existing.values.remove(position);
            }
            if existing.values.is_empty() {
                entry.remove(&attribute.name);
            }
        }
        Modification::Replace(attribute) => {
            entry.remove(&attribute.name);
            if !attribute.values.is_empty() {
                entry.attributes.push(attribute);
            }
        }
    }
    Ok(())
}

fn no_such_attribute(dn: String, attribute: &str) -> DirectoryError {
    DirectoryError::operation(
        dn,
        result_code::NO_SUCH_ATTRIBUTE,
        format!("No such value in {attribute}"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::Filter;

    const PEOPLE: &str = "ou=people,o=example";

    fn directory() -> MemoryDirectory {
        let directory = MemoryDirectory::new();
        directory.ensure_branch(PEOPLE);
        directory
    }

    fn person(uid: &str) -> Vec<Attribute> {
        vec![
            Attribute::text("objectClass", ["top", "inetOrgPerson"]),
            Attribute::text("uid", [uid]),
            Attribute::text("userPassword", ["secret"]),
        ]
    }

    fn code(err: DirectoryError) -> Option<u32> {
        err.result_code()
    }

    #[tokio::test]
    async fn ensure_branch_creates_ancestors() {
        let directory = directory();

        assert!(directory.contains("o=example"));
        assert!(directory.contains("OU=People,O=Example"));
        assert_eq!(directory.len(), 2);
        assert_eq!(directory.entry(PEOPLE).unwrap().get_attr("ou"), Some("people"));
    }

    #[tokio::test]
    async fn add_checks_duplicates_and_parent() {
        let directory = directory();
        let dn = "uid=jdoe,ou=people,o=example";

        directory.add(dn, person("jdoe")).await.unwrap();

        let duplicate = directory.add(dn, person("jdoe")).await.unwrap_err();
        assert_eq!(code(duplicate), Some(result_code::ENTRY_ALREADY_EXISTS));

        let orphan = directory.add("uid=x,ou=nowhere,o=example", person("x")).await.unwrap_err();
        assert_eq!(code(orphan), Some(result_code::NO_SUCH_OBJECT));
    }

    #[tokio::test]
    async fn value_conflicts_use_result_codes() {
        let directory = directory();
        let dn = "uid=jdoe,ou=people,o=example";
        directory.add(dn, person("jdoe")).await.unwrap();

        let add = Modification::Add(Attribute::text("mail", ["jdoe@example.org"]));
        directory.modify(dn, vec![add.clone()]).await.unwrap();
        let again = directory.modify(dn, vec![add]).await.unwrap_err();
        assert_eq!(code(again), Some(result_code::ATTRIBUTE_OR_VALUE_EXISTS));

        let missing = Modification::Delete(Attribute::text("mail", ["other@example.org"]));
        let err = directory.modify(dn, vec![missing]).await.unwrap_err();
        assert_eq!(code(err), Some(result_code::NO_SUCH_ATTRIBUTE));

        let err = directory.modify("uid=ghost,ou=people,o=example", vec![]).await.unwrap_err();
        assert_eq!(code(err), Some(result_code::NO_SUCH_OBJECT));
    }

    #[tokio::test]
    async fn modify_is_all_or_nothing() {
        let directory = directory();
        let dn = "uid=jdoe,ou=people,o=example";
        directory.add(dn, person("jdoe")).await.unwrap();

        let result = directory
            .modify(
                dn,
                vec![
                    Modification::Replace(Attribute::text("sn", ["Doe"])),
                    Modification::Delete(Attribute::text("description", ["none"])),
                ],
            )
            .await;

        assert!(result.is_err());
        assert!(!directory.entry(dn).unwrap().has_attr("sn"));
    }

    #[tokio::test]
    async fn delete_requires_leaf() {
        let directory = directory();
        directory
            .add("uid=jdoe,ou=people,o=example", person("jdoe"))
            .await
            .unwrap();

        let err = directory.delete(PEOPLE).await.unwrap_err();
        assert_eq!(code(err), Some(result_code::NOT_ALLOWED_ON_NON_LEAF));

        directory.delete_subtree(PEOPLE).await.unwrap();
        assert!(!directory.contains("uid=jdoe,ou=people,o=example"));
        assert!(directory.contains("o=example"));
    }

    #[tokio::test]
    async fn search_honors_scope_and_filter() {
        let directory = directory();
        directory.ensure_branch("ou=archive,ou=people,o=example");
        for uid in ["jdoe", "asmith"] {
            directory
                .add(&format!("uid={uid},ou=people,o=example"), person(uid))
                .await
                .unwrap();
        }
        directory
            .add("uid=old,ou=archive,ou=people,o=example", person("old"))
            .await
            .unwrap();

        let people = Filter::eq("objectClass", "inetOrgPerson");
        let one = directory
            .search(&SearchRequest::one_level(PEOPLE, people.clone()))
            .await
            .unwrap();
        let all = directory
            .search(&SearchRequest::subtree(PEOPLE, people))
            .await
            .unwrap();
        assert_eq!(one.len(), 2);
        assert_eq!(all.len(), 3);

        let limited = directory
            .search(&SearchRequest::subtree(PEOPLE, Filter::eq("objectClass", "inetOrgPerson")).with_size_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(directory.entries_returned(), 7);

        let err = directory
            .search(&SearchRequest::base("ou=missing,o=example"))
            .await
            .unwrap_err();
        assert!(err.is_no_such_object());
        assert!(directory.get_entry("ou=missing,o=example").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn password_modify_checks_old_password() {
        let directory = directory();
        let dn = "uid=jdoe,ou=people,o=example";
        directory.add(dn, person("jdoe")).await.unwrap();

        let err = directory.password_modify(dn, "wrong", "new").await.unwrap_err();
        assert_eq!(code(err), Some(result_code::INVALID_CREDENTIALS));

        directory.password_modify(dn, "secret", "new").await.unwrap();
        assert_eq!(directory.entry(dn).unwrap().get_attr("userPassword"), Some("new"));
    }

    #[tokio::test]
    async fn binary_values_stay_binary() {
        let directory = directory();
        let dn = "uid=jdoe,ou=people,o=example";
        let mut attributes = person("jdoe");
        attributes.push(Attribute::new("userCertificate;binary", vec![b"abc".to_vec()]));
        directory.add(dn, attributes).await.unwrap();

        let entry = directory.entry(dn).unwrap();
        assert_eq!(entry.binary_attributes["userCertificate;binary"], vec![b"abc".to_vec()]);
        assert!(entry.get_attrs("userCertificate;binary").is_none());
    }
}
