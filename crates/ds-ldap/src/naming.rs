//! Naming resolver.
//!
//! Every entry location is composed here from the tenant's branches and
//! patterns; stores never format distinguished names themselves.

use ds_model::EntityKind;
use regex::Regex;

use crate::config::TenantConfig;
use crate::error::{ConfigError, ConfigResult};

/// Computes entry locations for one tenant.
#[derive(Debug, Clone)]
pub struct NamingResolver {
    user_source: String,
    organization_source: Option<String>,
    address_source: Option<String>,
    app_source: String,
    group_source_pattern: String,
    group_manager_source_pattern: String,
    rdn: [String; 5],
}

impl NamingResolver {
    /// Creates a resolver from a tenant configuration.
    #[must_use]
    pub fn new(config: &TenantConfig) -> Self {
        Self {
            user_source: config.user_source.clone(),
            organization_source: config.organization_source.clone(),
            address_source: config.address_source.clone(),
            app_source: config.app_source.clone(),
            group_source_pattern: config.group_source_pattern.clone(),
            group_manager_source_pattern: config.group_manager_source_pattern.clone(),
            rdn: EntityKind::ALL.map(|kind| config.rdn_attribute(kind).to_string()),
        }
    }

    /// RDN attribute of an entity kind.
    #[must_use]
    pub fn rdn_attribute(&self, kind: EntityKind) -> &str {
        &self.rdn[kind_index(kind)]
    }

    /// Branch holding the entries of `kind`.
    ///
    /// Groups live under a per-application container; see
    /// [`Self::group_container`].
    pub fn container(&self, kind: EntityKind) -> ConfigResult<&str> {
        match kind {
            EntityKind::User => Ok(&self.user_source),
            EntityKind::Organization => self
                .organization_source
                .as_deref()
                .ok_or_else(|| ConfigError::Missing("organization_source".to_string())),
            EntityKind::Address => self
                .address_source
                .as_deref()
                .ok_or_else(|| ConfigError::Missing("address_source".to_string())),
            EntityKind::Application => Ok(&self.app_source),
            EntityKind::Group => Err(ConfigError::invalid(
                "group",
                "",
                "group containers depend on the application",
            )),
        }
    }

    /// Location of the entry of `kind` keyed by `key`.
    pub fn entry_location(&self, kind: EntityKind, key: &str) -> ConfigResult<String> {
        let container = self.container(kind)?;
        Ok(format!(
            "{}={},{}",
            self.rdn_attribute(kind),
            escape_dn_value(key),
            container
        ))
    }

    /// Container of an application's groups.
    #[must_use]
    pub fn group_container(&self, application: &str) -> String {
        self.expand(&self.group_source_pattern, application)
    }

    /// Location of a group of an application.
    #[must_use]
    pub fn group_location(&self, application: &str, group: &str) -> String {
        format!(
            "{}={},{}",
            self.rdn_attribute(EntityKind::Group),
            escape_dn_value(group),
            self.group_container(application)
        )
    }

    /// Location of an application's manager group.
    #[must_use]
    pub fn manager_group(&self, application: &str) -> String {
        self.expand(&self.group_manager_source_pattern, application)
    }

    /// Application owning the group at `location`, if it is one.
    #[must_use]
    pub fn application_of_group(&self, location: &str) -> Option<String> {
        let (_, parent) = split_first_rdn(location)?;
        self.capture_application(&self.group_source_pattern, parent)
    }

    /// Application whose manager group is at `location`, if it is one.
    #[must_use]
    pub fn application_of_manager_group(&self, location: &str) -> Option<String> {
        self.capture_application(&self.group_manager_source_pattern, location)
    }

    /// Checks if `location` is a user entry of this storage.
    #[must_use]
    pub fn is_user_location(&self, location: &str) -> bool {
        parent_of(location.trim()).is_some_and(|parent| same_location(parent, &self.user_source))
    }

    fn expand(&self, pattern: &str, application: &str) -> String {
        pattern
            .replace("{app_source}", &self.app_source)
            .replace("{app}", &escape_dn_value(application))
    }

    fn capture_application(&self, pattern: &str, location: &str) -> Option<String> {
        let pattern = pattern.replace("{app_source}", &self.app_source);
        let mut regex = String::from("(?i)^");
        let mut captured = false;
        for (i, literal) in pattern.split("{app}").enumerate() {
            if i > 0 {
                if captured {
                    regex.push_str(RDN_VALUE);
                } else {
                    regex.push_str(&format!("(?P<app>{RDN_VALUE})"));
                    captured = true;
                }
            }
            regex.push_str(&regex::escape(literal));
        }
        regex.push('$');

        let re = Regex::new(&regex).ok()?;
        let caps = re.captures(location.trim())?;
        caps.name("app").map(|m| unescape_dn_value(m.as_str()))
    }
}

/// An RDN value: escaped pairs or anything but a comma or backslash.
const RDN_VALUE: &str = r"(?:\\.|[^,\\])+";

const fn kind_index(kind: EntityKind) -> usize {
    match kind {
        EntityKind::User => 0,
        EntityKind::Organization => 1,
        EntityKind::Group => 2,
        EntityKind::Application => 3,
        EntityKind::Address => 4,
    }
}

/// Value of the first RDN of `location`, unescaped.
#[must_use]
pub fn key_of(location: &str) -> Option<String> {
    let (rdn, _) = split_first_rdn(location)?;
    let (_, value) = rdn.split_once('=')?;
    Some(unescape_dn_value(value.trim()))
}

/// Parent of `location`; `None` for a single-RDN location.
#[must_use]
pub fn parent_of(location: &str) -> Option<&str> {
    split_first_rdn(location)
        .map(|(_, parent)| parent)
        .filter(|parent| !parent.is_empty())
}

/// Splits `location` into its first RDN and the parent location.
fn split_first_rdn(location: &str) -> Option<(&str, &str)> {
    let mut escaped = false;
    for (i, c) in location.char_indices() {
        match c {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => return Some((&location[..i], location[i + 1..].trim_start())),
            _ => escaped = false,
        }
    }
    if location.contains('=') {
        Some((location, ""))
    } else {
        None
    }
}

/// Number of RDNs in `location`.
#[must_use]
pub fn depth(location: &str) -> usize {
    let mut count = 0;
    let mut rest = location;
    while let Some((_, parent)) = split_first_rdn(rest) {
        count += 1;
        if parent.is_empty() {
            break;
        }
        rest = parent;
    }
    count
}

/// Compares two locations RDN by RDN, ignoring case and spacing around separators.
#[must_use]
pub fn same_location(a: &str, b: &str) -> bool {
    let (mut a, mut b) = (a.trim(), b.trim());
    loop {
        match (split_first_rdn(a), split_first_rdn(b)) {
            (Some((rdn_a, rest_a)), Some((rdn_b, rest_b))) => {
                if !same_rdn(rdn_a, rdn_b) {
                    return false;
                }
                if rest_a.is_empty() || rest_b.is_empty() {
                    return rest_a.is_empty() && rest_b.is_empty();
                }
                a = rest_a;
                b = rest_b;
            }
            _ => return a.eq_ignore_ascii_case(b),
        }
    }
}

fn same_rdn(a: &str, b: &str) -> bool {
    match (a.split_once('='), b.split_once('=')) {
        (Some((name_a, value_a)), Some((name_b, value_b))) => {
            name_a.trim().eq_ignore_ascii_case(name_b.trim())
                && unescape_dn_value(value_a.trim()).to_lowercase() == unescape_dn_value(value_b.trim()).to_lowercase()
        }
        _ => a.trim().eq_ignore_ascii_case(b.trim()),
    }
}

/// Escapes an attribute value for use in a DN (RFC 4514).
#[must_use]
pub fn escape_dn_value(value: &str) -> String {
    let last = value.chars().count().saturating_sub(1);
    let mut result = String::with_capacity(value.len() * 2);

    for (i, ch) in value.chars().enumerate() {
        match ch {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                result.push('\\');
                result.push(ch);
            }
            '\0' => result.push_str("\\00"),
            ' ' if i == 0 || i == last => result.push_str("\\20"),
            '#' if i == 0 => result.push_str("\\23"),
            _ => result.push(ch),
        }
    }
    result
}

/// Reverses [`escape_dn_value`], including `\xx` hex pairs.
#[must_use]
pub fn unescape_dn_value(value: &str) -> String {
    let mut bytes = Vec::with_capacity(value.len());
    let raw = value.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() {
            let hex = raw.get(i + 1..i + 3).and_then(|pair| {
                std::str::from_utf8(pair)
                    .ok()
                    .and_then(|s| u8::from_str_radix(s, 16).ok())
            });
            if let Some(byte) = hex {
                bytes.push(byte);
                i += 3;
            } else {
                bytes.push(raw[i + 1]);
                i += 2;
            }
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}
