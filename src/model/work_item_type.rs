use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of container a work item lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    Project,
    Group,
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Project => f.write_str("PROJECT"),
            Scope::Group => f.write_str("GROUP"),
        }
    }
}

/// Canonical work item type name.
///
/// `Other` holds types an instance reports that are not one of the nine
/// conventional ones. `Unknown` is used for types addressed directly by id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeName {
    Epic,
    Issue,
    Incident,
    Task,
    TestCase,
    Requirement,
    Objective,
    KeyResult,
    Ticket,
    Other(String),
    Unknown,
}

impl TypeName {
    pub const CONVENTIONAL: [TypeName; 9] = [
        TypeName::Epic,
        TypeName::Issue,
        TypeName::Incident,
        TypeName::Task,
        TypeName::TestCase,
        TypeName::Requirement,
        TypeName::Objective,
        TypeName::KeyResult,
        TypeName::Ticket,
    ];

    /// Parse any spelling ("Test Case", "test_case", "TEST-CASE") into a type name.
    /// Never fails: unrecognised names become `Other` with the normalized key.
    pub fn parse(input: &str) -> TypeName {
        let key = normalize_type_key(input);
        match key.as_str() {
            "EPIC" => TypeName::Epic,
            "ISSUE" => TypeName::Issue,
            "INCIDENT" => TypeName::Incident,
            "TASK" => TypeName::Task,
            "TEST_CASE" => TypeName::TestCase,
            "REQUIREMENT" => TypeName::Requirement,
            "OBJECTIVE" => TypeName::Objective,
            "KEY_RESULT" => TypeName::KeyResult,
            "TICKET" => TypeName::Ticket,
            "UNKNOWN" => TypeName::Unknown,
            _ => TypeName::Other(key),
        }
    }

    /// Uppercase, underscore-separated form; also the backend's `IssueType` enum value.
    pub fn as_key(&self) -> &str {
        match self {
            TypeName::Epic => "EPIC",
            TypeName::Issue => "ISSUE",
            TypeName::Incident => "INCIDENT",
            TypeName::Task => "TASK",
            TypeName::TestCase => "TEST_CASE",
            TypeName::Requirement => "REQUIREMENT",
            TypeName::Objective => "OBJECTIVE",
            TypeName::KeyResult => "KEY_RESULT",
            TypeName::Ticket => "TICKET",
            TypeName::Other(key) => key,
            TypeName::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_key())
    }
}

impl Serialize for TypeName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_key())
    }
}

impl<'de> Deserialize<'de> for TypeName {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(TypeName::parse(&raw))
    }
}

/// A resolved work item type for this session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemType {
    pub name: TypeName,
    pub global_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_name: Option<String>,
    /// `None` only for pass-through ids whose type is not known locally.
    pub scope: Option<Scope>,
}

/// Collapse case and separators: `"Key result"`, `"key-result"` and
/// `"KEY_RESULT"` all become `KEY_RESULT`.
pub fn normalize_type_key(input: &str) -> String {
    let mut key = String::with_capacity(input.len());
    let mut pending_sep = false;
    for ch in input.trim().chars() {
        if ch.is_whitespace() || ch == '_' || ch == '-' {
            pending_sep = !key.is_empty();
            continue;
        }
        if pending_sep {
            key.push('_');
            pending_sep = false;
        }
        key.extend(ch.to_uppercase());
    }
    key
}

/// True for opaque global ids of the form `<scheme>://<domain>/<EntityKind>/<rest>`.
/// Only the shape is checked; nothing is read out of the parts.
pub fn looks_like_global_id(input: &str) -> bool {
    let Some((scheme, rest)) = input.split_once("://") else {
        return false;
    };
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        return false;
    }
    let mut parts = rest.splitn(3, '/');
    let domain = parts.next().unwrap_or_default();
    let kind = parts.next().unwrap_or_default();
    let tail = parts.next().unwrap_or_default();
    !domain.is_empty() && !kind.is_empty() && !tail.is_empty() && !input.contains(char::is_whitespace)
}
