use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const FIELD_ID: &str = "Id";
pub const FIELD_NAME: &str = "Name";
pub const FIELD_TAGS: &str = "Tags";
pub const FIELD_OWNER: &str = "Owner";
pub const FIELD_IS_DELETED: &str = "IsDeleted";
pub const FIELD_CREATED_ON: &str = "CreatedOn";

/// Stable record identifier in its canonical string form.
///
/// The gateway hands out numeric ids for every collection; they are kept as
/// strings in memory so contacts, clients, tasks and deals share one id type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Reads an id from its wire value. Numbers and non-blank strings are accepted.
    #[must_use]
    pub fn from_wire(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => Some(Self(number.to_string())),
            Value::String(text) => {
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(Self(trimmed.to_string()))
                }
            }
            _ => None,
        }
    }

    /// Canonical integer ids go back to the gateway as JSON integers. Anything
    /// whose integer form prints differently (`"007"`, `"+5"`, `"-0"`) stays a
    /// string so it never aliases another record.
    #[must_use]
    pub fn to_wire(&self) -> Value {
        match self.0.parse::<i64>() {
            Ok(number) if number.to_string() == self.0 => Value::from(number),
            _ => Value::String(self.0.clone()),
        }
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<i64> for RecordId {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

/// A record exactly as the gateway produces or consumes it.
///
/// Provider-managed keys are capitalised (`Id`, `Name`, `Tags`, `Owner`);
/// domain keys keep whatever casing the collection schema uses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord(Map<String, Value>);

impl RawRecord {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn id(&self) -> Option<RecordId> {
        self.get(FIELD_ID).and_then(RecordId::from_wire)
    }

    /// String view of a field; absent and null values read as `""`.
    ///
    /// Lookup objects (`{"Id": 4, "Name": "Dana"}`) read as their `Name`.
    #[must_use]
    pub fn text(&self, key: &str) -> String {
        self.get(key).map(value_text).unwrap_or_default()
    }

    /// First non-empty text among `keys`.
    #[must_use]
    pub fn first_text(&self, keys: &[&str]) -> String {
        keys.iter()
            .map(|key| self.text(key))
            .find(|value| !value.is_empty())
            .unwrap_or_default()
    }

    pub fn merge(&mut self, patch: &RawRecord) {
        for (key, value) in &patch.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Keeps only `fields`; an empty selection keeps everything.
    #[must_use]
    pub fn project(&self, fields: &[&str]) -> Self {
        if fields.is_empty() {
            return self.clone();
        }
        Self(
            self.0
                .iter()
                .filter(|(key, _)| fields.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        )
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Object(map) => map
            .get(FIELD_NAME)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        Value::Null | Value::Array(_) => String::new(),
    }
}

/// Splits a comma-joined tag string. Segments are kept as written; only
/// blank segments are dropped.
#[must_use]
pub fn split_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|segment| !segment.trim().is_empty())
        .map(str::to_string)
        .collect()
}

/// Turns the free-text tag input of a form into the provider's `Tags` value.
#[must_use]
pub fn join_tag_input(input: &str) -> String {
    input
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// Renders stored tags back into editable form text.
#[must_use]
pub fn tags_to_input(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}
