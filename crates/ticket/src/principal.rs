//! Resolved identities

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Attribute value attached to a principal
///
/// Attribute sources hand back either a single scalar or a set of scalars;
/// both forms deserialize into this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Single(String),
    Multi(BTreeSet<String>),
}

impl AttributeValue {
    /// All values, a single value yields a one-element iterator
    pub fn values(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            AttributeValue::Single(v) => Box::new(std::iter::once(v.as_str())),
            AttributeValue::Multi(set) => Box::new(set.iter().map(String::as_str)),
        }
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values().any(|v| v == value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        AttributeValue::Single(value.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Single(value)
    }
}

impl From<Vec<String>> for AttributeValue {
    fn from(values: Vec<String>) -> Self {
        AttributeValue::Multi(values.into_iter().collect())
    }
}

/// An authenticated identity and its attributes
///
/// Immutable once resolved; tickets share it through the owning
/// [`crate::Authentication`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    id: String,
    #[serde(default)]
    attributes: BTreeMap<String, AttributeValue>,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attributes(
        id: impl Into<String>,
        attributes: BTreeMap<String, AttributeValue>,
    ) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn attributes(&self) -> &BTreeMap<String, AttributeValue> {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}
