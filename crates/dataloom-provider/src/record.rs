//! Identifier and record model.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ProviderError, ProviderResult};

/// Identifier of a record within a resource.
///
/// Backends use either integer or string ids. The two never compare equal:
/// `1` and `"1"` are different records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Int(i64),
    Str(String),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(id) => write!(f, "{id}"),
            Identifier::Str(id) => f.write_str(id),
        }
    }
}

impl From<i64> for Identifier {
    fn from(id: i64) -> Self {
        Identifier::Int(id)
    }
}

impl From<i32> for Identifier {
    fn from(id: i32) -> Self {
        Identifier::Int(i64::from(id))
    }
}

impl From<u32> for Identifier {
    fn from(id: u32) -> Self {
        Identifier::Int(i64::from(id))
    }
}

impl From<&str> for Identifier {
    fn from(id: &str) -> Self {
        Identifier::Str(id.to_string())
    }
}

impl From<String> for Identifier {
    fn from(id: String) -> Self {
        Identifier::Str(id)
    }
}

/// A record: an identifier plus an open set of JSON fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Identifier,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a record with no fields.
    pub fn new(id: impl Into<Identifier>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    /// Adds a field, builder style.
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    /// Parses a record from a JSON object with an `id` member.
    pub fn from_value(value: Value) -> ProviderResult<Self> {
        serde_json::from_value(value).map_err(|e| ProviderError::InvalidInput {
            message: format!("not a record: {e}"),
        })
    }

    /// Returns a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Returns this record with `patch` applied on top.
    ///
    /// An `id` member in the patch is ignored; a partial update never moves
    /// a record to another identity.
    pub fn merged(&self, patch: &Map<String, Value>) -> Self {
        let mut next = self.clone();
        for (name, value) in patch {
            if name != "id" {
                next.fields.insert(name.clone(), value.clone());
            }
        }
        next
    }
}
