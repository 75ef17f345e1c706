//! Record and query types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A stored record: an id, a type and a bag of JSON properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub record_type: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, record_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            record_type: record_type.into(),
            properties: Map::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name).filter(|v| !v.is_null())
    }

    /// A property holding JSON `null` counts as absent.
    pub fn has_property(&self, name: &str) -> bool {
        self.property(name).is_some()
    }

    pub fn set_property(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.properties.insert(name.into(), value.into());
    }

    pub fn remove_property(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }
}

/// Selects candidate records: the conjunction of every predicate that is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrollQuery {
    pub record_type: Option<String>,
    pub with_property: Option<String>,
    pub without_property: Option<String>,
}

impl ScrollQuery {
    /// A query matching every record.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    pub fn with_property(mut self, name: impl Into<String>) -> Self {
        self.with_property = Some(name.into());
        self
    }

    pub fn without_property(mut self, name: impl Into<String>) -> Self {
        self.without_property = Some(name.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(ref record_type) = self.record_type {
            if &record.record_type != record_type {
                return false;
            }
        }
        if let Some(ref name) = self.with_property {
            if !record.has_property(name) {
                return false;
            }
        }
        if let Some(ref name) = self.without_property {
            if record.has_property(name) {
                return false;
            }
        }
        true
    }
}
