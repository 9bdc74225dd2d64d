//! Snapshot document model.
//!
//! A snapshot is a JSON object whose top-level fields are typically arrays
//! of records ("collections"): demands, articles, customer order positions.
//! The engine never imposes a schema on the records themselves; everything
//! below the collection level stays dynamic JSON.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An in-memory planning snapshot, owned by a correction session while a
/// pipeline mutates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    root: Map<String, Value>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root object, keyed by collection name.
    pub fn root(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.root
    }

    /// A top-level collection as an array of records, if it exists and is
    /// an array.
    pub fn collection(&self, name: &str) -> Option<&Vec<Value>> {
        self.root.get(name)?.as_array()
    }

    pub fn collection_mut(&mut self, name: &str) -> Option<&mut Vec<Value>> {
        self.root.get_mut(name)?.as_array_mut()
    }

    /// Names of all top-level fields that hold arrays.
    pub fn collection_names(&self) -> Vec<&str> {
        self.root
            .iter()
            .filter(|(_, value)| value.is_array())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn contains_collection(&self, name: &str) -> bool {
        self.collection(name).is_some()
    }

    /// The full document as a JSON value, for upload and backups.
    pub fn to_value(&self) -> Value {
        Value::Object(self.root.clone())
    }
}

impl From<Map<String, Value>> for Snapshot {
    fn from(root: Map<String, Value>) -> Self {
        Self { root }
    }
}
