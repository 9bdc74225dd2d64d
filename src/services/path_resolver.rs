//! Resolution of [`TargetPath`]s against a live snapshot.
//!
//! Resolution is lazy: a path is just data until one of these functions
//! walks the document, and every structural assumption (collection exists,
//! index in range, entry is a record) is re-checked at call time against
//! the document as it is now.

use serde_json::Value;

use crate::domain::errors::{PathError, PathResult};
use crate::domain::models::document::Snapshot;
use crate::domain::models::path::TargetPath;

/// Read, write, and delete operations addressed by a [`TargetPath`].
pub struct PathResolver;

impl PathResolver {
    /// Reads the value the path addresses.
    pub fn get<'a>(snapshot: &'a Snapshot, path: &TargetPath) -> PathResult<&'a Value> {
        match path {
            TargetPath::Collection { collection } => {
                collection_value(snapshot, collection).map(|(value, _)| value)
            }
            TargetPath::Entry { collection, index } => entry(snapshot, collection, *index),
            TargetPath::Field {
                collection,
                index,
                field,
            } => {
                let record = record(snapshot, collection, *index)?;
                record.get(field).ok_or_else(|| PathError::UnknownField {
                    path: format!("{collection}[{index}]"),
                    field: field.clone(),
                })
            }
            TargetPath::NestedEntry {
                collection,
                index,
                field,
                nested_index,
            } => {
                let items = nested_array(snapshot, collection, *index, field)?;
                items
                    .get(*nested_index)
                    .ok_or_else(|| PathError::IndexOutOfRange {
                        container: format!("{collection}[{index}].{field}"),
                        index: *nested_index,
                        len: items.len(),
                    })
            }
        }
    }

    /// Writes `value` at the path, returning whatever it displaced.
    ///
    /// Setting a field that does not exist yet creates it; everything
    /// above the leaf must already exist. Setting a bare collection path
    /// replaces the whole array.
    pub fn set(
        snapshot: &mut Snapshot,
        path: &TargetPath,
        value: Value,
    ) -> PathResult<Option<Value>> {
        match path {
            TargetPath::Collection { collection } => {
                // Verify the target is an existing array before replacing it.
                collection_value(snapshot, collection)?;
                Ok(snapshot.root_mut().insert(collection.clone(), value))
            }
            TargetPath::Entry { collection, index } => {
                let slot = entry_mut(snapshot, collection, *index)?;
                Ok(Some(std::mem::replace(slot, value)))
            }
            TargetPath::Field {
                collection,
                index,
                field,
            } => {
                let record = record_mut(snapshot, collection, *index)?;
                Ok(record.insert(field.clone(), value))
            }
            TargetPath::NestedEntry {
                collection,
                index,
                field,
                nested_index,
            } => {
                let items = nested_array_mut(snapshot, collection, *index, field)?;
                let slot = checked_slot(items, *nested_index, || {
                    format!("{collection}[{index}].{field}")
                })?;
                Ok(Some(std::mem::replace(slot, value)))
            }
        }
    }

    /// Removes and returns the value the path addresses. Whole collections
    /// cannot be deleted.
    pub fn delete(snapshot: &mut Snapshot, path: &TargetPath) -> PathResult<Value> {
        match path {
            TargetPath::Collection { collection } => Err(PathError::CannotDeleteCollection {
                collection: collection.clone(),
            }),
            TargetPath::Entry { collection, index } => {
                let entries = collection_array_mut(snapshot, collection)?;
                if *index >= entries.len() {
                    return Err(PathError::IndexOutOfRange {
                        container: collection.clone(),
                        index: *index,
                        len: entries.len(),
                    });
                }
                Ok(entries.remove(*index))
            }
            TargetPath::Field {
                collection,
                index,
                field,
            } => {
                let record = record_mut(snapshot, collection, *index)?;
                record.remove(field).ok_or_else(|| PathError::UnknownField {
                    path: format!("{collection}[{index}]"),
                    field: field.clone(),
                })
            }
            TargetPath::NestedEntry {
                collection,
                index,
                field,
                nested_index,
            } => {
                let items = nested_array_mut(snapshot, collection, *index, field)?;
                if *nested_index >= items.len() {
                    return Err(PathError::IndexOutOfRange {
                        container: format!("{collection}[{index}].{field}"),
                        index: *nested_index,
                        len: items.len(),
                    });
                }
                Ok(items.remove(*nested_index))
            }
        }
    }
}

fn collection_value<'a>(
    snapshot: &'a Snapshot,
    collection: &str,
) -> PathResult<(&'a Value, &'a Vec<Value>)> {
    let value = snapshot
        .root()
        .get(collection)
        .ok_or_else(|| PathError::UnknownCollection {
            collection: collection.to_string(),
        })?;
    let entries = value.as_array().ok_or_else(|| PathError::NotAnArray {
        path: collection.to_string(),
    })?;
    Ok((value, entries))
}

fn collection_array_mut<'a>(
    snapshot: &'a mut Snapshot,
    collection: &str,
) -> PathResult<&'a mut Vec<Value>> {
    let value = snapshot
        .root_mut()
        .get_mut(collection)
        .ok_or_else(|| PathError::UnknownCollection {
            collection: collection.to_string(),
        })?;
    value.as_array_mut().ok_or_else(|| PathError::NotAnArray {
        path: collection.to_string(),
    })
}

fn entry<'a>(snapshot: &'a Snapshot, collection: &str, index: usize) -> PathResult<&'a Value> {
    let (_, entries) = collection_value(snapshot, collection)?;
    entries.get(index).ok_or_else(|| PathError::IndexOutOfRange {
        container: collection.to_string(),
        index,
        len: entries.len(),
    })
}

fn entry_mut<'a>(
    snapshot: &'a mut Snapshot,
    collection: &str,
    index: usize,
) -> PathResult<&'a mut Value> {
    let entries = collection_array_mut(snapshot, collection)?;
    checked_slot(entries, index, || collection.to_string())
}

fn checked_slot<'a>(
    items: &'a mut Vec<Value>,
    index: usize,
    container: impl Fn() -> String,
) -> PathResult<&'a mut Value> {
    let len = items.len();
    items.get_mut(index).ok_or_else(|| PathError::IndexOutOfRange {
        container: container(),
        index,
        len,
    })
}

fn record<'a>(
    snapshot: &'a Snapshot,
    collection: &str,
    index: usize,
) -> PathResult<&'a serde_json::Map<String, Value>> {
    entry(snapshot, collection, index)?
        .as_object()
        .ok_or_else(|| PathError::NotARecord {
            path: format!("{collection}[{index}]"),
        })
}

fn record_mut<'a>(
    snapshot: &'a mut Snapshot,
    collection: &str,
    index: usize,
) -> PathResult<&'a mut serde_json::Map<String, Value>> {
    entry_mut(snapshot, collection, index)?
        .as_object_mut()
        .ok_or_else(|| PathError::NotARecord {
            path: format!("{collection}[{index}]"),
        })
}

fn nested_array<'a>(
    snapshot: &'a Snapshot,
    collection: &str,
    index: usize,
    field: &str,
) -> PathResult<&'a Vec<Value>> {
    let rec = record(snapshot, collection, index)?;
    let value = rec.get(field).ok_or_else(|| PathError::UnknownField {
        path: format!("{collection}[{index}]"),
        field: field.to_string(),
    })?;
    value.as_array().ok_or_else(|| PathError::NotAnArray {
        path: format!("{collection}[{index}].{field}"),
    })
}

fn nested_array_mut<'a>(
    snapshot: &'a mut Snapshot,
    collection: &str,
    index: usize,
    field: &str,
) -> PathResult<&'a mut Vec<Value>> {
    let path = format!("{collection}[{index}].{field}");
    let rec = record_mut(snapshot, collection, index)?;
    let value = rec.get_mut(field).ok_or_else(|| PathError::UnknownField {
        path: format!("{collection}[{index}]"),
        field: field.to_string(),
    })?;
    value
        .as_array_mut()
        .ok_or_else(|| PathError::NotAnArray { path })
}
