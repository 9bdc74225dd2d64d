//! Structured target paths into a snapshot document.
//!
//! Every location a correction can touch is one of four shapes, from a whole
//! collection down to a field inside a nested array entry. Paths are parsed
//! once into [`TargetPath`] and carried as data; nothing else in the crate
//! splits path strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::errors::PathError;

/// A parsed path addressing a location inside a snapshot.
///
/// The four accepted surface forms:
///
/// - `demands` — a whole top-level collection
/// - `demands[3]` — one entry of a collection
/// - `demands[3].dueDate` — a field of an entry
/// - `demands[3].positions[1]` — an entry of a nested array field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TargetPath {
    /// `collection`
    Collection { collection: String },
    /// `collection[index]`
    Entry { collection: String, index: usize },
    /// `collection[index].field`
    Field {
        collection: String,
        index: usize,
        field: String,
    },
    /// `collection[index].field[nested_index]`
    NestedEntry {
        collection: String,
        index: usize,
        field: String,
        nested_index: usize,
    },
}

impl TargetPath {
    /// Name of the top-level collection this path starts from.
    pub fn collection(&self) -> &str {
        match self {
            Self::Collection { collection }
            | Self::Entry { collection, .. }
            | Self::Field { collection, .. }
            | Self::NestedEntry { collection, .. } => collection,
        }
    }

    /// Entry index within the top-level collection, if the path has one.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Self::Collection { .. } => None,
            Self::Entry { index, .. }
            | Self::Field { index, .. }
            | Self::NestedEntry { index, .. } => Some(*index),
        }
    }

    /// Field name within the entry, if the path has one.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::Collection { .. } | Self::Entry { .. } => None,
            Self::Field { field, .. } | Self::NestedEntry { field, .. } => Some(field),
        }
    }

    /// True for the bare `collection` form.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::Collection { .. })
    }

    /// True when the path ends in a named field or nested entry and can be
    /// the target of a field update.
    pub fn addresses_field(&self) -> bool {
        matches!(self, Self::Field { .. } | Self::NestedEntry { .. })
    }
}

fn valid_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Splits one path segment into its name and optional `[index]` suffix.
fn parse_segment(segment: &str, full: &str) -> Result<(String, Option<usize>), PathError> {
    let invalid = || PathError::InvalidSyntax(full.to_string());
    if let Some(open) = segment.find('[') {
        let name = &segment[..open];
        let rest = &segment[open + 1..];
        let close = rest.find(']').ok_or_else(invalid)?;
        if close + 1 != rest.len() || !valid_name(name) {
            return Err(invalid());
        }
        let index: usize = rest[..close].parse().map_err(|_| invalid())?;
        Ok((name.to_string(), Some(index)))
    } else if valid_name(segment) {
        Ok((segment.to_string(), None))
    } else {
        Err(invalid())
    }
}

impl FromStr for TargetPath {
    type Err = PathError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let raw = raw.trim();
        let mut segments = raw.splitn(3, '.');
        let first = segments.next().unwrap_or_default();
        let second = segments.next();
        if segments.next().is_some() {
            return Err(PathError::InvalidSyntax(raw.to_string()));
        }

        let (collection, index) = parse_segment(first, raw)?;
        match (index, second) {
            (None, None) => Ok(Self::Collection { collection }),
            (Some(index), None) => Ok(Self::Entry { collection, index }),
            (Some(index), Some(second)) => {
                let (field, nested_index) = parse_segment(second, raw)?;
                match nested_index {
                    None => Ok(Self::Field {
                        collection,
                        index,
                        field,
                    }),
                    Some(nested_index) => Ok(Self::NestedEntry {
                        collection,
                        index,
                        field,
                        nested_index,
                    }),
                }
            }
            // A field on a bare collection ("demands.dueDate") has no entry
            // to anchor it.
            (None, Some(_)) => Err(PathError::InvalidSyntax(raw.to_string())),
        }
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Collection { collection } => write!(f, "{collection}"),
            Self::Entry { collection, index } => write!(f, "{collection}[{index}]"),
            Self::Field {
                collection,
                index,
                field,
            } => write!(f, "{collection}[{index}].{field}"),
            Self::NestedEntry {
                collection,
                index,
                field,
                nested_index,
            } => write!(f, "{collection}[{index}].{field}[{nested_index}]"),
        }
    }
}

impl From<TargetPath> for String {
    fn from(path: TargetPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for TargetPath {
    type Error = PathError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}
