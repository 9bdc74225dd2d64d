//! Search strategy, hits, and the enriched context report handed to the
//! proposer alongside the validation error.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How the engine should look for the offending location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Look for a concrete value (an id, a date, a name) anywhere in the tree.
    Value,
    /// Look for a field that is null, absent, or blank.
    EmptyField,
}

/// Strategy extracted from a validation error message: what to search for
/// and how. Produced by the proposer's analysis call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchStrategy {
    pub search_mode: SearchMode,
    /// The value or field name to search for. `None` only when the message
    /// carries nothing searchable.
    pub search_value: Option<String>,
    /// Free-form category from the analysis ("duplicate_id", "missing_date", ...).
    pub error_type: String,
    #[serde(default = "default_true")]
    pub should_investigate: bool,
}

fn default_true() -> bool {
    true
}

/// What the search concluded about the error location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SearchClassification {
    /// The searched value occurs in more than one entry.
    DuplicateId,
    /// Entries with a null, absent, or blank field were found.
    EmptyField,
    /// Exactly one exact occurrence.
    SingleMatch,
    /// Nothing matched exactly; ranked near-misses are reported instead.
    FuzzyMatch,
    /// The named collection exists but holds no entries.
    EmptyCollection,
    /// Nothing matched at all.
    NoMatch,
}

/// One location where the search matched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Rendered location, e.g. `demands[4].demandId`.
    pub path: String,
    /// Top-level collection the hit sits in, when it does.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collection: Option<String>,
    /// Index of the enclosing entry within that collection.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entry_index: Option<usize>,
    /// Field the match sits in, when the match is a field value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    /// The matched value itself.
    pub value: Value,
    /// The record immediately containing the matched value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<Value>,
    /// Similarity score in `[0, 1]`; present only for fuzzy hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity: Option<f64>,
}

/// Records elsewhere in the document that point at the searched value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CrossReferences {
    /// Demands naming the searched value as their successor.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub predecessors: Vec<Value>,
    /// Demands the matched entries name as their successors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub successors: Vec<Value>,
    /// Customer order positions mentioning the searched value.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub order_positions: Vec<Value>,
}

impl CrossReferences {
    pub fn is_empty(&self) -> bool {
        self.predecessors.is_empty() && self.successors.is_empty() && self.order_positions.is_empty()
    }
}

/// Format statistics for one field across a collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPattern {
    pub total_count: usize,
    pub non_empty_count: usize,
    /// Up to five sample values.
    pub sample_values: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Human-readable format observations ("all start with 'D'", ...).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub detected_patterns: Vec<String>,
}

/// Min/max/median over a numeric field of related records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub min: f64,
    pub max: f64,
    pub median: f64,
}

/// The entries immediately around a hit in its collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeighborWindow {
    pub collection: String,
    pub entry_index: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub before: Vec<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub after: Vec<Value>,
}

/// Records related to the hits (shared article, id universe, numeric ranges).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelatedRecords {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub same_article: Vec<Value>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub numeric_ranges: BTreeMap<String, NumericStats>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub known_ids: Vec<String>,
}

/// What the fallback resolver advises when the document alone cannot supply
/// a value. Plan A (infer from the document) has no variant here: it is the
/// enriched context itself, which is always offered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "plan", rename_all = "snake_case")]
pub enum FallbackAdvice {
    /// Plan B: a reference snapshot can fill the gap wholesale.
    UseReferenceData {
        collection: String,
        entry_count: usize,
        sample_entries: Vec<Value>,
        warning: String,
    },
    /// Plan C: nothing trustworthy is available; a human has to decide.
    ManualIntervention { reason: String },
}

/// Everything the proposer gets to reason with, beyond the raw hits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichedContext {
    /// Example values per field, drawn from sibling records (up to ten each).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_examples: BTreeMap<String, Vec<Value>>,
    /// Format statistics per field of interest.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub format_patterns: BTreeMap<String, FieldPattern>,
    /// Entries around each hit.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub neighbors: Vec<NeighborWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related: Option<RelatedRecords>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback: Option<FallbackAdvice>,
}

/// The full outcome of a locate step, persisted per iteration and fed to
/// the proposer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub document_id: String,
    pub mode: SearchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    pub classification: SearchClassification,
    pub results_count: usize,
    pub hits: Vec<SearchHit>,
    #[serde(default, skip_serializing_if = "CrossReferences::is_empty")]
    pub references: CrossReferences,
    #[serde(default)]
    pub context: EnrichedContext,
}
