//! Locates validation errors inside a snapshot.
//!
//! Three search modes build on each other: an exact scan over every scalar
//! in the tree, an empty-field scan over collection entries, and a fuzzy
//! fallback that ranks near-miss strings when the exact scan comes back
//! empty. Whatever is found gets wrapped in an enriched context report so
//! the proposer sees sibling examples, format patterns, neighbors, and
//! cross-references instead of a bare match.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};
use tracing::{debug, info};

use crate::domain::models::document::Snapshot;
use crate::domain::models::search::{
    CrossReferences, EnrichedContext, FieldPattern, NeighborWindow, NumericStats, RelatedRecords,
    SearchClassification, SearchHit, SearchMode, SearchReport, SearchStrategy,
};

/// Minimum similarity for a fuzzy hit to be reported.
const FUZZY_THRESHOLD: f64 = 0.6;
/// Fuzzy hits are capped to the best five.
const FUZZY_LIMIT: usize = 5;
/// Bonus when one string contains the other.
const SUBSTRING_BONUS: f64 = 0.2;
/// Example values per field in the enriched context.
const EXAMPLE_LIMIT: usize = 10;
/// Sample values per format pattern.
const SAMPLE_LIMIT: usize = 5;
/// Entries on each side of a hit in a neighbor window.
const NEIGHBOR_WINDOW: usize = 3;
/// Neighbor windows and related records are capped to this many.
const RELATED_LIMIT: usize = 5;
/// Known ids listed in the related-records section.
const KNOWN_ID_LIMIT: usize = 20;

/// Collections with well-known cross-referencing semantics.
const DEMANDS: &str = "demands";
const ORDER_POSITIONS: &str = "customerOrderPositions";
const SUCCESSOR_FIELD: &str = "successor";

/// Search over a snapshot document tree.
#[derive(Debug, Clone, Default)]
pub struct SearchEngine;

impl SearchEngine {
    pub fn new() -> Self {
        Self
    }

    /// Runs the strategy against the snapshot and assembles the report.
    pub fn search(
        &self,
        document_id: &str,
        snapshot: &Snapshot,
        strategy: &SearchStrategy,
    ) -> SearchReport {
        let (hits, classification) = match (strategy.search_mode, strategy.search_value.as_deref())
        {
            (SearchMode::Value, Some(needle)) => self.value_search(snapshot, needle),
            (SearchMode::EmptyField, Some(field)) => self.empty_field_search(snapshot, field),
            // Nothing searchable in the message.
            (_, None) => (Vec::new(), SearchClassification::NoMatch),
        };

        let references = match strategy.search_value.as_deref() {
            Some(needle) if strategy.search_mode == SearchMode::Value => {
                find_references(snapshot, needle, &hits)
            }
            _ => CrossReferences::default(),
        };

        let context = self.build_context(snapshot, strategy, &hits);

        info!(
            document_id,
            mode = ?strategy.search_mode,
            query = strategy.search_value.as_deref().unwrap_or(""),
            results = hits.len(),
            classification = ?classification,
            "search finished"
        );

        SearchReport {
            document_id: document_id.to_string(),
            mode: strategy.search_mode,
            query: strategy.search_value.clone(),
            classification,
            results_count: hits.len(),
            hits,
            references,
            context,
        }
    }

    fn value_search(
        &self,
        snapshot: &Snapshot,
        needle: &str,
    ) -> (Vec<SearchHit>, SearchClassification) {
        let hits = exact_scan(snapshot, needle);
        match hits.len() {
            0 => {
                debug!(needle, "no exact match, falling back to fuzzy search");
                let fuzzy = self.fuzzy_search(snapshot, needle);
                if fuzzy.is_empty() {
                    (fuzzy, SearchClassification::NoMatch)
                } else {
                    (fuzzy, SearchClassification::FuzzyMatch)
                }
            }
            1 => (hits, SearchClassification::SingleMatch),
            _ => (hits, SearchClassification::DuplicateId),
        }
    }

    fn empty_field_search(
        &self,
        snapshot: &Snapshot,
        field: &str,
    ) -> (Vec<SearchHit>, SearchClassification) {
        // A field name that is itself an empty top-level collection is a
        // different problem than blank fields inside entries.
        if let Some(entries) = snapshot.collection(field) {
            if entries.is_empty() {
                return (Vec::new(), SearchClassification::EmptyCollection);
            }
        }

        let mut hits = Vec::new();
        for name in snapshot.collection_names() {
            let Some(entries) = snapshot.collection(name) else {
                continue;
            };
            // Only collections whose records carry the field at all; an
            // absent dueDate on an order position is not a finding.
            let field_belongs_here = entries
                .iter()
                .any(|entry| entry.as_object().is_some_and(|r| r.contains_key(field)));
            if !field_belongs_here {
                continue;
            }
            for (index, entry) in entries.iter().enumerate() {
                let Some(record) = entry.as_object() else {
                    continue;
                };
                if is_empty_field(record.get(field)) {
                    hits.push(SearchHit {
                        path: format!("{name}[{index}].{field}"),
                        collection: Some(name.to_string()),
                        entry_index: Some(index),
                        field: Some(field.to_string()),
                        value: record.get(field).cloned().unwrap_or(Value::Null),
                        parent: Some(Value::Object(record.clone())),
                        similarity: None,
                    });
                }
            }
        }

        if hits.is_empty() {
            (hits, SearchClassification::NoMatch)
        } else {
            (hits, SearchClassification::EmptyField)
        }
    }

    /// Ranks every string leaf against the needle and keeps the plausible
    /// near-misses, best first.
    fn fuzzy_search(&self, snapshot: &Snapshot, needle: &str) -> Vec<SearchHit> {
        let mut scored: Vec<SearchHit> = string_leaves(snapshot)
            .into_iter()
            .filter_map(|mut hit| {
                let candidate = hit.value.as_str()?;
                let score = similarity(needle, candidate);
                if score >= FUZZY_THRESHOLD {
                    hit.similarity = Some(score);
                    Some(hit)
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(FUZZY_LIMIT);
        scored
    }

    fn build_context(
        &self,
        snapshot: &Snapshot,
        strategy: &SearchStrategy,
        hits: &[SearchHit],
    ) -> EnrichedContext {
        let primary_collection = hits
            .iter()
            .find_map(|hit| hit.collection.clone())
            .or_else(|| {
                // For an empty collection the field name is the collection.
                (strategy.search_mode == SearchMode::EmptyField)
                    .then(|| strategy.search_value.clone())
                    .flatten()
            });

        let mut context = EnrichedContext::default();
        let Some(collection_name) = primary_collection else {
            return context;
        };
        let Some(entries) = snapshot.collection(&collection_name) else {
            return context;
        };

        context.field_examples = field_examples(entries);

        let mut pattern_fields: Vec<String> =
            hits.iter().filter_map(|hit| hit.field.clone()).collect();
        pattern_fields.sort();
        pattern_fields.dedup();
        if pattern_fields.is_empty() {
            if let Some(field) = id_field(entries) {
                pattern_fields.push(field);
            }
        }
        for field in pattern_fields {
            if let Some(pattern) = field_pattern(entries, &field) {
                context.format_patterns.insert(field, pattern);
            }
        }

        context.neighbors = neighbor_windows(entries, &collection_name, hits);
        context.related = related_records(snapshot, entries, hits);
        context
    }
}

/// Scans every scalar in the tree for an exact (case-insensitive for
/// strings, textual for numbers) occurrence of the needle.
fn exact_scan(snapshot: &Snapshot, needle: &str) -> Vec<SearchHit> {
    let mut hits = Vec::new();
    let needle_lower = needle.to_lowercase();
    for (name, value) in snapshot.root() {
        match value {
            Value::Array(entries) => {
                for (index, entry) in entries.iter().enumerate() {
                    scan_value(
                        entry,
                        &format!("{name}[{index}]"),
                        Some(name),
                        Some(index),
                        None,
                        None,
                        &needle_lower,
                        needle,
                        &mut hits,
                    );
                }
            }
            other => scan_value(
                other,
                name,
                None,
                None,
                None,
                None,
                &needle_lower,
                needle,
                &mut hits,
            ),
        }
    }
    hits
}

#[allow(clippy::too_many_arguments)]
fn scan_value(
    value: &Value,
    path: &str,
    collection: Option<&str>,
    entry_index: Option<usize>,
    field: Option<&str>,
    parent: Option<&Map<String, Value>>,
    needle_lower: &str,
    needle: &str,
    hits: &mut Vec<SearchHit>,
) {
    match value {
        Value::Object(record) => {
            for (key, child) in record {
                scan_value(
                    child,
                    &format!("{path}.{key}"),
                    collection,
                    entry_index,
                    Some(key),
                    Some(record),
                    needle_lower,
                    needle,
                    hits,
                );
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                scan_value(
                    item,
                    &format!("{path}[{index}]"),
                    collection,
                    entry_index,
                    field,
                    parent,
                    needle_lower,
                    needle,
                    hits,
                );
            }
        }
        Value::String(text) => {
            if text.to_lowercase().contains(needle_lower) {
                push_hit(hits, path, collection, entry_index, field, value, parent);
            }
        }
        Value::Number(number) => {
            if number.to_string() == needle {
                push_hit(hits, path, collection, entry_index, field, value, parent);
            }
        }
        Value::Bool(_) | Value::Null => {}
    }
}

fn push_hit(
    hits: &mut Vec<SearchHit>,
    path: &str,
    collection: Option<&str>,
    entry_index: Option<usize>,
    field: Option<&str>,
    value: &Value,
    parent: Option<&Map<String, Value>>,
) {
    hits.push(SearchHit {
        path: path.to_string(),
        collection: collection.map(ToString::to_string),
        entry_index,
        field: field.map(ToString::to_string),
        value: value.clone(),
        parent: parent.map(|record| Value::Object(record.clone())),
        similarity: None,
    });
}

/// All string leaves in the tree, as hit skeletons for fuzzy scoring.
fn string_leaves(snapshot: &Snapshot) -> Vec<SearchHit> {
    let mut leaves = Vec::new();
    for (name, value) in snapshot.root() {
        if let Value::Array(entries) = value {
            for (index, entry) in entries.iter().enumerate() {
                collect_strings(
                    entry,
                    &format!("{name}[{index}]"),
                    Some(name),
                    Some(index),
                    None,
                    None,
                    &mut leaves,
                );
            }
        }
    }
    leaves
}

fn collect_strings(
    value: &Value,
    path: &str,
    collection: Option<&str>,
    entry_index: Option<usize>,
    field: Option<&str>,
    parent: Option<&Map<String, Value>>,
    leaves: &mut Vec<SearchHit>,
) {
    match value {
        Value::Object(record) => {
            for (key, child) in record {
                collect_strings(
                    child,
                    &format!("{path}.{key}"),
                    collection,
                    entry_index,
                    Some(key),
                    Some(record),
                    leaves,
                );
            }
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                collect_strings(
                    item,
                    &format!("{path}[{index}]"),
                    collection,
                    entry_index,
                    field,
                    parent,
                    leaves,
                );
            }
        }
        Value::String(_) => push_hit(leaves, path, collection, entry_index, field, value, parent),
        _ => {}
    }
}

/// Null, absent, or whitespace-only.
fn is_empty_field(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

/// Similarity in `[0, 1]`: normalized edit distance, plus a bonus when one
/// string contains the other, capped at 1.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a_lower = a.to_lowercase();
    let b_lower = b.to_lowercase();
    let longest = a_lower.chars().count().max(b_lower.chars().count());
    if longest == 0 {
        return 1.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let normalized = levenshtein(&a_lower, &b_lower) as f64 / longest as f64;
    let mut score = 1.0 - normalized;
    if a_lower.contains(&b_lower) || b_lower.contains(&a_lower) {
        score += SUBSTRING_BONUS;
    }
    score.min(1.0)
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Up to ten distinct non-empty example values per field.
fn field_examples(entries: &[Value]) -> BTreeMap<String, Vec<Value>> {
    let mut examples: BTreeMap<String, Vec<Value>> = BTreeMap::new();
    for entry in entries {
        let Some(record) = entry.as_object() else {
            continue;
        };
        for (field, value) in record {
            if is_empty_field(Some(value)) {
                continue;
            }
            let bucket = examples.entry(field.clone()).or_default();
            if bucket.len() < EXAMPLE_LIMIT && !bucket.contains(value) {
                bucket.push(value.clone());
            }
        }
    }
    examples
}

/// The first field whose name ends in "Id", which is usually the record key.
fn id_field(entries: &[Value]) -> Option<String> {
    entries.iter().find_map(|entry| {
        entry
            .as_object()?
            .keys()
            .find(|key| key.ends_with("Id"))
            .cloned()
    })
}

fn field_pattern(entries: &[Value], field: &str) -> Option<FieldPattern> {
    let values: Vec<&str> = entries
        .iter()
        .filter_map(|entry| entry.as_object()?.get(field)?.as_str())
        .filter(|text| !text.trim().is_empty())
        .collect();
    let total_count = entries.len();
    let non_empty_count = values.len();
    if total_count == 0 {
        return None;
    }

    let sample_values: Vec<String> = values
        .iter()
        .take(SAMPLE_LIMIT)
        .map(ToString::to_string)
        .collect();
    let lengths: Vec<usize> = values.iter().map(|text| text.chars().count()).collect();

    let mut detected_patterns = Vec::new();
    if let Some(first) = values.first() {
        if let Some(prefix) = first.chars().next() {
            if prefix.is_alphabetic()
                && values.iter().all(|text| text.starts_with(prefix))
            {
                detected_patterns.push(format!("all values start with '{prefix}'"));
            }
        }
        if values.iter().all(|text| text.contains('_')) {
            detected_patterns.push("all values contain '_'".to_string());
        }
        if values.iter().all(|text| text.contains('-')) {
            detected_patterns.push("all values contain '-'".to_string());
        }
    }

    Some(FieldPattern {
        total_count,
        non_empty_count,
        sample_values,
        min_length: lengths.iter().min().copied(),
        max_length: lengths.iter().max().copied(),
        detected_patterns,
    })
}

fn neighbor_windows(
    entries: &[Value],
    collection: &str,
    hits: &[SearchHit],
) -> Vec<NeighborWindow> {
    let mut seen = Vec::new();
    let mut windows = Vec::new();
    for hit in hits {
        let Some(index) = hit.entry_index else {
            continue;
        };
        if hit.collection.as_deref() != Some(collection) || seen.contains(&index) {
            continue;
        }
        seen.push(index);
        let start = index.saturating_sub(NEIGHBOR_WINDOW);
        windows.push(NeighborWindow {
            collection: collection.to_string(),
            entry_index: index,
            before: entries[start..index].to_vec(),
            after: entries
                .iter()
                .skip(index + 1)
                .take(NEIGHBOR_WINDOW)
                .cloned()
                .collect(),
        });
        if windows.len() == RELATED_LIMIT {
            break;
        }
    }
    windows
}

fn related_records(
    snapshot: &Snapshot,
    entries: &[Value],
    hits: &[SearchHit],
) -> Option<RelatedRecords> {
    let mut related = RelatedRecords::default();

    // Records sharing the first hit's article.
    if let Some(article) = hits.iter().find_map(|hit| {
        hit.parent
            .as_ref()?
            .as_object()?
            .get("articleId")?
            .as_str()
            .map(ToString::to_string)
    }) {
        related.same_article = entries
            .iter()
            .filter(|entry| {
                entry.get("articleId").and_then(Value::as_str) == Some(article.as_str())
            })
            .take(RELATED_LIMIT)
            .cloned()
            .collect();
    }

    if let Some(stats) = numeric_stats(entries, "quantity") {
        related.numeric_ranges.insert("quantity".to_string(), stats);
    }

    if let Some(field) = id_field(entries) {
        // Keep document order; duplicates can be interleaved.
        let mut seen = BTreeSet::new();
        let mut ids: Vec<String> = entries
            .iter()
            .filter_map(|entry| entry.get(&field)?.as_str().map(ToString::to_string))
            .filter(|id| seen.insert(id.clone()))
            .collect();
        ids.truncate(KNOWN_ID_LIMIT);
        related.known_ids = ids;
    }

    // Also expose the id universe of the demands collection when the hits
    // are elsewhere; duplicate ids are usually resolved against it.
    if related.known_ids.is_empty() {
        if let Some(demands) = snapshot.collection(DEMANDS) {
            related.known_ids = demands
                .iter()
                .filter_map(|entry| entry.get("demandId")?.as_str().map(ToString::to_string))
                .take(KNOWN_ID_LIMIT)
                .collect();
        }
    }

    if related.same_article.is_empty()
        && related.numeric_ranges.is_empty()
        && related.known_ids.is_empty()
    {
        None
    } else {
        Some(related)
    }
}

fn numeric_stats(entries: &[Value], field: &str) -> Option<NumericStats> {
    let mut values: Vec<f64> = entries
        .iter()
        .filter_map(|entry| entry.get(field)?.as_f64())
        .collect();
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    let median = if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    };
    Some(NumericStats {
        min: values[0],
        max: values[values.len() - 1],
        median,
    })
}

/// Cross-references for the searched value in the well-known collections.
fn find_references(snapshot: &Snapshot, needle: &str, hits: &[SearchHit]) -> CrossReferences {
    let mut references = CrossReferences::default();
    let needle_lower = needle.to_lowercase();

    if let Some(demands) = snapshot.collection(DEMANDS) {
        for entry in demands {
            let Some(record) = entry.as_object() else {
                continue;
            };
            if let Some(successor) = record.get(SUCCESSOR_FIELD).and_then(Value::as_str) {
                if successor.to_lowercase().contains(&needle_lower) {
                    references.predecessors.push(json!({
                        "demandId": record.get("demandId").cloned().unwrap_or(Value::Null),
                        SUCCESSOR_FIELD: successor,
                    }));
                }
            }
        }

        // Demands the matched entries point forward to.
        for hit in hits {
            let Some(successor) = hit
                .parent
                .as_ref()
                .and_then(|parent| parent.get(SUCCESSOR_FIELD))
                .and_then(Value::as_str)
            else {
                continue;
            };
            for entry in demands {
                if entry.get("demandId").and_then(Value::as_str) == Some(successor) {
                    references.successors.push(entry.clone());
                }
            }
        }
    }

    if let Some(positions) = snapshot.collection(ORDER_POSITIONS) {
        references.order_positions = positions
            .iter()
            .filter(|entry| {
                entry.as_object().is_some_and(|record| {
                    record.values().any(|value| {
                        value
                            .as_str()
                            .is_some_and(|text| text.to_lowercase().contains(&needle_lower))
                    })
                })
            })
            .take(RELATED_LIMIT)
            .cloned()
            .collect();
    }

    references
}
