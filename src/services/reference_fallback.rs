//! Tiered sourcing of correction values when a collection is empty.
//!
//! Plan A: infer from the document itself (the enriched context is the
//! vehicle; it never blocks). Plan B: replace the collection wholesale
//! from a configured reference snapshot, behind an explicit switch and
//! always flagged as provisional. Plan C: give up and demand a human.

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::models::document::Snapshot;
use crate::domain::models::search::FallbackAdvice;

/// Sample entries included with a Plan B advisory.
const SAMPLE_LIMIT: usize = 3;

/// Decides, for an empty collection, where a correction value may come from.
#[derive(Debug, Clone, Default)]
pub struct ReferenceFallbackResolver {
    reference: Option<Snapshot>,
    enabled: bool,
}

impl ReferenceFallbackResolver {
    /// A resolver with no reference snapshot; only Plans A and C remain.
    pub fn new(enabled: bool) -> Self {
        Self {
            reference: None,
            enabled,
        }
    }

    pub fn with_reference(enabled: bool, reference: Snapshot) -> Self {
        Self {
            reference: Some(reference),
            enabled,
        }
    }

    /// Whether Plan B may be advised at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Reference entries for a collection, for the applier's wholesale
    /// replacement.
    pub fn reference_collection(&self, collection: &str) -> Option<&Vec<Value>> {
        self.reference.as_ref()?.collection(collection)
    }

    /// Advice for an empty `collection` in the given document.
    pub fn resolve(&self, collection: &str) -> FallbackAdvice {
        // Plan A is informational: the enriched context is always offered
        // to the proposer regardless of what this returns.
        info!(collection, "collection is empty, considering fallback plans");

        if !self.enabled {
            return FallbackAdvice::ManualIntervention {
                reason: format!(
                    "collection '{collection}' is empty and the reference data fallback \
                     is disabled by configuration"
                ),
            };
        }

        match self.reference_collection(collection) {
            Some(entries) if !entries.is_empty() => {
                warn!(
                    collection,
                    entry_count = entries.len(),
                    "advising wholesale replacement from reference data; \
                     the result must be treated as provisional"
                );
                FallbackAdvice::UseReferenceData {
                    collection: collection.to_string(),
                    entry_count: entries.len(),
                    sample_entries: entries.iter().take(SAMPLE_LIMIT).cloned().collect(),
                    warning: format!(
                        "values for '{collection}' come from reference data, not from \
                         this document; review before trusting downstream plans"
                    ),
                }
            }
            Some(_) => FallbackAdvice::ManualIntervention {
                reason: format!(
                    "collection '{collection}' is empty and the reference snapshot \
                     has no entries for it either"
                ),
            },
            None => FallbackAdvice::ManualIntervention {
                reason: format!(
                    "collection '{collection}' is empty and no reference snapshot \
                     is configured"
                ),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reference() -> Snapshot {
        serde_json::from_value(json!({
            "dispatcherGroups": [
                {"groupId": "G1"},
                {"groupId": "G2"},
                {"groupId": "G3"},
                {"groupId": "G4"}
            ],
            "emptyToo": []
        }))
        .unwrap()
    }

    #[test]
    fn disabled_resolver_always_advises_manual_intervention() {
        let resolver = ReferenceFallbackResolver::with_reference(false, reference());
        let advice = resolver.resolve("dispatcherGroups");
        match advice {
            FallbackAdvice::ManualIntervention { reason } => {
                assert!(reason.contains("disabled by configuration"));
            }
            other => panic!("expected manual intervention, got {other:?}"),
        }
    }

    #[test]
    fn enabled_resolver_advises_reference_data_with_warning() {
        let resolver = ReferenceFallbackResolver::with_reference(true, reference());
        match resolver.resolve("dispatcherGroups") {
            FallbackAdvice::UseReferenceData {
                collection,
                entry_count,
                sample_entries,
                warning,
            } => {
                assert_eq!(collection, "dispatcherGroups");
                assert_eq!(entry_count, 4);
                assert_eq!(sample_entries.len(), 3);
                assert!(warning.contains("provisional"));
            }
            other => panic!("expected reference data advice, got {other:?}"),
        }
    }

    #[test]
    fn empty_reference_collection_falls_through_to_plan_c() {
        let resolver = ReferenceFallbackResolver::with_reference(true, reference());
        assert!(matches!(
            resolver.resolve("emptyToo"),
            FallbackAdvice::ManualIntervention { .. }
        ));
        assert!(matches!(
            resolver.resolve("unknownCollection"),
            FallbackAdvice::ManualIntervention { .. }
        ));
    }

    #[test]
    fn missing_reference_snapshot_is_plan_c() {
        let resolver = ReferenceFallbackResolver::new(true);
        match resolver.resolve("dispatcherGroups") {
            FallbackAdvice::ManualIntervention { reason } => {
                assert!(reason.contains("no reference snapshot"));
            }
            other => panic!("expected manual intervention, got {other:?}"),
        }
    }
}
