//! Applies gated correction proposals to an in-memory snapshot.
//!
//! The applier re-validates the action/path pairing even though the gate
//! already did; a proposal that was admissible when gated can still be
//! wrong for the document as it stands now. All mutations go through
//! [`PathResolver`], and the audit record captures every displaced value.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::errors::{PatchError, PatchResult};
use crate::domain::models::document::Snapshot;
use crate::domain::models::path::TargetPath;
use crate::domain::models::proposal::{
    AppliedPatch, AppliedUpdate, CorrectionAction, CorrectionProposal, USE_REFERENCE_DATA,
};
use crate::services::path_resolver::PathResolver;
use crate::services::reference_fallback::ReferenceFallbackResolver;

/// Applies proposals to snapshots.
#[derive(Debug, Clone, Default)]
pub struct PatchApplier;

impl PatchApplier {
    pub fn new() -> Self {
        Self
    }

    /// Applies the proposal's action and its additional updates, in order.
    /// The caller is responsible for taking a backup first.
    pub fn apply(
        &self,
        snapshot: &mut Snapshot,
        proposal: &CorrectionProposal,
        fallback: &ReferenceFallbackResolver,
    ) -> PatchResult<AppliedPatch> {
        let mut patch = match &proposal.action {
            CorrectionAction::UpdateField {
                target_path,
                new_value,
                ..
            } => self.update_field(snapshot, target_path, new_value, fallback)?,
            CorrectionAction::AddToArray {
                target_path,
                new_value,
                ..
            } => self.add_to_array(snapshot, target_path, new_value)?,
            CorrectionAction::RemoveFromArray {
                target_path,
                current_value,
                ..
            } => self.remove_from_array(snapshot, target_path, current_value.as_ref())?,
            CorrectionAction::ManualInterventionRequired {
                target_path,
                reasoning,
            } => {
                info!(
                    target_path,
                    "manual intervention requested, document left untouched"
                );
                return Ok(AppliedPatch {
                    action: proposal.action.kind().to_string(),
                    target_path: target_path.clone(),
                    old_value: None,
                    new_value: None,
                    additional_updates: Vec::new(),
                    manual_intervention: true,
                    note: Some(reasoning.clone()),
                    applied_at: Utc::now(),
                });
            }
        };

        for update in proposal.action.additional_updates() {
            let path: TargetPath = update.target_path.parse()?;
            if !path.addresses_field() {
                return Err(PatchError::NotAFieldPath(update.target_path.clone()));
            }
            let value = coerce_json_string(&update.new_value);
            let old = PathResolver::set(snapshot, &path, value.clone())?;
            debug!(target_path = %path, "applied additional update");
            patch.additional_updates.push(AppliedUpdate {
                target_path: update.target_path.clone(),
                old_value: old,
                new_value: value,
            });
        }

        info!(
            action = %patch.action,
            target_path = %patch.target_path,
            additional = patch.additional_updates.len(),
            "patch applied"
        );
        Ok(patch)
    }

    fn update_field(
        &self,
        snapshot: &mut Snapshot,
        target_path: &str,
        new_value: &Value,
        fallback: &ReferenceFallbackResolver,
    ) -> PatchResult<AppliedPatch> {
        let path: TargetPath = target_path.parse()?;
        let value = coerce_json_string(new_value);

        if path.is_collection() {
            // The only legal collection-level update is the reference data
            // sentinel asking for wholesale replacement.
            if value.as_str() != Some(USE_REFERENCE_DATA) {
                return Err(PatchError::NotAFieldPath(target_path.to_string()));
            }
            return self.replace_from_reference(snapshot, &path, fallback);
        }

        if !path.addresses_field() {
            return Err(PatchError::NotAFieldPath(target_path.to_string()));
        }

        let old = PathResolver::set(snapshot, &path, value.clone())?;
        Ok(AppliedPatch {
            action: "update_field".to_string(),
            target_path: target_path.to_string(),
            old_value: old,
            new_value: Some(value),
            additional_updates: Vec::new(),
            manual_intervention: false,
            note: None,
            applied_at: Utc::now(),
        })
    }

    fn replace_from_reference(
        &self,
        snapshot: &mut Snapshot,
        path: &TargetPath,
        fallback: &ReferenceFallbackResolver,
    ) -> PatchResult<AppliedPatch> {
        let collection = path.collection();
        let entries = fallback
            .reference_collection(collection)
            .filter(|entries| !entries.is_empty())
            .cloned()
            .ok_or_else(|| PatchError::MissingReferenceData {
                collection: collection.to_string(),
            })?;

        warn!(
            collection,
            entry_count = entries.len(),
            "replacing collection from reference data"
        );
        let old = PathResolver::set(snapshot, path, Value::Array(entries.clone()))?;
        Ok(AppliedPatch {
            action: "update_field".to_string(),
            target_path: path.to_string(),
            old_value: old,
            new_value: Some(Value::Array(entries)),
            additional_updates: Vec::new(),
            manual_intervention: false,
            note: Some(format!(
                "collection '{collection}' was filled from reference data and must be \
                 reviewed before downstream plans rely on it"
            )),
            applied_at: Utc::now(),
        })
    }

    fn add_to_array(
        &self,
        snapshot: &mut Snapshot,
        target_path: &str,
        new_value: &Value,
    ) -> PatchResult<AppliedPatch> {
        let path: TargetPath = target_path.parse()?;
        if !path.is_collection() {
            return Err(PatchError::NotACollectionPath {
                action: "add_to_array".to_string(),
                path: target_path.to_string(),
            });
        }
        let value = coerce_json_string(new_value);
        if !value.is_object() {
            return Err(PatchError::NewValueNotARecord);
        }

        // Existence and array-ness checks come from the resolver.
        let mut entries = PathResolver::get(snapshot, &path)?
            .as_array()
            .cloned()
            .unwrap_or_default();
        entries.push(value.clone());
        PathResolver::set(snapshot, &path, Value::Array(entries))?;

        Ok(AppliedPatch {
            action: "add_to_array".to_string(),
            target_path: target_path.to_string(),
            old_value: None,
            new_value: Some(value),
            additional_updates: Vec::new(),
            manual_intervention: false,
            note: None,
            applied_at: Utc::now(),
        })
    }

    fn remove_from_array(
        &self,
        snapshot: &mut Snapshot,
        target_path: &str,
        predicate: Option<&Value>,
    ) -> PatchResult<AppliedPatch> {
        let path: TargetPath = target_path.parse()?;
        let removed = match &path {
            // Explicit index in the path.
            TargetPath::Entry { .. } | TargetPath::NestedEntry { .. } => {
                PathResolver::delete(snapshot, &path)?
            }
            // Bare collection: remove the first entry matching the predicate.
            TargetPath::Collection { collection } => {
                let predicate = predicate
                    .and_then(Value::as_object)
                    .ok_or(PatchError::PredicateNotARecord)?;
                let entries =
                    PathResolver::get(snapshot, &path)?
                        .as_array()
                        .cloned()
                        .unwrap_or_default();
                let position = entries
                    .iter()
                    .position(|entry| {
                        predicate
                            .iter()
                            .all(|(key, value)| entry.get(key) == Some(value))
                    })
                    .ok_or_else(|| PatchError::NoMatchingEntry {
                        collection: collection.clone(),
                    })?;
                let index_path = TargetPath::Entry {
                    collection: collection.clone(),
                    index: position,
                };
                PathResolver::delete(snapshot, &index_path)?
            }
            TargetPath::Field { .. } => {
                return Err(PatchError::NotACollectionPath {
                    action: "remove_from_array".to_string(),
                    path: target_path.to_string(),
                })
            }
        };

        Ok(AppliedPatch {
            action: "remove_from_array".to_string(),
            target_path: target_path.to_string(),
            old_value: Some(removed),
            new_value: None,
            additional_updates: Vec::new(),
            manual_intervention: false,
            note: None,
            applied_at: Utc::now(),
        })
    }
}

/// Proposers sometimes deliver structured values as embedded JSON text.
/// Strings that look like JSON arrays or objects and parse cleanly are
/// unwrapped; everything else passes through untouched.
fn coerce_json_string(value: &Value) -> Value {
    if let Some(text) = value.as_str() {
        let trimmed = text.trim_start();
        if trimmed.starts_with('[') || trimmed.starts_with('{') {
            if let Ok(parsed) = serde_json::from_str::<Value>(text) {
                debug!("coerced JSON-in-string value");
                return parsed;
            }
        }
    }
    value.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::proposal::{AdditionalUpdate, ErrorAnalysis};
    use crate::domain::models::search::SearchMode;
    use crate::domain::models::validation::ValidationMessage;
    use serde_json::json;

    fn snapshot() -> Snapshot {
        serde_json::from_value(json!({
            "demands": [
                {"demandId": "D1", "quantity": 10},
                {"demandId": "D1", "quantity": 20},
                {"demandId": "D3", "quantity": 30}
            ],
            "dispatcherGroups": []
        }))
        .unwrap()
    }

    fn proposal(action: CorrectionAction) -> CorrectionProposal {
        CorrectionProposal {
            iteration: 1,
            document_id: "snap-1".into(),
            original_error: ValidationMessage::error("Duplicate demand id 'D1'"),
            error_analyzed: ErrorAnalysis {
                search_mode: SearchMode::Value,
                search_value: Some("D1".into()),
                error_type: "duplicate_id".into(),
                results_count: 2,
            },
            action,
        }
    }

    fn no_fallback() -> ReferenceFallbackResolver {
        ReferenceFallbackResolver::new(false)
    }

    fn update(target: &str, new_value: Value) -> CorrectionAction {
        CorrectionAction::UpdateField {
            target_path: target.into(),
            current_value: None,
            new_value,
            reasoning: "test".into(),
            additional_updates: vec![],
        }
    }

    #[test]
    fn updates_a_field_and_records_the_old_value() {
        let mut doc = snapshot();
        let patch = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(update("demands[1].demandId", json!("D1_2"))),
                &no_fallback(),
            )
            .unwrap();
        assert_eq!(patch.old_value, Some(json!("D1")));
        assert_eq!(patch.new_value, Some(json!("D1_2")));
        assert_eq!(doc.collection("demands").unwrap()[1]["demandId"], "D1_2");
        assert!(!patch.manual_intervention);
    }

    #[test]
    fn unwraps_json_carried_as_text() {
        let mut doc = snapshot();
        PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(update(
                    "demands[0].positions",
                    json!("[{\"pos\": 1}, {\"pos\": 2}]"),
                )),
                &no_fallback(),
            )
            .unwrap();
        let positions = &doc.collection("demands").unwrap()[0]["positions"];
        assert!(positions.is_array());
        assert_eq!(positions.as_array().unwrap().len(), 2);
    }

    #[test]
    fn malformed_json_text_stays_a_string() {
        let mut doc = snapshot();
        PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(update("demands[0].note", json!("{not json"))),
                &no_fallback(),
            )
            .unwrap();
        assert_eq!(doc.collection("demands").unwrap()[0]["note"], "{not json");
    }

    #[test]
    fn update_field_rejects_non_field_paths() {
        let mut doc = snapshot();
        let err = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(update("demands[1]", json!("D1_2"))),
                &no_fallback(),
            )
            .unwrap_err();
        assert!(matches!(err, PatchError::NotAFieldPath(_)));
    }

    #[test]
    fn sentinel_replaces_collection_from_reference() {
        let reference: Snapshot = serde_json::from_value(json!({
            "dispatcherGroups": [{"groupId": "G1"}, {"groupId": "G2"}]
        }))
        .unwrap();
        let fallback = ReferenceFallbackResolver::with_reference(true, reference);
        let mut doc = snapshot();
        let patch = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(update("dispatcherGroups", json!(USE_REFERENCE_DATA))),
                &fallback,
            )
            .unwrap();
        assert_eq!(doc.collection("dispatcherGroups").unwrap().len(), 2);
        assert!(patch.note.unwrap().contains("reference data"));
    }

    #[test]
    fn sentinel_without_reference_data_fails() {
        let mut doc = snapshot();
        let err = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(update("dispatcherGroups", json!(USE_REFERENCE_DATA))),
                &no_fallback(),
            )
            .unwrap_err();
        assert!(matches!(err, PatchError::MissingReferenceData { .. }));
    }

    #[test]
    fn collection_update_without_sentinel_is_rejected() {
        let mut doc = snapshot();
        let err = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(update("dispatcherGroups", json!("anything else"))),
                &no_fallback(),
            )
            .unwrap_err();
        assert!(matches!(err, PatchError::NotAFieldPath(_)));
    }

    #[test]
    fn add_to_array_appends_a_record() {
        let mut doc = snapshot();
        PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(CorrectionAction::AddToArray {
                    target_path: "demands".into(),
                    new_value: json!({"demandId": "D9", "quantity": 5}),
                    reasoning: "test".into(),
                    additional_updates: vec![],
                }),
                &no_fallback(),
            )
            .unwrap();
        let demands = doc.collection("demands").unwrap();
        assert_eq!(demands.len(), 4);
        assert_eq!(demands[3]["demandId"], "D9");
    }

    #[test]
    fn add_to_array_rejects_scalars() {
        let mut doc = snapshot();
        let err = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(CorrectionAction::AddToArray {
                    target_path: "demands".into(),
                    new_value: json!(42),
                    reasoning: "test".into(),
                    additional_updates: vec![],
                }),
                &no_fallback(),
            )
            .unwrap_err();
        assert!(matches!(err, PatchError::NewValueNotARecord));
    }

    #[test]
    fn removes_by_explicit_index() {
        let mut doc = snapshot();
        let patch = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(CorrectionAction::RemoveFromArray {
                    target_path: "demands[1]".into(),
                    current_value: None,
                    reasoning: "test".into(),
                    additional_updates: vec![],
                }),
                &no_fallback(),
            )
            .unwrap();
        assert_eq!(patch.old_value.unwrap()["quantity"], 20);
        assert_eq!(doc.collection("demands").unwrap().len(), 2);
    }

    #[test]
    fn removes_first_entry_matching_predicate() {
        let mut doc = snapshot();
        let patch = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(CorrectionAction::RemoveFromArray {
                    target_path: "demands".into(),
                    current_value: Some(json!({"demandId": "D1"})),
                    reasoning: "test".into(),
                    additional_updates: vec![],
                }),
                &no_fallback(),
            )
            .unwrap();
        // The first D1 goes; the second stays.
        assert_eq!(patch.old_value.unwrap()["quantity"], 10);
        let demands = doc.collection("demands").unwrap();
        assert_eq!(demands.len(), 2);
        assert_eq!(demands[0]["demandId"], "D1");
    }

    #[test]
    fn predicate_without_match_is_an_error() {
        let mut doc = snapshot();
        let err = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(CorrectionAction::RemoveFromArray {
                    target_path: "demands".into(),
                    current_value: Some(json!({"demandId": "MISSING"})),
                    reasoning: "test".into(),
                    additional_updates: vec![],
                }),
                &no_fallback(),
            )
            .unwrap_err();
        assert!(matches!(err, PatchError::NoMatchingEntry { .. }));
    }

    #[test]
    fn additional_updates_apply_in_order() {
        let mut doc = snapshot();
        let patch = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(CorrectionAction::UpdateField {
                    target_path: "demands[1].demandId".into(),
                    current_value: Some(json!("D1")),
                    new_value: json!("D1_2"),
                    reasoning: "rename and fix quantity".into(),
                    additional_updates: vec![AdditionalUpdate {
                        target_path: "demands[1].quantity".into(),
                        current_value: Some(json!(20)),
                        new_value: json!(25),
                    }],
                }),
                &no_fallback(),
            )
            .unwrap();
        assert_eq!(patch.additional_updates.len(), 1);
        assert_eq!(patch.additional_updates[0].old_value, Some(json!(20)));
        let demands = doc.collection("demands").unwrap();
        assert_eq!(demands[1]["demandId"], "D1_2");
        assert_eq!(demands[1]["quantity"], 25);
    }

    #[test]
    fn manual_intervention_leaves_the_document_untouched() {
        let mut doc = snapshot();
        let before = doc.clone();
        let patch = PatchApplier::new()
            .apply(
                &mut doc,
                &proposal(CorrectionAction::ManualInterventionRequired {
                    target_path: "demands[0].quantity".into(),
                    reasoning: "no trustworthy source".into(),
                }),
                &no_fallback(),
            )
            .unwrap();
        assert!(patch.manual_intervention);
        assert_eq!(doc, before);
    }

    #[test]
    fn field_updates_are_idempotent() {
        let mut once = snapshot();
        let applier = PatchApplier::new();
        let action = proposal(update("demands[2].quantity", json!(99)));
        applier.apply(&mut once, &action, &no_fallback()).unwrap();
        let mut twice = once.clone();
        applier.apply(&mut twice, &action, &no_fallback()).unwrap();
        assert_eq!(once, twice);
    }
}
