//! Correction proposals: the structured output of the proposer, gated
//! before it may touch a snapshot, and the audit record of an applied patch.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::models::search::SearchMode;
use crate::domain::models::validation::ValidationMessage;

/// Sentinel value a proposal may use for `new_value` on a bare collection
/// path to request wholesale replacement from the reference snapshot.
pub const USE_REFERENCE_DATA: &str = "USE_REFERENCE_DATA";

/// A secondary field update riding along with the primary correction, for
/// errors whose fix spans several fields (a renamed id and the references
/// to it, for instance).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditionalUpdate {
    pub target_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<Value>,
    pub new_value: Value,
}

/// The correction itself, one variant per action kind. Variant payloads
/// carry exactly the fields that action needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CorrectionAction {
    /// Overwrite one field of one entry.
    UpdateField {
        target_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_value: Option<Value>,
        new_value: Value,
        reasoning: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        additional_updates: Vec<AdditionalUpdate>,
    },
    /// Append a new record to a collection.
    AddToArray {
        target_path: String,
        new_value: Value,
        reasoning: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        additional_updates: Vec<AdditionalUpdate>,
    },
    /// Remove an entry, either by explicit index in the path or by a
    /// field/value predicate in `current_value`.
    RemoveFromArray {
        target_path: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        current_value: Option<Value>,
        reasoning: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        additional_updates: Vec<AdditionalUpdate>,
    },
    /// No safe automatic fix exists; record the reasoning and leave the
    /// document untouched.
    ManualInterventionRequired {
        target_path: String,
        reasoning: String,
    },
}

impl CorrectionAction {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateField { .. } => "update_field",
            Self::AddToArray { .. } => "add_to_array",
            Self::RemoveFromArray { .. } => "remove_from_array",
            Self::ManualInterventionRequired { .. } => "manual_intervention_required",
        }
    }

    pub fn target_path(&self) -> &str {
        match self {
            Self::UpdateField { target_path, .. }
            | Self::AddToArray { target_path, .. }
            | Self::RemoveFromArray { target_path, .. }
            | Self::ManualInterventionRequired { target_path, .. } => target_path,
        }
    }

    pub fn reasoning(&self) -> &str {
        match self {
            Self::UpdateField { reasoning, .. }
            | Self::AddToArray { reasoning, .. }
            | Self::RemoveFromArray { reasoning, .. }
            | Self::ManualInterventionRequired { reasoning, .. } => reasoning,
        }
    }

    pub fn additional_updates(&self) -> &[AdditionalUpdate] {
        match self {
            Self::UpdateField {
                additional_updates, ..
            }
            | Self::AddToArray {
                additional_updates, ..
            }
            | Self::RemoveFromArray {
                additional_updates, ..
            } => additional_updates,
            Self::ManualInterventionRequired { .. } => &[],
        }
    }
}

/// Summary of the locate step carried inside a proposal for auditing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub search_mode: SearchMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_value: Option<String>,
    pub error_type: String,
    pub results_count: usize,
}

/// The proposal envelope: which iteration and document it belongs to, the
/// error it addresses, what the search found, and the correction itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrectionProposal {
    pub iteration: u32,
    pub document_id: String,
    pub original_error: ValidationMessage,
    pub error_analyzed: ErrorAnalysis,
    #[serde(rename = "correction_proposal")]
    pub action: CorrectionAction,
}

/// One secondary update after application, with the value it displaced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedUpdate {
    pub target_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// Audit record of a patch that went through, persisted per iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppliedPatch {
    pub action: String,
    pub target_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub additional_updates: Vec<AppliedUpdate>,
    /// True when the action was `manual_intervention_required` and the
    /// document was left untouched.
    #[serde(default)]
    pub manual_intervention: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub applied_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn action_tag_selects_variant() {
        let action: CorrectionAction = serde_json::from_value(json!({
            "action": "update_field",
            "target_path": "demands[4].demandId",
            "current_value": "D1",
            "new_value": "D1_2",
            "reasoning": "duplicate id renamed to the next free suffix"
        }))
        .unwrap();
        assert_eq!(action.kind(), "update_field");
        assert_eq!(action.target_path(), "demands[4].demandId");
        assert!(action.additional_updates().is_empty());
    }

    #[test]
    fn unknown_action_is_rejected() {
        let result = serde_json::from_value::<CorrectionAction>(json!({
            "action": "truncate_collection",
            "target_path": "demands",
            "reasoning": "nope"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn missing_reasoning_is_rejected() {
        let result = serde_json::from_value::<CorrectionAction>(json!({
            "action": "update_field",
            "target_path": "demands[0].dueDate",
            "new_value": "2026-01-01"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn manual_intervention_takes_no_updates() {
        let action: CorrectionAction = serde_json::from_value(json!({
            "action": "manual_intervention_required",
            "target_path": "demands[2].quantity",
            "reasoning": "no trustworthy source for the quantity"
        }))
        .unwrap();
        assert!(action.additional_updates().is_empty());
    }

    #[test]
    fn envelope_round_trips_with_renamed_action_field() {
        let proposal = CorrectionProposal {
            iteration: 1,
            document_id: "snap-1".into(),
            original_error: ValidationMessage::error("Duplicate demand id 'D1'"),
            error_analyzed: ErrorAnalysis {
                search_mode: SearchMode::Value,
                search_value: Some("D1".into()),
                error_type: "duplicate_id".into(),
                results_count: 2,
            },
            action: CorrectionAction::UpdateField {
                target_path: "demands[4].demandId".into(),
                current_value: Some(json!("D1")),
                new_value: json!("D1_2"),
                reasoning: "rename the later duplicate".into(),
                additional_updates: vec![],
            },
        };
        let value = serde_json::to_value(&proposal).unwrap();
        assert_eq!(value["correction_proposal"]["action"], "update_field");
        let back: CorrectionProposal = serde_json::from_value(value).unwrap();
        assert_eq!(back, proposal);
    }
}
