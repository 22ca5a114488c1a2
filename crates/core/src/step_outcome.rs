//! Classification of business outcomes carried by ordinary step completions.
//!
//! The workflow engine reports a duplicate link as a normally completing
//! step. An explicit `metadata.outcome_kind` is authoritative; the step-name
//! heuristics in [`classify_step_name`] cover engines that predate it and are
//! the only place step names are inspected.

use serde::Serialize;

use crate::job::JobStep;
use crate::types::DbId;

/// Metadata key carrying an explicit [`StepOutcome`].
pub const OUTCOME_KIND_KEY: &str = "outcome_kind";

/// Output/metadata key with the id of the resource a duplicate points at.
pub const EXISTING_RESOURCE_ID_KEY: &str = "existing_resource_id";

/// Output/metadata key with the title of the resource a duplicate points at.
pub const EXISTING_RESOURCE_TITLE_KEY: &str = "existing_resource_title";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Standard,
    /// The link already exists in the submitting user's own library.
    DuplicateSameUser,
    /// The link was already processed for another user; the result is reused.
    DuplicateOtherUser,
}

impl StepOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            StepOutcome::Standard => "standard",
            StepOutcome::DuplicateSameUser => "duplicate_same_user",
            StepOutcome::DuplicateOtherUser => "duplicate_other_user",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(StepOutcome::Standard),
            "duplicate_same_user" => Some(StepOutcome::DuplicateSameUser),
            "duplicate_other_user" => Some(StepOutcome::DuplicateOtherUser),
            _ => None,
        }
    }

    pub fn is_duplicate(self) -> bool {
        self != StepOutcome::Standard
    }
}

/// Classify a step, preferring the explicit metadata contract.
pub fn classify_step(step: &JobStep) -> StepOutcome {
    step.metadata
        .get(OUTCOME_KIND_KEY)
        .and_then(|v| v.as_str())
        .and_then(StepOutcome::parse)
        .unwrap_or_else(|| classify_step_name(&step.step_name))
}

/// Markers that, next to a `duplicate` token, mean "same user".
const SAME_USER_MARKERS: &[&str] = &["same_user", "own", "mine", "existing_user"];

/// Markers that, next to a `duplicate` token, mean "different user".
const OTHER_USER_MARKERS: &[&str] = &["other_user", "different_user", "another_user", "foreign"];

/// Classify a step purely by its name.
///
/// Matching is token based on the lowercased name with `-` and spaces
/// folded into `_`, so `check_duplicate_same_user`, `Duplicate - Own` and
/// `duplicate-other-user` are recognised while `download_summary` is not.
pub fn classify_step_name(step_name: &str) -> StepOutcome {
    let normalized: String = step_name
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c == '-' || c == ' ' { '_' } else { c })
        .collect();
    let tokens: Vec<&str> = normalized.split('_').filter(|t| !t.is_empty()).collect();

    if !tokens.iter().any(|t| t.starts_with("duplicate")) {
        return StepOutcome::Standard;
    }

    let joined = format!("_{}_", tokens.join("_"));
    let has_marker = |markers: &[&str]| markers.iter().any(|m| joined.contains(&format!("_{m}_")));

    if has_marker(OTHER_USER_MARKERS) {
        StepOutcome::DuplicateOtherUser
    } else if has_marker(SAME_USER_MARKERS) {
        StepOutcome::DuplicateSameUser
    } else {
        StepOutcome::Standard
    }
}

/// The pre-existing resource a same-user duplicate refers to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExistingResource {
    pub id: Option<DbId>,
    pub title: Option<String>,
}

/// Read the existing-resource reference from `output_data`, then `metadata`.
pub fn existing_resource(step: &JobStep) -> ExistingResource {
    let sources = [step.output_data.as_ref(), Some(&step.metadata)];

    let id = sources.iter().flatten().find_map(|bag| {
        bag.get(EXISTING_RESOURCE_ID_KEY).and_then(|v| {
            v.as_i64()
                .or_else(|| v.as_str().and_then(|s| s.trim().parse().ok()))
        })
    });

    let title = sources.iter().flatten().find_map(|bag| {
        bag.get(EXISTING_RESOURCE_TITLE_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .map(str::to_string)
    });

    ExistingResource { id, title }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::fixtures::step;
    use crate::status::StepStatus;

    #[test]
    fn classifies_known_same_user_names() {
        for name in [
            "duplicate_same_user",
            "check_duplicate_same_user",
            "Duplicate - Own",
            "duplicate_mine",
            "handle-duplicate-existing-user",
            "DUPLICATE SAME USER",
        ] {
            assert_eq!(
                classify_step_name(name),
                StepOutcome::DuplicateSameUser,
                "{name}"
            );
        }
    }

    #[test]
    fn classifies_known_other_user_names() {
        for name in [
            "duplicate_other_user",
            "duplicate-different-user",
            "handle_duplicate_another_user",
            "duplicate_foreign",
            "Duplicates Other User",
        ] {
            assert_eq!(
                classify_step_name(name),
                StepOutcome::DuplicateOtherUser,
                "{name}"
            );
        }
    }

    #[test]
    fn ordinary_names_are_standard() {
        for name in [
            "fetch_metadata",
            "download_summary",
            "check_duplicate",
            "own_library_sync",
            "summarize",
            "",
        ] {
            assert_eq!(classify_step_name(name), StepOutcome::Standard, "{name}");
        }
    }

    #[test]
    fn explicit_outcome_kind_wins_over_name() {
        let mut s = step(1, "duplicate_same_user", 1, StepStatus::Completed);
        s.metadata = serde_json::json!({ "outcome_kind": "duplicate_other_user" });
        assert_eq!(classify_step(&s), StepOutcome::DuplicateOtherUser);

        s.metadata = serde_json::json!({ "outcome_kind": "standard" });
        assert_eq!(classify_step(&s), StepOutcome::Standard);
    }

    #[test]
    fn unknown_outcome_kind_falls_back_to_name() {
        let mut s = step(1, "duplicate_same_user", 1, StepStatus::Completed);
        s.metadata = serde_json::json!({ "outcome_kind": "mystery" });
        assert_eq!(classify_step(&s), StepOutcome::DuplicateSameUser);
    }

    #[test]
    fn existing_resource_prefers_output_data() {
        let mut s = step(1, "duplicate_same_user", 1, StepStatus::Completed);
        s.output_data = Some(serde_json::json!({ "existing_resource_id": 55 }));
        s.metadata = serde_json::json!({
            "existing_resource_id": 99,
            "existing_resource_title": "Rust async book"
        });

        let existing = existing_resource(&s);
        assert_eq!(existing.id, Some(55));
        assert_eq!(existing.title.as_deref(), Some("Rust async book"));
    }

    #[test]
    fn existing_resource_accepts_string_ids() {
        let mut s = step(1, "duplicate_same_user", 1, StepStatus::Completed);
        s.metadata = serde_json::json!({ "existing_resource_id": "12" });
        assert_eq!(existing_resource(&s).id, Some(12));
        assert_eq!(existing_resource(&s).title, None);
    }

    #[test]
    fn outcome_names_parse_back() {
        for outcome in [
            StepOutcome::Standard,
            StepOutcome::DuplicateSameUser,
            StepOutcome::DuplicateOtherUser,
        ] {
            assert_eq!(StepOutcome::parse(outcome.as_str()), Some(outcome));
        }
    }
}
