//! User-facing labels for internal workflow stage identifiers.
//!
//! Workflow-level errors report the failing engine node by its internal
//! identifier (`fetch_transcript`, `GenerateTags2`, ...). Notifications show
//! a readable label instead.

use std::sync::LazyLock;

use regex::Regex;

/// Label used when the engine reports no stage at all.
pub const UNKNOWN_STAGE: &str = "Unknown stage";

/// Known stage identifiers and their labels.
const KNOWN_STAGES: &[(&str, &str)] = &[
    ("check_duplicate", "Duplicate check"),
    ("fetch_metadata", "Fetching metadata"),
    ("fetch_transcript", "Fetching transcript"),
    ("scrape_article", "Reading article"),
    ("summarize", "Summarizing content"),
    ("generate_tags", "Generating tags"),
    ("generate_embedding", "Indexing for search"),
    ("save_resource", "Saving to your library"),
    ("notify_user", "Sending notification"),
];

static CAMEL_BOUNDARY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("valid regex"));

static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s_\-.:/]+").expect("valid regex"));

/// Trailing node counters such as `_2`, ` #3` or ` node 4`.
static TRAILING_COUNTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:\s+node)?\s*#?\d+$").expect("valid regex"));

/// Map an internal stage identifier to a user-facing label.
pub fn stage_label(error_node: &str) -> String {
    let words = split_words(error_node);
    if words.is_empty() {
        return UNKNOWN_STAGE.to_string();
    }

    let key = words.replace(' ', "_");
    if let Some((_, label)) = KNOWN_STAGES.iter().find(|(id, _)| *id == key) {
        return (*label).to_string();
    }

    capitalize_first(&words)
}

/// Lowercased, space separated words with any trailing counter removed.
fn split_words(raw: &str) -> String {
    let spaced = CAMEL_BOUNDARY_RE.replace_all(raw.trim(), "$1 $2");
    let spaced = SEPARATOR_RE.replace_all(&spaced, " ");
    let trimmed = TRAILING_COUNTER_RE.replace(spaced.trim(), "");
    trimmed.trim().to_lowercase()
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_stages_use_curated_labels() {
        assert_eq!(stage_label("fetch_transcript"), "Fetching transcript");
        assert_eq!(stage_label("generate_embedding"), "Indexing for search");
        assert_eq!(stage_label("check_duplicate"), "Duplicate check");
    }

    #[test]
    fn known_stages_match_through_casing_and_counters() {
        assert_eq!(stage_label("FetchTranscript"), "Fetching transcript");
        assert_eq!(stage_label("summarize_2"), "Summarizing content");
        assert_eq!(stage_label("Generate Tags #3"), "Generating tags");
    }

    #[test]
    fn unknown_stages_are_humanized() {
        assert_eq!(stage_label("resolve_video_id"), "Resolve video id");
        assert_eq!(stage_label("parseFeedItems"), "Parse feed items");
        assert_eq!(stage_label("http-request node 4"), "Http request");
        assert_eq!(stage_label("extract.images"), "Extract images");
    }

    #[test]
    fn empty_or_counter_only_is_unknown() {
        assert_eq!(stage_label(""), UNKNOWN_STAGE);
        assert_eq!(stage_label("   "), UNKNOWN_STAGE);
        assert_eq!(stage_label("_7"), UNKNOWN_STAGE);
    }
}
