//! Content-rating normalization.
//!
//! The upstream API reports content ratings as booleans, small integers, or
//! free-text labels depending on revision and nesting level. This module
//! collapses all of them into one ordinal [`ContentLevel`]. Normalization is
//! total: every input maps to exactly one level, with `Pg` as the default
//! for absent or unrecognized values.

use std::collections::BTreeSet;

use crate::api::types::{Model, NsfwRating};

/// Ordinal content-rating bucket, least to most restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ContentLevel {
    Pg,
    Pg13,
    R,
    X,
    Xxx,
}

/// All levels in ascending order.
pub const ALL_LEVELS: [ContentLevel; 5] = [
    ContentLevel::Pg,
    ContentLevel::Pg13,
    ContentLevel::R,
    ContentLevel::X,
    ContentLevel::Xxx,
];

impl ContentLevel {
    /// Canonical display label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pg => "PG",
            Self::Pg13 => "PG-13",
            Self::R => "R",
            Self::X => "X",
            Self::Xxx => "XXX",
        }
    }

    /// Ordinal rank (PG = 0 .. XXX = 4).
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::Pg => 0,
            Self::Pg13 => 1,
            Self::R => 2,
            Self::X => 3,
            Self::Xxx => 4,
        }
    }

    /// Maps an upstream integer code to a level.
    ///
    /// The mapping treats codes as ordinals (0..=4), clamping below to PG
    /// and above to XXX. Upstream has shipped at least one other scheme
    /// (bitmask-like codes); if live samples disagree, this function is the
    /// single place to re-tune the boundaries.
    #[must_use]
    pub fn from_code(code: i64) -> Self {
        match code {
            i64::MIN..=0 => Self::Pg,
            1 => Self::Pg13,
            2 => Self::R,
            3 => Self::X,
            _ => Self::Xxx,
        }
    }

    /// Maps an upstream text label to a level. Unrecognized labels fall
    /// back to PG.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        let raw = label.trim().to_ascii_uppercase().replace("PG13", "PG-13");
        match raw.as_str() {
            "PG" | "SAFE" | "SFW" | "NONE" => Self::Pg,
            "PG-13" => Self::Pg13,
            "R" | "MATURE" | "ADULT" => Self::R,
            "X" => Self::X,
            "XXX" | "NSFW" | "EXPLICIT" => Self::Xxx,
            _ => Self::Pg,
        }
    }
}

/// Normalizes any wire-level rating hint into a level. Total: `None` and
/// unrecognized values map to PG; boolean `true` is treated as XXX.
#[must_use]
pub fn normalize(value: Option<&NsfwRating>) -> ContentLevel {
    match value {
        None => ContentLevel::Pg,
        Some(NsfwRating::Flag(true)) => ContentLevel::Xxx,
        Some(NsfwRating::Flag(false)) => ContentLevel::Pg,
        Some(NsfwRating::Code(code)) => ContentLevel::from_code(*code),
        Some(NsfwRating::Label(label)) => ContentLevel::from_label(label),
    }
}

/// Expands a selection into the allowed set; an empty selection allows
/// everything.
#[must_use]
pub fn allowed_set(levels: &[ContentLevel]) -> BTreeSet<ContentLevel> {
    if levels.is_empty() {
        ALL_LEVELS.iter().copied().collect()
    } else {
        levels.iter().copied().collect()
    }
}

/// Derives a single level for a model: the model-level hint if present,
/// else the maximum across version- and image-level hints, else PG.
#[must_use]
pub fn model_content_level(model: &Model) -> ContentLevel {
    if let Some(direct) = model.nsfw_level.as_ref().or(model.nsfw.as_ref()) {
        return normalize(Some(direct));
    }

    let mut max = ContentLevel::Pg;
    for version in &model.model_versions {
        if let Some(hint) = version.nsfw_level.as_ref().or(version.nsfw.as_ref()) {
            max = max.max(normalize(Some(hint)));
            continue;
        }
        for image in &version.images {
            let hint = image.nsfw_level.as_ref().or(image.nsfw.as_ref());
            if hint.is_some() {
                max = max.max(normalize(hint));
            }
        }
    }
    max
}

/// Decides whether a model is visible for a level selection: true when any
/// rating hint (model, version, or image level) normalizes into the allowed
/// set. A model carrying no hints at all counts as PG.
#[must_use]
pub fn matches_content_levels(model: &Model, levels: &[ContentLevel]) -> bool {
    let allowed = allowed_set(levels);
    let mut has_any_hint = false;

    let mut check = |hint: Option<&NsfwRating>| -> bool {
        if hint.is_some() {
            has_any_hint = true;
            allowed.contains(&normalize(hint))
        } else {
            false
        }
    };

    for version in &model.model_versions {
        if check(version.nsfw_level.as_ref()) || check(version.nsfw.as_ref()) {
            return true;
        }
        for image in &version.images {
            if check(image.nsfw_level.as_ref()) || check(image.nsfw.as_ref()) {
                return true;
            }
        }
    }
    if check(model.nsfw_level.as_ref()) || check(model.nsfw.as_ref()) {
        return true;
    }

    if !has_any_hint {
        return allowed.contains(&ContentLevel::Pg);
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn model(value: serde_json::Value) -> Model {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn normalize_is_total_over_all_shapes() {
        let inputs = [
            None,
            Some(NsfwRating::Flag(true)),
            Some(NsfwRating::Flag(false)),
            Some(NsfwRating::Code(-3)),
            Some(NsfwRating::Code(0)),
            Some(NsfwRating::Code(2)),
            Some(NsfwRating::Code(99)),
            Some(NsfwRating::Label("Mature".to_string())),
            Some(NsfwRating::Label("pg13".to_string())),
            Some(NsfwRating::Label("garbage".to_string())),
            Some(NsfwRating::Label(String::new())),
        ];
        for input in &inputs {
            let level = normalize(input.as_ref());
            assert!(ALL_LEVELS.contains(&level));
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        // Re-normalizing a level's own label is a fixed point.
        for level in ALL_LEVELS {
            let round_trip = normalize(Some(&NsfwRating::Label(level.as_str().to_string())));
            assert_eq!(round_trip, level, "label {}", level.as_str());
        }
    }

    #[test]
    fn boolean_flags_map_to_extremes() {
        assert_eq!(normalize(Some(&NsfwRating::Flag(true))), ContentLevel::Xxx);
        assert_eq!(normalize(Some(&NsfwRating::Flag(false))), ContentLevel::Pg);
    }

    #[test]
    fn integer_codes_clamp_to_range() {
        assert_eq!(ContentLevel::from_code(-1), ContentLevel::Pg);
        assert_eq!(ContentLevel::from_code(0), ContentLevel::Pg);
        assert_eq!(ContentLevel::from_code(1), ContentLevel::Pg13);
        assert_eq!(ContentLevel::from_code(2), ContentLevel::R);
        assert_eq!(ContentLevel::from_code(3), ContentLevel::X);
        assert_eq!(ContentLevel::from_code(4), ContentLevel::Xxx);
        assert_eq!(ContentLevel::from_code(32), ContentLevel::Xxx);
    }

    #[test]
    fn label_synonyms() {
        assert_eq!(ContentLevel::from_label("sfw"), ContentLevel::Pg);
        assert_eq!(ContentLevel::from_label("Safe"), ContentLevel::Pg);
        assert_eq!(ContentLevel::from_label("mature"), ContentLevel::R);
        assert_eq!(ContentLevel::from_label("explicit"), ContentLevel::Xxx);
        assert_eq!(ContentLevel::from_label("NSFW"), ContentLevel::Xxx);
        assert_eq!(ContentLevel::from_label("PG13"), ContentLevel::Pg13);
    }

    #[test]
    fn empty_selection_allows_everything() {
        let allowed = allowed_set(&[]);
        assert_eq!(allowed.len(), 5);
    }

    #[test]
    fn model_level_hint_wins_over_nested() {
        let m = model(json!({
            "nsfwLevel": 0,
            "modelVersions": [{"nsfwLevel": 4}]
        }));
        assert_eq!(model_content_level(&m), ContentLevel::Pg);
    }

    #[test]
    fn nested_hints_take_maximum() {
        let m = model(json!({
            "modelVersions": [
                {"nsfw": false, "images": []},
                {"images": [{"url": "x", "nsfwLevel": 2}, {"url": "y", "nsfwLevel": 3}]}
            ]
        }));
        assert_eq!(model_content_level(&m), ContentLevel::X);
    }

    #[test]
    fn hintless_model_defaults_to_pg() {
        let m = model(json!({"name": "plain"}));
        assert_eq!(model_content_level(&m), ContentLevel::Pg);
        assert!(matches_content_levels(&m, &[ContentLevel::Pg]));
        assert!(!matches_content_levels(&m, &[ContentLevel::Xxx]));
    }

    #[test]
    fn visibility_needs_one_allowed_hint() {
        let m = model(json!({
            "modelVersions": [{"nsfwLevel": 4, "images": [{"url": "x", "nsfwLevel": 0}]}]
        }));
        // Version is XXX but an image is PG: visible to a PG-only selection.
        assert!(matches_content_levels(&m, &[ContentLevel::Pg]));
        assert!(matches_content_levels(&m, &[ContentLevel::Xxx]));
        assert!(!matches_content_levels(&m, &[ContentLevel::R]));
    }
}
