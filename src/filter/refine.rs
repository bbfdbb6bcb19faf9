//! Local (network-free) result refinement.
//!
//! These filters run over whatever item set is already cached, so the UI can
//! narrow results without re-querying. All matching is case-insensitive.

use crate::api::types::Model;

/// Splits free text on commas/newlines into a trimmed, case-insensitively
/// deduplicated tag list, preserving first-seen order and casing.
#[must_use]
pub fn parse_tag_list(raw: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for part in raw.split(|c| c == ',' || c == '\n') {
        let tag = part.trim();
        if tag.is_empty() {
            continue;
        }
        if seen.insert(tag.to_lowercase()) {
            out.push(tag.to_string());
        }
    }
    out
}

/// True when every required tag appears on the model (case-insensitive).
/// An empty requirement matches everything.
#[must_use]
pub fn matches_required_tags(model: &Model, required: &[String]) -> bool {
    if required.is_empty() {
        return true;
    }
    let tags: std::collections::HashSet<String> =
        model.tags.iter().map(|t| t.to_lowercase()).collect();
    required.iter().all(|t| tags.contains(&t.to_lowercase()))
}

/// True when at least one of the selected categories appears as a tag.
/// An empty selection matches everything.
#[must_use]
pub fn matches_any_category(model: &Model, categories: &[String]) -> bool {
    if categories.is_empty() {
        return true;
    }
    let tags: std::collections::HashSet<String> =
        model.tags.iter().map(|t| t.to_lowercase()).collect();
    categories.iter().any(|c| tags.contains(&c.to_lowercase()))
}

/// True when any version's base model contains the wanted value as a
/// substring. `None` (or "Any") matches everything.
#[must_use]
pub fn matches_base_model(model: &Model, base_model: Option<&str>) -> bool {
    let Some(want) = base_model.map(str::trim).filter(|b| !b.is_empty() && *b != "Any") else {
        return true;
    };
    let want = want.to_lowercase();
    model.model_versions.iter().any(|v| {
        v.base_model
            .as_deref()
            .is_some_and(|got| got.to_lowercase().contains(&want))
    })
}

/// Applies the layered local pass: base model, required literal tags, and
/// tag categories. With no active filters this is the identity on the input.
#[must_use]
pub fn apply_extra_filters(
    items: &[Model],
    categories: &[String],
    tag_filter_text: &str,
    base_model: Option<&str>,
) -> Vec<Model> {
    let required = parse_tag_list(tag_filter_text);
    let base_inactive = base_model
        .map(str::trim)
        .is_none_or(|b| b.is_empty() || b == "Any");
    if required.is_empty() && categories.is_empty() && base_inactive {
        return items.to_vec();
    }

    items
        .iter()
        .filter(|m| {
            matches_base_model(m, base_model)
                && matches_required_tags(m, &required)
                && matches_any_category(m, categories)
        })
        .cloned()
        .collect()
}

/// Keyword match used by local refinement: the lowercased needle must appear
/// in the model name, any tag, or any version name.
#[must_use]
pub fn matches_query(model: &Model, needle_lower: &str) -> bool {
    model
        .name
        .as_deref()
        .is_some_and(|n| n.to_lowercase().contains(needle_lower))
        || model
            .tags
            .iter()
            .any(|t| t.to_lowercase().contains(needle_lower))
        || model.model_versions.iter().any(|v| {
            v.name
                .as_deref()
                .is_some_and(|n| n.to_lowercase().contains(needle_lower))
        })
}
