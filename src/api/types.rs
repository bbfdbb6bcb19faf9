//! Wire types for the catalog JSON API.
//!
//! Every upstream field is optional or defaulted: the API interleaves
//! booleans, integers and labels for the same logical fields across
//! revisions, so nothing here assumes a shape beyond "JSON object".

use serde::Deserialize;

/// A content-rating hint as it appears on the wire: a boolean flag, a small
/// integer code, or a free-text label, depending on API revision and field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum NsfwRating {
    /// Legacy boolean flag (`nsfw: true`).
    Flag(bool),
    /// Small integer / ordinal code (`nsfwLevel: 2`).
    Code(i64),
    /// Free-text label (`"Mature"`, `"X"`, `"sfw"`, ...).
    Label(String),
}

/// One catalog entry.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Model {
    pub id: Option<i64>,
    pub name: Option<String>,
    /// Artifact category (`Checkpoint`, `LORA`, ...). Keyed `type` upstream.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub tags: Vec<String>,
    pub nsfw: Option<NsfwRating>,
    pub nsfw_level: Option<NsfwRating>,
    pub model_versions: Vec<ModelVersion>,
}

/// One version of a model, carrying its downloadable files and previews.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelVersion {
    pub id: Option<i64>,
    pub name: Option<String>,
    pub base_model: Option<String>,
    pub nsfw: Option<NsfwRating>,
    pub nsfw_level: Option<NsfwRating>,
    pub trained_words: Vec<String>,
    pub files: Vec<ModelFile>,
    pub images: Vec<ModelImage>,
}

/// A downloadable artifact attached to a version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelFile {
    pub name: Option<String>,
    pub download_url: Option<String>,
    pub primary: bool,
}

/// A preview asset attached to a version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelImage {
    pub url: Option<String>,
    /// `"image"` or `"video"`; absent means image.
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub nsfw: Option<NsfwRating>,
    pub nsfw_level: Option<NsfwRating>,
}

/// One page of search results.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchPage {
    pub items: Vec<Model>,
    pub metadata: PageMetadata,
}

/// Pagination metadata; `next_page` is an opaque absolute-URL cursor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageMetadata {
    pub next_page: Option<String>,
    pub total_items: Option<u64>,
}

/// One tag from the tag-search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TagEntry {
    pub name: Option<String>,
    pub model_count: u64,
}

/// Tag-search response page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TagPage {
    pub items: Vec<TagEntry>,
}

/// Creator-search response page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CreatorPage {
    pub items: Vec<CreatorEntry>,
}

/// One creator from the creator-search endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CreatorEntry {
    pub username: Option<String>,
}

impl ModelVersion {
    /// Picks the canonical file for this version: the one flagged primary,
    /// else the first listed. Returns `(download_url, name)`.
    #[must_use]
    pub fn pick_download(&self) -> (Option<&str>, Option<&str>) {
        let file = self
            .files
            .iter()
            .find(|f| f.primary)
            .or_else(|| self.files.first());
        match file {
            Some(f) => (
                f.download_url.as_deref().map(str::trim).filter(|u| !u.is_empty()),
                f.name.as_deref(),
            ),
            None => (None, None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn nsfw_rating_deserializes_all_shapes() {
        let flag: NsfwRating = serde_json::from_str("true").unwrap();
        assert_eq!(flag, NsfwRating::Flag(true));

        let code: NsfwRating = serde_json::from_str("3").unwrap();
        assert_eq!(code, NsfwRating::Code(3));

        let label: NsfwRating = serde_json::from_str("\"Mature\"").unwrap();
        assert_eq!(label, NsfwRating::Label("Mature".to_string()));
    }

    #[test]
    fn model_tolerates_missing_fields() {
        let model: Model = serde_json::from_str("{}").unwrap();
        assert!(model.id.is_none());
        assert!(model.tags.is_empty());
        assert!(model.model_versions.is_empty());
    }

    #[test]
    fn search_page_reads_cursor_from_metadata() {
        let page: SearchPage = serde_json::from_value(serde_json::json!({
            "items": [{"id": 7, "name": "thing", "type": "LORA"}],
            "metadata": {"nextPage": "https://example/api?cursor=2", "totalItems": 41}
        }))
        .unwrap();
        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].kind.as_deref(), Some("LORA"));
        assert_eq!(
            page.metadata.next_page.as_deref(),
            Some("https://example/api?cursor=2")
        );
        assert_eq!(page.metadata.total_items, Some(41));
    }

    #[test]
    fn pick_download_prefers_primary_file() {
        let version: ModelVersion = serde_json::from_value(serde_json::json!({
            "files": [
                {"name": "extra.zip", "downloadUrl": "https://x/extra"},
                {"name": "main.safetensors", "downloadUrl": "https://x/main", "primary": true}
            ]
        }))
        .unwrap();
        let (url, name) = version.pick_download();
        assert_eq!(url, Some("https://x/main"));
        assert_eq!(name, Some("main.safetensors"));
    }

    #[test]
    fn pick_download_falls_back_to_first_file() {
        let version: ModelVersion = serde_json::from_value(serde_json::json!({
            "files": [
                {"name": "a.safetensors", "downloadUrl": ""},
                {"name": "b.safetensors", "downloadUrl": "https://x/b"}
            ]
        }))
        .unwrap();
        let (url, name) = version.pick_download();
        // First file wins even with an empty URL; the empty URL is filtered.
        assert_eq!(url, None);
        assert_eq!(name, Some("a.safetensors"));
    }

    #[test]
    fn pick_download_empty_files() {
        let version = ModelVersion::default();
        assert_eq!(version.pick_download(), (None, None));
    }
}
