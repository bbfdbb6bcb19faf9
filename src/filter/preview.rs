//! Preview asset selection.
//!
//! Picks which attached image (if any) represents a model or version,
//! honoring the active content-level selection and skipping video assets
//! that the gallery cannot render.

use crate::api::types::{Model, ModelVersion};
use crate::filter::content::{ContentLevel, allowed_set, normalize};

/// Asset extensions treated as video regardless of the declared type.
const VIDEO_EXTS: [&str; 5] = [".mp4", ".webm", ".gif", ".mov", ".avi"];

/// Extensions accepted for an on-disk preview sidecar.
const SIDECAR_EXTS: [&str; 3] = [".png", ".jpg", ".jpeg"];

/// Lowercased extension of a URL path, query string stripped.
fn url_extension(url: &str) -> Option<String> {
    let path = url.split('?').next().unwrap_or(url);
    let dot = path.rfind('.')?;
    Some(path[dot..].to_ascii_lowercase())
}

fn is_video_url(url: &str) -> bool {
    url_extension(url).is_some_and(|ext| VIDEO_EXTS.contains(&ext.as_str()))
}

/// Picks the first displayable preview URL for a version: not a video, not
/// empty, and rated inside the allowed content levels. An image with no
/// rating hint counts as PG.
#[must_use]
pub fn pick_version_preview<'a>(
    version: &'a ModelVersion,
    levels: &[ContentLevel],
) -> Option<&'a str> {
    let allowed = allowed_set(levels);
    version.images.iter().find_map(|image| {
        let url = image.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        if image.kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case("video")) {
            return None;
        }
        if is_video_url(url) {
            return None;
        }
        let level = normalize(image.nsfw_level.as_ref().or(image.nsfw.as_ref()));
        if allowed.contains(&level) { Some(url) } else { None }
    })
}

/// Picks the first displayable preview across all versions, in listed order.
#[must_use]
pub fn pick_model_preview<'a>(model: &'a Model, levels: &[ContentLevel]) -> Option<&'a str> {
    model
        .model_versions
        .iter()
        .find_map(|v| pick_version_preview(v, levels))
}

/// True when the model has at least one preview visible under the selection.
#[must_use]
pub fn has_displayable_preview(model: &Model, levels: &[ContentLevel]) -> bool {
    pick_model_preview(model, levels).is_some()
}

/// Picks the first plain-image URL for writing a sidecar next to a download.
/// Extension-gated only; the sidecar mirrors whatever the user chose to
/// download, so no content-level check applies here.
#[must_use]
pub fn pick_sidecar_image(version: &ModelVersion) -> Option<&str> {
    version.images.iter().find_map(|image| {
        let url = image.url.as_deref().map(str::trim).filter(|u| !u.is_empty())?;
        let ext = url_extension(url)?;
        if SIDECAR_EXTS.contains(&ext.as_str()) {
            Some(url)
        } else {
            None
        }
    })
}

/// Extension to give the sidecar file for a given image URL, defaulting to
/// `.png` when the URL carries no recognizable one.
#[must_use]
pub fn sidecar_extension(url: &str) -> &'static str {
    match url_extension(url).as_deref() {
        Some(".jpg") => ".jpg",
        Some(".jpeg") => ".jpeg",
        _ => ".png",
    }
}
