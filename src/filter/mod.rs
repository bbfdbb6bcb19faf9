//! Content-level normalization, local refinement, and preview selection.

pub mod content;
pub mod preview;
pub mod refine;

pub use content::{
    ALL_LEVELS, ContentLevel, allowed_set, matches_content_levels, model_content_level, normalize,
};
pub use preview::{
    has_displayable_preview, pick_model_preview, pick_sidecar_image, pick_version_preview,
    sidecar_extension,
};
pub use refine::{apply_extra_filters, matches_query, parse_tag_list};
