//! Destination-path hygiene for downloaded artifacts.
//!
//! Filenames arrive from the remote API and must never escape the target
//! directory or produce unwritable names. Sanitization is lossy on purpose.

use std::path::{Component, Path, PathBuf};

/// Name used when sanitization leaves nothing usable.
const FALLBACK_FILENAME: &str = "model.safetensors";

/// Longest filename written to disk.
const MAX_FILENAME_LEN: usize = 180;

/// Reduces an untrusted filename to a safe basename: path separators and
/// directory components are stripped, control and reserved characters
/// collapse into underscores, and degenerate results fall back to a fixed
/// name. The result is capped at 180 characters.
#[must_use]
pub fn sanitize_filename(raw: &str) -> String {
    // Basename only, for both separator conventions.
    let base = raw
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(raw);

    let mut out = String::with_capacity(base.len());
    let mut last_was_sub = false;
    for c in base.chars() {
        let hostile = c.is_control()
            || matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*');
        if hostile {
            if !last_was_sub {
                out.push('_');
                last_was_sub = true;
            }
        } else {
            out.push(c);
            last_was_sub = false;
        }
    }

    let trimmed = out.trim().trim_matches('_').trim();
    let mut name = if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        FALLBACK_FILENAME.to_string()
    } else {
        trimmed.to_string()
    };

    if name.chars().count() > MAX_FILENAME_LEN {
        name = name.chars().take(MAX_FILENAME_LEN).collect();
    }
    name
}

/// Joins a filename onto a base directory, guaranteeing containment: any
/// name that is not a single normal path component collapses to its final
/// component (or the fallback name) before joining.
#[must_use]
pub fn safe_join(base: &Path, name: &str) -> PathBuf {
    let candidate = Path::new(name);
    let mut components = candidate.components();
    let simple = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );
    if simple {
        return base.join(name);
    }
    let basename = candidate
        .file_name()
        .map_or_else(|| FALLBACK_FILENAME.to_string(), |n| n.to_string_lossy().into_owned());
    base.join(sanitize_filename(&basename))
}

/// Maps a model category to the directory its artifacts belong in.
///
/// Kept as a trait so hosts can route downloads into their own layouts; the
/// crate ships [`ModelDirLayout`] for the conventional WebUI tree.
pub trait DestinationResolver: Send + Sync {
    fn resolve_dir(&self, category: &str) -> PathBuf;
}

/// The conventional on-disk layout rooted at an installation directory.
#[derive(Debug, Clone)]
pub struct ModelDirLayout {
    root: PathBuf,
}

impl ModelDirLayout {
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

/// Category → subdirectory, matched case-insensitively.
const MODEL_DIRS: [(&str, &str); 9] = [
    ("checkpoint", "models/Stable-diffusion"),
    ("lora", "models/Lora"),
    ("textualinversion", "embeddings"),
    ("controlnet", "models/ControlNet"),
    ("hypernetwork", "models/hypernetworks"),
    ("vae", "models/VAE"),
    ("poses", "models/Poses"),
    ("wildcards", "models/Wildcards"),
    ("other", "models/other"),
];

impl DestinationResolver for ModelDirLayout {
    fn resolve_dir(&self, category: &str) -> PathBuf {
        let key = category.trim().to_lowercase();
        let sub = MODEL_DIRS
            .iter()
            .find(|(k, _)| *k == key)
            .map_or("models/other", |(_, dir)| *dir);
        self.root.join(sub)
    }
}
