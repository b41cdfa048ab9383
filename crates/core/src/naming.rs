//! Deterministic sample naming and output path rules.
//!
//! A generated sample lives at `<sample_root>/<checkpoint>/<filename>`,
//! where the filename is a URL-query encoding of the parameters that
//! produced it. The metadata sidecar sits beside it with a `.json`
//! extension.

use std::path::{Component, Path, PathBuf};

use crate::error::CoreError;

/// Directory (relative to ComfyUI's output dir) that sampler saves go to.
pub const OUTPUT_PREFIX_DIR: &str = "checkpoint-sampler";

/// Extension of generated sample images.
pub const SAMPLE_EXTENSION: &str = "png";

/// Extension of metadata sidecars.
pub const SIDECAR_EXTENSION: &str = "json";

/// Build the sample filename for one parameter combination.
///
/// Keys are emitted in a fixed order and CFG is rendered with one decimal
/// place so the same combination always maps to the same file.
///
/// ```
/// use sampler_core::naming::sample_filename;
///
/// assert_eq!(
///     sample_filename("forest", 20, 7.5, "euler", "normal", 42),
///     "prompt=forest&steps=20&cfg=7.5&sampler=euler&scheduler=normal&seed=42.png"
/// );
/// ```
pub fn sample_filename(
    prompt_name: &str,
    steps: i32,
    cfg: f64,
    sampler_name: &str,
    scheduler: &str,
    seed: i64,
) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("prompt", prompt_name)
        .append_pair("steps", &steps.to_string())
        .append_pair("cfg", &format!("{cfg:.1}"))
        .append_pair("sampler", sampler_name)
        .append_pair("scheduler", scheduler)
        .append_pair("seed", &seed.to_string())
        .finish();
    format!("{query}.{SAMPLE_EXTENSION}")
}

/// Join `checkpoint` and `filename` under `sample_root`, rejecting any
/// result that escapes the root once `.`/`..` segments are resolved.
pub fn output_path(sample_root: &Path, checkpoint: &str, filename: &str) -> Result<PathBuf, CoreError> {
    let root = clean_path(sample_root);
    let joined = clean_path(&sample_root.join(checkpoint).join(filename));

    if joined == root || !joined.starts_with(&root) {
        return Err(CoreError::PathTraversal { path: joined });
    }
    Ok(joined)
}

/// Sidecar location for a sample image: same path, `.json` extension.
pub fn sidecar_path(image_path: &Path) -> PathBuf {
    image_path.with_extension(SIDECAR_EXTENSION)
}

/// `filename_prefix` handed to the workflow's output saver node.
///
/// Uses the checkpoint's base name without directories or extension.
pub fn output_filename_prefix(checkpoint_filename: &str) -> String {
    let base = checkpoint_filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(checkpoint_filename);
    let stem = Path::new(base)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(base);
    format!("{OUTPUT_PREFIX_DIR}/{stem}")
}

/// Lexically normalise a path: drop `.`, resolve `..` against preceding
/// segments. `..` directly under the root stays at the root.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut parts: Vec<Component<'_>> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(Component::Normal(_)) => {
                    parts.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => parts.push(component),
            },
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}
