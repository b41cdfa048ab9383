//! Matching local checkpoint filenames to model paths known by ComfyUI.
//!
//! ComfyUI reports model names relative to its model directories, often
//! with subfolders (`loras/run-a/run-a-step00001000.safetensors`). The
//! sample directory only knows the bare checkpoint filename.

/// Find the remote model path for `checkpoint_filename`.
///
/// An exact match wins; otherwise the first candidate whose final path
/// segment equals the filename is used. Both `/` and `\` separators are
/// recognised since ComfyUI on Windows reports backslashes.
pub fn match_model_path<'a>(checkpoint_filename: &str, available: &'a [String]) -> Option<&'a str> {
    if checkpoint_filename.is_empty() {
        return None;
    }

    if let Some(exact) = available.iter().find(|p| p.as_str() == checkpoint_filename) {
        return Some(exact.as_str());
    }

    available
        .iter()
        .find(|p| base_name(p) == checkpoint_filename)
        .map(String::as_str)
}

fn base_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}
