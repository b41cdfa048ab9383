//! Output discovery from `GET /history/{prompt_id}` responses.
//!
//! The history payload is keyed by prompt id; each entry maps output node
//! ids to whatever the node produced. Image-producing nodes report a list
//! of `{filename, subfolder, type}` records that can be fetched back
//! through `GET /view`.

use serde::{Deserialize, Serialize};

/// Location of one generated image on the ComfyUI server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputImage {
    pub filename: String,
    #[serde(default)]
    pub subfolder: String,
    /// ComfyUI storage category: `output`, `temp` or `input`.
    #[serde(rename = "type", default = "default_kind")]
    pub kind: String,
}

fn default_kind() -> String {
    "output".to_string()
}

/// Collect every image the prompt produced.
///
/// Output nodes are visited in numeric id order. Images saved to the
/// `output` category come before previews so the first entry is the
/// persisted result when a workflow has both.
pub fn output_images(history: &serde_json::Value, prompt_id: &str) -> Vec<OutputImage> {
    let Some(outputs) = history
        .get(prompt_id)
        .and_then(|entry| entry.get("outputs"))
        .and_then(|o| o.as_object())
    else {
        return Vec::new();
    };

    let mut node_ids: Vec<&String> = outputs.keys().collect();
    node_ids.sort_by_key(|id| (id.parse::<u64>().unwrap_or(u64::MAX), id.as_str()));

    let mut images: Vec<OutputImage> = node_ids
        .into_iter()
        .filter_map(|id| outputs[id.as_str()].get("images"))
        .filter_map(|list| serde_json::from_value::<Vec<OutputImage>>(list.clone()).ok())
        .flatten()
        .collect();

    images.sort_by_key(|img| img.kind != "output");
    images
}
