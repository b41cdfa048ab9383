//! Role-annotated ComfyUI workflow templates and parameter substitution.
//!
//! A template is a ComfyUI API-format graph (`{"<node id>": {"class_type":
//! ..., "inputs": {...}, "_meta": {...}}}`). Nodes the sampler needs to
//! touch carry a role tag in `_meta.role`; [`WorkflowTemplate::from_graph`]
//! indexes those tags so [`substitute`] can inject per-item parameters
//! without knowing anything else about the graph.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::CoreError;
use crate::naming::output_filename_prefix;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Node key holding ComfyUI's free-form node metadata.
pub const META_KEY: &str = "_meta";

/// Field inside `_meta` that carries the node's role tag.
pub const ROLE_FIELD: &str = "role";

/// Node key holding the node's input values.
pub const INPUTS_KEY: &str = "inputs";

/// Latent batches are always generated one image at a time.
pub const LATENT_BATCH_SIZE: i64 = 1;

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Semantic tag on a workflow node naming which parameters get injected.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeRole {
    ModelLoader,
    ClipLoader,
    VaeLoader,
    Sampler,
    PositivePrompt,
    NegativePrompt,
    Shift,
    LatentImage,
    OutputSaver,
    /// A tag outside the substitution vocabulary, kept verbatim.
    Unknown(String),
}

impl NodeRole {
    /// Every role the substitutor knows how to fill.
    pub const KNOWN: [NodeRole; 9] = [
        NodeRole::ModelLoader,
        NodeRole::ClipLoader,
        NodeRole::VaeLoader,
        NodeRole::Sampler,
        NodeRole::PositivePrompt,
        NodeRole::NegativePrompt,
        NodeRole::Shift,
        NodeRole::LatentImage,
        NodeRole::OutputSaver,
    ];

    /// Parse a role tag. Never fails; unrecognised tags become [`NodeRole::Unknown`].
    pub fn parse(tag: &str) -> Self {
        match tag {
            "model_loader" => Self::ModelLoader,
            "clip_loader" => Self::ClipLoader,
            "vae_loader" => Self::VaeLoader,
            "sampler" => Self::Sampler,
            "positive_prompt" => Self::PositivePrompt,
            "negative_prompt" => Self::NegativePrompt,
            "shift" => Self::Shift,
            "latent_image" => Self::LatentImage,
            "output_saver" => Self::OutputSaver,
            other => Self::Unknown(other.to_string()),
        }
    }

    /// The tag as it appears in `_meta.role`.
    pub fn as_str(&self) -> &str {
        match self {
            Self::ModelLoader => "model_loader",
            Self::ClipLoader => "clip_loader",
            Self::VaeLoader => "vae_loader",
            Self::Sampler => "sampler",
            Self::PositivePrompt => "positive_prompt",
            Self::NegativePrompt => "negative_prompt",
            Self::Shift => "shift",
            Self::LatentImage => "latent_image",
            Self::OutputSaver => "output_saver",
            Self::Unknown(raw) => raw,
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown(_))
    }
}

impl From<String> for NodeRole {
    fn from(value: String) -> Self {
        Self::parse(&value)
    }
}

impl From<NodeRole> for String {
    fn from(value: NodeRole) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// A named generation graph plus its role -> node-id index.
///
/// The graph is only ever read; [`substitute`] works on a deep copy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowTemplate {
    pub name: String,
    pub graph: Map<String, Value>,
    pub roles: BTreeMap<NodeRole, Vec<String>>,
}

impl WorkflowTemplate {
    /// Build a template from a raw API-format graph, indexing `_meta.role` tags.
    ///
    /// Node ids within a role are kept in sorted order so substitution is
    /// deterministic regardless of JSON key order.
    pub fn from_graph(name: impl Into<String>, graph: Value) -> Result<Self, CoreError> {
        let name = name.into();
        let Value::Object(graph) = graph else {
            return Err(CoreError::Validation(format!(
                "Workflow '{name}' must be a JSON object keyed by node id"
            )));
        };

        let mut roles: BTreeMap<NodeRole, Vec<String>> = BTreeMap::new();
        for (node_id, node) in &graph {
            let tag = node
                .get(META_KEY)
                .and_then(|meta| meta.get(ROLE_FIELD))
                .and_then(Value::as_str)
                .filter(|tag| !tag.is_empty());
            if let Some(tag) = tag {
                roles
                    .entry(NodeRole::parse(tag))
                    .or_default()
                    .push(node_id.clone());
            }
        }
        for ids in roles.values_mut() {
            ids.sort();
        }

        Ok(Self { name, graph, roles })
    }

    /// Node ids tagged with `role` (empty when the role is absent).
    pub fn nodes_with_role(&self, role: &NodeRole) -> &[String] {
        self.roles.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Check that the template can be driven by the executor.
    ///
    /// An output saver is mandatory, plus at least one other known role, and
    /// every tagged node must have an `inputs` object.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.nodes_with_role(&NodeRole::OutputSaver).is_empty() {
            return Err(CoreError::Validation(format!(
                "Workflow '{}' has no node tagged '{}'",
                self.name,
                NodeRole::OutputSaver
            )));
        }

        let has_other_known = self
            .roles
            .keys()
            .any(|role| role.is_known() && *role != NodeRole::OutputSaver);
        if !has_other_known {
            return Err(CoreError::Validation(format!(
                "Workflow '{}' has no substitutable roles besides the output saver",
                self.name
            )));
        }

        for (role, ids) in &self.roles {
            for id in ids {
                let has_inputs = self
                    .graph
                    .get(id)
                    .and_then(|node| node.get(INPUTS_KEY))
                    .is_some_and(Value::is_object);
                if !has_inputs {
                    return Err(CoreError::Validation(format!(
                        "Workflow '{}' node {id} ({role}) has no inputs object",
                        self.name
                    )));
                }
            }
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Substitution
// ---------------------------------------------------------------------------

/// Everything the substitutor may inject into a template, borrowed from a
/// job and one of its items.
#[derive(Debug, Clone)]
pub struct SampleParams<'a> {
    pub checkpoint_filename: &'a str,
    pub model_path: &'a str,
    pub prompt_text: &'a str,
    pub negative_prompt: &'a str,
    pub steps: i32,
    pub cfg: f64,
    pub sampler_name: &'a str,
    pub scheduler: &'a str,
    pub seed: i64,
    pub width: i32,
    pub height: i32,
    pub clip_override: Option<&'a str>,
    pub vae_override: Option<&'a str>,
    pub shift: Option<f64>,
}

/// Deep-clone the template graph and inject `params` into every role-tagged
/// node. Returns the graph ready for submission.
pub fn substitute(template: &WorkflowTemplate, params: &SampleParams<'_>) -> Result<Value, CoreError> {
    let mut graph = template.graph.clone();

    for (role, ids) in &template.roles {
        for id in ids {
            let inputs = graph
                .get_mut(id)
                .and_then(|node| node.get_mut(INPUTS_KEY))
                .and_then(Value::as_object_mut)
                .ok_or_else(|| {
                    CoreError::Validation(format!(
                        "Workflow '{}' node {id} ({role}) has no inputs object",
                        template.name
                    ))
                })?;
            apply_role(role, id, inputs, params);
        }
    }

    Ok(Value::Object(graph))
}

fn apply_role(role: &NodeRole, node_id: &str, inputs: &mut Map<String, Value>, params: &SampleParams<'_>) {
    match role {
        NodeRole::ModelLoader => {
            // Checkpoint loaders name the field differently from UNet loaders.
            let field = if inputs.contains_key("ckpt_name") {
                "ckpt_name"
            } else {
                "unet_name"
            };
            inputs.insert(field.into(), params.model_path.into());
        }
        NodeRole::ClipLoader => {
            if let Some(clip) = non_empty(params.clip_override) {
                inputs.insert("clip_name".into(), clip.into());
            }
        }
        NodeRole::VaeLoader => {
            if let Some(vae) = non_empty(params.vae_override) {
                inputs.insert("vae_name".into(), vae.into());
            }
        }
        NodeRole::Sampler => {
            inputs.insert("seed".into(), params.seed.into());
            inputs.insert("steps".into(), params.steps.into());
            inputs.insert("cfg".into(), params.cfg.into());
            inputs.insert("sampler_name".into(), params.sampler_name.into());
            inputs.insert("scheduler".into(), params.scheduler.into());
        }
        NodeRole::PositivePrompt => {
            inputs.insert("text".into(), params.prompt_text.into());
        }
        NodeRole::NegativePrompt => {
            // An empty negative prompt keeps the workflow's own default.
            if !params.negative_prompt.is_empty() {
                inputs.insert("text".into(), params.negative_prompt.into());
            }
        }
        NodeRole::Shift => {
            if let Some(shift) = params.shift {
                inputs.insert("shift".into(), shift.into());
            }
        }
        NodeRole::LatentImage => {
            inputs.insert("width".into(), params.width.into());
            inputs.insert("height".into(), params.height.into());
            inputs.insert("batch_size".into(), LATENT_BATCH_SIZE.into());
        }
        NodeRole::OutputSaver => {
            inputs.insert(
                "filename_prefix".into(),
                output_filename_prefix(params.checkpoint_filename).into(),
            );
        }
        NodeRole::Unknown(raw) => {
            tracing::debug!(node_id, role = %raw, "Skipping node with unknown role");
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
