//! ComfyUI WebSocket message types and parser.
//!
//! ComfyUI sends JSON frames shaped `{"type": "<kind>", "data": {...}}`.
//! Only the kinds the sampler reacts to or logs are modelled; everything
//! else fails to parse and is dropped by the processor.

use serde::Deserialize;

/// The ComfyUI message kinds the sampler understands.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ComfyUIMessage {
    /// Queue depth broadcast.
    #[serde(rename = "status")]
    Status(StatusData),

    /// A node started running. A null or empty `node` marks the end of
    /// the prompt.
    #[serde(rename = "executing")]
    Executing(ExecutingData),

    /// Step counter of a long-running node such as KSampler.
    #[serde(rename = "progress")]
    Progress(ProgressData),

    #[serde(rename = "execution_error")]
    ExecutionError(ErrorData),

    /// The prompt was stopped through `/interrupt`.
    #[serde(rename = "execution_interrupted")]
    ExecutionInterrupted(InterruptedData),
}

impl ComfyUIMessage {
    /// Prompt the message belongs to, when the payload carries one.
    pub fn prompt_id(&self) -> Option<&str> {
        match self {
            Self::Status(_) => None,
            Self::Executing(d) => Some(&d.prompt_id),
            Self::Progress(d) => d.prompt_id.as_deref(),
            Self::ExecutionError(d) => Some(&d.prompt_id),
            Self::ExecutionInterrupted(d) => Some(&d.prompt_id),
        }
    }

    /// `executing` with a null or empty node: every node of the prompt ran.
    pub fn is_prompt_finished(&self) -> bool {
        matches!(self, Self::Executing(d) if d.node.as_deref().map_or(true, str::is_empty))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusData {
    pub status: QueueStatus,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueStatus {
    pub exec_info: ExecInfo,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecInfo {
    pub queue_remaining: i32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExecutingData {
    pub node: Option<String>,
    pub prompt_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressData {
    pub value: i32,
    pub max: i32,
    #[serde(default)]
    pub prompt_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorData {
    pub prompt_id: String,
    pub node_id: String,
    pub exception_message: String,
    pub exception_type: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterruptedData {
    pub prompt_id: String,
    #[serde(default)]
    pub node_id: Option<String>,
}

/// Parse a ComfyUI WebSocket text frame.
///
/// Malformed JSON and kinds outside [`ComfyUIMessage`] are errors.
pub fn parse_message(text: &str) -> Result<ComfyUIMessage, serde_json::Error> {
    serde_json::from_str(text)
}
