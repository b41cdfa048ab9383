//! REST API client for the ComfyUI HTTP endpoints.
//!
//! Wraps the ComfyUI HTTP API (workflow submission, cancellation,
//! interruption, history retrieval, image download, model listing) using
//! [`reqwest`].

use serde::Deserialize;

/// Loader nodes whose combo inputs enumerate the model files ComfyUI can
/// load, as `(node class, input name)`.
const MODEL_LISTING_INPUTS: &[(&str, &str)] = &[
    ("UNETLoader", "unet_name"),
    ("CheckpointLoaderSimple", "ckpt_name"),
];

/// HTTP client for a single ComfyUI instance.
pub struct ComfyUIApi {
    client: reqwest::Client,
    api_url: String,
    client_id: String,
}

/// Response returned by the ComfyUI `/prompt` endpoint after
/// successfully queuing a workflow.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned identifier for the queued prompt.
    pub prompt_id: String,
    /// Position in the execution queue.
    pub number: i32,
}

/// Errors from the ComfyUI REST API layer.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// ComfyUI returned a non-2xx status code.
    #[error("ComfyUI API error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl ComfyUIApi {
    /// Create a new API client for a ComfyUI instance.
    ///
    /// * `api_url`   - Base HTTP URL, e.g. `http://host:8188`.
    /// * `client_id` - Id sent with every submission; must match the id the
    ///   WebSocket connection registered so ComfyUI routes execution events
    ///   for our prompts to it.
    pub fn new(api_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), api_url, client_id)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(
        client: reqwest::Client,
        api_url: impl Into<String>,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client_id: client_id.into(),
        }
    }

    /// HTTP API base URL (e.g. `http://host:8188`).
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a workflow for execution.
    ///
    /// Sends a `POST /prompt` request with the given workflow JSON and
    /// this client's id. Returns the server-assigned `prompt_id` and queue
    /// position.
    pub async fn submit_workflow(
        &self,
        workflow: &serde_json::Value,
    ) -> Result<SubmitResponse, ComfyUIApiError> {
        let body = serde_json::json!({
            "prompt": workflow,
            "client_id": self.client_id,
        });

        let response = self
            .client
            .post(format!("{}/prompt", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Remove a queued prompt.
    ///
    /// Sends a `POST /queue` request asking ComfyUI to delete the
    /// specified prompt from the queue. Has no effect once it is running.
    pub async fn cancel_execution(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let body = serde_json::json!({
            "delete": [prompt_id],
        });

        let response = self
            .client
            .post(format!("{}/queue", self.api_url))
            .json(&body)
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Interrupt a running prompt.
    ///
    /// Sends a `POST /interrupt` naming the prompt, so an unrelated
    /// execution started by another client is left alone.
    pub async fn interrupt(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        let response = self
            .client
            .post(format!("{}/interrupt", self.api_url))
            .json(&serde_json::json!({ "prompt_id": prompt_id }))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Retrieve execution history for a specific prompt.
    ///
    /// Sends a `GET /history/{prompt_id}` request. The returned JSON
    /// contains output file locations, node results, and timing data.
    pub async fn get_history(&self, prompt_id: &str) -> Result<serde_json::Value, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/history/{}", self.api_url, prompt_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Download a file through `GET /view`.
    pub async fn view(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        let response = self
            .client
            .get(format!("{}/view", self.api_url))
            .query(&[("filename", filename), ("subfolder", subfolder), ("type", kind)])
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// List the model files the loader nodes can see.
    ///
    /// Queries `GET /object_info/{node}` for each known loader class and
    /// merges the options of its model input, preserving first-seen order.
    pub async fn list_models(&self) -> Result<Vec<String>, ComfyUIApiError> {
        let mut models: Vec<String> = Vec::new();
        for (node, input) in MODEL_LISTING_INPUTS {
            let response = self
                .client
                .get(format!("{}/object_info/{}", self.api_url, node))
                .send()
                .await?;
            let info: serde_json::Value = Self::parse_response(response).await?;
            for name in combo_options(&info, node, input) {
                if !models.contains(&name) {
                    models.push(name);
                }
            }
        }
        Ok(models)
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`ComfyUIApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, ComfyUIApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ComfyUIApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ComfyUIApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    /// Assert the response has a success status code, discarding the body.
    async fn check_status(response: reqwest::Response) -> Result<(), ComfyUIApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

/// Extract the option list of a combo input from an `/object_info` payload.
///
/// Older servers describe combos as `[[options...], {config}]`, newer ones
/// as `["COMBO", {"options": [...]}]`. Both are accepted.
fn combo_options(info: &serde_json::Value, node: &str, input: &str) -> Vec<String> {
    let Some(input_def) = info
        .get(node)
        .and_then(|n| n.get("input"))
        .and_then(|i| i.get("required"))
        .and_then(|r| r.get(input))
        .and_then(|s| s.as_array())
    else {
        return Vec::new();
    };

    let options = match input_def.first() {
        Some(serde_json::Value::Array(list)) => Some(list),
        Some(serde_json::Value::String(_)) => input_def
            .get(1)
            .and_then(|cfg| cfg.get("options"))
            .and_then(|o| o.as_array()),
        _ => None,
    };

    options
        .map(|list| {
            list.iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
