//! Collaborator traits the sample executor drives.
//!
//! The executor only talks to ComfyUI through [`InferenceClient`] and
//! [`EventStream`], so tests can substitute in-memory fakes. The real
//! implementations forward to [`ComfyUIApi`] and [`ComfyUIStream`].

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::api::{ComfyUIApi, ComfyUIApiError};
use crate::client::ComfyUIClientError;
use crate::events::StreamEvent;
use crate::history::{output_images, OutputImage};
use crate::stream::ComfyUIStream;

/// Request/response side of the inference backend.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Queue a workflow, returning the remote request (prompt) id.
    async fn submit(&self, workflow: &serde_json::Value) -> Result<String, ComfyUIApiError>;

    /// Images a finished request produced, persisted outputs first.
    async fn output_images(&self, prompt_id: &str) -> Result<Vec<OutputImage>, ComfyUIApiError>;

    /// Fetch the bytes of one output file.
    async fn download(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError>;

    /// Drop a queued request and interrupt it if already running.
    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError>;

    /// Model files the backend can load.
    async fn list_models(&self) -> Result<Vec<String>, ComfyUIApiError>;
}

/// Push-notification side of the inference backend.
#[async_trait]
pub trait EventStream: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<StreamEvent>;

    async fn connect(&self) -> Result<(), ComfyUIClientError>;

    async fn close(&self);
}

#[async_trait]
impl InferenceClient for ComfyUIApi {
    async fn submit(&self, workflow: &serde_json::Value) -> Result<String, ComfyUIApiError> {
        let response = self.submit_workflow(workflow).await?;
        tracing::debug!(
            prompt_id = %response.prompt_id,
            queue_position = response.number,
            "Workflow queued",
        );
        Ok(response.prompt_id)
    }

    async fn output_images(&self, prompt_id: &str) -> Result<Vec<OutputImage>, ComfyUIApiError> {
        let history = self.get_history(prompt_id).await?;
        Ok(output_images(&history, prompt_id))
    }

    async fn download(
        &self,
        filename: &str,
        subfolder: &str,
        kind: &str,
    ) -> Result<Vec<u8>, ComfyUIApiError> {
        self.view(filename, subfolder, kind).await
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancel_execution(prompt_id).await?;
        self.interrupt(prompt_id).await
    }

    async fn list_models(&self) -> Result<Vec<String>, ComfyUIApiError> {
        ComfyUIApi::list_models(self).await
    }
}

#[async_trait]
impl EventStream for ComfyUIStream {
    fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        ComfyUIStream::subscribe(self)
    }

    async fn connect(&self) -> Result<(), ComfyUIClientError> {
        ComfyUIStream::connect(self).await
    }

    async fn close(&self) {
        ComfyUIStream::close(self).await
    }
}
