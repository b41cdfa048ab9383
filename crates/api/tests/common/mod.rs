//! Shared helpers for API integration tests: in-memory collaborators and a
//! router built exactly like the binary's.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use sampler_api::config::ServerConfig;
use sampler_api::router::build_app_router;
use sampler_api::state::AppState;
use sampler_api::ws::WsManager;
use sampler_comfyui::api::ComfyUIApiError;
use sampler_comfyui::backend::{EventStream, InferenceClient};
use sampler_comfyui::client::ComfyUIClientError;
use sampler_comfyui::events::StreamEvent;
use sampler_comfyui::history::OutputImage;
use sampler_core::error::CoreError;
use sampler_core::types::DbId;
use sampler_core::workflow::WorkflowTemplate;
use sampler_db::models::job::{NewSampleJob, SampleJob};
use sampler_db::models::job_item::{JobItem, NewJobItem};
use sampler_db::models::preset::{CreatePreset, Preset};
use sampler_db::models::status::JobStatus;
use sampler_db::store::{JobStore, StoreError};
use sampler_events::EventBus;
use sampler_pipeline::fs::TokioFileSystem;
use sampler_pipeline::loader::WorkflowLoader;
use sampler_pipeline::planner::JobPlanner;
use sampler_pipeline::{ExecutorConfig, JobExecutor};
use serde_json::Value;
use sqlx::types::Json;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tower::ServiceExt;

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct StoreData {
    jobs: Vec<SampleJob>,
    items: Vec<JobItem>,
    presets: Vec<Preset>,
    next_id: DbId,
}

impl StoreData {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn list_jobs(&self) -> Result<Vec<SampleJob>, StoreError> {
        Ok(self.data.lock().unwrap().jobs.clone())
    }

    async fn get_job(&self, job_id: DbId) -> Result<SampleJob, StoreError> {
        let data = self.data.lock().unwrap();
        data.jobs
            .iter()
            .find(|j| j.id == job_id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "SampleJob", id: job_id })
    }

    async fn transition_job(
        &self,
        job_id: DbId,
        from: JobStatus,
        to: JobStatus,
    ) -> Result<Option<SampleJob>, StoreError> {
        let mut data = self.data.lock().unwrap();
        let slot = data
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(StoreError::NotFound { entity: "SampleJob", id: job_id })?;
        Ok(slot.transition(from, to, Utc::now()).then(|| slot.clone()))
    }

    async fn set_completed_items(&self, job_id: DbId, completed_items: i32) -> Result<SampleJob, StoreError> {
        let mut data = self.data.lock().unwrap();
        let slot = data
            .jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or(StoreError::NotFound { entity: "SampleJob", id: job_id })?;
        slot.completed_items = completed_items;
        slot.updated_at = Utc::now();
        Ok(slot.clone())
    }

    async fn list_items(&self, job_id: DbId) -> Result<Vec<JobItem>, StoreError> {
        let data = self.data.lock().unwrap();
        Ok(data.items.iter().filter(|i| i.job_id == job_id).cloned().collect())
    }

    async fn update_item(&self, item: &JobItem) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        let slot = data
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or(StoreError::NotFound { entity: "JobItem", id: item.id })?;
        *slot = item.clone();
        Ok(())
    }

    async fn create_job(&self, job: &NewSampleJob, items: &[NewJobItem]) -> Result<SampleJob, StoreError> {
        let mut data = self.data.lock().unwrap();
        let now = Utc::now();
        let created = SampleJob {
            id: data.next_id(),
            training_run_name: job.training_run_name.clone(),
            preset_id: job.preset_id,
            workflow_name: job.workflow_name.clone(),
            vae_override: job.vae_override.clone(),
            clip_override: job.clip_override.clone(),
            shift_override: job.shift_override,
            status_id: JobStatus::Pending.id(),
            total_items: items.len() as i32,
            completed_items: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
        };
        for new in items {
            let id = data.next_id();
            data.items.push(JobItem {
                id,
                job_id: created.id,
                checkpoint_filename: new.checkpoint_filename.clone(),
                model_path: new.model_path.clone(),
                prompt_name: new.prompt_name.clone(),
                prompt_text: new.prompt_text.clone(),
                negative_prompt: new.negative_prompt.clone(),
                steps: new.steps,
                cfg: new.cfg,
                sampler_name: new.sampler_name.clone(),
                scheduler: new.scheduler.clone(),
                seed: new.seed,
                width: new.width,
                height: new.height,
                status_id: new.status_id,
                error_message: new.error_message.clone(),
                output_path: None,
                prompt_id: None,
                created_at: now,
                started_at: None,
                completed_at: None,
                updated_at: now,
            });
        }
        data.jobs.push(created.clone());
        Ok(created)
    }

    async fn get_preset(&self, preset_id: DbId) -> Result<Preset, StoreError> {
        let data = self.data.lock().unwrap();
        data.presets
            .iter()
            .find(|p| p.id == preset_id)
            .cloned()
            .ok_or(StoreError::NotFound { entity: "Preset", id: preset_id })
    }

    async fn list_presets(&self) -> Result<Vec<Preset>, StoreError> {
        let mut presets = self.data.lock().unwrap().presets.clone();
        presets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(presets)
    }

    async fn create_preset(&self, input: &CreatePreset) -> Result<Preset, StoreError> {
        let mut data = self.data.lock().unwrap();
        let now = Utc::now();
        let preset = Preset {
            id: data.next_id(),
            name: input.name.clone(),
            prompts: Json(input.prompts.clone()),
            negative_prompt: input.negative_prompt.clone(),
            steps: input.steps.clone(),
            cfgs: input.cfgs.clone(),
            samplers: input.samplers.clone(),
            schedulers: input.schedulers.clone(),
            seeds: input.seeds.clone(),
            width: input.width,
            height: input.height,
            created_at: now,
            updated_at: now,
        };
        data.presets.push(preset.clone());
        Ok(preset)
    }
}

// ---------------------------------------------------------------------------
// ComfyUI fakes
// ---------------------------------------------------------------------------

/// Accepts every submission and knows two models.
#[derive(Default)]
pub struct FakeClient {
    prompts: AtomicUsize,
    cancelled: Mutex<Vec<String>>,
}

impl FakeClient {
    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for FakeClient {
    async fn submit(&self, _workflow: &Value) -> Result<String, ComfyUIApiError> {
        Ok(format!("prompt-{}", self.prompts.fetch_add(1, Ordering::SeqCst) + 1))
    }

    async fn output_images(&self, _prompt_id: &str) -> Result<Vec<OutputImage>, ComfyUIApiError> {
        Ok(Vec::new())
    }

    async fn download(&self, _filename: &str, _subfolder: &str, _kind: &str) -> Result<Vec<u8>, ComfyUIApiError> {
        Ok(Vec::new())
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancelled.lock().unwrap().push(prompt_id.to_string());
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, ComfyUIApiError> {
        Ok(vec!["a.safetensors".into(), "loras/b.safetensors".into()])
    }
}

pub struct FakeStream {
    tx: broadcast::Sender<StreamEvent>,
}

impl Default for FakeStream {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }
}

#[async_trait]
impl EventStream for FakeStream {
    fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    async fn connect(&self) -> Result<(), ComfyUIClientError> {
        Ok(())
    }

    async fn close(&self) {}
}

/// Serves one workflow named `zimage`.
pub struct FakeLoader;

#[async_trait]
impl WorkflowLoader for FakeLoader {
    async fn load(&self, name: &str) -> Result<WorkflowTemplate, CoreError> {
        if name != "zimage" {
            return Err(CoreError::NotFound {
                entity: "Workflow",
                key: name.to_string(),
            });
        }
        let graph = serde_json::json!({
            "3": {"class_type": "KSampler", "inputs": {"seed": 0}, "_meta": {"role": "sampler"}},
            "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "x"}, "_meta": {"role": "output_saver"}}
        });
        let template = WorkflowTemplate::from_graph(name, graph)?;
        template.validate()?;
        Ok(template)
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(sample_dir: &std::path::Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        database_url: "postgres://unused".to_string(),
        comfyui_url: "http://127.0.0.1:8188".to_string(),
        comfyui_ws_url: "ws://127.0.0.1:8188".to_string(),
        sample_dir: sample_dir.to_path_buf(),
        workflow_dir: sample_dir.to_path_buf(),
        work_tick_ms: 1000,
        reconnect_interval_secs: 10,
        item_timeout_secs: 0,
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryStore>,
    pub client: Arc<FakeClient>,
    pub executor: Arc<JobExecutor>,
    pub event_bus: Arc<EventBus>,
    _sample_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let sample_dir = tempfile::tempdir().unwrap();
        let config = test_config(sample_dir.path());

        let store = Arc::new(MemoryStore::default());
        let client = Arc::new(FakeClient::default());
        let event_bus = Arc::new(EventBus::default());
        let executor = Arc::new(JobExecutor::new(
            store.clone(),
            client.clone(),
            Arc::new(FakeStream::default()),
            Arc::new(FakeLoader),
            Arc::new(TokioFileSystem),
            event_bus.clone(),
            ExecutorConfig::new(sample_dir.path()),
        ));
        let planner = Arc::new(JobPlanner::new(store.clone(), client.clone(), Arc::new(FakeLoader)));

        let state = AppState {
            store: store.clone(),
            executor: executor.clone(),
            planner,
            config: Arc::new(config.clone()),
            ws_manager: Arc::new(WsManager::new()),
            event_bus: event_bus.clone(),
        };

        Self {
            router: build_app_router(state, &config),
            store,
            client,
            executor,
            event_bus,
            _sample_dir: sample_dir,
        }
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Method::GET, uri, None).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> Response<Body> {
        self.send(Method::POST, uri, Some(body)).await
    }

    pub async fn post_empty(&self, uri: &str) -> Response<Body> {
        self.send(Method::POST, uri, None).await
    }

    async fn send(&self, method: Method, uri: &str, body: Option<Value>) -> Response<Body> {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(json) => builder
                .header("content-type", "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.router.clone().oneshot(request).await.unwrap()
    }

    /// Create a preset through the API and return its id.
    pub async fn create_preset(&self, name: &str) -> DbId {
        let response = self.post("/api/v1/presets", preset_body(name)).await;
        assert_eq!(response.status(), 201);
        body_json(response).await["data"]["id"].as_i64().unwrap()
    }

    /// Create a job through the API and return its id.
    pub async fn create_job(&self, checkpoints: &[&str]) -> DbId {
        let preset_id = self.create_preset("basic").await;
        let response = self.post("/api/v1/jobs", job_body(preset_id, checkpoints)).await;
        assert_eq!(response.status(), 201);
        body_json(response).await["data"]["id"].as_i64().unwrap()
    }
}

pub fn preset_body(name: &str) -> Value {
    serde_json::json!({
        "name": name,
        "prompts": [{"name": "fox", "text": "a red fox"}],
        "steps": [20],
        "cfgs": [7.5],
        "samplers": ["euler"],
        "schedulers": ["normal"],
        "seeds": [1, 2],
        "width": 512,
        "height": 512
    })
}

pub fn job_body(preset_id: DbId, checkpoints: &[&str]) -> Value {
    serde_json::json!({
        "training_run_name": "run-a",
        "checkpoints": checkpoints,
        "preset_id": preset_id,
        "workflow_name": "zimage"
    })
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
