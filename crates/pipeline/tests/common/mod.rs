//! In-memory collaborators for driving the executor and planner without
//! PostgreSQL, ComfyUI or a real event stream.

#![allow(dead_code)]

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use sampler_comfyui::api::ComfyUIApiError;
use sampler_comfyui::backend::{EventStream, InferenceClient};
use sampler_comfyui::client::ComfyUIClientError;
use sampler_comfyui::events::StreamEvent;
use sampler_comfyui::history::OutputImage;
use sampler_comfyui::messages::parse_message;
use sampler_core::error::CoreError;
use sampler_core::types::DbId;
use sampler_core::workflow::WorkflowTemplate;
use sampler_db::models::job::{NewSampleJob, SampleJob};
use sampler_db::models::job_item::{JobItem, NewJobItem};
use sampler_db::models::preset::{CreatePreset, NamedPrompt, Preset};
use sampler_db::models::status::{JobItemStatus, JobStatus};
use sampler_db::store::{JobStore, StoreError};
use sampler_events::bus::{EventBus, HubEvent};
use sampler_pipeline::executor::{ExecutorConfig, JobExecutor};
use sampler_pipeline::fs::{FileSystem, TokioFileSystem};
use sampler_pipeline::loader::WorkflowLoader;
use serde_json::Value;
use sqlx::types::Json;
use tempfile::TempDir;
use tokio::sync::broadcast;

pub const SAMPLE_BYTES: &[u8] = b"\x89PNG fake image";

pub const DEFAULT_NEGATIVE: &str = "workflow default negative";

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

/// [`JobStore`] over vectors, counting every write.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<StoreData>,
    writes: AtomicUsize,
}

impl MemoryStore {
    /// Insert a job created `age_secs` ago with one item per checkpoint.
    pub fn add_job(&self, status: JobStatus, age_secs: i64, items: &[(&str, JobItemStatus)]) -> SampleJob {
        let mut data = self.data.lock().unwrap();
        let created = Utc::now() - chrono::Duration::seconds(age_secs);
        let job = SampleJob {
            id: data.next_id(),
            training_run_name: "run-a".into(),
            preset_id: 1,
            workflow_name: "zimage".into(),
            vae_override: None,
            clip_override: None,
            shift_override: None,
            status_id: status.id(),
            total_items: items.len() as i32,
            completed_items: 0,
            created_at: created,
            started_at: None,
            completed_at: None,
            updated_at: created,
        };
        for (seed, (checkpoint, item_status)) in items.iter().enumerate() {
            let id = data.next_id();
            data.items.push(JobItem {
                id,
                job_id: job.id,
                checkpoint_filename: checkpoint.to_string(),
                model_path: checkpoint.to_string(),
                prompt_name: "fox".into(),
                prompt_text: "a red fox".into(),
                negative_prompt: String::new(),
                steps: 20,
                cfg: 7.5,
                sampler_name: "euler".into(),
                scheduler: "normal".into(),
                seed: seed as i64 + 1,
                width: 512,
                height: 512,
                status_id: item_status.id(),
                error_message: None,
                output_path: None,
                prompt_id: None,
                created_at: created,
                started_at: None,
                completed_at: None,
                updated_at: created,
            });
        }
        data.jobs.push(job.clone());
        job
    }

    pub fn add_preset(&self, name: &str) -> Preset {
        let mut data = self.data.lock().unwrap();
        let now = Utc::now();
        let preset = Preset {
            id: data.next_id(),
            name: name.into(),
            prompts: Json(vec![NamedPrompt {
                name: "fox".into(),
                text: "a red fox".into(),
            }]),
            negative_prompt: String::new(),
            steps: vec![20],
            cfgs: vec![7.5],
            samplers: vec!["euler".into()],
            schedulers: vec!["normal".into()],
            seeds: vec![1, 2],
            width: 512,
            height: 512,
            created_at: now,
            updated_at: now,
        };
        data.presets.push(preset.clone());
        preset
    }

    /// Rewrite a job directly, bypassing the write counter.
    pub fn edit_job(&self, job_id: DbId, edit: impl FnOnce(&mut SampleJob)) {
        let mut data = self.data.lock().unwrap();
        let job = data.jobs.iter_mut().find(|j| j.id == job_id).unwrap();
        edit(job);
    }

    /// Rewrite an item directly, bypassing the write counter.
    pub fn edit_item(&self, item_id: DbId, edit: impl FnOnce(&mut JobItem)) {
        let mut data = self.data.lock().unwrap();
        let item = data.items.iter_mut().find(|i| i.id == item_id).unwrap();
        edit(item);
    }

    pub fn job(&self, job_id: DbId) -> SampleJob {
        let data = self.data.lock().unwrap();
        data.jobs.iter().find(|j| j.id == job_id).cloned().unwrap()
    }

    pub fn items(&self, job_id: DbId) -> Vec<JobItem> {
        let data = self.data.lock().unwrap();
        data.items.iter().filter(|i| i.job_id == job_id).cloned().collect()
    }

    pub fn item(&self, item_id: DbId) -> JobItem {
        let data = self.data.lock().unwrap();
        data.items.iter().find(|i| i.id == item_id).cloned().unwrap()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn list_jobs(&self) -> Result<Vec<SampleJob>, StoreError> {
        let mut jobs = self.data.lock().unwrap().jobs.clone();
        jobs.sort_by_key(|j| (j.created_at, j.id));
        Ok(jobs)
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
        if !slot.transition(from, to, Utc::now()) {
            return Ok(None);
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(Some(slot.clone()))
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
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(slot.clone())
    }

    async fn list_items(&self, job_id: DbId) -> Result<Vec<JobItem>, StoreError> {
        let mut items = self.items(job_id);
        items.sort_by_key(|i| i.id);
        Ok(items)
    }

    async fn update_item(&self, item: &JobItem) -> Result<(), StoreError> {
        let mut data = self.data.lock().unwrap();
        let slot = data
            .items
            .iter_mut()
            .find(|i| i.id == item.id)
            .ok_or(StoreError::NotFound { entity: "JobItem", id: item.id })?;
        *slot = item.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
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
        self.writes.fetch_add(1, Ordering::SeqCst);
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
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(preset)
    }
}

// ---------------------------------------------------------------------------
// Inference client
// ---------------------------------------------------------------------------

/// Hands out `prompt-1`, `prompt-2`, ... and serves one output image.
pub struct FakeClient {
    prompts: AtomicUsize,
    submitted: Mutex<Vec<Value>>,
    cancelled: Mutex<Vec<String>>,
    submit_error: Mutex<Option<(u16, String)>>,
    images: Mutex<Vec<OutputImage>>,
    models: Vec<String>,
    finish_during_submit: Mutex<Option<Weak<JobExecutor>>>,
    during_next_submit: Mutex<Option<(Weak<JobExecutor>, Vec<StreamEvent>)>>,
}

impl Default for FakeClient {
    fn default() -> Self {
        Self {
            prompts: AtomicUsize::new(0),
            submitted: Mutex::default(),
            cancelled: Mutex::default(),
            submit_error: Mutex::default(),
            images: Mutex::new(vec![OutputImage {
                filename: "ck_00001_.png".into(),
                subfolder: "checkpoint-sampler".into(),
                kind: "output".into(),
            }]),
            models: vec!["a.safetensors".into(), "loras/b.safetensors".into()],
            finish_during_submit: Mutex::default(),
            during_next_submit: Mutex::default(),
        }
    }
}

impl FakeClient {
    /// Make every submission fail with an HTTP error carrying `body`.
    pub fn fail_submissions(&self, status: u16, body: &str) {
        *self.submit_error.lock().unwrap() = Some((status, body.to_string()));
    }

    pub fn set_images(&self, images: Vec<OutputImage>) {
        *self.images.lock().unwrap() = images;
    }

    /// Deliver the completion event to `executor` before `submit` returns.
    pub fn finish_during_submit(&self, executor: &Arc<JobExecutor>) {
        *self.finish_during_submit.lock().unwrap() = Some(Arc::downgrade(executor));
    }

    /// Deliver `events` to `executor` while the next submission is in
    /// flight, before its prompt id is returned.
    pub fn during_next_submit(&self, executor: &Arc<JobExecutor>, events: Vec<StreamEvent>) {
        *self.during_next_submit.lock().unwrap() = Some((Arc::downgrade(executor), events));
    }

    pub fn submitted(&self) -> Vec<Value> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<String> {
        self.cancelled.lock().unwrap().clone()
    }
}

#[async_trait]
impl InferenceClient for FakeClient {
    async fn submit(&self, workflow: &Value) -> Result<String, ComfyUIApiError> {
        let error = self.submit_error.lock().unwrap().clone();
        if let Some((status, body)) = error {
            return Err(ComfyUIApiError::ApiError { status, body });
        }
        self.submitted.lock().unwrap().push(workflow.clone());
        let prompt_id = format!("prompt-{}", self.prompts.fetch_add(1, Ordering::SeqCst) + 1);

        let pending = self.during_next_submit.lock().unwrap().take();
        if let Some((executor, events)) = pending {
            if let Some(executor) = executor.upgrade() {
                for event in events {
                    executor.handle_event(event).await;
                }
            }
        }

        let early = self
            .finish_during_submit
            .lock()
            .unwrap()
            .as_ref()
            .and_then(Weak::upgrade);
        if let Some(executor) = early {
            executor.handle_event(finished(&prompt_id)).await;
        }
        Ok(prompt_id)
    }

    async fn output_images(&self, _prompt_id: &str) -> Result<Vec<OutputImage>, ComfyUIApiError> {
        Ok(self.images.lock().unwrap().clone())
    }

    async fn download(&self, _filename: &str, _subfolder: &str, _kind: &str) -> Result<Vec<u8>, ComfyUIApiError> {
        Ok(SAMPLE_BYTES.to_vec())
    }

    async fn cancel(&self, prompt_id: &str) -> Result<(), ComfyUIApiError> {
        self.cancelled.lock().unwrap().push(prompt_id.to_string());
        Ok(())
    }

    async fn list_models(&self) -> Result<Vec<String>, ComfyUIApiError> {
        Ok(self.models.clone())
    }
}

// ---------------------------------------------------------------------------
// Event stream
// ---------------------------------------------------------------------------

pub struct FakeStream {
    tx: broadcast::Sender<StreamEvent>,
    fail_connect: AtomicBool,
    connects: AtomicUsize,
    closes: AtomicUsize,
}

impl Default for FakeStream {
    fn default() -> Self {
        let (tx, _) = broadcast::channel(64);
        Self {
            tx,
            fail_connect: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }
}

impl FakeStream {
    pub fn emit(&self, event: StreamEvent) {
        let _ = self.tx.send(event);
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventStream for FakeStream {
    fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.tx.subscribe()
    }

    async fn connect(&self) -> Result<(), ComfyUIClientError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(ComfyUIClientError::Connection("connection refused".into()));
        }
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Workflow loader and filesystem
// ---------------------------------------------------------------------------

pub fn workflow_json() -> Value {
    serde_json::json!({
        "1": {"class_type": "UNETLoader", "inputs": {"unet_name": "placeholder", "weight_dtype": "default"}, "_meta": {"role": "model_loader"}},
        "3": {"class_type": "KSampler", "inputs": {"seed": 0, "steps": 1, "cfg": 1.0, "sampler_name": "x", "scheduler": "x"}, "_meta": {"role": "sampler"}},
        "5": {"class_type": "EmptyLatentImage", "inputs": {"width": 1, "height": 1, "batch_size": 4}, "_meta": {"role": "latent_image"}},
        "6": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}, "_meta": {"role": "positive_prompt"}},
        "7": {"class_type": "CLIPTextEncode", "inputs": {"text": DEFAULT_NEGATIVE}, "_meta": {"role": "negative_prompt"}},
        "9": {"class_type": "SaveImage", "inputs": {"filename_prefix": "ComfyUI"}, "_meta": {"role": "output_saver"}}
    })
}

/// Serves [`workflow_json`] under the name `zimage`.
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
        let template = WorkflowTemplate::from_graph(name, workflow_json())?;
        template.validate()?;
        Ok(template)
    }
}

/// Creates directories but refuses to write files.
pub struct ReadOnlyFs;

#[async_trait]
impl FileSystem for ReadOnlyFs {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        TokioFileSystem.create_dir_all(path).await
    }

    async fn write(&self, _path: &Path, _contents: &[u8]) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only filesystem"))
    }

    async fn is_dir(&self, path: &Path) -> bool {
        TokioFileSystem.is_dir(path).await
    }

    async fn rename(&self, _from: &Path, _to: &Path) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only filesystem"))
    }

    async fn remove_file(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }
}

/// Real filesystem that, once armed, asks the executor to stop a job in
/// the middle of writing the next sample image.
#[derive(Default)]
pub struct StopOnImageWrite {
    target: Mutex<Option<(Weak<JobExecutor>, DbId)>>,
    outcome: Mutex<Option<Result<(), String>>>,
}

impl StopOnImageWrite {
    pub fn arm(&self, executor: &Arc<JobExecutor>, job_id: DbId) {
        *self.target.lock().unwrap() = Some((Arc::downgrade(executor), job_id));
    }

    /// Result of the stop request issued during the write, if it fired.
    pub fn outcome(&self) -> Option<Result<(), String>> {
        self.outcome.lock().unwrap().clone()
    }
}

#[async_trait]
impl FileSystem for StopOnImageWrite {
    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        TokioFileSystem.create_dir_all(path).await
    }

    async fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let is_image = path.extension().is_some_and(|ext| ext == "png");
        let target = if is_image { self.target.lock().unwrap().take() } else { None };
        if let Some((executor, job_id)) = target {
            if let Some(executor) = executor.upgrade() {
                let result = executor.request_stop(job_id).await.map_err(|e| e.to_string());
                *self.outcome.lock().unwrap() = Some(result);
            }
        }
        TokioFileSystem.write(path, contents).await
    }

    async fn is_dir(&self, path: &Path) -> bool {
        TokioFileSystem.is_dir(path).await
    }

    async fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        TokioFileSystem.rename(from, to).await
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        TokioFileSystem.remove_file(path).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub executor: Arc<JobExecutor>,
    pub store: Arc<MemoryStore>,
    pub client: Arc<FakeClient>,
    pub stream: Arc<FakeStream>,
    pub hub: Arc<EventBus>,
    pub sample_dir: TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Arc::new(TokioFileSystem), |_| {})
    }

    pub fn build(fs: Arc<dyn FileSystem>, configure: impl FnOnce(&mut ExecutorConfig)) -> Self {
        let sample_dir = tempfile::tempdir().unwrap();
        let mut config = ExecutorConfig::new(sample_dir.path());
        configure(&mut config);

        let store = Arc::new(MemoryStore::default());
        let client = Arc::new(FakeClient::default());
        let stream = Arc::new(FakeStream::default());
        let hub = Arc::new(EventBus::default());
        let executor = Arc::new(JobExecutor::new(
            store.clone(),
            client.clone(),
            stream.clone(),
            Arc::new(FakeLoader),
            fs,
            hub.clone(),
            config,
        ));

        Self {
            executor,
            store,
            client,
            stream,
            hub,
            sample_dir,
        }
    }

    /// A harness whose executor already holds a live connection.
    pub async fn connected() -> Self {
        let harness = Self::new();
        assert!(harness.executor.connect().await);
        harness
    }

    pub async fn tick(&self) {
        self.executor.process_next_item().await.unwrap();
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

fn message(json: &str) -> StreamEvent {
    StreamEvent::Message(parse_message(json).unwrap())
}

/// `executing` with a null node: the prompt finished.
pub fn finished(prompt_id: &str) -> StreamEvent {
    message(&format!(
        r#"{{"type":"executing","data":{{"node":null,"prompt_id":"{prompt_id}"}}}}"#
    ))
}

pub fn executing_node(prompt_id: &str, node: &str) -> StreamEvent {
    message(&format!(
        r#"{{"type":"executing","data":{{"node":"{node}","prompt_id":"{prompt_id}"}}}}"#
    ))
}

pub fn execution_error(prompt_id: &str, detail: &str) -> StreamEvent {
    message(&format!(
        r#"{{"type":"execution_error","data":{{"prompt_id":"{prompt_id}","node_id":"3","exception_message":"{detail}","exception_type":"RuntimeError"}}}}"#
    ))
}

pub fn interrupted(prompt_id: &str) -> StreamEvent {
    message(&format!(
        r#"{{"type":"execution_interrupted","data":{{"prompt_id":"{prompt_id}","node_id":"3","node_type":"KSampler","executed":[]}}}}"#
    ))
}

/// Every hub event received so far with the given type.
pub fn drain(rx: &mut broadcast::Receiver<HubEvent>, event_type: &str) -> Vec<HubEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if event.event_type == event_type {
            events.push(event);
        }
    }
    events
}

/// Poll `check` every few milliseconds until it holds or `timeout` passes.
pub async fn wait_for(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    check()
}
