//! Single-flight sample job executor.
//!
//! [`JobExecutor`] walks jobs one item at a time: a tick picks the running
//! job (or auto-starts the oldest pending one), submits its next pending
//! item to ComfyUI and returns. Completion arrives later as a WebSocket
//! event, at which point the image and its sidecar are written and the
//! next tick moves on.
//!
//! All mutable executor state sits behind one `std::sync::Mutex` that is
//! never held across an `.await`.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use sampler_comfyui::backend::{EventStream, InferenceClient};
use sampler_comfyui::events::StreamEvent;
use sampler_comfyui::messages::ComfyUIMessage;
use sampler_core::connection::is_connection_error;
use sampler_core::naming::{output_path, sample_filename};
use sampler_core::types::DbId;
use sampler_core::workflow::substitute;
use sampler_db::models::job::SampleJob;
use sampler_db::models::job_item::JobItem;
use sampler_db::models::status::{JobItemStatus, JobStatus};
use sampler_db::store::{JobStore, StoreError};
use sampler_events::bus::{EventBus, HubEvent, JOB_PROGRESS, SAMPLE_GENERATED};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;
use crate::fs::FileSystem;
use crate::loader::WorkflowLoader;
use crate::progress::{summarize, JobProgress};
use crate::sidecar::{SampleMetadata, SidecarWriter};

/// Default interval between work ticks.
pub const DEFAULT_WORK_TICK: Duration = Duration::from_secs(1);

/// Default interval between reconnect attempts while disconnected.
pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(10);

/// Default time an item may wait for its completion event.
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Early terminal events kept while a submission is in progress.
const MAX_EARLY_EVENTS: usize = 16;

/// Source entity name on hub events.
const JOB_ENTITY: &str = "sample_job";

// ---------------------------------------------------------------------------
// Configuration and state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Root under which `<checkpoint>/<sample>.png` files are written.
    pub sample_dir: PathBuf,
    pub work_tick: Duration,
    pub reconnect_interval: Duration,
    /// `None` disables the in-flight watchdog.
    pub item_timeout: Option<Duration>,
}

impl ExecutorConfig {
    pub fn new(sample_dir: impl Into<PathBuf>) -> Self {
        Self {
            sample_dir: sample_dir.into(),
            work_tick: DEFAULT_WORK_TICK,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            item_timeout: Some(DEFAULT_ITEM_TIMEOUT),
        }
    }
}

/// What the executor is working on right now.
///
/// Never mutated in place: every transition swaps in a new value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveWork {
    pub job_id: DbId,
    pub item_id: Option<DbId>,
    /// ComfyUI prompt id, once the submission returned.
    pub request_id: Option<String>,
    /// When the item was dequeued.
    pub dispatched_at: Option<Instant>,
}

impl ActiveWork {
    fn job_only(job_id: DbId) -> Self {
        Self {
            job_id,
            item_id: None,
            request_id: None,
            dispatched_at: None,
        }
    }

    fn dispatched(job_id: DbId, item_id: DbId) -> Self {
        Self {
            job_id,
            item_id: Some(item_id),
            request_id: None,
            dispatched_at: Some(Instant::now()),
        }
    }

    fn with_request(&self, request_id: String) -> Self {
        Self {
            request_id: Some(request_id),
            ..self.clone()
        }
    }

    fn has_item(&self) -> bool {
        self.item_id.is_some()
    }
}

#[derive(Debug, Default)]
struct ExecutorState {
    active: Option<ActiveWork>,
    stop_requested: bool,
    connected: bool,
    /// Terminal events that arrived before the submit call returned.
    early_events: Vec<ComfyUIMessage>,
}

impl ExecutorState {
    fn active_item(&self) -> Option<DbId> {
        self.active.as_ref().and_then(|a| a.item_id)
    }

    fn clear_item(&mut self, item_id: DbId) {
        if self.active_item() == Some(item_id) {
            self.active = self.active.as_ref().map(|a| ActiveWork::job_only(a.job_id));
            self.early_events.clear();
        }
    }
}

/// How a terminal event resolves the in-flight item.
enum Outcome {
    Completed,
    Failed(String),
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    client: Arc<dyn InferenceClient>,
    stream: Arc<dyn EventStream>,
    loader: Arc<dyn WorkflowLoader>,
    fs: Arc<dyn FileSystem>,
    hub: Arc<EventBus>,
    sidecar: SidecarWriter,
    config: ExecutorConfig,
    state: Mutex<ExecutorState>,
    cancel: CancellationToken,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn JobStore>,
        client: Arc<dyn InferenceClient>,
        stream: Arc<dyn EventStream>,
        loader: Arc<dyn WorkflowLoader>,
        fs: Arc<dyn FileSystem>,
        hub: Arc<EventBus>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            client,
            stream,
            loader,
            sidecar: SidecarWriter::new(Arc::clone(&fs)),
            fs,
            hub,
            config,
            state: Mutex::new(ExecutorState::default()),
            cancel: CancellationToken::new(),
            tasks: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ExecutorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ---- accessors ----

    pub fn active_work(&self) -> Option<ActiveWork> {
        self.lock().active.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.lock().connected
    }

    pub fn stop_requested(&self) -> bool {
        self.lock().stop_requested
    }

    // ---- lifecycle ----

    /// Subscribe to the event stream, attempt a first connection and spawn
    /// the event and tick tasks. A failed connection is retried by the
    /// reconnect tick.
    pub async fn start(self: &Arc<Self>) {
        let events = self.stream.subscribe();
        self.log_running_jobs().await;
        self.connect().await;

        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(Arc::clone(self).run_event_loop(events)));
        tasks.push(tokio::spawn(Arc::clone(self).run_tick_loop()));
        tracing::info!(
            work_tick_ms = self.config.work_tick.as_millis() as u64,
            reconnect_secs = self.config.reconnect_interval.as_secs(),
            sample_dir = %self.config.sample_dir.display(),
            "Job executor started",
        );
    }

    /// Cancel the background tasks, wait for them and close the stream.
    /// Safe to call without a prior [`start`](Self::start).
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handles = std::mem::take(&mut *self.tasks.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Executor task ended abnormally");
            }
        }
        self.stream.close().await;
        tracing::info!("Job executor stopped");
    }

    /// Try to (re)open the event stream, updating the connected flag.
    pub async fn connect(&self) -> bool {
        match self.stream.connect().await {
            Ok(()) => {
                self.lock().connected = true;
                true
            }
            Err(e) => {
                self.lock().connected = false;
                tracing::warn!(error = %e, "ComfyUI unavailable, will retry");
                false
            }
        }
    }

    fn mark_disconnected(&self, reason: &str) {
        let was_connected = std::mem::replace(&mut self.lock().connected, false);
        if was_connected {
            tracing::warn!(reason, "Lost connection to ComfyUI");
        }
    }

    async fn log_running_jobs(&self) {
        match self.store.list_jobs().await {
            Ok(jobs) => {
                for job in jobs.iter().filter(|j| j.has_status(JobStatus::Running)) {
                    tracing::info!(
                        job_id = job.id,
                        completed_items = job.completed_items,
                        total_items = job.total_items,
                        "Resuming running job",
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to list jobs at startup"),
        }
    }

    async fn run_tick_loop(self: Arc<Self>) {
        let mut work = tokio::time::interval(self.config.work_tick);
        work.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut reconnect = tokio::time::interval_at(
            Instant::now() + self.config.reconnect_interval,
            self.config.reconnect_interval,
        );
        reconnect.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = work.tick() => {
                    if let Err(e) = self.process_next_item().await {
                        tracing::error!(error = %e, "Executor tick failed");
                    }
                }
                _ = reconnect.tick() => {
                    if !self.is_connected() && self.connect().await {
                        tracing::info!("Reconnected to ComfyUI");
                    }
                }
            }
        }
    }

    async fn run_event_loop(self: Arc<Self>, mut events: broadcast::Receiver<StreamEvent>) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                received = events.recv() => match received {
                    Ok(event) => self.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Executor fell behind the ComfyUI event stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
    }

    // ---- scheduling ----

    /// One work tick: dequeue and submit the next item if the executor is
    /// idle, connected and not stopped.
    pub async fn process_next_item(&self) -> Result<(), ExecutorError> {
        {
            let state = self.lock();
            if state.stop_requested || !state.connected {
                return Ok(());
            }
        }

        self.expire_stale_item().await?;

        let jobs = self.store.list_jobs().await?;
        let active_job = self.lock().active.as_ref().map(|a| a.job_id);
        let Some(mut job) = select_runnable_job(jobs, active_job) else {
            return Ok(());
        };

        if job.has_status(JobStatus::Pending) {
            if self.lock().active.as_ref().is_some_and(ActiveWork::has_item) {
                return Ok(());
            }
            let Some(started) = self
                .store
                .transition_job(job.id, JobStatus::Pending, JobStatus::Running)
                .await?
            else {
                return Ok(());
            };
            job = started;
            tracing::info!(job_id = job.id, total_items = job.total_items, "Sample job started");
        }

        if self.lock().active.as_ref().is_some_and(ActiveWork::has_item) {
            return Ok(());
        }

        let items = self.store.list_items(job.id).await?;
        let Some(item) = items
            .into_iter()
            .find(|i| i.has_status(JobItemStatus::Pending))
        else {
            return self.complete_job(job).await;
        };

        {
            let mut state = self.lock();
            if state.stop_requested || state.active.as_ref().is_some_and(ActiveWork::has_item) {
                return Ok(());
            }
            state.active = Some(ActiveWork::dispatched(job.id, item.id));
            state.early_events.clear();
        }

        self.process_item(&job, item).await
    }

    async fn complete_job(&self, job: SampleJob) -> Result<(), ExecutorError> {
        let Some(job) = self
            .store
            .transition_job(job.id, JobStatus::Running, JobStatus::Completed)
            .await?
        else {
            tracing::debug!(job_id = job.id, "Job left running before it could complete");
            return Ok(());
        };

        {
            let mut state = self.lock();
            state.active = None;
            state.early_events.clear();
        }

        let items = self.store.list_items(job.id).await?;
        tracing::info!(
            job_id = job.id,
            completed_items = job.completed_items,
            total_items = job.total_items,
            "Sample job completed",
        );
        self.publish_progress(&summarize(&job, &items));
        Ok(())
    }

    /// Mark the item running, build its workflow and submit it.
    async fn process_item(&self, job: &SampleJob, mut item: JobItem) -> Result<(), ExecutorError> {
        let now = Utc::now();
        item.status_id = JobItemStatus::Running.id();
        item.started_at = Some(now);
        item.updated_at = now;
        self.store.update_item(&item).await?;

        let template = match self.loader.load(&job.workflow_name).await {
            Ok(template) => template,
            Err(e) => {
                return self
                    .fail_item(item.id, format!("Failed to load workflow '{}': {e}", job.workflow_name))
                    .await;
            }
        };

        let workflow = match substitute(&template, &item.sample_params(job)) {
            Ok(workflow) => workflow,
            Err(e) => {
                return self
                    .fail_item(item.id, format!("Failed to prepare workflow: {e}"))
                    .await;
            }
        };

        let prompt_id = match self.client.submit(&workflow).await {
            Ok(prompt_id) => prompt_id,
            Err(e) => {
                let message = e.to_string();
                if is_connection_error(&message) {
                    self.mark_disconnected(&message);
                }
                return self
                    .fail_item(item.id, format!("Failed to submit workflow: {message}"))
                    .await;
            }
        };

        item.prompt_id = Some(prompt_id.clone());
        item.updated_at = Utc::now();
        self.store.update_item(&item).await?;

        let early = {
            let mut state = self.lock();
            let current = state
                .active
                .as_ref()
                .filter(|a| a.item_id == Some(item.id))
                .map(|a| a.with_request(prompt_id.clone()));
            if current.is_none() {
                // Watchdog or a failure path already moved on.
                return Ok(());
            }
            state.active = current;
            std::mem::take(&mut state.early_events)
                .into_iter()
                .filter(|m| m.prompt_id() == Some(prompt_id.as_str()))
                .collect::<Vec<_>>()
        };

        tracing::info!(
            job_id = job.id,
            item_id = item.id,
            prompt_id = %prompt_id,
            checkpoint = %item.checkpoint_filename,
            "Sample submitted",
        );

        for message in early {
            tracing::debug!(prompt_id = %prompt_id, "Replaying early ComfyUI event");
            self.handle_message(message).await?;
        }
        Ok(())
    }

    /// Fail the in-flight item if it has waited longer than `item_timeout`.
    async fn expire_stale_item(&self) -> Result<(), ExecutorError> {
        let Some(timeout) = self.config.item_timeout else {
            return Ok(());
        };
        let expired = {
            let state = self.lock();
            state.active.as_ref().and_then(|a| match (a.item_id, a.dispatched_at) {
                (Some(item_id), Some(at)) if at.elapsed() >= timeout => {
                    Some((item_id, a.request_id.clone()))
                }
                _ => None,
            })
        };
        let Some((item_id, request_id)) = expired else {
            return Ok(());
        };

        tracing::warn!(item_id, prompt_id = ?request_id, "Sample timed out waiting for ComfyUI");
        if let Some(prompt_id) = &request_id {
            if let Err(e) = self.client.cancel(prompt_id).await {
                tracing::warn!(prompt_id = %prompt_id, error = %e, "Failed to cancel timed-out prompt");
            }
        }
        self.fail_item(
            item_id,
            format!("Timed out after {}s waiting for ComfyUI", timeout.as_secs()),
        )
        .await
    }

    // ---- events ----

    /// Apply one event from the ComfyUI stream. Failures are logged.
    pub async fn handle_event(&self, event: StreamEvent) {
        match event {
            StreamEvent::Disconnected => self.mark_disconnected("WebSocket closed"),
            StreamEvent::Message(message) => {
                if let Err(e) = self.handle_message(message).await {
                    tracing::error!(error = %e, "Failed to handle ComfyUI event");
                }
            }
        }
    }

    async fn handle_message(&self, message: ComfyUIMessage) -> Result<(), ExecutorError> {
        let outcome = match &message {
            m if m.is_prompt_finished() => Outcome::Completed,
            ComfyUIMessage::ExecutionError(data) => Outcome::Failed(format!(
                "ComfyUI execution error in node {} ({}): {}",
                data.node_id, data.exception_type, data.exception_message
            )),
            ComfyUIMessage::ExecutionInterrupted(_) => {
                Outcome::Failed("ComfyUI execution was interrupted".to_string())
            }
            _ => return Ok(()),
        };
        let Some(prompt_id) = message.prompt_id().map(str::to_string) else {
            return Ok(());
        };

        let target = {
            let mut state = self.lock();
            let Some(active) = state.active.clone() else {
                return Ok(());
            };
            let Some(item_id) = active.item_id else {
                return Ok(());
            };
            match active.request_id.as_deref() {
                None => {
                    if state.early_events.len() < MAX_EARLY_EVENTS {
                        state.early_events.push(message);
                    }
                    return Ok(());
                }
                Some(current) if current != prompt_id => {
                    tracing::debug!(prompt_id = %prompt_id, "Ignoring event for stale prompt");
                    return Ok(());
                }
                Some(_) => (active.job_id, item_id),
            }
        };
        let (job_id, item_id) = target;

        match outcome {
            Outcome::Completed => self.complete_item(job_id, item_id, &prompt_id).await,
            Outcome::Failed(reason) => self.fail_item(item_id, reason).await,
        }
    }

    /// Download the result, write image and sidecar, and mark the item done.
    async fn complete_item(&self, job_id: DbId, item_id: DbId, prompt_id: &str) -> Result<(), ExecutorError> {
        let job = self.store.get_job(job_id).await?;
        let mut item = find_item(self.store.list_items(job_id).await?, item_id)?;

        let path = match self.save_sample(&job, &item, prompt_id).await {
            Ok(path) => path,
            Err(e) => {
                let message = e.to_string();
                if matches!(e, ExecutorError::Inference(_)) && is_connection_error(&message) {
                    self.mark_disconnected(&message);
                }
                return self
                    .fail_item(item_id, format!("Failed to save sample: {message}"))
                    .await;
            }
        };

        let now = Utc::now();
        item.status_id = JobItemStatus::Completed.id();
        item.output_path = Some(path.to_string_lossy().into_owned());
        item.error_message = None;
        item.completed_at = Some(now);
        item.updated_at = now;
        self.store.update_item(&item).await?;

        let progress = self.refresh_progress(job_id).await?;
        tracing::info!(
            job_id,
            item_id,
            prompt_id,
            path = %path.display(),
            completed_items = progress.completed_items,
            total_items = progress.total_items,
            "Sample generated",
        );
        self.hub.publish(
            HubEvent::new(SAMPLE_GENERATED)
                .with_source(JOB_ENTITY, job_id)
                .with_payload(serde_json::json!({
                    "item_id": item_id,
                    "checkpoint": item.checkpoint_filename,
                    "path": item.output_path,
                })),
        );
        self.publish_progress(&progress);

        self.lock().clear_item(item_id);
        Ok(())
    }

    async fn save_sample(&self, job: &SampleJob, item: &JobItem, prompt_id: &str) -> Result<PathBuf, ExecutorError> {
        let images = self.client.output_images(prompt_id).await?;
        let image = images.first().ok_or_else(|| ExecutorError::NoOutput {
            prompt_id: prompt_id.to_string(),
        })?;
        let bytes = self
            .client
            .download(&image.filename, &image.subfolder, &image.kind)
            .await?;

        let filename = sample_filename(
            &item.prompt_name,
            item.steps,
            item.cfg,
            &item.sampler_name,
            &item.scheduler,
            item.seed,
        );
        let path = output_path(&self.config.sample_dir, &item.checkpoint_filename, &filename)?;

        if let Some(dir) = path.parent() {
            if !self.fs.is_dir(dir).await {
                self.fs.create_dir_all(dir).await.map_err(|source| ExecutorError::Io {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }
        self.fs.write(&path, &bytes).await.map_err(|source| ExecutorError::Io {
            path: path.clone(),
            source,
        })?;

        let metadata = SampleMetadata::new(job, item, Utc::now());
        if let Err(e) = self.sidecar.write(&path, &metadata).await {
            tracing::warn!(item_id = item.id, error = %e, "Failed to write sample sidecar");
        }
        Ok(path)
    }

    /// Mark `item_id` failed, recompute progress and release the item slot.
    /// The job stays active.
    async fn fail_item(&self, item_id: DbId, message: String) -> Result<(), ExecutorError> {
        let Some(job_id) = self.lock().active.as_ref().map(|a| a.job_id) else {
            tracing::warn!(item_id, "No active job to attribute failure to");
            return Ok(());
        };

        let mut item = find_item(self.store.list_items(job_id).await?, item_id)?;
        let now = Utc::now();
        item.status_id = JobItemStatus::Failed.id();
        item.error_message = Some(message);
        item.completed_at = Some(now);
        item.updated_at = now;
        self.store.update_item(&item).await?;

        tracing::warn!(
            job_id,
            item_id,
            prompt_id = ?item.prompt_id,
            error = item.error_message.as_deref().unwrap_or_default(),
            "Sample failed",
        );

        let progress = self.refresh_progress(job_id).await?;
        self.publish_progress(&progress);

        self.lock().clear_item(item_id);
        Ok(())
    }

    /// Recount completed items, persist the count if it moved and return
    /// the new roll-up. Reads the job fresh and never writes its status.
    async fn refresh_progress(&self, job_id: DbId) -> Result<JobProgress, ExecutorError> {
        let items = self.store.list_items(job_id).await?;
        let completed = items
            .iter()
            .filter(|i| i.has_status(JobItemStatus::Completed))
            .count() as i32;
        let mut job = self.store.get_job(job_id).await?;
        if completed != job.completed_items {
            job = self.store.set_completed_items(job_id, completed).await?;
        }
        Ok(summarize(&job, &items))
    }

    fn publish_progress(&self, progress: &JobProgress) {
        let payload = serde_json::to_value(progress).unwrap_or_default();
        self.hub.publish(
            HubEvent::new(JOB_PROGRESS)
                .with_source(JOB_ENTITY, progress.job_id)
                .with_payload(payload),
        );
    }

    // ---- stop / resume ----

    /// Pause the active job: no further items are dequeued and the
    /// in-flight prompt, if any, is cancelled on a best-effort basis.
    pub async fn request_stop(&self, job_id: DbId) -> Result<(), ExecutorError> {
        let request_id = {
            let mut state = self.lock();
            let active = state
                .active
                .as_ref()
                .filter(|a| a.job_id == job_id)
                .ok_or(ExecutorError::JobNotActive { job_id })?;
            let request_id = active.request_id.clone();
            state.stop_requested = true;
            request_id
        };
        tracing::info!(job_id, prompt_id = ?request_id, "Stop requested");

        self.move_job(job_id, JobStatus::Running, JobStatus::Paused).await?;

        if let Some(prompt_id) = request_id {
            if let Err(e) = self.client.cancel(&prompt_id).await {
                tracing::warn!(job_id, prompt_id = %prompt_id, error = %e, "Failed to cancel prompt");
            }
        }
        Ok(())
    }

    /// Resume a stopped job.
    ///
    /// Accepts the active job, or a `paused` job while nothing is active
    /// and no other job is `running` (the process restarted after a stop).
    pub async fn request_resume(&self, job_id: DbId) -> Result<(), ExecutorError> {
        let active_job = self.lock().active.as_ref().map(|a| a.job_id);
        match active_job {
            Some(active) if active == job_id => {}
            Some(_) => return Err(ExecutorError::JobNotActive { job_id }),
            None => {
                let jobs = self.store.list_jobs().await?;
                let Some(job) = jobs.iter().find(|j| j.id == job_id) else {
                    return Err(ExecutorError::JobNotActive { job_id });
                };
                if !job.has_status(JobStatus::Paused) {
                    return Err(ExecutorError::JobNotActive { job_id });
                }
                if let Some(other) = jobs.iter().find(|j| j.has_status(JobStatus::Running)) {
                    tracing::info!(job_id, running_job_id = other.id, "Resume refused while another job runs");
                    return Err(ExecutorError::JobNotActive { job_id });
                }
            }
        }

        self.lock().stop_requested = false;
        self.move_job(job_id, JobStatus::Paused, JobStatus::Running).await?;
        tracing::info!(job_id, "Resume requested");
        Ok(())
    }

    /// Apply a `from -> to` status change and publish progress if it took.
    async fn move_job(&self, job_id: DbId, from: JobStatus, to: JobStatus) -> Result<(), ExecutorError> {
        let Some(job) = self.store.transition_job(job_id, from, to).await? else {
            return Ok(());
        };
        let items = self.store.list_items(job_id).await?;
        self.publish_progress(&summarize(&job, &items));
        Ok(())
    }
}

/// The job to work on: the active job while it is still running, else the
/// oldest running job, else the oldest pending job.
fn select_runnable_job(jobs: Vec<SampleJob>, active_job: Option<DbId>) -> Option<SampleJob> {
    let mut candidates: Vec<SampleJob> = jobs
        .into_iter()
        .filter(|j| j.has_status(JobStatus::Running) || j.has_status(JobStatus::Pending))
        .collect();
    candidates.sort_by_key(|j| {
        let running = j.has_status(JobStatus::Running);
        (!(running && Some(j.id) == active_job), !running, j.created_at, j.id)
    });
    candidates.into_iter().next()
}

fn find_item(items: Vec<JobItem>, item_id: DbId) -> Result<JobItem, ExecutorError> {
    items
        .into_iter()
        .find(|i| i.id == item_id)
        .ok_or_else(|| {
            StoreError::NotFound {
                entity: "JobItem",
                id: item_id,
            }
            .into()
        })
}
