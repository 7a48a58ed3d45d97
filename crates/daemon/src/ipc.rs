// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC bus: file-watched per-group inboxes for container→host commands.
//!
//! Tree layout under `<data>/ipc/`:
//!
//! ```text
//! <group_folder>/messages/   outbound message / media ops
//! <group_folder>/tasks/      task CRUD + group registration ops
//! <group_folder>/requests/   synchronous requests
//! <group_folder>/responses/  responses, written by the host
//! errors/                    files that failed to parse or dispatch
//! ```
//!
//! The directory name is the source group and is the *only* input to
//! authorization — file contents are never trusted for identity. Each file
//! is consumed exactly once: parse → dispatch → delete.

use dotclaw_adapters::{MemoryStore, SendOptions};
use dotclaw_core::{
    ChatId, Clock, ContextMode, GroupFolder, IdGen, IpcEnvelope, IpcMessageOp, IpcRequest,
    IpcResponse, IpcTaskOp, RegisteredGroup, ScheduleTaskPayload, ScheduledTask, TaskId,
    TaskStatus,
};
use dotclaw_engine::{
    initial_next_run, spawn_background_job, JobWorkers, ProviderRegistry, TaskEngine,
};
use dotclaw_storage::{iso_from_ms, Store};
use notify::Watcher;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Everything IPC dispatch can touch.
pub struct IpcDeps<C: Clock> {
    pub store: Store,
    pub jobs: JobWorkers<C>,
    pub scheduler: TaskEngine<C>,
    pub registry: Arc<ProviderRegistry>,
    pub memory: Arc<dyn MemoryStore>,
    pub clock: C,
    pub ids: Arc<dyn IdGen>,
}

pub struct IpcBus<C: Clock> {
    deps: IpcDeps<C>,
    root: PathBuf,
    poll_interval_ms: u64,
    shutdown: dotclaw_adapters::CancelToken,
}

impl<C: Clock> IpcBus<C> {
    pub fn new(
        deps: IpcDeps<C>,
        root: PathBuf,
        poll_interval_ms: u64,
        shutdown: dotclaw_adapters::CancelToken,
    ) -> Self {
        Self {
            deps,
            root,
            poll_interval_ms,
            shutdown,
        }
    }

    /// Watch loop. Native recursive watching when available, polling
    /// otherwise; scans are serialized by construction (one loop).
    pub async fn run(self) {
        let _ = std::fs::create_dir_all(self.root.join("errors"));

        let (wake_tx, mut wake_rx) = mpsc::channel::<()>(1);
        let _watcher_guard = match create_watcher(&self.root, wake_tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, "ipc watcher unavailable, falling back to polling");
                None
            }
        };

        loop {
            // A wake during a scan leaves a queued permit, so nothing is
            // missed between passes.
            self.scan().await;
            tokio::select! {
                _ = wake_rx.recv() => {}
                _ = tokio::time::sleep(Duration::from_millis(self.poll_interval_ms)) => {}
                _ = self.shutdown.canceled() => break,
            }
        }
        info!("ipc bus stopped");
    }

    /// One pass over every group inbox. Public for tests.
    pub async fn scan(&self) {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries.filter_map(|e| e.ok()) {
            if !entry.path().is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if name == "errors" {
                continue;
            }
            let Ok(source) = GroupFolder::parse(&name) else {
                warn!(dir = name, "ignoring ipc dir with unsafe name");
                continue;
            };
            self.scan_group(&source).await;
        }
    }

    async fn scan_group(&self, source: &GroupFolder) {
        let base = self.root.join(source.as_str());
        for (sub, kind) in [
            ("messages", FileKind::Message),
            ("tasks", FileKind::TaskOp),
            ("requests", FileKind::Request),
        ] {
            let dir = base.join(sub);
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_file())
                .collect();
            files.sort();
            for file in files {
                self.consume(source, &file, kind).await;
            }
        }
    }

    /// Parse → dispatch → delete. Parse or dispatch errors move the file to
    /// the errors directory instead.
    async fn consume(&self, source: &GroupFolder, file: &Path, kind: FileKind) {
        let outcome = self.process_file(source, file, kind).await;
        match outcome {
            Ok(()) => {
                let _ = std::fs::remove_file(file);
            }
            Err(reason) => {
                warn!(source = %source, file = %file.display(), reason, "ipc file rejected");
                quarantine(&self.root, source, file);
            }
        }
    }

    async fn process_file(
        &self,
        source: &GroupFolder,
        file: &Path,
        kind: FileKind,
    ) -> Result<(), String> {
        let body = std::fs::read_to_string(file).map_err(|e| e.to_string())?;
        let envelope = IpcEnvelope::parse(&body).map_err(|e| e.to_string())?;
        match kind {
            FileKind::Message => {
                let op = IpcMessageOp::from_envelope(&envelope).map_err(|e| e.to_string())?;
                self.handle_message_op(source, op).await
            }
            FileKind::TaskOp => {
                let op = IpcTaskOp::from_envelope(&envelope).map_err(|e| e.to_string())?;
                self.handle_task_op(source, op).await
            }
            FileKind::Request => {
                if envelope.id.is_empty() {
                    return Err("request without id".to_string());
                }
                let response = match IpcRequest::from_envelope(&envelope) {
                    Ok(request) => self.handle_request(source, &envelope.id, request).await,
                    Err(e) => IpcResponse::err(&envelope.id, e.to_string()),
                };
                self.write_response(source, &response)
                    .map_err(|e| e.to_string())
            }
        }
    }

    fn source_group(&self, source: &GroupFolder) -> Option<RegisteredGroup> {
        self.deps.store.group_by_folder(source)
    }

    // ---- messages/ ----

    async fn handle_message_op(
        &self,
        source: &GroupFolder,
        op: IpcMessageOp,
    ) -> Result<(), String> {
        let Some(group) = self.source_group(source) else {
            return Err(format!("unknown source group {source}"));
        };
        match op {
            IpcMessageOp::SendMessage {
                chat_id,
                text,
                thread_id,
            } => {
                let target = chat_id.unwrap_or_else(|| group.chat_id.clone());
                if target != group.chat_id && !source.is_main() {
                    warn!(source = %source, target = %target, "Unauthorized send_message attempt blocked");
                    return Ok(());
                }
                let opts = SendOptions {
                    thread_id,
                    ..Default::default()
                };
                self.deps
                    .registry
                    .send_message(&target, &text, &opts)
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            IpcMessageOp::SendDocument {
                chat_id,
                path,
                caption,
            } => {
                let target = chat_id.unwrap_or_else(|| group.chat_id.clone());
                if target != group.chat_id && !source.is_main() {
                    warn!(source = %source, target = %target, "Unauthorized send_document attempt blocked");
                    return Ok(());
                }
                let provider = self
                    .deps
                    .registry
                    .resolve(&target)
                    .ok_or_else(|| format!("no provider for {target}"))?;
                provider
                    .send_document(
                        &target,
                        Path::new(&path),
                        caption.as_deref(),
                        &SendOptions::default(),
                    )
                    .await
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
        }
    }

    // ---- tasks/ ----

    async fn handle_task_op(&self, source: &GroupFolder, op: IpcTaskOp) -> Result<(), String> {
        let Some(group) = self.source_group(source) else {
            return Err(format!("unknown source group {source}"));
        };
        match op {
            IpcTaskOp::ScheduleTask(payload) => self.schedule_task(source, &group, payload),
            IpcTaskOp::UpdateTask(payload) => self.update_task(source, payload),
            IpcTaskOp::PauseTask { task_id } => {
                let Some(task) = self.task_for_op(source, &task_id, "pause_task")? else {
                    return Ok(());
                };
                self.deps
                    .store
                    .pause_task(&task.id, "paused via ipc".to_string())
                    .map_err(|e| e.to_string())
            }
            IpcTaskOp::ResumeTask { task_id } => {
                let Some(task) = self.task_for_op(source, &task_id, "resume_task")? else {
                    return Ok(());
                };
                let next = initial_next_run(
                    task.schedule_kind,
                    &task.schedule_value,
                    &task.timezone,
                    self.deps.clock.now_ms(),
                )
                .map_err(|e| e.to_string())?;
                self.deps
                    .store
                    .resume_task(&task.id, Some(next))
                    .map_err(|e| e.to_string())
            }
            IpcTaskOp::CancelTask { task_id } => {
                let Some(task) = self.task_for_op(source, &task_id, "cancel_task")? else {
                    return Ok(());
                };
                self.deps
                    .store
                    .cancel_task(&task.id)
                    .map_err(|e| e.to_string())
            }
            IpcTaskOp::RegisterGroup(payload) => {
                if !source.is_main() {
                    warn!(source = %source, "Unauthorized register_group attempt blocked");
                    return Ok(());
                }
                let registered = RegisteredGroup {
                    chat_id: payload.chat_id,
                    name: payload.name,
                    folder: payload.folder.clone(),
                    trigger: payload.trigger,
                    added_at: iso_from_ms(self.deps.clock.now_ms()),
                    container_config: None,
                    model_override: None,
                };
                self.deps
                    .store
                    .register_group(registered)
                    .map_err(|e| e.to_string())
            }
            IpcTaskOp::RemoveGroup { chat_id } => {
                if !source.is_main() {
                    warn!(source = %source, "Unauthorized remove_group attempt blocked");
                    return Ok(());
                }
                self.deps
                    .store
                    .unregister_group(&chat_id)
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            }
            IpcTaskOp::SetModel(payload) => {
                // Model overrides are an administrative control.
                if !source.is_main() {
                    warn!(source = %source, "Unauthorized set_model attempt blocked");
                    return Ok(());
                }
                let folder = payload.group_folder.unwrap_or_else(|| source.clone());
                self.deps
                    .store
                    .set_group_model(&folder, payload.model)
                    .map_err(|e| e.to_string())
            }
        }
    }

    fn schedule_task(
        &self,
        source: &GroupFolder,
        group: &RegisteredGroup,
        payload: ScheduleTaskPayload,
    ) -> Result<(), String> {
        let folder = payload.group_folder.clone().unwrap_or_else(|| source.clone());
        if folder != *source && !source.is_main() {
            warn!(source = %source, target = %folder, "Unauthorized schedule_task attempt blocked");
            return Ok(());
        }
        let target_group = if folder == *source {
            group.clone()
        } else {
            self.deps
                .store
                .group_by_folder(&folder)
                .ok_or_else(|| format!("no group {folder}"))?
        };
        let now = self.deps.clock.now_ms();
        let timezone = payload.timezone.unwrap_or_else(|| "UTC".to_string());
        let next = initial_next_run(
            payload.schedule_kind,
            &payload.schedule_value,
            &timezone,
            now,
        )
        .map_err(|e| e.to_string())?;
        let task = ScheduledTask {
            id: payload
                .task_id
                .unwrap_or_else(|| TaskId::new(format!("task-{}", self.deps.ids.next()))),
            group_folder: folder,
            chat_id: payload.chat_id.unwrap_or(target_group.chat_id),
            prompt: payload.prompt,
            schedule_kind: payload.schedule_kind,
            schedule_value: payload.schedule_value,
            timezone,
            context_mode: payload.context_mode.unwrap_or(ContextMode::Isolated),
            next_run_at_ms: Some(next),
            last_run_at_ms: None,
            last_result: None,
            state_json: None,
            retry_count: 0,
            last_error: None,
            running_since_ms: None,
            status: TaskStatus::Active,
            created_at: iso_from_ms(now),
        };
        self.deps.store.create_task(task).map_err(|e| e.to_string())
    }

    fn update_task(&self, source: &GroupFolder, payload: ScheduleTaskPayload) -> Result<(), String> {
        let Some(task_id) = payload.task_id.clone() else {
            return Err("update_task requires task_id".to_string());
        };
        let Some(existing) = self.task_for_op(source, &task_id, "update_task")? else {
            return Ok(());
        };
        let timezone = payload
            .timezone
            .unwrap_or_else(|| existing.timezone.clone());
        let next = initial_next_run(
            payload.schedule_kind,
            &payload.schedule_value,
            &timezone,
            self.deps.clock.now_ms(),
        )
        .map_err(|e| e.to_string())?;
        let updated = ScheduledTask {
            prompt: payload.prompt,
            schedule_kind: payload.schedule_kind,
            schedule_value: payload.schedule_value,
            timezone,
            context_mode: payload.context_mode.unwrap_or(existing.context_mode),
            next_run_at_ms: Some(next),
            retry_count: 0,
            last_error: None,
            status: TaskStatus::Active,
            ..existing
        };
        self.deps.store.update_task(updated).map_err(|e| e.to_string())
    }

    /// Resolve a task for a fire-and-forget op. `Ok(None)` means the source
    /// is not allowed to touch it: the attempt is logged here and the op is
    /// dropped without error, so the file is deleted rather than
    /// quarantined. A missing task is still an error (malformed file).
    fn task_for_op(
        &self,
        source: &GroupFolder,
        task_id: &TaskId,
        op: &str,
    ) -> Result<Option<ScheduledTask>, String> {
        let task = self
            .deps
            .store
            .task(task_id)
            .ok_or_else(|| format!("no task {task_id}"))?;
        if task.group_folder != *source && !source.is_main() {
            warn!(source = %source, task_id = %task_id, "Unauthorized {op} attempt blocked");
            return Ok(None);
        }
        Ok(Some(task))
    }

    /// Resolve a task for a synchronous request; authorization failures
    /// come back as the request's error response.
    fn owned_task(&self, source: &GroupFolder, task_id: &TaskId) -> Result<ScheduledTask, String> {
        match self.task_for_op(source, task_id, "task request")? {
            Some(task) => Ok(task),
            None => Err("not authorized".to_string()),
        }
    }

    // ---- requests/ ----

    async fn handle_request(
        &self,
        source: &GroupFolder,
        id: &str,
        request: IpcRequest,
    ) -> IpcResponse {
        let Some(group) = self.source_group(source) else {
            return IpcResponse::err(id, format!("unknown source group {source}"));
        };
        match request {
            IpcRequest::MemoryUpsert(payload) => {
                match self
                    .deps
                    .memory
                    .upsert(source, payload.key, payload.content, payload.tags)
                    .await
                {
                    Ok(key) => IpcResponse::ok(id, serde_json::json!({ "key": key })),
                    Err(e) => IpcResponse::err(id, e.to_string()),
                }
            }
            IpcRequest::MemorySearch(payload) => {
                let max = payload.max_results.unwrap_or(5) as usize;
                match self.deps.memory.search(source, &payload.query, max).await {
                    Ok(hits) => IpcResponse::ok(id, serde_json::json!({ "hits": hits })),
                    Err(e) => IpcResponse::err(id, e.to_string()),
                }
            }
            IpcRequest::MemoryDelete { key } => {
                match self.deps.memory.delete(source, &key).await {
                    Ok(found) => IpcResponse::ok(id, serde_json::json!({ "deleted": found })),
                    Err(e) => IpcResponse::err(id, e.to_string()),
                }
            }
            IpcRequest::ListGroups => {
                let groups: Vec<serde_json::Value> = self
                    .deps
                    .store
                    .list_groups()
                    .iter()
                    .map(|g| {
                        serde_json::json!({
                            "folder": g.folder.as_str(),
                            "chat_id": g.chat_id.as_str(),
                            "name": g.name,
                        })
                    })
                    .collect();
                IpcResponse::ok(id, serde_json::json!({ "groups": groups }))
            }
            IpcRequest::RunTask { task_id } => {
                let task = match self.owned_task(source, &task_id) {
                    Ok(task) => task,
                    Err(e) => return IpcResponse::err(id, e),
                };
                if task.running_since_ms.is_some() {
                    return IpcResponse::err(id, "task is already running");
                }
                let scheduler = self.deps.scheduler.clone();
                tokio::spawn(async move {
                    if let Err(e) = scheduler.run_task_now(&task_id).await {
                        warn!(task_id = %task_id, error = %e, "ipc run_task failed");
                    }
                });
                IpcResponse::ok(id, serde_json::json!({ "status": "started" }))
            }
            IpcRequest::SpawnJob(spec) => {
                if spec.group_folder != *source && !source.is_main() {
                    warn!(source = %source, target = %spec.group_folder, "Unauthorized spawn_job attempt blocked");
                    return IpcResponse::err(id, "not authorized");
                }
                let mut spec = *spec;
                if spec.chat_id.is_none() {
                    spec.chat_id = Some(group.chat_id.clone());
                }
                match spawn_background_job(
                    &self.deps.store,
                    self.deps.ids.as_ref(),
                    spec,
                    self.deps.clock.now_ms(),
                ) {
                    Ok((job, position)) => IpcResponse::ok(
                        id,
                        serde_json::json!({
                            "job_id": job.id.as_str(),
                            "position": position.position,
                            "total": position.total,
                        }),
                    ),
                    Err(e) => IpcResponse::err(id, e.to_string()),
                }
            }
            IpcRequest::JobStatus { job_id } => match self.owned_job(source, &job_id) {
                Ok(job) => IpcResponse::ok(
                    id,
                    serde_json::json!({
                        "job_id": job.id.as_str(),
                        "status": job.status,
                        "result_summary": job.result_summary,
                        "last_error": job.last_error,
                    }),
                ),
                Err(e) => IpcResponse::err(id, e),
            },
            IpcRequest::ListJobs(mut filter) => {
                if !source.is_main() {
                    filter.group_folder = Some(source.clone());
                }
                let jobs: Vec<serde_json::Value> = self
                    .deps
                    .store
                    .list_background_jobs(&filter)
                    .iter()
                    .map(|j| {
                        serde_json::json!({
                            "job_id": j.id.as_str(),
                            "status": j.status,
                            "prompt": j.prompt,
                        })
                    })
                    .collect();
                IpcResponse::ok(id, serde_json::json!({ "jobs": jobs }))
            }
            IpcRequest::CancelJob { job_id } => match self.owned_job(source, &job_id) {
                Ok(job) => match self.deps.jobs.cancel(&job.id) {
                    Ok(canceled) => {
                        IpcResponse::ok(id, serde_json::json!({ "canceled": canceled }))
                    }
                    Err(e) => IpcResponse::err(id, e.to_string()),
                },
                Err(e) => IpcResponse::err(id, e),
            },
            IpcRequest::JobUpdate(payload) => {
                if let Err(e) = self.owned_job(source, &payload.job_id) {
                    return IpcResponse::err(id, e);
                }
                match self
                    .deps
                    .jobs
                    .record_update(
                        &payload.job_id,
                        payload.level,
                        payload.message,
                        payload.data,
                        payload.notify,
                    )
                    .await
                {
                    Ok(()) => IpcResponse::ok(id, serde_json::json!({ "recorded": true })),
                    Err(e) => IpcResponse::err(id, e.to_string()),
                }
            }
            IpcRequest::EditMessage(payload) => {
                if let Err(e) = self.own_chat(source, &group, &payload.chat_id) {
                    return IpcResponse::err(id, e);
                }
                let Some(provider) = self.deps.registry.resolve(&payload.chat_id) else {
                    return IpcResponse::err(id, format!("no provider for {}", payload.chat_id));
                };
                match provider
                    .edit_message(&payload.chat_id, &payload.message_id, &payload.text)
                    .await
                {
                    Ok(()) => IpcResponse::ok(id, serde_json::json!({ "edited": true })),
                    Err(e) => IpcResponse::err(id, e.to_string()),
                }
            }
            IpcRequest::DeleteMessage(payload) => {
                if let Err(e) = self.own_chat(source, &group, &payload.chat_id) {
                    return IpcResponse::err(id, e);
                }
                let Some(provider) = self.deps.registry.resolve(&payload.chat_id) else {
                    return IpcResponse::err(id, format!("no provider for {}", payload.chat_id));
                };
                match provider
                    .delete_message(&payload.chat_id, &payload.message_id)
                    .await
                {
                    Ok(()) => IpcResponse::ok(id, serde_json::json!({ "deleted": true })),
                    Err(e) => IpcResponse::err(id, e.to_string()),
                }
            }
        }
    }

    /// Resolve a job for a synchronous request. Request-side only: the
    /// caller turns the error into a response, never a quarantine.
    fn owned_job(
        &self,
        source: &GroupFolder,
        job_id: &dotclaw_core::JobId,
    ) -> Result<dotclaw_core::BackgroundJob, String> {
        let job = self
            .deps
            .store
            .background_job(job_id)
            .ok_or_else(|| format!("no job {job_id}"))?;
        if job.group_folder != *source && !source.is_main() {
            warn!(source = %source, job_id = %job_id, "Unauthorized job op attempt blocked");
            return Err("not authorized".to_string());
        }
        Ok(job)
    }

    /// Check a chat target for a synchronous request. Request-side only:
    /// the caller turns the error into a response, never a quarantine.
    fn own_chat(
        &self,
        source: &GroupFolder,
        group: &RegisteredGroup,
        chat_id: &ChatId,
    ) -> Result<(), String> {
        if *chat_id != group.chat_id && !source.is_main() {
            warn!(source = %source, chat_id = %chat_id, "Unauthorized message op attempt blocked");
            return Err("not authorized".to_string());
        }
        Ok(())
    }

    /// Write a response atomically: tmp file + rename.
    fn write_response(&self, source: &GroupFolder, response: &IpcResponse) -> std::io::Result<()> {
        let dir = self.root.join(source.as_str()).join("responses");
        std::fs::create_dir_all(&dir)?;
        let final_path = dir.join(format!("{}.json", response.id));
        let tmp_path = dir.join(format!("{}.json.tmp", response.id));
        let mut body = serde_json::to_vec(response)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        body.push(b'\n');
        std::fs::write(&tmp_path, body)?;
        std::fs::rename(&tmp_path, &final_path)?;
        debug!(source = %source, id = response.id, ok = response.ok, "ipc response written");
        Ok(())
    }
}

#[derive(Clone, Copy)]
enum FileKind {
    Message,
    TaskOp,
    Request,
}

/// Move a rejected file into `errors/`, prefixed with its source group.
fn quarantine(root: &Path, source: &GroupFolder, file: &Path) {
    let errors = root.join("errors");
    let _ = std::fs::create_dir_all(&errors);
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "unnamed".to_string());
    let dest = errors.join(format!("{source}-{name}"));
    if std::fs::rename(file, &dest).is_err() {
        // Cross-device or already gone; last resort is deletion so the scan
        // loop cannot spin on the same file.
        let _ = std::fs::remove_file(file);
    }
}

fn create_watcher(
    root: &Path,
    wake_tx: mpsc::Sender<()>,
) -> Result<notify::RecommendedWatcher, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |res: Result<notify::Event, _>| {
        if res.is_ok() {
            let _ = wake_tx.try_send(());
        }
    })?;
    watcher.watch(root, notify::RecursiveMode::Recursive)?;
    Ok(watcher)
}

#[cfg(test)]
#[path = "ipc_tests.rs"]
mod tests;
