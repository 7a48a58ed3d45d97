// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The Store: typed operations over the WAL-backed tables.
//!
//! One `parking_lot::Mutex` serializes every writer, which is what makes the
//! claim operations atomic: a row observed as pending/queued inside the lock
//! is claimed in the same critical section, so two concurrent claimers can
//! never take the same row.

use crate::snapshot::Snapshot;
use crate::state::StoreState;
use crate::wal::Wal;
use crate::{iso_from_ms, ms_from_iso};
use dotclaw_core::{
    BackgroundJob, BackgroundJobEvent, Chat, ChatCursor, ChatId, FeedbackEntry, GroupFolder,
    JobFilter, JobId, JobOutcome, JobSpec, JobStatus, QueuedMessage, QueuedStatus, RegisteredGroup,
    ScheduledTask, StoreEvent, StoredMessage, TaskId, TaskStatus, TraceLink,
};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors from store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] crate::wal::WalError),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] crate::snapshot::SnapshotError),
    #[error("{0} not found")]
    NotFound(String),
    #[error("group folder {0:?} already in use")]
    FolderInUse(String),
    #[error("chat {0} already registered")]
    AlreadyRegistered(String),
    #[error("the main group cannot be removed")]
    MainGroupProtected,
    #[error("task {0} is already running")]
    TaskRunning(String),
}

/// Position of a job in the queue at spawn time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueuePosition {
    /// 1-based position among queued jobs
    pub position: usize,
    /// Total queued jobs including this one
    pub total: usize,
}

struct StoreInner {
    state: StoreState,
    wal: Wal,
}

/// Handle to the durable state plane. Cheap to clone; all clones share the
/// single writer.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
    snapshot_path: std::path::PathBuf,
}

impl Store {
    /// Open the store rooted at `dir` (creates `events.wal` / `snapshot.json`).
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir).map_err(crate::wal::WalError::Io)?;
        let snapshot_path = dir.join("snapshot.json");
        let wal_path = dir.join("events.wal");

        let (mut state, base_seq) = match Snapshot::load(&snapshot_path)? {
            Some(snapshot) => (snapshot.state, snapshot.seq),
            None => (StoreState::default(), 0),
        };

        let mut wal = Wal::open(&wal_path, base_seq)?;
        let replay = wal.entries_after(base_seq)?;
        let replay_count = replay.len();
        for entry in replay {
            state.apply_event(&entry.event);
        }
        if replay_count > 0 || base_seq > 0 {
            info!(
                replayed = replay_count,
                snapshot_seq = base_seq,
                "store recovered"
            );
        }

        Ok(Self {
            inner: Arc::new(Mutex::new(StoreInner { state, wal })),
            snapshot_path,
        })
    }

    fn commit(inner: &mut StoreInner, event: StoreEvent) -> Result<(), StoreError> {
        inner.wal.append(&event)?;
        inner.state.apply_event(&event);
        Ok(())
    }

    /// Make buffered WAL entries durable.
    pub fn flush(&self) -> Result<(), StoreError> {
        Ok(self.inner.lock().wal.flush()?)
    }

    pub fn needs_flush(&self) -> bool {
        self.inner.lock().wal.needs_flush()
    }

    /// Save a snapshot and truncate the WAL behind it.
    pub fn checkpoint(&self) -> Result<(), StoreError> {
        // Clone state under the lock, write the snapshot outside it.
        let (snapshot, seq) = {
            let mut inner = self.inner.lock();
            inner.wal.flush()?;
            let seq = inner.wal.write_seq();
            (Snapshot::new(seq, inner.state.clone()), seq)
        };
        if seq == 0 {
            return Ok(());
        }
        snapshot.save(&self.snapshot_path)?;
        // Truncation only after the snapshot is durable.
        self.inner.lock().wal.truncate_before(seq + 1)?;
        Ok(())
    }

    /// Run a read-only closure against the tables.
    pub fn read<T>(&self, f: impl FnOnce(&StoreState) -> T) -> T {
        f(&self.inner.lock().state)
    }

    // ---- chats & message log ----

    pub fn upsert_chat(&self, chat: Chat) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::ChatUpserted { chat })
    }

    pub fn chat(&self, chat_id: &ChatId) -> Option<Chat> {
        self.read(|s| s.chats.get(chat_id.as_str()).cloned())
    }

    pub fn log_message(&self, message: StoredMessage) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::MessageLogged { message })
    }

    /// Messages after the cursor (exclusive) up to `(timestamp, id)`
    /// inclusive, in log order.
    pub fn messages_for_run(
        &self,
        chat_id: &ChatId,
        cursor: Option<&ChatCursor>,
        upto_timestamp: &str,
        upto_id: &str,
    ) -> Vec<StoredMessage> {
        self.read(|s| {
            let mut rows: Vec<StoredMessage> = s
                .messages
                .get(chat_id.as_str())
                .map(|log| {
                    log.iter()
                        .filter(|m| !m.is_outbound)
                        .filter(|m| match cursor {
                            Some(c) => c.is_after(&m.timestamp, m.id.as_str()),
                            None => true,
                        })
                        .filter(|m| {
                            (m.timestamp.as_str(), m.id.as_str()) <= (upto_timestamp, upto_id)
                        })
                        .cloned()
                        .collect()
                })
                .unwrap_or_default();
            rows.sort_by(|a, b| a.log_key().cmp(&b.log_key()));
            rows
        })
    }

    pub fn cursor(&self, chat_id: &ChatId) -> Option<ChatCursor> {
        self.read(|s| s.cursors.get(chat_id.as_str()).cloned())
    }

    /// Advance the cursor; stale (non-monotonic) advances are dropped by the
    /// state layer.
    pub fn advance_cursor(&self, cursor: ChatCursor) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::CursorAdvanced { cursor })
    }

    // ---- processing queue ----

    /// Enqueue an observed message. Idempotent by `(chat_id, message_id)`:
    /// returns `None` when the row was already present (redelivery).
    pub fn enqueue_message(
        &self,
        mut message: QueuedMessage,
    ) -> Result<Option<u64>, StoreError> {
        let mut inner = self.inner.lock();
        if inner
            .state
            .queue_contains(message.chat_id.as_str(), message.message_id.as_str())
        {
            return Ok(None);
        }
        let auto_id = inner.state.last_queue_id + 1;
        message.auto_id = auto_id;
        message.status = QueuedStatus::Pending;
        Self::commit(&mut inner, StoreEvent::QueueEnqueued { message })?;
        Ok(Some(auto_id))
    }

    /// Atomically claim the next batch for one chat.
    ///
    /// The batch is the contiguous prefix (auto_id order) of pending rows
    /// whose timestamps lie within `window_ms` of the oldest pending row; a
    /// delta exactly equal to the window is inside the batch.
    pub fn claim_batch_for_chat(
        &self,
        chat_id: &ChatId,
        now_ms: u64,
        window_ms: u64,
        max_size: usize,
    ) -> Result<Vec<QueuedMessage>, StoreError> {
        let mut inner = self.inner.lock();
        let pending: Vec<QueuedMessage> = inner
            .state
            .queued
            .values()
            .filter(|q| q.chat_id == *chat_id && q.status == QueuedStatus::Pending)
            .cloned()
            .collect();
        let Some(oldest) = pending.first() else {
            return Ok(Vec::new());
        };
        let base = ms_from_iso(&oldest.timestamp);
        let mut batch: Vec<QueuedMessage> = Vec::new();
        for row in pending {
            if batch.len() >= max_size {
                break;
            }
            if ms_from_iso(&row.timestamp).saturating_sub(base) <= window_ms {
                batch.push(row);
            } else {
                break;
            }
        }
        let auto_ids: Vec<u64> = batch.iter().map(|q| q.auto_id).collect();
        Self::commit(
            &mut inner,
            StoreEvent::QueueClaimed {
                chat_id: chat_id.clone(),
                auto_ids,
                at_ms: now_ms,
            },
        )?;
        for row in &mut batch {
            row.status = QueuedStatus::Claimed;
            row.claimed_at_ms = Some(now_ms);
        }
        Ok(batch)
    }

    pub fn complete_queued_messages(&self, auto_ids: Vec<u64>) -> Result<(), StoreError> {
        if auto_ids.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::QueueCompleted { auto_ids })
    }

    pub fn fail_queued_messages(&self, auto_ids: Vec<u64>, error: String) -> Result<(), StoreError> {
        if auto_ids.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::QueueFailed { auto_ids, error })
    }

    /// Return claimed rows to pending for a retry; bumps attempt counts.
    pub fn requeue_queued_messages(
        &self,
        auto_ids: Vec<u64>,
        error: String,
    ) -> Result<(), StoreError> {
        if auto_ids.is_empty() {
            return Ok(());
        }
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::QueueRequeued { auto_ids, error })
    }

    /// Return stalled claims (held longer than `threshold_ms`) to pending.
    pub fn reset_stalled_messages(
        &self,
        now_ms: u64,
        threshold_ms: u64,
    ) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let auto_ids: Vec<u64> = inner
            .state
            .queued
            .values()
            .filter(|q| q.status == QueuedStatus::Claimed)
            .filter(|q| {
                q.claimed_at_ms
                    .is_none_or(|at| now_ms.saturating_sub(at) >= threshold_ms)
            })
            .map(|q| q.auto_id)
            .collect();
        let count = auto_ids.len();
        if count > 0 {
            Self::commit(&mut inner, StoreEvent::QueueStalledReset { auto_ids })?;
        }
        Ok(count)
    }

    /// Chats that currently have pending rows.
    pub fn chats_with_pending(&self) -> Vec<ChatId> {
        self.read(|s| {
            let mut out: Vec<ChatId> = Vec::new();
            for q in s.queued.values() {
                if q.status == QueuedStatus::Pending && !out.contains(&q.chat_id) {
                    out.push(q.chat_id.clone());
                }
            }
            out
        })
    }

    pub fn pending_count(&self, chat_id: &ChatId) -> usize {
        self.read(|s| {
            s.queued
                .values()
                .filter(|q| q.chat_id == *chat_id && q.status == QueuedStatus::Pending)
                .count()
        })
    }

    /// Drop terminal (completed/failed) queue rows. Called from maintenance.
    pub fn prune_terminal_queued(&self) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let auto_ids: Vec<u64> = inner
            .state
            .queued
            .values()
            .filter(|q| matches!(q.status, QueuedStatus::Completed | QueuedStatus::Failed))
            .map(|q| q.auto_id)
            .collect();
        let count = auto_ids.len();
        if count > 0 {
            Self::commit(&mut inner, StoreEvent::QueuePruned { auto_ids })?;
        }
        Ok(count)
    }

    // ---- groups & sessions ----

    pub fn register_group(&self, group: RegisteredGroup) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if inner.state.groups.contains_key(group.chat_id.as_str()) {
            return Err(StoreError::AlreadyRegistered(
                group.chat_id.as_str().to_string(),
            ));
        }
        let folder_taken = inner
            .state
            .groups
            .values()
            .any(|g| g.folder == group.folder);
        if folder_taken {
            return Err(StoreError::FolderInUse(group.folder.as_str().to_string()));
        }
        Self::commit(&mut inner, StoreEvent::GroupRegistered { group })
    }

    pub fn unregister_group(&self, chat_id: &ChatId) -> Result<RegisteredGroup, StoreError> {
        let mut inner = self.inner.lock();
        let group = inner
            .state
            .groups
            .get(chat_id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("group for {chat_id}")))?;
        if group.folder.is_main() {
            return Err(StoreError::MainGroupProtected);
        }
        Self::commit(
            &mut inner,
            StoreEvent::GroupRemoved {
                chat_id: chat_id.clone(),
            },
        )?;
        Ok(group)
    }

    pub fn group_by_chat(&self, chat_id: &ChatId) -> Option<RegisteredGroup> {
        self.read(|s| s.groups.get(chat_id.as_str()).cloned())
    }

    pub fn group_by_folder(&self, folder: &GroupFolder) -> Option<RegisteredGroup> {
        self.read(|s| s.groups.values().find(|g| g.folder == *folder).cloned())
    }

    pub fn list_groups(&self) -> Vec<RegisteredGroup> {
        self.read(|s| {
            let mut groups: Vec<RegisteredGroup> = s.groups.values().cloned().collect();
            groups.sort_by(|a, b| a.folder.as_str().cmp(b.folder.as_str()));
            groups
        })
    }

    pub fn set_group_model(
        &self,
        folder: &GroupFolder,
        model: Option<String>,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        let exists = inner.state.groups.values().any(|g| g.folder == *folder);
        if !exists {
            return Err(StoreError::NotFound(format!("group {folder}")));
        }
        Self::commit(
            &mut inner,
            StoreEvent::GroupModelSet {
                folder: folder.clone(),
                model,
            },
        )
    }

    pub fn set_session(&self, folder: &GroupFolder, session_id: String) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(
            &mut inner,
            StoreEvent::SessionSet {
                folder: folder.clone(),
                session_id,
            },
        )
    }

    pub fn session(&self, folder: &GroupFolder) -> Option<String> {
        self.read(|s| s.sessions.get(folder.as_str()).cloned())
    }

    // ---- scheduled tasks ----

    pub fn create_task(&self, task: ScheduledTask) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::TaskCreated { task })
    }

    pub fn update_task(&self, task: ScheduledTask) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.tasks.contains_key(task.id.as_str()) {
            return Err(StoreError::NotFound(format!("task {}", task.id)));
        }
        Self::commit(&mut inner, StoreEvent::TaskUpdated { task })
    }

    pub fn task(&self, id: &TaskId) -> Option<ScheduledTask> {
        self.read(|s| s.tasks.get(id.as_str()).cloned())
    }

    pub fn list_tasks(&self, group: Option<&GroupFolder>) -> Vec<ScheduledTask> {
        self.read(|s| {
            let mut tasks: Vec<ScheduledTask> = s
                .tasks
                .values()
                .filter(|t| group.is_none_or(|g| t.group_folder == *g))
                .cloned()
                .collect();
            tasks.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
            tasks
        })
    }

    /// Atomically claim every due task (`active ∧ next_run ≤ now ∧ not
    /// running`), setting `running_since`.
    pub fn claim_due_tasks(&self, now_ms: u64) -> Result<Vec<ScheduledTask>, StoreError> {
        let mut inner = self.inner.lock();
        let mut due: Vec<ScheduledTask> = inner
            .state
            .tasks
            .values()
            .filter(|t| t.is_due(now_ms))
            .cloned()
            .collect();
        if due.is_empty() {
            return Ok(Vec::new());
        }
        due.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        let ids: Vec<TaskId> = due.iter().map(|t| t.id.clone()).collect();
        Self::commit(&mut inner, StoreEvent::TasksClaimed { ids, at_ms: now_ms })?;
        for task in &mut due {
            task.running_since_ms = Some(now_ms);
        }
        Ok(due)
    }

    /// Claim one task out of band (for immediate runs). Rejects when a
    /// claim is already held.
    pub fn claim_task(&self, id: &TaskId, now_ms: u64) -> Result<ScheduledTask, StoreError> {
        let mut inner = self.inner.lock();
        let mut task = inner
            .state
            .tasks
            .get(id.as_str())
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("task {id}")))?;
        if task.running_since_ms.is_some() {
            return Err(StoreError::TaskRunning(id.as_str().to_string()));
        }
        Self::commit(
            &mut inner,
            StoreEvent::TasksClaimed {
                ids: vec![id.clone()],
                at_ms: now_ms,
            },
        )?;
        task.running_since_ms = Some(now_ms);
        Ok(task)
    }

    /// Clear `running_since`, record the result, advance (or clear) the
    /// schedule.
    #[allow(clippy::too_many_arguments)]
    pub fn update_task_after_run(
        &self,
        id: &TaskId,
        next_run_at_ms: Option<u64>,
        result: Option<String>,
        error: Option<String>,
        retry_count: u32,
        status: TaskStatus,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.tasks.contains_key(id.as_str()) {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Self::commit(
            &mut inner,
            StoreEvent::TaskRunFinished {
                id: id.clone(),
                next_run_at_ms,
                last_run_at_ms: now_ms,
                result,
                error,
                retry_count,
                status,
            },
        )
    }

    pub fn pause_task(&self, id: &TaskId, reason: String) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.tasks.contains_key(id.as_str()) {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Self::commit(
            &mut inner,
            StoreEvent::TaskPaused {
                id: id.clone(),
                reason,
            },
        )
    }

    pub fn resume_task(&self, id: &TaskId, next_run_at_ms: Option<u64>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.tasks.contains_key(id.as_str()) {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Self::commit(
            &mut inner,
            StoreEvent::TaskResumed {
                id: id.clone(),
                next_run_at_ms,
            },
        )
    }

    pub fn cancel_task(&self, id: &TaskId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.tasks.contains_key(id.as_str()) {
            return Err(StoreError::NotFound(format!("task {id}")));
        }
        Self::commit(&mut inner, StoreEvent::TaskCanceled { id: id.clone() })
    }

    // ---- background jobs ----

    /// Insert a new job in `queued` and report its queue position.
    pub fn spawn_background_job(
        &self,
        id: JobId,
        spec: JobSpec,
        now_ms: u64,
    ) -> Result<(BackgroundJob, QueuePosition), StoreError> {
        let now_iso = iso_from_ms(now_ms);
        let job = BackgroundJob {
            id: id.clone(),
            group_folder: spec.group_folder,
            chat_id: spec.chat_id,
            prompt: spec.prompt,
            context_mode: spec.context_mode,
            status: JobStatus::Queued,
            created_at: now_iso.clone(),
            updated_at: now_iso,
            started_at_ms: None,
            finished_at_ms: None,
            timeout_ms: spec.timeout_ms,
            max_tool_steps: spec.max_tool_steps,
            tool_policy_json: spec.tool_policy_json,
            model_override: spec.model_override,
            priority: spec.priority,
            tags: spec.tags,
            parent_trace_id: spec.parent_trace_id,
            parent_message_id: spec.parent_message_id,
            estimated_minutes: spec.estimated_minutes,
            result_summary: None,
            output_path: None,
            output_truncated: false,
            last_error: None,
            lease_expires_at_ms: None,
            attempt_count: 0,
        };
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::JobSpawned { job: job.clone() })?;
        let position = Self::position_of(&inner.state, &id);
        Ok((job, position))
    }

    fn position_of(state: &StoreState, id: &JobId) -> QueuePosition {
        let mut queued: Vec<&BackgroundJob> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .collect();
        queued.sort_by_key(|j| j.queue_key());
        let position = queued
            .iter()
            .position(|j| j.id == *id)
            .map(|i| i + 1)
            .unwrap_or(queued.len().max(1));
        QueuePosition {
            position,
            total: queued.len().max(1),
        }
    }

    /// Claim the highest-priority queued job (FIFO tie-break) with a lease.
    pub fn claim_background_job(
        &self,
        now_ms: u64,
        lease_ttl_ms: u64,
    ) -> Result<Option<BackgroundJob>, StoreError> {
        let mut inner = self.inner.lock();
        let mut queued: Vec<BackgroundJob> = inner
            .state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Queued)
            .cloned()
            .collect();
        queued.sort_by(|a, b| a.queue_key().cmp(&b.queue_key()));
        let Some(mut job) = queued.into_iter().next() else {
            return Ok(None);
        };
        let lease_expires_at_ms = now_ms + lease_ttl_ms;
        Self::commit(
            &mut inner,
            StoreEvent::JobClaimed {
                id: job.id.clone(),
                at_ms: now_ms,
                lease_expires_at_ms,
            },
        )?;
        job.status = JobStatus::Running;
        job.started_at_ms = Some(now_ms);
        job.lease_expires_at_ms = Some(lease_expires_at_ms);
        job.attempt_count += 1;
        Ok(Some(job))
    }

    pub fn renew_background_job_lease(
        &self,
        id: &JobId,
        now_ms: u64,
        lease_ttl_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.jobs.contains_key(id.as_str()) {
            return Err(StoreError::NotFound(format!("job {id}")));
        }
        Self::commit(
            &mut inner,
            StoreEvent::JobLeaseRenewed {
                id: id.clone(),
                lease_expires_at_ms: now_ms + lease_ttl_ms,
            },
        )
    }

    pub fn finish_background_job(
        &self,
        id: &JobId,
        outcome: JobOutcome,
        summary: Option<String>,
        error: Option<String>,
        now_ms: u64,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        if !inner.state.jobs.contains_key(id.as_str()) {
            return Err(StoreError::NotFound(format!("job {id}")));
        }
        Self::commit(
            &mut inner,
            StoreEvent::JobFinished {
                id: id.clone(),
                outcome,
                summary,
                error,
                at_ms: now_ms,
            },
        )
    }

    /// Transition a still-queued job to canceled. Returns false when the job
    /// has already been claimed (the worker's abort token handles that case).
    pub fn cancel_queued_job(&self, id: &JobId, now_ms: u64) -> Result<bool, StoreError> {
        let mut inner = self.inner.lock();
        let Some(job) = inner.state.jobs.get(id.as_str()) else {
            return Err(StoreError::NotFound(format!("job {id}")));
        };
        if job.status != JobStatus::Queued {
            return Ok(false);
        }
        Self::commit(
            &mut inner,
            StoreEvent::JobFinished {
                id: id.clone(),
                outcome: JobOutcome::Canceled,
                summary: None,
                error: None,
                at_ms: now_ms,
            },
        )?;
        Ok(true)
    }

    /// Return running jobs with expired leases to the queue.
    pub fn reset_stalled_background_jobs(&self, now_ms: u64) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let ids: Vec<JobId> = inner
            .state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Running)
            .filter(|j| j.lease_expires_at_ms.is_none_or(|at| at < now_ms))
            .map(|j| j.id.clone())
            .collect();
        let count = ids.len();
        if count > 0 {
            Self::commit(&mut inner, StoreEvent::JobsStalledReset { ids })?;
        }
        Ok(count)
    }

    pub fn background_job(&self, id: &JobId) -> Option<BackgroundJob> {
        self.read(|s| s.jobs.get(id.as_str()).cloned())
    }

    pub fn list_background_jobs(&self, filter: &JobFilter) -> Vec<BackgroundJob> {
        self.read(|s| {
            let mut jobs: Vec<BackgroundJob> = s
                .jobs
                .values()
                .filter(|j| {
                    filter
                        .group_folder
                        .as_ref()
                        .is_none_or(|g| j.group_folder == *g)
                })
                .filter(|j| filter.status.is_none_or(|st| j.status == st))
                .cloned()
                .collect();
            jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            if let Some(limit) = filter.limit {
                jobs.truncate(limit);
            }
            jobs
        })
    }

    pub fn append_job_event(&self, event: BackgroundJobEvent) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::JobEventAppended { event })
    }

    pub fn job_events(&self, id: &JobId) -> Vec<BackgroundJobEvent> {
        self.read(|s| {
            s.job_events
                .iter()
                .filter(|e| e.job_id == *id)
                .cloned()
                .collect()
        })
    }

    // ---- traces & feedback ----

    pub fn link_trace(&self, link: TraceLink) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::TraceLinked { link })
    }

    pub fn trace_for_message(&self, chat_id: &ChatId, sent_message_id: &str) -> Option<TraceLink> {
        self.read(|s| s.trace_link(chat_id.as_str(), sent_message_id).cloned())
    }

    pub fn record_feedback(&self, feedback: FeedbackEntry) -> Result<(), StoreError> {
        let mut inner = self.inner.lock();
        Self::commit(&mut inner, StoreEvent::FeedbackRecorded { feedback })
    }
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
