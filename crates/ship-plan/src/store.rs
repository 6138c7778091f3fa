use chrono::{DateTime, TimeDelta, Utc};
use ship_core::events::{PlanEvent, PlanOutcome};
use ship_core::state::TaskStatus;
use ship_core::types::{PlanningRequest, ShippingOption, Task, TaskId};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::event_log::{event_log, EventLogError, LogReader, LogWriter, Subscription};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },
    #[error("invalid status transition for task {task_id}: {from} -> {to}")]
    InvalidTransition {
        task_id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },
    #[error(transparent)]
    EventLog(#[from] EventLogError),
}

#[derive(Debug)]
struct Entry {
    task: Task,
    log: LogReader,
}

/// In-memory task records keyed by id, each with its event log.
#[derive(Debug, Clone, Default)]
pub struct TaskStore {
    inner: Arc<RwLock<HashMap<TaskId, Entry>>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new pending task and hands back the only handle that may
    /// advance it.
    pub async fn create(&self, request: PlanningRequest) -> TaskHandle {
        let task = Task::new(TaskId::generate(), request);
        let task_id = task.id;
        let (writer, log) = event_log();
        let mut guard = self.inner.write().await;
        guard.insert(task_id, Entry { task, log });
        drop(guard);
        debug!(%task_id, "task created");
        TaskHandle {
            task_id,
            store: self.clone(),
            log: writer,
        }
    }

    pub async fn task(&self, task_id: &TaskId) -> Option<Task> {
        let guard = self.inner.read().await;
        guard.get(task_id).map(|entry| entry.task.clone())
    }

    pub async fn log(&self, task_id: &TaskId) -> Option<LogReader> {
        let guard = self.inner.read().await;
        guard.get(task_id).map(|entry| entry.log.clone())
    }

    pub async fn subscribe(&self, task_id: &TaskId) -> Option<Subscription> {
        self.log(task_id).await.map(|log| log.subscribe())
    }

    /// Returns the task together with its sealed outcome, if any, from one
    /// consistent read.
    pub async fn snapshot(&self, task_id: &TaskId) -> Option<(Task, Option<PlanOutcome>)> {
        let guard = self.inner.read().await;
        guard
            .get(task_id)
            .map(|entry| (entry.task.clone(), entry.log.outcome()))
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Drops sealed tasks idle for longer than `retention` with no open
    /// subscriptions.
    pub async fn purge_expired(&self, now: DateTime<Utc>, retention: Duration) -> Vec<TaskId> {
        let retention = TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);
        let mut guard = self.inner.write().await;
        let expired = guard
            .iter()
            .filter(|(_, entry)| {
                entry.task.status.is_terminal()
                    && entry.log.is_sealed()
                    && entry.log.open_subscriptions() == 0
                    && now.signed_duration_since(entry.task.updated_at) >= retention
            })
            .map(|(task_id, _)| *task_id)
            .collect::<Vec<_>>();
        for task_id in &expired {
            guard.remove(task_id);
        }
        expired
    }

    async fn transition(&self, task_id: TaskId, to: TaskStatus) -> Result<Task, StoreError> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound { task_id })?;
        apply_transition(&mut entry.task, to)?;
        Ok(entry.task.clone())
    }

    /// Appends the terminal event and moves the status under one write lock,
    /// so readers never see one without the other.
    async fn seal(
        &self,
        task_id: TaskId,
        log: &LogWriter,
        event: PlanEvent,
        to: TaskStatus,
    ) -> Result<Task, StoreError> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound { task_id })?;
        if !entry.task.status.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                task_id,
                from: entry.task.status,
                to,
            });
        }
        log.append(event)?;
        apply_transition(&mut entry.task, to)?;
        Ok(entry.task.clone())
    }

    async fn abandon(
        &self,
        task_id: TaskId,
        log: &LogWriter,
        event: PlanEvent,
    ) -> Result<Option<Task>, StoreError> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .get_mut(&task_id)
            .ok_or(StoreError::TaskNotFound { task_id })?;
        if entry.task.status.is_terminal() {
            return Ok(None);
        }
        if entry.task.status == TaskStatus::Pending {
            apply_transition(&mut entry.task, TaskStatus::Running)?;
        }
        if !log.is_sealed() {
            log.append(event)?;
        }
        apply_transition(&mut entry.task, TaskStatus::Failed)?;
        Ok(Some(entry.task.clone()))
    }
}

fn apply_transition(task: &mut Task, to: TaskStatus) -> Result<(), StoreError> {
    if !task.status.can_transition_to(to) {
        return Err(StoreError::InvalidTransition {
            task_id: task.id,
            from: task.status,
            to,
        });
    }
    task.status = to;
    task.updated_at = Utc::now();
    Ok(())
}

/// Exclusive write access to one task: its status and its event log.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    store: TaskStore,
    log: LogWriter,
}

impl TaskHandle {
    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn reader(&self) -> LogReader {
        self.log.reader()
    }

    pub async fn start(&self) -> Result<Task, StoreError> {
        self.store.transition(self.task_id, TaskStatus::Running).await
    }

    pub fn progress(&self, message: impl Into<String>) -> Result<usize, StoreError> {
        Ok(self.log.append(PlanEvent::progress(message))?)
    }

    /// Publishes the ranked options, then `Done`, and marks the task succeeded.
    pub async fn succeed(&self, options: Vec<ShippingOption>) -> Result<Task, StoreError> {
        self.log.append(PlanEvent::Options { options })?;
        self.store
            .seal(
                self.task_id,
                &self.log,
                PlanEvent::Done {},
                TaskStatus::Succeeded,
            )
            .await
    }

    pub async fn fail(&self, message: impl Into<String>) -> Result<Task, StoreError> {
        self.store
            .seal(
                self.task_id,
                &self.log,
                PlanEvent::error(message),
                TaskStatus::Failed,
            )
            .await
    }

    /// Fails a task whose worker stopped without settling it. Returns `None`
    /// when the task had already reached a terminal status.
    pub async fn abandon(&self, message: impl Into<String>) -> Result<Option<Task>, StoreError> {
        self.store
            .abandon(self.task_id, &self.log, PlanEvent::error(message))
            .await
    }
}

/// Periodically purges expired tasks until the returned handle is aborted.
pub fn spawn_retention_sweeper(
    store: TaskStore,
    interval: Duration,
    retention: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let purged = store.purge_expired(Utc::now(), retention).await;
            if !purged.is_empty() {
                info!(count = purged.len(), "purged expired planning tasks");
            }
        }
    })
}
