//! In-process store for tests and single-process development.
//!
//! Tasks do not survive a restart. Only the newest completed and dead tasks
//! are kept, so a long-running process stays bounded.

use super::{ClassStats, QueueStats, QueueStore};
use crate::class::QueueClass;
use crate::error::{QueueError, QueueResult};
use crate::task::{Task, TaskId, TaskState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Completed tasks kept by [`MemoryStore::new`].
const DEFAULT_KEEP_COMPLETED: usize = 1_000;

/// Dead tasks kept by [`MemoryStore::new`].
const DEFAULT_KEEP_DEAD: usize = 1_000;

struct Inner {
    tasks: HashMap<TaskId, Task>,
    ready: HashMap<QueueClass, VecDeque<TaskId>>,
    scheduled: Vec<TaskId>,
    completed: VecDeque<TaskId>,
    dead: VecDeque<TaskId>,
    keep_completed: usize,
    keep_dead: usize,
}

impl Inner {
    fn new(keep_completed: usize, keep_dead: usize) -> Self {
        Self {
            tasks: HashMap::new(),
            ready: HashMap::new(),
            scheduled: Vec::new(),
            completed: VecDeque::new(),
            dead: VecDeque::new(),
            keep_completed,
            keep_dead,
        }
    }

    /// Store `task` and file its id under its state.
    fn put(&mut self, task: Task, now: DateTime<Utc>) {
        let id = task.id;
        match task.state {
            TaskState::Pending if task.is_due(now) => {
                self.ready.entry(task.class).or_default().push_back(id)
            }
            TaskState::Pending | TaskState::Retrying => self.scheduled.push(id),
            TaskState::Completed => self.completed.push_back(id),
            TaskState::Dead => self.dead.push_back(id),
            TaskState::Processing => {}
        }
        self.tasks.insert(id, task);
        self.evict();
    }

    /// Drop the oldest terminal tasks beyond the retention limits.
    fn evict(&mut self) {
        while self.completed.len() > self.keep_completed {
            if let Some(id) = self.completed.pop_front() {
                self.tasks.remove(&id);
            }
        }
        while self.dead.len() > self.keep_dead {
            if let Some(id) = self.dead.pop_front() {
                self.tasks.remove(&id);
            }
        }
    }

    fn promote_due(&mut self, class: QueueClass, now: DateTime<Utc>) {
        let mut due: Vec<(DateTime<Utc>, TaskId)> = Vec::new();
        let tasks = &self.tasks;
        self.scheduled.retain(|id| match tasks.get(id) {
            Some(task) if task.class == class && task.is_due(now) => {
                due.push((task.next_attempt_at, *id));
                false
            }
            Some(_) => true,
            None => false,
        });

        due.sort();
        for (_, id) in due {
            if let Some(task) = self.tasks.get_mut(&id) {
                task.release();
                self.ready.entry(class).or_default().push_back(id);
            }
        }
    }
}

/// Mutex-guarded in-memory store.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_retention(DEFAULT_KEEP_COMPLETED, DEFAULT_KEEP_DEAD)
    }

    /// Keep at most `completed` finished and `dead` dead-lettered tasks,
    /// dropping the oldest first.
    pub fn with_retention(completed: usize, dead: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::new(completed, dead))),
        }
    }

    /// Number of tasks held in any state.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.tasks.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl QueueStore for MemoryStore {
    async fn push(&self, task: Task) -> QueueResult<()> {
        self.inner.lock().await.put(task, Utc::now());
        Ok(())
    }

    async fn pop(&self, class: QueueClass, now: DateTime<Utc>) -> QueueResult<Option<Task>> {
        let mut inner = self.inner.lock().await;
        inner.promote_due(class, now);

        while let Some(id) = inner.ready.get_mut(&class).and_then(VecDeque::pop_front) {
            if let Some(task) = inner.tasks.get_mut(&id) {
                task.start(now);
                return Ok(Some(task.clone()));
            }
        }

        Ok(None)
    }

    async fn settle(&self, task: &Task) -> QueueResult<()> {
        let mut inner = self.inner.lock().await;

        let stored = inner
            .tasks
            .get(&task.id)
            .ok_or(QueueError::TaskNotFound(task.id))?;
        if stored.state != TaskState::Processing {
            return Err(QueueError::InvalidState {
                id: task.id,
                state: stored.state,
                action: "settle",
            });
        }

        inner.put(task.clone(), Utc::now());
        Ok(())
    }

    async fn get(&self, id: TaskId) -> QueueResult<Option<Task>> {
        Ok(self.inner.lock().await.tasks.get(&id).cloned())
    }

    async fn cancel(&self, id: TaskId) -> QueueResult<Task> {
        let mut inner = self.inner.lock().await;

        let task = inner.tasks.get(&id).ok_or(QueueError::TaskNotFound(id))?;
        if !matches!(task.state, TaskState::Pending | TaskState::Retrying) {
            return Err(QueueError::InvalidState {
                id,
                state: task.state,
                action: "cancel",
            });
        }

        let class = task.class;
        if let Some(ready) = inner.ready.get_mut(&class) {
            ready.retain(|queued| *queued != id);
        }
        inner.scheduled.retain(|queued| *queued != id);
        inner.tasks.remove(&id).ok_or(QueueError::TaskNotFound(id))
    }

    async fn processing_since(&self, started_before: DateTime<Utc>) -> QueueResult<Vec<Task>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .tasks
            .values()
            .filter(|t| t.state == TaskState::Processing)
            .filter(|t| t.started_at.is_some_and(|s| s < started_before))
            .cloned()
            .collect())
    }

    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<Task>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .dead
            .iter()
            .rev()
            .filter_map(|id| inner.tasks.get(id))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let inner = self.inner.lock().await;
        let mut stats = QueueStats::default();

        for class in QueueClass::ALL {
            stats.classes.insert(class, ClassStats::default());
        }

        for (class, ready) in &inner.ready {
            if let Some(entry) = stats.classes.get_mut(class) {
                entry.pending = ready.len();
            }
        }

        for task in inner.tasks.values() {
            let Some(entry) = stats.classes.get_mut(&task.class) else {
                continue;
            };
            match task.state {
                TaskState::Processing => entry.processing += 1,
                TaskState::Completed => entry.completed += 1,
                TaskState::Dead => entry.dead += 1,
                TaskState::Pending | TaskState::Retrying => {}
            }
        }

        for id in &inner.scheduled {
            if let Some(task) = inner.tasks.get(id)
                && let Some(entry) = stats.classes.get_mut(&task.class)
            {
                entry.scheduled += 1;
            }
        }

        Ok(stats)
    }
}
