//! Queue facade over a [`QueueStore`].

use crate::class::{ClassWeights, QueueClass, WeightedRoundRobin};
use crate::error::{QueueError, QueueResult};
use crate::store::{MemoryStore, QueueStats, QueueStore, RedisStore, RedisStoreConfig};
use crate::task::{RetryPolicy, Task, TaskId, TaskState};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const STALE_ERROR: &str = "worker stopped while processing";

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Relative dequeue share per class
    pub weights: ClassWeights,

    /// Executions allowed per task
    pub max_attempts: u32,

    /// Delay between attempts
    pub retry: RetryPolicy,

    /// Age after which a `Processing` task is presumed abandoned
    pub stale_after: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            weights: ClassWeights::default(),
            max_attempts: 3,
            retry: RetryPolicy::default(),
            stale_after: Duration::from_secs(600),
        }
    }
}

impl QueueConfig {
    pub fn with_weights(mut self, weights: ClassWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }
}

/// Priority-classed task queue.
///
/// Cloning is cheap; clones share the store and the class scheduler.
#[derive(Clone)]
pub struct Queue {
    store: Arc<dyn QueueStore>,
    config: QueueConfig,
    scheduler: Arc<Mutex<WeightedRoundRobin>>,
}

impl Queue {
    /// Create a queue over an existing store.
    pub fn new(store: Arc<dyn QueueStore>, config: QueueConfig) -> Self {
        let scheduler = WeightedRoundRobin::new(config.weights);
        Self {
            store,
            config,
            scheduler: Arc::new(Mutex::new(scheduler)),
        }
    }

    /// Create a queue held in process memory.
    pub fn in_memory(config: QueueConfig) -> Self {
        Self::new(Arc::new(MemoryStore::new()), config)
    }

    /// Create a queue persisted in Redis.
    pub async fn redis(store_config: RedisStoreConfig, config: QueueConfig) -> QueueResult<Self> {
        let store = RedisStore::connect(store_config).await?;
        Ok(Self::new(Arc::new(store), config))
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Enqueue a raw payload.
    pub async fn enqueue(
        &self,
        class: QueueClass,
        task_type: impl Into<String>,
        payload: Vec<u8>,
    ) -> QueueResult<TaskId> {
        let task = Task::new(class, task_type, payload).with_max_attempts(self.config.max_attempts);
        self.enqueue_task(task).await
    }

    /// Enqueue a payload serialized as JSON.
    pub async fn enqueue_json<T: Serialize>(
        &self,
        class: QueueClass,
        task_type: impl Into<String>,
        payload: &T,
    ) -> QueueResult<TaskId> {
        let payload =
            serde_json::to_vec(payload).map_err(|e| QueueError::Serialization(e.to_string()))?;
        self.enqueue(class, task_type, payload).await
    }

    /// Enqueue a prepared task.
    pub async fn enqueue_task(&self, task: Task) -> QueueResult<TaskId> {
        let id = task.id;
        debug!(task_id = %id, task_type = %task.task_type, class = %task.class, "enqueueing task");
        self.store.push(task).await?;
        Ok(id)
    }

    /// Take the next task, honouring class weights.
    ///
    /// Returns `None` when every class is empty.
    pub async fn dequeue(&self) -> QueueResult<Option<Task>> {
        let order = self.scheduler.lock().await.next_order();
        let now = Utc::now();

        for class in order {
            if let Some(task) = self.store.pop(class, now).await? {
                debug!(task_id = %task.id, class = %class, attempt = task.attempt + 1, "dequeued task");
                return Ok(Some(task));
            }
        }

        Ok(None)
    }

    /// Mark a processing task as completed.
    pub async fn ack(&self, id: TaskId) -> QueueResult<()> {
        let mut task = self.processing(id, "ack").await?;
        task.complete(Utc::now());
        self.store.settle(&task).await
    }

    /// Record a failed execution; returns the task's new state.
    pub async fn nack(
        &self,
        id: TaskId,
        retryable: bool,
        error: impl Into<String>,
    ) -> QueueResult<TaskState> {
        let mut task = self.processing(id, "nack").await?;
        let state = task.fail(error, retryable, &self.config.retry, Utc::now());
        self.store.settle(&task).await?;

        if state == TaskState::Dead {
            warn!(
                task_id = %id,
                task_type = %task.task_type,
                class = %task.class,
                attempt = task.attempt,
                error = task.last_error.as_deref().unwrap_or_default(),
                "task moved to dead letters"
            );
        }
        Ok(state)
    }

    /// Fetch a task by id.
    pub async fn get(&self, id: TaskId) -> QueueResult<Option<Task>> {
        self.store.get(id).await
    }

    /// Cancel a task that has not been dispatched yet.
    pub async fn cancel(&self, id: TaskId) -> QueueResult<Task> {
        let task = self.store.cancel(id).await?;
        info!(task_id = %id, class = %task.class, "task cancelled");
        Ok(task)
    }

    /// Per-class counts.
    pub async fn stats(&self) -> QueueResult<QueueStats> {
        self.store.stats().await
    }

    /// Most recently buried tasks first.
    pub async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<Task>> {
        self.store.dead_letters(limit).await
    }

    /// Treat tasks processing longer than `stale_after` as failed attempts.
    pub async fn recover_stale(&self) -> QueueResult<usize> {
        self.recover_older_than(self.config.stale_after).await
    }

    /// Treat tasks processing longer than `age` as failed attempts; returns
    /// how many were recovered.
    pub async fn recover_older_than(&self, age: Duration) -> QueueResult<usize> {
        let now = Utc::now();
        let cutoff = now - chrono::Duration::from_std(age).unwrap_or(chrono::Duration::zero());
        let mut recovered = 0;

        for mut task in self.store.processing_since(cutoff).await? {
            let state = task.fail(STALE_ERROR, true, &self.config.retry, now);
            match self.store.settle(&task).await {
                Ok(()) => {
                    recovered += 1;
                    info!(task_id = %task.id, class = %task.class, attempt = task.attempt, ?state, "recovered stale task");
                }
                Err(QueueError::InvalidState { .. }) => {
                    debug!(task_id = %task.id, "stale task settled concurrently");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(recovered)
    }

    async fn processing(&self, id: TaskId, action: &'static str) -> QueueResult<Task> {
        let task = self.store.get(id).await?.ok_or(QueueError::TaskNotFound(id))?;
        if task.state != TaskState::Processing {
            return Err(QueueError::InvalidState {
                id,
                state: task.state,
                action,
            });
        }
        Ok(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue() -> Queue {
        Queue::in_memory(QueueConfig::default().with_retry_policy(RetryPolicy::immediate()))
    }

    #[test]
    fn test_queue_config_builder() {
        let config = QueueConfig::default()
            .with_weights(ClassWeights::new(4, 2, 1))
            .with_max_attempts(0)
            .with_stale_after(Duration::from_secs(30));

        assert_eq!(config.weights, ClassWeights::new(4, 2, 1));
        assert_eq!(config.max_attempts, 1);
        assert_eq!(config.stale_after, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_enqueue_uses_configured_attempts() {
        let queue = Queue::in_memory(QueueConfig::default().with_max_attempts(5));
        let id = queue
            .enqueue(QueueClass::Default, "t", b"x".to_vec())
            .await
            .unwrap();

        let task = queue.get(id).await.unwrap().unwrap();
        assert_eq!(task.max_attempts, 5);
        assert_eq!(task.state, TaskState::Pending);
    }

    #[tokio::test]
    async fn test_ack_completes() {
        let queue = queue();
        let id = queue.enqueue(QueueClass::Critical, "t", Vec::new()).await.unwrap();

        let task = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(task.id, id);
        queue.ack(id).await.unwrap();

        assert_eq!(queue.get(id).await.unwrap().unwrap().state, TaskState::Completed);
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_ack_requires_processing() {
        let queue = queue();
        let id = queue.enqueue(QueueClass::Low, "t", Vec::new()).await.unwrap();

        assert!(matches!(
            queue.ack(id).await,
            Err(QueueError::InvalidState { action: "ack", .. })
        ));
        assert!(matches!(
            queue.ack(uuid::Uuid::new_v4()).await,
            Err(QueueError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_nack_until_dead() {
        let queue = queue();
        let id = queue.enqueue(QueueClass::Default, "t", Vec::new()).await.unwrap();

        let mut states = Vec::new();
        while let Some(task) = queue.dequeue().await.unwrap() {
            states.push(queue.nack(task.id, true, "boom").await.unwrap());
        }

        assert_eq!(
            states,
            vec![TaskState::Retrying, TaskState::Retrying, TaskState::Dead]
        );
        let dead = queue.dead_letters(10).await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, id);
        assert_eq!(dead[0].attempt, 3);
    }

    #[tokio::test]
    async fn test_non_retryable_nack_is_dead() {
        let queue = queue();
        queue.enqueue(QueueClass::Default, "t", Vec::new()).await.unwrap();

        let task = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(
            queue.nack(task.id, false, "no handler").await.unwrap(),
            TaskState::Dead
        );
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recover_stale_processing() {
        let queue = queue();
        let id = queue.enqueue(QueueClass::Critical, "t", Vec::new()).await.unwrap();
        queue.dequeue().await.unwrap().unwrap();

        assert_eq!(queue.recover_older_than(Duration::from_secs(3600)).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(queue.recover_older_than(Duration::ZERO).await.unwrap(), 1);

        let task = queue.get(id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Retrying);
        assert_eq!(task.attempt, 1);
        assert_eq!(task.last_error.as_deref(), Some(STALE_ERROR));

        let again = queue.dequeue().await.unwrap().unwrap();
        assert_eq!(again.id, id);
    }

    #[tokio::test]
    async fn test_cancel_pending_task() {
        let queue = queue();
        let id = queue.enqueue(QueueClass::Low, "t", Vec::new()).await.unwrap();

        queue.cancel(id).await.unwrap();
        assert!(queue.get(id).await.unwrap().is_none());
        assert!(queue.dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_weighted_dispatch_ratio() {
        let queue = queue();
        for class in QueueClass::ALL {
            for _ in 0..100 {
                queue.enqueue(class, "t", Vec::new()).await.unwrap();
            }
        }

        let mut counts = std::collections::HashMap::new();
        for _ in 0..100 {
            let task = queue.dequeue().await.unwrap().unwrap();
            *counts.entry(task.class).or_insert(0) += 1;
            queue.ack(task.id).await.unwrap();
        }

        assert_eq!(counts[&QueueClass::Critical], 60);
        assert_eq!(counts[&QueueClass::Default], 30);
        assert_eq!(counts[&QueueClass::Low], 10);
    }
}
