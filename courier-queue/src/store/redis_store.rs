//! Durable store backed by Redis.
//!
//! Layout under `key_prefix`:
//!
//! - `task:<id>`: task JSON
//! - `<class>:pending`: ready set, scored by ready time (ms)
//! - `<class>:scheduled`: waiting retries and delayed tasks, scored by due time (ms)
//! - `<class>:processing`: held tasks, scored by start time (ms)
//! - `<class>:completed` / `<class>:dead`: scored by finish time (ms)
//!
//! Moves between sets run as Lua scripts, so a task id is always in exactly
//! one set even if the process dies mid-transition. The task body is
//! rewritten after the move; a task that was popped but whose body still
//! says `Pending` is found by stale recovery through the processing set.

use super::{ClassStats, QueueStats, QueueStore};
use crate::class::QueueClass;
use crate::error::{QueueError, QueueResult};
use crate::task::{Task, TaskId, TaskState};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Move every due member of the scheduled set into the pending set.
const PROMOTE_DUE_SCRIPT: &str = r#"
    local due = redis.call("zrangebyscore", KEYS[1], "-inf", ARGV[1])
    for _, member in ipairs(due) do
        redis.call("zrem", KEYS[1], member)
        redis.call("zadd", KEYS[2], ARGV[1], member)
    end
    return due
"#;

/// Pop the oldest pending member straight into the processing set.
const POP_SCRIPT: &str = r#"
    local popped = redis.call("zpopmin", KEYS[1], 1)
    if #popped == 0 then
        return false
    end
    redis.call("zadd", KEYS[2], ARGV[1], popped[1])
    return popped[1]
"#;

/// Redis store configuration.
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Redis connection URL
    pub redis_url: String,

    /// Key prefix for Redis keys
    pub key_prefix: String,

    /// How long completed tasks are kept
    pub retention_time: Duration,
}

impl RedisStoreConfig {
    pub fn new(redis_url: impl Into<String>) -> Self {
        Self {
            redis_url: redis_url.into(),
            key_prefix: "courier:queue".to_string(),
            retention_time: Duration::from_secs(86400),
        }
    }

    /// Set the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Set the retention time for completed tasks.
    pub fn with_retention_time(mut self, retention_time: Duration) -> Self {
        self.retention_time = retention_time;
        self
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.key_prefix, suffix)
    }

    fn task_key(&self, id: TaskId) -> String {
        self.key(&format!("task:{}", id))
    }

    fn set_key(&self, class: QueueClass, set: &str) -> String {
        self.key(&format!("{}:{}", class, set))
    }
}

/// Task store backed by Redis.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    config: RedisStoreConfig,
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(config: RedisStoreConfig) -> QueueResult<Self> {
        info!(prefix = %config.key_prefix, "connecting redis task store");

        let client = Client::open(config.redis_url.as_str())
            .map_err(|e| QueueError::Config(e.to_string()))?;
        let connection = ConnectionManager::new(client).await?;

        Ok(Self { connection, config })
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }

    async fn load(&self, id: TaskId) -> QueueResult<Option<Task>> {
        let mut conn = self.connection.clone();
        let json: Option<String> = conn.get(self.config.task_key(id)).await?;

        json.map(|json| {
            serde_json::from_str(&json).map_err(|e| QueueError::Deserialization(e.to_string()))
        })
        .transpose()
    }

    async fn save(&self, task: &Task) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let json =
            serde_json::to_string(task).map_err(|e| QueueError::Serialization(e.to_string()))?;
        let key = self.config.task_key(task.id);

        if task.state == TaskState::Completed {
            let _: () = conn
                .set_ex(&key, json, self.config.retention_time.as_secs())
                .await?;
        } else {
            let _: () = conn.set(&key, json).await?;
        }
        Ok(())
    }

    /// Add the task id to the set matching its state.
    async fn index(&self, task: &Task, now: DateTime<Utc>) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let member = task.id.to_string();
        let class = task.class;

        match task.state {
            TaskState::Pending if task.is_due(now) => {
                let key = self.config.set_key(class, "pending");
                let _: () = conn.zadd(key, member, now.timestamp_millis()).await?;
            }
            TaskState::Pending | TaskState::Retrying => {
                let key = self.config.set_key(class, "scheduled");
                let score = task.next_attempt_at.timestamp_millis();
                let _: () = conn.zadd(key, member, score).await?;
            }
            TaskState::Completed => {
                let key = self.config.set_key(class, "completed");
                let _: () = conn.zadd(&key, member, now.timestamp_millis()).await?;

                let horizon = now
                    - chrono::Duration::from_std(self.config.retention_time)
                        .unwrap_or_else(|_| chrono::Duration::days(1));
                let _: () = conn
                    .zrembyscore(&key, "-inf", horizon.timestamp_millis())
                    .await?;
            }
            TaskState::Dead => {
                let key = self.config.set_key(class, "dead");
                let _: () = conn.zadd(key, member, now.timestamp_millis()).await?;
            }
            TaskState::Processing => {
                let key = self.config.set_key(class, "processing");
                let started = task.started_at.unwrap_or(now);
                let _: () = conn.zadd(key, member, started.timestamp_millis()).await?;
            }
        }
        Ok(())
    }

    async fn promote_due(&self, class: QueueClass, now: DateTime<Utc>) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let due: Vec<String> = redis::Script::new(PROMOTE_DUE_SCRIPT)
            .key(self.config.set_key(class, "scheduled"))
            .key(self.config.set_key(class, "pending"))
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        for member in due {
            let Ok(id) = member.parse::<TaskId>() else {
                warn!(member = %member, "malformed entry promoted to pending");
                continue;
            };

            match self.load(id).await? {
                Some(mut task) => {
                    task.release();
                    self.save(&task).await?;
                    debug!(task_id = %id, class = %class, "promoted scheduled task");
                }
                None => warn!(task_id = %id, "scheduled task has no stored body"),
            }
        }

        Ok(())
    }
}

#[async_trait]
impl QueueStore for RedisStore {
    async fn push(&self, task: Task) -> QueueResult<()> {
        self.save(&task).await?;
        self.index(&task, Utc::now()).await
    }

    async fn pop(&self, class: QueueClass, now: DateTime<Utc>) -> QueueResult<Option<Task>> {
        self.promote_due(class, now).await?;

        let mut conn = self.connection.clone();
        let processing_key = self.config.set_key(class, "processing");

        loop {
            let popped: Option<String> = redis::Script::new(POP_SCRIPT)
                .key(self.config.set_key(class, "pending"))
                .key(&processing_key)
                .arg(now.timestamp_millis())
                .invoke_async(&mut conn)
                .await?;
            let Some(member) = popped else {
                return Ok(None);
            };

            let task = match member.parse::<TaskId>() {
                Ok(id) => self.load(id).await?,
                Err(_) => None,
            };
            let Some(mut task) = task else {
                warn!(member = %member, "dropping pending entry without a task body");
                let _: () = conn.zrem(&processing_key, &member).await?;
                continue;
            };

            task.start(now);
            self.save(&task).await?;
            return Ok(Some(task));
        }
    }

    async fn settle(&self, task: &Task) -> QueueResult<()> {
        let mut conn = self.connection.clone();
        let processing_key = self.config.set_key(task.class, "processing");

        let removed: i64 = conn.zrem(&processing_key, task.id.to_string()).await?;
        if removed == 0 {
            let state = self
                .load(task.id)
                .await?
                .map(|stored| stored.state)
                .ok_or(QueueError::TaskNotFound(task.id))?;
            return Err(QueueError::InvalidState {
                id: task.id,
                state,
                action: "settle",
            });
        }

        self.save(task).await?;
        self.index(task, Utc::now()).await
    }

    async fn get(&self, id: TaskId) -> QueueResult<Option<Task>> {
        self.load(id).await
    }

    async fn cancel(&self, id: TaskId) -> QueueResult<Task> {
        let task = self.load(id).await?.ok_or(QueueError::TaskNotFound(id))?;

        let mut conn = self.connection.clone();
        let member = id.to_string();
        let mut removed: i64 = 0;
        for set in ["pending", "scheduled"] {
            let count: i64 = conn
                .zrem(self.config.set_key(task.class, set), &member)
                .await?;
            removed += count;
        }

        if removed == 0 {
            let state = self
                .load(id)
                .await?
                .map(|t| t.state)
                .unwrap_or(task.state);
            return Err(QueueError::InvalidState {
                id,
                state,
                action: "cancel",
            });
        }

        let _: () = conn.del(self.config.task_key(id)).await?;
        Ok(task)
    }

    async fn processing_since(&self, started_before: DateTime<Utc>) -> QueueResult<Vec<Task>> {
        let mut conn = self.connection.clone();
        let mut stale = Vec::new();

        for class in QueueClass::ALL {
            let members: Vec<String> = conn
                .zrangebyscore(
                    self.config.set_key(class, "processing"),
                    "-inf",
                    format!("({}", started_before.timestamp_millis()),
                )
                .await?;

            for member in members {
                if let Ok(id) = member.parse::<TaskId>()
                    && let Some(task) = self.load(id).await?
                {
                    stale.push(task);
                }
            }
        }

        Ok(stale)
    }

    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<Task>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.connection.clone();
        let stop = isize::try_from(limit).unwrap_or(isize::MAX) - 1;
        let mut entries: Vec<(String, f64)> = Vec::new();

        for class in QueueClass::ALL {
            let newest: Vec<(String, f64)> = conn
                .zrevrange_withscores(self.config.set_key(class, "dead"), 0, stop)
                .await?;
            entries.extend(newest);
        }

        entries.sort_by(|a, b| b.1.total_cmp(&a.1));
        entries.truncate(limit);

        let mut tasks = Vec::with_capacity(entries.len());
        for (member, _) in entries {
            if let Ok(id) = member.parse::<TaskId>()
                && let Some(task) = self.load(id).await?
            {
                tasks.push(task);
            }
        }
        Ok(tasks)
    }

    async fn stats(&self) -> QueueResult<QueueStats> {
        let mut conn = self.connection.clone();
        let mut stats = QueueStats::default();

        for class in QueueClass::ALL {
            let key = |set: &str| self.config.set_key(class, set);
            let entry = ClassStats {
                pending: conn.zcard(key("pending")).await?,
                scheduled: conn.zcard(key("scheduled")).await?,
                processing: conn.zcard(key("processing")).await?,
                completed: conn.zcard(key("completed")).await?,
                dead: conn.zcard(key("dead")).await?,
            };
            stats.classes.insert(class, entry);
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_config_defaults() {
        let config = RedisStoreConfig::new("redis://localhost:6379");
        assert_eq!(config.key_prefix, "courier:queue");
        assert_eq!(config.retention_time, Duration::from_secs(86400));
    }

    #[test]
    fn test_key_layout() {
        let config = RedisStoreConfig::new("redis://localhost:6379").with_key_prefix("app:mail");
        let id = uuid::Uuid::nil();

        assert_eq!(
            config.task_key(id),
            "app:mail:task:00000000-0000-0000-0000-000000000000"
        );
        assert_eq!(
            config.set_key(QueueClass::Critical, "pending"),
            "app:mail:critical:pending"
        );
        assert_eq!(config.set_key(QueueClass::Low, "dead"), "app:mail:low:dead");
    }

    #[test]
    fn test_prefixes_do_not_collide() {
        let a = RedisStoreConfig::new("redis://localhost:6379").with_key_prefix("production");
        let b = RedisStoreConfig::new("redis://localhost:6379").with_key_prefix("development");
        assert_ne!(
            a.set_key(QueueClass::Default, "pending"),
            b.set_key(QueueClass::Default, "pending")
        );
    }
}
