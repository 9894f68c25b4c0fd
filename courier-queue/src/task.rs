//! Task definition and state transitions.

use crate::class::QueueClass;
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Task unique identifier.
pub type TaskId = Uuid;

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Waiting to be dispatched
    Pending,
    /// Held by a worker
    Processing,
    /// Handler succeeded
    Completed,
    /// Failed, waiting for its next attempt
    Retrying,
    /// Retry budget exhausted or permanently failed; kept for inspection
    Dead,
}

impl TaskState {
    /// Completed and dead tasks are never dispatched again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Dead)
    }
}

/// A unit of queued work.
///
/// The payload is opaque to the queue and never changes after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,

    /// Handler lookup key
    pub task_type: String,

    /// Priority class, fixed for the task's lifetime
    pub class: QueueClass,

    /// Serialized handler input
    #[serde(with = "base64_bytes")]
    pub payload: Vec<u8>,

    /// When the task was accepted
    pub enqueued_at: DateTime<Utc>,

    /// Number of finished (failed) executions so far
    pub attempt: u32,

    /// Executions allowed before the task is dead
    pub max_attempts: u32,

    /// Earliest time the task may be dispatched
    pub next_attempt_at: DateTime<Utc>,

    /// Current state
    pub state: TaskState,

    /// When the current or last execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal state
    pub finished_at: Option<DateTime<Utc>>,

    /// Error reported by the last failed execution
    pub last_error: Option<String>,
}

impl Task {
    /// Create a new pending task.
    pub fn new(class: QueueClass, task_type: impl Into<String>, payload: Vec<u8>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            task_type: task_type.into(),
            class,
            payload,
            enqueued_at: now,
            attempt: 0,
            max_attempts: 3,
            next_attempt_at: now,
            state: TaskState::Pending,
            started_at: None,
            finished_at: None,
            last_error: None,
        }
    }

    /// Create a task whose payload is `value` serialized as JSON.
    pub fn from_json<T: Serialize>(
        class: QueueClass,
        task_type: impl Into<String>,
        value: &T,
    ) -> serde_json::Result<Self> {
        Ok(Self::new(class, task_type, serde_json::to_vec(value)?))
    }

    /// Set max attempts.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Hold the task back until `time`.
    pub fn schedule_at(mut self, time: DateTime<Utc>) -> Self {
        self.next_attempt_at = time;
        self
    }

    /// Decode the payload as JSON.
    pub fn payload_json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.payload)
    }

    /// Check if the task may be dispatched at `now`.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.next_attempt_at
    }

    /// Mark the task as held by a worker.
    pub fn start(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Processing;
        self.started_at = Some(now);
    }

    /// Move a due retry back to the ready set.
    pub fn release(&mut self) {
        if self.state == TaskState::Retrying {
            self.state = TaskState::Pending;
        }
    }

    /// Mark the task as completed.
    pub fn complete(&mut self, now: DateTime<Utc>) {
        self.state = TaskState::Completed;
        self.finished_at = Some(now);
    }

    /// Record a failed execution.
    ///
    /// Retryable failures with budget left schedule another attempt after the
    /// policy's backoff; everything else is dead.
    pub fn fail(
        &mut self,
        error: impl Into<String>,
        retryable: bool,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> TaskState {
        self.attempt = self.attempt.saturating_add(1);
        self.last_error = Some(error.into());

        if retryable && self.attempt < self.max_attempts {
            let delay = chrono::Duration::from_std(policy.delay(self.attempt))
                .unwrap_or_else(|_| chrono::Duration::hours(1));
            self.state = TaskState::Retrying;
            self.next_attempt_at = now + delay;
        } else {
            self.state = TaskState::Dead;
            self.finished_at = Some(now);
        }

        self.state
    }
}

/// Exponential backoff with jitter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub base: Duration,
    /// Upper bound on any delay
    pub max: Duration,
    /// Extra random delay, as a fraction of the computed delay (0.0..=1.0)
    pub jitter: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(10),
            max: Duration::from_secs(3600),
            jitter: 0.2,
        }
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            ..Self::default()
        }
    }

    /// No waiting between attempts.
    pub fn immediate() -> Self {
        Self {
            base: Duration::ZERO,
            max: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        let backoff = self
            .base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max);

        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 || backoff.is_zero() {
            return backoff;
        }

        let factor = rand::rng().random_range(0.0..=jitter);
        backoff.mul_f64(1.0 + factor).min(self.max)
    }
}

/// Byte payloads travel as base64 strings in the stored JSON.
mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
