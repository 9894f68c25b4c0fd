//! Durable task queue and worker pool for the Courier email pipeline.
//!
//! Provides:
//! - Three priority classes (`critical`, `default`, `low`) served by smooth
//!   weighted round-robin, so low-priority backlogs are never starved
//! - At-least-once processing with bounded retries and jittered exponential
//!   backoff
//! - A dead-letter set for tasks that exhausted their attempts
//! - Redis-backed persistence, or an in-memory store for tests
//! - A worker pool with per-task timeouts and graceful shutdown
//! - Recovery of tasks left `Processing` by a crashed or aborted worker
//!
//! ## Task Creation
//!
//! ```
//! use courier_queue::{QueueClass, Task, TaskState};
//!
//! let task = Task::new(QueueClass::Critical, "email:deliver", b"{}".to_vec())
//!     .with_max_attempts(5);
//!
//! assert_eq!(task.state, TaskState::Pending);
//! assert_eq!(task.max_attempts, 5);
//! ```
//!
//! ## Complete Example
//!
//! ```no_run
//! use courier_queue::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), QueueError> {
//!     let queue = Queue::redis(
//!         RedisStoreConfig::new("redis://localhost:6379"),
//!         QueueConfig::default(),
//!     )
//!     .await?;
//!
//!     queue
//!         .enqueue_json(QueueClass::Critical, "report:build", &serde_json::json!({"id": 7}))
//!         .await?;
//!
//!     let handlers = Handlers::new().register_fn("report:build", |task| async move {
//!         println!("building report from {} bytes", task.payload.len());
//!         Ok(())
//!     });
//!
//!     let mut worker = Worker::new(queue);
//!     worker.start(handlers)?;
//!     tokio::signal::ctrl_c().await.ok();
//!     worker.stop().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod class;
pub mod error;
pub mod queue;
pub mod store;
pub mod task;
pub mod worker;

pub use class::{ClassWeights, QueueClass, WeightedRoundRobin};
pub use error::{QueueError, QueueResult};
pub use queue::{Queue, QueueConfig};
pub use store::{ClassStats, MemoryStore, QueueStats, QueueStore, RedisStore, RedisStoreConfig};
pub use task::{RetryPolicy, Task, TaskId, TaskState};
pub use worker::{
    FnHandler, Handlers, ShutdownReport, TaskError, TaskHandler, Worker, WorkerConfig,
};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::class::{ClassWeights, QueueClass};
    pub use crate::error::{QueueError, QueueResult};
    pub use crate::queue::{Queue, QueueConfig};
    pub use crate::task::{Task, TaskId, TaskState};
    pub use crate::worker::{Handlers, TaskError, TaskHandler, Worker, WorkerConfig};
}
