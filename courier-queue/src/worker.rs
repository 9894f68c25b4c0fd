//! Worker pool for processing tasks.

use crate::error::{QueueError, QueueResult};
use crate::queue::Queue;
use crate::task::{Task, TaskState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Failure reported by a handler.
///
/// The worker only looks at `retryable`; the message is stored on the task.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TaskError {
    pub message: String,
    pub retryable: bool,
}

impl TaskError {
    /// A failure that may succeed on a later attempt.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that can never succeed.
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

/// Processes tasks of one type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: &Task) -> Result<(), TaskError>;
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> TaskHandler for FnHandler<F>
where
    F: Fn(Task) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
{
    async fn handle(&self, task: &Task) -> Result<(), TaskError> {
        (self.0)(task.clone()).await
    }
}

/// Handler registry keyed by task type.
#[derive(Clone, Default)]
pub struct Handlers {
    map: HashMap<String, Arc<dyn TaskHandler>>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the type.
    pub fn register(mut self, task_type: impl Into<String>, handler: Arc<dyn TaskHandler>) -> Self {
        self.map.insert(task_type.into(), handler);
        self
    }

    /// Register an async closure.
    ///
    /// ```
    /// use courier_queue::{Handlers, TaskError};
    ///
    /// let handlers = Handlers::new().register_fn("report:build", |task| async move {
    ///     if task.payload.is_empty() {
    ///         return Err(TaskError::permanent("empty payload"));
    ///     }
    ///     Ok(())
    /// });
    /// assert!(handlers.get("report:build").is_some());
    /// ```
    pub fn register_fn<F, Fut>(self, task_type: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Task) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        self.register(task_type, Arc::new(FnHandler(handler)))
    }

    pub fn get(&self, task_type: &str) -> Option<Arc<dyn TaskHandler>> {
        self.map.get(task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.map.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent tasks to process
    pub concurrency: usize,

    /// Poll interval while every class is empty
    pub poll_interval: Duration,

    /// Timeout for one handler call
    pub task_timeout: Duration,

    /// How long shutdown waits for in-flight tasks
    pub shutdown_grace: Duration,

    /// How often stale `Processing` tasks are swept back into the queue;
    /// zero disables the sweep
    pub recover_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            poll_interval: Duration::from_secs(1),
            task_timeout: Duration::from_secs(300), // 5 minutes
            shutdown_grace: Duration::from_secs(30),
            recover_interval: Duration::from_secs(60),
        }
    }
}

/// Outcome of a graceful shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownReport {
    /// Worker loops that stopped on their own
    pub drained: usize,
    /// Worker loops aborted at the grace deadline; their task stays
    /// `Processing` until stale recovery picks it up
    pub abandoned: usize,
}

/// Pool of workers pulling from a [`Queue`].
pub struct Worker {
    queue: Queue,
    config: WorkerConfig,
    shutdown: Option<watch::Sender<bool>>,
    handles: Vec<JoinHandle<()>>,
    recovery: Option<JoinHandle<()>>,
}

impl Worker {
    /// Create a new worker.
    pub fn new(queue: Queue) -> Self {
        Self::with_config(queue, WorkerConfig::default())
    }

    /// Create a worker with custom configuration.
    pub fn with_config(queue: Queue, config: WorkerConfig) -> Self {
        Self {
            queue,
            config,
            shutdown: None,
            handles: Vec::new(),
            recovery: None,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Spawn `concurrency` worker loops, plus the stale-task sweep when
    /// `recover_interval` is non-zero.
    pub fn start(&mut self, handlers: Handlers) -> QueueResult<()> {
        if self.shutdown.is_some() {
            return Err(QueueError::WorkerAlreadyRunning);
        }
        if self.config.concurrency == 0 {
            return Err(QueueError::Config("concurrency must be at least 1".into()));
        }

        info!(
            concurrency = self.config.concurrency,
            task_types = ?handlers.task_types(),
            "starting worker pool"
        );

        let (tx, rx) = watch::channel(false);
        let handlers = Arc::new(handlers);

        for worker in 0..self.config.concurrency {
            let slot = Slot {
                worker,
                queue: self.queue.clone(),
                handlers: handlers.clone(),
                poll_interval: self.config.poll_interval,
                task_timeout: self.config.task_timeout,
            };
            self.handles.push(tokio::spawn(slot.run(rx.clone())));
        }

        if !self.config.recover_interval.is_zero() {
            let sweep = recover_loop(self.queue.clone(), self.config.recover_interval, rx);
            self.recovery = Some(tokio::spawn(sweep));
        }

        self.shutdown = Some(tx);
        Ok(())
    }

    /// Stop with the configured grace period.
    pub async fn stop(&mut self) -> QueueResult<ShutdownReport> {
        self.shutdown(self.config.shutdown_grace).await
    }

    /// Stop pulling new tasks, wait up to `grace` for in-flight tasks, then
    /// abort whatever is still running.
    pub async fn shutdown(&mut self, grace: Duration) -> QueueResult<ShutdownReport> {
        let tx = self.shutdown.take().ok_or(QueueError::WorkerNotRunning)?;
        info!(grace_secs = grace.as_secs_f64(), "stopping worker pool");
        let _ = tx.send(true);

        let deadline = tokio::time::Instant::now() + grace;
        let mut report = ShutdownReport::default();

        for mut handle in self.handles.drain(..) {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(())) => report.drained += 1,
                Ok(Err(e)) => {
                    error!(error = %e, "worker loop ended abnormally");
                    report.drained += 1;
                }
                Err(_) => {
                    handle.abort();
                    report.abandoned += 1;
                }
            }
        }

        if let Some(mut recovery) = self.recovery.take()
            && tokio::time::timeout_at(deadline, &mut recovery).await.is_err()
        {
            recovery.abort();
        }

        if report.abandoned > 0 {
            warn!(abandoned = report.abandoned, "grace period elapsed with tasks in flight");
        }
        info!(drained = report.drained, "worker pool stopped");
        Ok(report)
    }

    /// Check if the worker is running.
    pub fn is_running(&self) -> bool {
        self.shutdown.is_some()
    }
}

/// Periodically return stale `Processing` tasks to the queue until shutdown.
async fn recover_loop(queue: Queue, every: Duration, mut shutdown: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    debug!(interval_secs = every.as_secs_f64(), "stale task sweep started");

    while !*shutdown.borrow() {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }

        match queue.recover_stale().await {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "recovered stale tasks"),
            Err(e) => error!(error = %e, "stale task sweep failed"),
        }
    }

    debug!("stale task sweep stopped");
}

/// One worker loop.
struct Slot {
    worker: usize,
    queue: Queue,
    handlers: Arc<Handlers>,
    poll_interval: Duration,
    task_timeout: Duration,
}

impl Slot {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        debug!(worker = self.worker, "worker started");

        while !*shutdown.borrow() {
            match self.queue.dequeue().await {
                Ok(Some(task)) => self.execute(task).await,
                Ok(None) => self.idle(&mut shutdown).await,
                Err(e) => {
                    error!(worker = self.worker, error = %e, "error dequeuing task");
                    self.idle(&mut shutdown).await;
                }
            }
        }

        debug!(worker = self.worker, "worker stopped");
    }

    async fn idle(&self, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => {}
            _ = shutdown.changed() => {}
        }
    }

    async fn execute(&self, task: Task) {
        let id = task.id;
        let attempt = task.attempt + 1;
        debug!(
            worker = self.worker,
            task_id = %id,
            task_type = %task.task_type,
            class = %task.class,
            attempt,
            "processing task"
        );

        let outcome = match self.handlers.get(&task.task_type) {
            None => {
                error!(
                    worker = self.worker,
                    task_id = %id,
                    task_type = %task.task_type,
                    "no handler registered for task type"
                );
                Err(TaskError::permanent(
                    QueueError::UnknownTaskType(task.task_type.clone()).to_string(),
                ))
            }
            Some(handler) => match tokio::time::timeout(self.task_timeout, handler.handle(&task)).await {
                Ok(result) => result,
                Err(_) => Err(TaskError::retryable(format!(
                    "handler timed out after {}s",
                    self.task_timeout.as_secs_f64()
                ))),
            },
        };

        let settled = match outcome {
            Ok(()) => self.queue.ack(id).await.map(|()| TaskState::Completed),
            Err(e) => {
                warn!(
                    worker = self.worker,
                    task_id = %id,
                    attempt,
                    retryable = e.retryable,
                    error = %e.message,
                    "task failed"
                );
                self.queue.nack(id, e.retryable, e.message).await
            }
        };

        match settled {
            Ok(state) => debug!(worker = self.worker, task_id = %id, ?state, "task settled"),
            Err(e) => error!(worker = self.worker, task_id = %id, error = %e, "failed to record task outcome"),
        }
    }
}
