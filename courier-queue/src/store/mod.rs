//! Task persistence.
//!
//! A [`QueueStore`] owns every task after enqueue. Each store operation is
//! atomic with respect to concurrent callers: two workers popping the same
//! class never receive the same task, and a task leaves the processing set
//! exactly once.

mod memory;
mod redis_store;

pub use self::memory::MemoryStore;
pub use self::redis_store::{RedisStore, RedisStoreConfig};

use crate::class::QueueClass;
use crate::error::QueueResult;
use crate::task::{Task, TaskId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Storage backend for tasks.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Store a new task. Tasks due now join the tail of their class's ready
    /// set; later ones wait in the scheduled set.
    async fn push(&self, task: Task) -> QueueResult<()>;

    /// Promote due scheduled tasks of `class`, then take the oldest ready
    /// task and mark it `Processing`.
    async fn pop(&self, class: QueueClass, now: DateTime<Utc>) -> QueueResult<Option<Task>>;

    /// Persist the outcome of a `Processing` task that has been moved to
    /// `Completed`, `Retrying` or `Dead`.
    ///
    /// Fails with `InvalidState` when the stored task is no longer
    /// processing, e.g. because it was already settled by stale recovery.
    async fn settle(&self, task: &Task) -> QueueResult<()>;

    /// Fetch a task by id.
    async fn get(&self, id: TaskId) -> QueueResult<Option<Task>>;

    /// Remove a task that has not been dispatched yet.
    async fn cancel(&self, id: TaskId) -> QueueResult<Task>;

    /// Tasks that started processing before `started_before`.
    async fn processing_since(&self, started_before: DateTime<Utc>) -> QueueResult<Vec<Task>>;

    /// Most recently buried tasks first.
    async fn dead_letters(&self, limit: usize) -> QueueResult<Vec<Task>>;

    /// Per-class counts.
    async fn stats(&self) -> QueueResult<QueueStats>;
}

/// Task counts for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassStats {
    pub pending: usize,
    pub scheduled: usize,
    pub processing: usize,
    pub completed: usize,
    pub dead: usize,
}

impl ClassStats {
    fn add(&mut self, other: &ClassStats) {
        self.pending += other.pending;
        self.scheduled += other.scheduled;
        self.processing += other.processing;
        self.completed += other.completed;
        self.dead += other.dead;
    }
}

/// Task counts for the whole queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub classes: BTreeMap<QueueClass, ClassStats>,
}

impl QueueStats {
    pub fn class(&self, class: QueueClass) -> ClassStats {
        self.classes.get(&class).copied().unwrap_or_default()
    }

    pub fn total(&self) -> ClassStats {
        let mut total = ClassStats::default();
        for stats in self.classes.values() {
            total.add(stats);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_total() {
        let mut stats = QueueStats::default();
        stats.classes.insert(
            QueueClass::Critical,
            ClassStats {
                pending: 2,
                dead: 1,
                ..ClassStats::default()
            },
        );
        stats.classes.insert(
            QueueClass::Low,
            ClassStats {
                pending: 3,
                completed: 4,
                ..ClassStats::default()
            },
        );

        let total = stats.total();
        assert_eq!(total.pending, 5);
        assert_eq!(total.dead, 1);
        assert_eq!(total.completed, 4);
        assert_eq!(stats.class(QueueClass::Default), ClassStats::default());
    }
}
