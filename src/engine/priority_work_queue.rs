// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Priority-ordered set of tasks whose dependencies are satisfied.
//!
//! The task queue keeps every pending task whose dependency count has reached
//! zero in a `PriorityWorkQueue`. Unlike a heap, peeking at the runnable
//! prefix does not consume it: a task only leaves the set when the caller
//! marks it started, so `next_runnable` can be called repeatedly without
//! losing work.
//!
//! # Priority Ordering
//!
//! Tasks are ordered by:
//! 1. **Priority** (higher first)
//! 2. **Creation time** (earlier first, FIFO fairness among equals)
//! 3. **Enqueue sequence** (stable tie-break for tasks created in the same instant)
//!
//! # Examples
//!
//! ```rust
//! use chrono::Utc;
//! use refcheck::engine::priority_work_queue::{PriorityWorkQueue, PrioritizedTask};
//!
//! let now = Utc::now();
//! let mut queue = PriorityWorkQueue::new();
//! queue.push(PrioritizedTask::new("low".to_string(), 0, now, 0));
//! queue.push(PrioritizedTask::new("high".to_string(), 5, now, 1));
//! queue.push(PrioritizedTask::new("mid".to_string(), 3, now, 2));
//!
//! let order: Vec<&str> = queue.iter().map(|t| t.task_id.as_str()).collect();
//! assert_eq!(order, vec!["high", "mid", "low"]);
//! ```

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

/// Scheduling key for one ready task.
#[derive(Debug, Clone)]
pub struct PrioritizedTask {
    pub task_id: String,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
    pub seq: u64,
}

impl PrioritizedTask {
    pub fn new(task_id: String, priority: i32, created_at: DateTime<Utc>, seq: u64) -> Self {
        Self {
            task_id,
            priority,
            created_at,
            seq,
        }
    }
}

impl PartialEq for PrioritizedTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for PrioritizedTask {}

impl PartialOrd for PrioritizedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PrioritizedTask {
    /// Ascending order of this `Ord` is scheduling order, so the first element
    /// of a `BTreeSet` is the next task to run.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.created_at.cmp(&other.created_at))
            .then_with(|| self.seq.cmp(&other.seq))
            .then_with(|| self.task_id.cmp(&other.task_id))
    }
}

/// Ready tasks in scheduling order with O(log n) removal by id.
#[derive(Debug, Default)]
pub struct PriorityWorkQueue {
    ordered: BTreeSet<PrioritizedTask>,
    // id -> key, so removal does not need the caller to rebuild the key
    index: HashMap<String, PrioritizedTask>,
}

impl PriorityWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a task; re-adding an id replaces its previous entry.
    pub fn push(&mut self, task: PrioritizedTask) {
        if let Some(previous) = self.index.insert(task.task_id.clone(), task.clone()) {
            self.ordered.remove(&previous);
        }
        self.ordered.insert(task);
    }

    pub fn remove(&mut self, task_id: &str) -> Option<PrioritizedTask> {
        let key = self.index.remove(task_id)?;
        self.ordered.remove(&key);
        Some(key)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.index.contains_key(task_id)
    }

    /// Tasks in scheduling order.
    pub fn iter(&self) -> impl Iterator<Item = &PrioritizedTask> {
        self.ordered.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }
}
