// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Progress events published while a session runs.
//!
//! Events are informational only. Retries and phase transitions are decided
//! by inspecting the task queue, never by consuming these events; a lagging
//! subscriber simply misses some of them.

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::models::{OverallStatus, Phase, TaskKind};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    SessionStarted {
        session_id: Uuid,
        data_sources: usize,
    },
    PhaseChanged {
        session_id: Uuid,
        from: Phase,
        to: Phase,
    },
    TaskCreated {
        task_id: String,
        agent: String,
        kind: TaskKind,
    },
    TaskStarted {
        task_id: String,
        agent: String,
        attempt: u32,
    },
    TaskCompleted {
        task_id: String,
        agent: String,
        elapsed_ms: u64,
        items_processed: usize,
    },
    TaskFailed {
        task_id: String,
        agent: String,
        kind: ErrorKind,
        recoverable: bool,
        message: String,
    },
    SessionFinished {
        session_id: Uuid,
        status: OverallStatus,
    },
}

/// Broadcast bus for [`PipelineEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PipelineEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of subscribers that received the event.
    pub fn publish(&self, event: PipelineEvent) -> usize {
        // Err only means nobody is listening
        self.sender.send(event).unwrap_or(0)
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Log every event at debug level until the bus is dropped.
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut receiver = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => tracing::debug!(target: "refcheck::events", "{}", json),
                    Err(e) => tracing::debug!(target: "refcheck::events", "{:?} ({})", event, e),
                },
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::debug!(target: "refcheck::events", missed, "event logger lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
