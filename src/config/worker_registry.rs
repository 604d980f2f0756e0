// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

use std::collections::HashMap;
use std::sync::Arc;

use crate::backends::json_store::{JsonStoreModifier, JsonStoreValidator, FEED_PATH_OPTION};
use crate::backends::stub::StubWorker;
use crate::config::{BackendType, Config};
use crate::errors::RegistryError;
use crate::traits::WorkerCapability;

/// Registry mapping agent names to their worker implementations.
///
/// Dispatch resolves every task's `agent` through this map. Workers are held
/// as `Arc<dyn WorkerCapability>` so in-flight tasks can share them across
/// spawned futures.
///
/// ```ignore
/// use std::sync::Arc;
/// use refcheck::config::WorkerRegistry;
/// use refcheck::backends::stub::StubWorker;
///
/// let mut registry = WorkerRegistry::new();
/// registry.insert(Arc::new(StubWorker::new("korean-etf-validator")));
/// assert!(registry.contains_key("korean-etf-validator"));
/// ```
#[derive(Clone, Default)]
pub struct WorkerRegistry(pub HashMap<String, Arc<dyn WorkerCapability>>);

impl WorkerRegistry {
    pub fn new() -> Self {
        Self(HashMap::new())
    }

    /// Build the validator and modifier for every configured data source.
    ///
    /// Data sources sharing an agent name share one worker instance. A JSON
    /// store source must name its reference feed with the `feed_path` option.
    pub fn from_config(cfg: &Config) -> Result<Self, RegistryError> {
        let mut registry = Self::new();

        for ds in &cfg.data_sources {
            let (validator, modifier): (Arc<dyn WorkerCapability>, Arc<dyn WorkerCapability>) =
                match ds.backend {
                    BackendType::JsonStore => {
                        if !ds.options.get(FEED_PATH_OPTION).map_or(false, |v| v.is_string()) {
                            return Err(RegistryError::WorkerCreationFailed {
                                data_source: ds.id.clone(),
                                agent: ds.agent.clone(),
                                backend: ds.backend,
                                reason: format!("missing string option '{}'", FEED_PATH_OPTION),
                            });
                        }
                        (
                            Arc::new(JsonStoreValidator::new(&ds.agent)),
                            Arc::new(JsonStoreModifier::new(&ds.modifier)),
                        )
                    }
                    BackendType::Stub => (
                        Arc::new(StubWorker::new(&ds.agent)),
                        Arc::new(StubWorker::new(&ds.modifier)),
                    ),
                };

            registry.0.entry(ds.agent.clone()).or_insert(validator);
            registry.0.entry(ds.modifier.clone()).or_insert(modifier);
        }

        Ok(registry)
    }

    /// Register a worker under its own name, replacing any previous one.
    pub fn insert(&mut self, worker: Arc<dyn WorkerCapability>) {
        self.0.insert(worker.name().to_string(), worker);
    }

    /// Register a worker under an explicit agent name.
    pub fn register(&mut self, agent: impl Into<String>, worker: Arc<dyn WorkerCapability>) {
        self.0.insert(agent.into(), worker);
    }

    pub fn get(&self, agent: &str) -> Option<&Arc<dyn WorkerCapability>> {
        self.0.get(agent)
    }

    pub fn contains_key(&self, agent: &str) -> bool {
        self.0.contains_key(agent)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for WorkerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut agents: Vec<_> = self.0.keys().collect();
        agents.sort();
        f.debug_struct("WorkerRegistry")
            .field("worker_count", &self.0.len())
            .field("agents", &agents)
            .finish()
    }
}

impl From<HashMap<String, Arc<dyn WorkerCapability>>> for WorkerRegistry {
    fn from(map: HashMap<String, Arc<dyn WorkerCapability>>) -> Self {
        Self(map)
    }
}
