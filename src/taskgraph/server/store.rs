// SPDX-License-Identifier: MIT

//! Stores for graph definitions and run records
//!
//! Each store keeps a live in-memory map. With a [`Database`] attached,
//! writes go through to SQLite and lookups that miss the map fall back to
//! it, so graphs and finished runs outlive eviction and restarts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::database::Database;
use crate::runtime::StateData;
use crate::taskgraph::workflow::graph::{ExecutionOutcome, Termination};
use crate::taskgraph::workflow::state::ExecutionLogEntry;
use crate::taskgraph::workflow::types::GraphDefinition;

/// A validated graph definition kept for later runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredGraph {
    pub id: String,
    pub name: String,
    pub definition: GraphDefinition,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Default)]
pub struct GraphStore {
    graphs: Arc<RwLock<HashMap<String, StoredGraph>>>,
    database: Option<Arc<Database>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that persists every graph to `database`
    pub fn with_database(database: Arc<Database>) -> Self {
        Self {
            graphs: Arc::default(),
            database: Some(database),
        }
    }

    /// Store a definition under a fresh id
    pub async fn insert(&self, definition: GraphDefinition) -> StoredGraph {
        let stored = StoredGraph {
            id: Uuid::new_v4().to_string(),
            name: definition.name.clone(),
            definition,
            created_at: Utc::now(),
        };
        self.graphs
            .write()
            .await
            .insert(stored.id.clone(), stored.clone());
        if let Some(database) = &self.database {
            if let Err(e) = database.save_graph(&stored) {
                log::error!("Failed to persist graph {}: {}", stored.id, e);
            }
        }
        log::info!("Stored graph '{}' as {}", stored.name, stored.id);
        stored
    }

    /// Look up a graph, loading it from the database on a cache miss
    pub async fn get(&self, id: &str) -> Option<StoredGraph> {
        if let Some(stored) = self.graphs.read().await.get(id) {
            return Some(stored.clone());
        }

        let database = self.database.as_ref()?;
        match database.get_graph(id) {
            Ok(Some(stored)) => {
                self.graphs
                    .write()
                    .await
                    .insert(stored.id.clone(), stored.clone());
                Some(stored)
            }
            Ok(None) => None,
            Err(e) => {
                log::error!("Failed to load graph {}: {}", id, e);
                None
            }
        }
    }

    /// All stored graphs, oldest first
    pub async fn list(&self) -> Vec<StoredGraph> {
        let cached = self.graphs.read().await.clone();
        let persisted = match &self.database {
            Some(database) => database.list_graphs().unwrap_or_else(|e| {
                log::error!("Failed to list persisted graphs: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        merge_by_created(cached, persisted, |g| g.id.clone(), |g| g.created_at)
    }
}

/// Lifecycle of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Started => "started",
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(status: &str) -> Option<Self> {
        match status {
            "started" => Some(RunStatus::Started),
            "running" => Some(RunStatus::Running),
            "completed" => Some(RunStatus::Completed),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// What the server knows about one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub execution_id: String,
    pub graph_id: String,
    pub status: RunStatus,
    pub state: StateData,
    pub log: Vec<ExecutionLogEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub termination: Option<Termination>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn started(graph_id: impl Into<String>, initial_state: StateData) -> Self {
        let now = Utc::now();
        Self {
            execution_id: Uuid::new_v4().to_string(),
            graph_id: graph_id.into(),
            status: RunStatus::Started,
            state: initial_state,
            log: Vec::new(),
            termination: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Clone, Default)]
pub struct RunStore {
    runs: Arc<RwLock<HashMap<String, RunRecord>>>,
    database: Option<Arc<Database>>,
}

impl RunStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that writes every status change through to `database`
    pub fn with_database(database: Arc<Database>) -> Self {
        Self {
            runs: Arc::default(),
            database: Some(database),
        }
    }

    pub async fn insert(&self, record: RunRecord) {
        self.persist(&record);
        self.runs
            .write()
            .await
            .insert(record.execution_id.clone(), record);
    }

    /// Look up a run, falling back to the database for evicted records
    pub async fn get(&self, execution_id: &str) -> Option<RunRecord> {
        if let Some(record) = self.runs.read().await.get(execution_id) {
            return Some(record.clone());
        }

        let database = self.database.as_ref()?;
        database.get_run(execution_id).unwrap_or_else(|e| {
            log::error!("Failed to load run {}: {}", execution_id, e);
            None
        })
    }

    pub async fn set_running(&self, execution_id: &str) {
        self.modify(execution_id, |record| record.status = RunStatus::Running)
            .await;
    }

    /// Record the outcome of a finished run
    pub async fn complete(&self, execution_id: &str, outcome: ExecutionOutcome) {
        self.modify(execution_id, move |record| {
            record.status = RunStatus::Completed;
            record.state = outcome.state.into_data();
            record.log = outcome.log;
            record.termination = Some(outcome.termination);
        })
        .await;
    }

    /// Mark a run failed; its state stays as it was
    pub async fn fail(&self, execution_id: &str, error: impl Into<String>) {
        let error = error.into();
        self.modify(execution_id, move |record| {
            record.status = RunStatus::Failed;
            record.error = Some(error);
        })
        .await;
    }

    /// All runs, oldest first
    pub async fn list(&self) -> Vec<RunRecord> {
        let cached = self.runs.read().await.clone();
        let persisted = match &self.database {
            Some(database) => database.list_runs().unwrap_or_else(|e| {
                log::error!("Failed to list persisted runs: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        merge_by_created(cached, persisted, |r| r.execution_id.clone(), |r| r.created_at)
    }

    /// Drop a run from the live cache; a persisted copy stays in the database
    pub async fn remove(&self, execution_id: &str) -> Option<RunRecord> {
        self.runs.write().await.remove(execution_id)
    }

    /// Drop finished runs last updated more than `ttl` ago from the live
    /// cache, returning how many were removed
    pub async fn evict_expired(&self, ttl: Duration) -> usize {
        let Ok(ttl) = chrono::Duration::from_std(ttl) else {
            return 0;
        };
        let Some(cutoff) = Utc::now().checked_sub_signed(ttl) else {
            return 0;
        };

        let mut runs = self.runs.write().await;
        let before = runs.len();
        runs.retain(|_, record| !(record.status.is_terminal() && record.updated_at < cutoff));
        let evicted = before - runs.len();
        if evicted > 0 {
            log::info!("Evicted {} expired runs", evicted);
        }
        evicted
    }

    /// Periodically evict expired runs until the task is aborted
    pub fn spawn_sweeper(&self, ttl: Duration, every: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                store.evict_expired(ttl).await;
            }
        })
    }

    async fn modify<F>(&self, execution_id: &str, apply: F)
    where
        F: FnOnce(&mut RunRecord),
    {
        let updated = {
            let mut runs = self.runs.write().await;
            match runs.get_mut(execution_id) {
                Some(record) => {
                    apply(record);
                    record.updated_at = Utc::now();
                    Some(record.clone())
                }
                None => None,
            }
        };

        match updated {
            Some(record) => self.persist(&record),
            None => log::warn!("Run {} not found, update dropped", execution_id),
        }
    }

    fn persist(&self, record: &RunRecord) {
        if let Some(database) = &self.database {
            if let Err(e) = database.save_run(record) {
                log::error!("Failed to persist run {}: {}", record.execution_id, e);
            }
        }
    }
}

/// Combine cached and persisted items, the cached copy winning, oldest first
fn merge_by_created<T, K, C>(
    cached: HashMap<String, T>,
    persisted: Vec<T>,
    key: K,
    created: C,
) -> Vec<T>
where
    K: Fn(&T) -> String,
    C: Fn(&T) -> DateTime<Utc>,
{
    let mut merged = cached;
    for item in persisted {
        merged.entry(key(&item)).or_insert(item);
    }
    let mut items: Vec<T> = merged.into_values().collect();
    items.sort_by_key(|item| created(item));
    items
}
