// SPDX-License-Identifier: MIT

//! SQLite persistence for graphs and run records
//!
//! The stores keep live data in memory and write through to this database,
//! which answers lookups the cache no longer holds.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::store::{RunRecord, RunStatus, StoredGraph};
use crate::runtime::TaskGraphError;

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS graphs (
        id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        definition TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS executions (
        execution_id TEXT PRIMARY KEY,
        graph_id TEXT NOT NULL,
        status TEXT NOT NULL,
        state TEXT NOT NULL,
        log TEXT NOT NULL,
        termination TEXT,
        error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_executions_graph ON executions(graph_id);
";

type GraphRow = (String, String, String, String);

struct RunRow {
    execution_id: String,
    graph_id: String,
    status: String,
    state: String,
    log: String,
    termination: Option<String>,
    error: Option<String>,
    created_at: String,
    updated_at: String,
}

/// SQLite-backed graph and execution storage
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create a database file at `path`
    pub fn open(path: &Path) -> Result<Self, TaskGraphError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                TaskGraphError::database(format!("failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(path).map_err(TaskGraphError::database)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(TaskGraphError::database)?;

        let database = Self::init(conn)?;
        log::info!("Opened database at {}", path.display());
        Ok(database)
    }

    /// Open a private in-memory database
    pub fn in_memory() -> Result<Self, TaskGraphError> {
        Self::init(Connection::open_in_memory().map_err(TaskGraphError::database)?)
    }

    fn init(conn: Connection) -> Result<Self, TaskGraphError> {
        conn.execute_batch(SCHEMA).map_err(TaskGraphError::database)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, TaskGraphError> {
        self.conn.lock().map_err(TaskGraphError::database)
    }

    pub fn save_graph(&self, graph: &StoredGraph) -> Result<(), TaskGraphError> {
        let definition = serde_json::to_string(&graph.definition)?;
        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO graphs (id, name, definition, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    graph.id,
                    graph.name,
                    definition,
                    timestamp(&graph.created_at)
                ],
            )
            .map_err(TaskGraphError::database)?;
        Ok(())
    }

    pub fn get_graph(&self, id: &str) -> Result<Option<StoredGraph>, TaskGraphError> {
        let row = self
            .lock()?
            .query_row(
                "SELECT id, name, definition, created_at FROM graphs WHERE id = ?1",
                params![id],
                read_graph_row,
            )
            .optional()
            .map_err(TaskGraphError::database)?;
        row.map(graph_from_row).transpose()
    }

    /// Every stored graph, oldest first
    pub fn list_graphs(&self) -> Result<Vec<StoredGraph>, TaskGraphError> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare("SELECT id, name, definition, created_at FROM graphs ORDER BY created_at")
                .map_err(TaskGraphError::database)?;
            let rows = stmt
                .query_map([], read_graph_row)
                .map_err(TaskGraphError::database)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(TaskGraphError::database)?;
            rows
        };
        rows.into_iter().map(graph_from_row).collect()
    }

    /// Insert or overwrite the row for `record`
    pub fn save_run(&self, record: &RunRecord) -> Result<(), TaskGraphError> {
        let state = serde_json::to_string(&record.state)?;
        let log = serde_json::to_string(&record.log)?;
        let termination = record
            .termination
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.lock()?
            .execute(
                "INSERT OR REPLACE INTO executions
                 (execution_id, graph_id, status, state, log, termination, error, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    record.execution_id,
                    record.graph_id,
                    record.status.as_str(),
                    state,
                    log,
                    termination,
                    record.error,
                    timestamp(&record.created_at),
                    timestamp(&record.updated_at)
                ],
            )
            .map_err(TaskGraphError::database)?;
        Ok(())
    }

    pub fn get_run(&self, execution_id: &str) -> Result<Option<RunRecord>, TaskGraphError> {
        let row = self
            .lock()?
            .query_row(
                "SELECT execution_id, graph_id, status, state, log, termination, error,
                        created_at, updated_at
                 FROM executions WHERE execution_id = ?1",
                params![execution_id],
                read_run_row,
            )
            .optional()
            .map_err(TaskGraphError::database)?;
        row.map(run_from_row).transpose()
    }

    /// Every stored run, oldest first
    pub fn list_runs(&self) -> Result<Vec<RunRecord>, TaskGraphError> {
        let rows = {
            let conn = self.lock()?;
            let mut stmt = conn
                .prepare(
                    "SELECT execution_id, graph_id, status, state, log, termination, error,
                            created_at, updated_at
                     FROM executions ORDER BY created_at",
                )
                .map_err(TaskGraphError::database)?;
            let rows = stmt
                .query_map([], read_run_row)
                .map_err(TaskGraphError::database)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(TaskGraphError::database)?;
            rows
        };
        rows.into_iter().map(run_from_row).collect()
    }
}

fn read_graph_row(row: &Row<'_>) -> rusqlite::Result<GraphRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn read_run_row(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    Ok(RunRow {
        execution_id: row.get(0)?,
        graph_id: row.get(1)?,
        status: row.get(2)?,
        state: row.get(3)?,
        log: row.get(4)?,
        termination: row.get(5)?,
        error: row.get(6)?,
        created_at: row.get(7)?,
        updated_at: row.get(8)?,
    })
}

fn graph_from_row((id, name, definition, created_at): GraphRow) -> Result<StoredGraph, TaskGraphError> {
    Ok(StoredGraph {
        id,
        name,
        definition: serde_json::from_str(&definition)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

fn run_from_row(row: RunRow) -> Result<RunRecord, TaskGraphError> {
    let status = RunStatus::parse(&row.status).ok_or_else(|| {
        TaskGraphError::database(format!("unknown run status '{}'", row.status))
    })?;

    Ok(RunRecord {
        execution_id: row.execution_id,
        graph_id: row.graph_id,
        status,
        state: serde_json::from_str(&row.state)?,
        log: serde_json::from_str(&row.log)?,
        termination: row
            .termination
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?,
        error: row.error,
        created_at: parse_timestamp(&row.created_at)?,
        updated_at: parse_timestamp(&row.updated_at)?,
    })
}

/// Fixed-width UTC text, so `ORDER BY created_at` sorts chronologically
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, TaskGraphError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| TaskGraphError::database(format!("invalid timestamp '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::StateData;
    use crate::taskgraph::workflow::graph::Termination;
    use crate::taskgraph::workflow::state::ExecutionLogEntry;
    use crate::taskgraph::workflow::types::{GraphDefinition, NodeConfig};
    use serde_json::json;

    fn stored_graph(name: &str) -> StoredGraph {
        StoredGraph {
            id: format!("{}-id", name),
            name: name.to_string(),
            definition: GraphDefinition {
                name: name.to_string(),
                nodes: vec![NodeConfig::looping("retry", "attempt", "tries < 3", 5)],
                edges: vec![],
                start_node: "retry".to_string(),
            },
            created_at: Utc::now(),
        }
    }

    fn data(value: serde_json::Value) -> StateData {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_graph_round_trip() {
        let db = Database::in_memory().unwrap();
        let graph = stored_graph("orders");
        db.save_graph(&graph).unwrap();

        let loaded = db.get_graph("orders-id").unwrap().unwrap();
        assert_eq!(loaded.name, "orders");
        assert_eq!(loaded.definition, graph.definition);
        assert_eq!(loaded.created_at, graph.created_at);
        assert!(db.get_graph("missing").unwrap().is_none());
    }

    #[test]
    fn test_list_graphs_oldest_first() {
        let db = Database::in_memory().unwrap();
        let mut older = stored_graph("older");
        older.created_at = Utc::now() - chrono::Duration::seconds(30);
        db.save_graph(&stored_graph("newer")).unwrap();
        db.save_graph(&older).unwrap();

        let names: Vec<String> = db.list_graphs().unwrap().into_iter().map(|g| g.name).collect();
        assert_eq!(names, vec!["older", "newer"]);
    }

    #[test]
    fn test_run_round_trip_and_overwrite() {
        let db = Database::in_memory().unwrap();
        let mut record = RunRecord::started("orders-id", data(json!({"tries": 0})));
        db.save_run(&record).unwrap();

        let started = db.get_run(&record.execution_id).unwrap().unwrap();
        assert_eq!(started.status, RunStatus::Started);
        assert!(started.termination.is_none());

        record.status = RunStatus::Completed;
        record.state = data(json!({"tries": 3, "nested": {"ok": true}}));
        record.log = vec![ExecutionLogEntry::success("retry", Utc::now(), record.state.clone())
            .with_iteration(3)];
        record.termination = Some(Termination::StepLimit { limit: 7 });
        db.save_run(&record).unwrap();

        let done = db.get_run(&record.execution_id).unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert_eq!(done.state.get("nested"), Some(&json!({"ok": true})));
        assert_eq!(done.log.len(), 1);
        assert_eq!(done.log[0].iteration, Some(3));
        assert_eq!(done.termination, Some(Termination::StepLimit { limit: 7 }));
        assert_eq!(db.list_runs().unwrap().len(), 1);
    }

    #[test]
    fn test_failed_run_keeps_error() {
        let db = Database::in_memory().unwrap();
        let mut record = RunRecord::started("g", StateData::new());
        record.status = RunStatus::Failed;
        record.error = Some("task panicked".to_string());
        db.save_run(&record).unwrap();

        let failed = db.get_run(&record.execution_id).unwrap().unwrap();
        assert_eq!(failed.error.as_deref(), Some("task panicked"));
        assert!(failed.status.is_terminal());
    }

    #[test]
    fn test_file_database_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("taskgraph-db-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("taskgraph.db");

        {
            let db = Database::open(&path).unwrap();
            db.save_graph(&stored_graph("durable")).unwrap();
        }

        let reopened = Database::open(&path).unwrap();
        assert_eq!(
            reopened.get_graph("durable-id").unwrap().map(|g| g.name),
            Some("durable".to_string())
        );

        drop(reopened);
        let _ = std::fs::remove_dir_all(dir);
    }
}
