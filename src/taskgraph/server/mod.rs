// SPDX-License-Identifier: MIT

//! HTTP API for creating graphs, starting runs and watching them

mod database;
mod store;

pub use database::Database;
pub use store::{GraphStore, RunRecord, RunStatus, RunStore, StoredGraph};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::runtime::{StateData, TaskGraphError};
use crate::taskgraph::config::Settings;
use crate::taskgraph::workflow::graph::WorkflowEngine;
use crate::taskgraph::workflow::registry::ToolRegistry;
use crate::taskgraph::workflow::types::GraphDefinition;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

type ApiError = (StatusCode, Json<Value>);

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub registry: ToolRegistry,
    pub graphs: GraphStore,
    pub runs: RunStore,
    permits: Arc<Semaphore>,
    settings: Arc<Settings>,
}

impl AppState {
    pub fn new(settings: Settings, registry: ToolRegistry) -> Self {
        Self {
            registry,
            graphs: GraphStore::new(),
            runs: RunStore::new(),
            permits: Arc::new(Semaphore::new(settings.max_concurrent_executions)),
            settings: Arc::new(settings),
        }
    }

    /// State whose stores persist graphs and runs to `database`
    pub fn with_database(settings: Settings, registry: ToolRegistry, database: Database) -> Self {
        let database = Arc::new(database);
        Self {
            graphs: GraphStore::with_database(database.clone()),
            runs: RunStore::with_database(database),
            ..Self::new(settings, registry)
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(health_check))
        .route("/tools", get(list_tools))
        .route("/graph/create", post(create_graph))
        .route("/graph/run", post(run_graph))
        .route("/graph/state/{execution_id}", get(get_execution_state))
        .route("/graph/stream/{execution_id}", get(stream_execution))
        .route("/graph/{graph_id}", get(get_graph));

    Router::new()
        .nest("/api/v1", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn serve(settings: Settings, registry: ToolRegistry) -> Result<(), TaskGraphError> {
    let addr = settings.bind_address();
    let database = Database::open(&settings.database_path)?;
    let state = AppState::with_database(settings, registry, database);
    let sweeper = state
        .runs
        .spawn_sweeper(state.settings.execution_ttl, SWEEP_INTERVAL);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    log::info!("Listening on http://{}", addr);

    let result = axum::serve(listener, router(state)).await;
    sweeper.abort();
    result?;
    Ok(())
}

fn error_response(status: StatusCode, detail: impl Into<String>) -> ApiError {
    (status, Json(json!({ "detail": detail.into() })))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "message": "Workflow Engine is running",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn list_tools(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "tools": state.registry.list().await }))
}

#[derive(Deserialize)]
struct CreateGraphRequest {
    definition: GraphDefinition,
}

async fn create_graph(
    State(state): State<AppState>,
    Json(payload): Json<CreateGraphRequest>,
) -> Result<Json<Value>, ApiError> {
    if let Err(e) = WorkflowEngine::new(&payload.definition, state.registry.clone()) {
        log::error!("Error creating graph: {}", e);
        return Err(error_response(StatusCode::BAD_REQUEST, e.to_string()));
    }

    let stored = state.graphs.insert(payload.definition).await;
    Ok(Json(json!({
        "graph_id": stored.id,
        "message": format!("Graph '{}' created successfully", stored.name),
    })))
}

async fn get_graph(
    State(state): State<AppState>,
    Path(graph_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let stored = state
        .graphs
        .get(&graph_id)
        .await
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Graph not found"))?;

    Ok(Json(json!({
        "graph_id": stored.id,
        "name": stored.name,
        "definition": stored.definition,
        "created_at": stored.created_at,
    })))
}

#[derive(Deserialize)]
struct RunGraphRequest {
    graph_id: String,
    #[serde(default)]
    initial_state: StateData,
}

async fn run_graph(
    State(state): State<AppState>,
    Json(payload): Json<RunGraphRequest>,
) -> Result<Json<Value>, ApiError> {
    let stored = state
        .graphs
        .get(&payload.graph_id)
        .await
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Graph not found"))?;

    let engine = WorkflowEngine::new(&stored.definition, state.registry.clone())
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?
        .with_max_steps(state.settings.max_steps);

    let record = RunRecord::started(&stored.id, payload.initial_state.clone());
    let execution_id = record.execution_id.clone();
    state.runs.insert(record).await;

    tokio::spawn(execute_in_background(
        state.clone(),
        execution_id.clone(),
        engine,
        payload.initial_state,
    ));

    Ok(Json(json!({
        "execution_id": execution_id,
        "status": RunStatus::Started,
        "message": "Workflow execution started",
    })))
}

async fn execute_in_background(
    state: AppState,
    execution_id: String,
    engine: WorkflowEngine,
    initial_state: StateData,
) {
    let _permit = match state.permits.clone().acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => {
            state.runs.fail(&execution_id, e.to_string()).await;
            return;
        }
    };

    state.runs.set_running(&execution_id).await;
    log::info!("Starting execution {}", execution_id);

    let run = tokio::spawn(async move { engine.execute(initial_state).await });
    match run.await {
        Ok(outcome) => {
            log::info!(
                "Execution {} finished: {:?}",
                execution_id,
                outcome.termination
            );
            state.runs.complete(&execution_id, outcome).await;
        }
        Err(e) => {
            log::error!("Workflow execution failed: {}", e);
            state.runs.fail(&execution_id, e.to_string()).await;
        }
    }
}

async fn get_execution_state(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .runs
        .get(&execution_id)
        .await
        .ok_or_else(|| error_response(StatusCode::NOT_FOUND, "Execution not found"))?;

    Ok(Json(json!({
        "execution_id": record.execution_id,
        "graph_id": record.graph_id,
        "status": record.status,
        "current_state": record.state,
        "execution_log": record.log,
        "termination": record.termination,
        "error": record.error,
    })))
}

async fn stream_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, ApiError> {
    if state.runs.get(&execution_id).await.is_none() {
        return Err(error_response(StatusCode::NOT_FOUND, "Execution not found"));
    }

    let (tx, rx) = mpsc::channel(16);
    let runs = state.runs.clone();
    let poll_interval = state.settings.poll_interval;

    tokio::spawn(async move {
        loop {
            let Some(record) = runs.get(&execution_id).await else {
                log::warn!("Execution {} vanished while streaming", execution_id);
                break;
            };

            let update = json!({
                "execution_id": record.execution_id,
                "status": record.status,
                "current_state": record.state,
                "logs": record.log,
            });
            if tx.send(update).await.is_err() {
                log::info!("Stream client for {} disconnected", execution_id);
                break;
            }
            if record.status.is_terminal() {
                break;
            }

            tokio::time::sleep(poll_interval).await;
        }
    });

    let stream = ReceiverStream::new(rx).map(|update| Event::default().json_data(update));

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}
