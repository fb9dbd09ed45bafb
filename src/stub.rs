//! Local stub backend.
//!
//! Serves the three remote interfaces the console consumes — chat, file
//! indexing, cluster execution — with the platform's demo behavior: canned
//! assistant replies that embed a fenced code block and a suggestions
//! section, an in-memory file registry whose entries settle to `indexed` on
//! the first status poll, and two mock clusters with fixed-delay execution.
//!
//! Used by `anc stub` for offline work and spawned in-process by the
//! integration tests. Error responses mirror the real backend's
//! `{"detail": ...}` shape.

use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

use crate::chat_client::{AgentInfo, ChatHistory, ChatReply, HistoryMessage};
use crate::cluster_client::{Cluster, ExecutionResult};
use crate::file_client::{FileInfo, FileStatus, FileStatusReport, UploadReceipt};

/// Shared state behind the stub's routes.
#[derive(Clone, Default)]
pub struct StubState {
    inner: Arc<Mutex<StubInner>>,
}

struct StubInner {
    sessions: HashMap<String, Vec<HistoryMessage>>,
    files: HashMap<String, FileInfo>,
    clusters: Vec<Cluster>,
}

impl Default for StubInner {
    fn default() -> Self {
        Self {
            sessions: HashMap::new(),
            files: HashMap::new(),
            clusters: demo_clusters(),
        }
    }
}

fn demo_clusters() -> Vec<Cluster> {
    vec![
        Cluster {
            cluster_id: "mock-cluster-1".to_string(),
            cluster_name: "Standard Cluster (Dev)".to_string(),
            state: "RUNNING".to_string(),
            driver_type: Some("Standard_DS3_v2".to_string()),
            num_workers: Some(2),
        },
        Cluster {
            cluster_id: "mock-cluster-2".to_string(),
            cluster_name: "ML Cluster (GPU)".to_string(),
            state: "TERMINATED".to_string(),
            driver_type: Some("Standard_NC6".to_string()),
            num_workers: Some(1),
        },
    ]
}

fn stub_agents() -> Vec<AgentInfo> {
    let agent = |name: &str, description: &str, capabilities: &[&str]| AgentInfo {
        name: name.to_string(),
        description: description.to_string(),
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        status: "active".to_string(),
    };
    vec![
        agent(
            "Orchestrator",
            "Routes queries to appropriate agents and coordinates multi-agent tasks",
            &["query_routing", "task_coordination", "result_aggregation"],
        ),
        agent(
            "SQL Agent",
            "Generates and explains SQL queries from natural language",
            &["sql_generation", "query_explanation", "schema_analysis"],
        ),
        agent(
            "Python Agent",
            "Generates Python code for data analysis and visualization",
            &["code_generation", "data_analysis", "visualization"],
        ),
        agent(
            "Market Researcher",
            "Conducts market research analysis using indexed data",
            &["market_analysis", "trend_detection", "competitive_intelligence"],
        ),
        agent(
            "Data Analyst",
            "Performs statistical analysis and generates insights",
            &["statistical_analysis", "insight_generation", "data_summary"],
        ),
        agent(
            "Report Writer",
            "Creates professional reports and summaries",
            &["report_generation", "executive_summary", "documentation"],
        ),
    ]
}

struct StubError(StatusCode, String);

impl StubError {
    fn not_found(detail: &str) -> Self {
        Self(StatusCode::NOT_FOUND, detail.to_string())
    }

    fn bad_request(detail: &str) -> Self {
        Self(StatusCode::BAD_REQUEST, detail.to_string())
    }
}

impl IntoResponse for StubError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "detail": self.1 }))).into_response()
    }
}

/// Build the stub router. Exposed separately from [`run_stub`] so tests can
/// serve it on an ephemeral port.
pub fn router() -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .route("/chat/send", post(chat_send))
        .route("/chat/history/{session_id}", get(chat_history).delete(chat_clear))
        .route("/agents/list", get(agents_list))
        .route("/files/upload", post(files_upload))
        .route("/files/list", get(files_list))
        .route("/files/{file_id}/status", get(files_status))
        .route("/files/{file_id}", delete(files_delete))
        .route("/databricks/clusters", get(clusters_list))
        .route("/databricks/clusters/{cluster_id}/start", post(cluster_start))
        .route("/databricks/clusters/{cluster_id}/stop", post(cluster_stop))
        .route("/databricks/execute", post(execute))
        .route("/databricks/context/destroy", post(context_destroy))
        .with_state(StubState::default());

    Router::new().nest("/api/v1", api).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    )
}

/// Serve the stub until the process is terminated.
pub async fn run_stub(bind: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    let addr = listener.local_addr()?;
    println!("Stub backend listening on http://{addr}/api/v1");
    axum::serve(listener, router()).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy", "service": "analyst-console-stub" }))
}

#[derive(Deserialize)]
struct SendRequest {
    message: String,
    #[serde(default = "default_agent")]
    agent: String,
    #[serde(default)]
    session_id: Option<String>,
}

fn default_agent() -> String {
    "orchestrator".to_string()
}

fn canned_reply(message: &str) -> String {
    format!(
        "Here's a first pass at \"{message}\".\n\n\
         ```python\n\
         import pandas as pd\n\n\
         df = spark.table(\"sales.orders\").toPandas()\n\
         print(df.describe())\n\
         ```\n\
         Suggestions:\n\
         - Visualize the distribution as a histogram\n\
         - Narrow the analysis to the last quarter\n\
         - Export the summary as a report"
    )
}

async fn chat_send(
    State(state): State<StubState>,
    Json(request): Json<SendRequest>,
) -> Result<Json<ChatReply>, StubError> {
    if request.message.trim().is_empty() {
        return Err(StubError::bad_request("No message provided"));
    }

    let session_id = request
        .session_id
        .unwrap_or_else(|| Uuid::new_v4().to_string());
    let response = canned_reply(&request.message);
    let now = Utc::now();

    {
        let mut inner = state.inner.lock().expect("stub state poisoned");
        let transcript = inner.sessions.entry(session_id.clone()).or_default();
        transcript.push(HistoryMessage {
            role: "user".to_string(),
            content: request.message.clone(),
            agent: None,
            timestamp: Some(now),
            sources: None,
        });
        transcript.push(HistoryMessage {
            role: "assistant".to_string(),
            content: response.clone(),
            agent: Some(request.agent.clone()),
            timestamp: Some(now),
            sources: Some(vec!["demo://sales.orders".to_string()]),
        });
    }

    Ok(Json(ChatReply {
        session_id,
        agent: request.agent,
        response,
        timestamp: now,
        sources: Some(vec!["demo://sales.orders".to_string()]),
    }))
}

async fn chat_history(
    State(state): State<StubState>,
    Path(session_id): Path<String>,
) -> Result<Json<ChatHistory>, StubError> {
    let inner = state.inner.lock().expect("stub state poisoned");
    let Some(messages) = inner.sessions.get(&session_id) else {
        return Err(StubError::not_found("Session not found"));
    };
    Ok(Json(ChatHistory {
        session_id,
        message_count: messages.len(),
        messages: messages.clone(),
    }))
}

async fn chat_clear(
    State(state): State<StubState>,
    Path(session_id): Path<String>,
) -> Result<Json<Value>, StubError> {
    let mut inner = state.inner.lock().expect("stub state poisoned");
    if inner.sessions.remove(&session_id).is_none() {
        return Err(StubError::not_found("Session not found"));
    }
    Ok(Json(json!({
        "message": "Chat history cleared",
        "session_id": session_id,
    })))
}

async fn agents_list() -> Json<Vec<AgentInfo>> {
    Json(stub_agents())
}

async fn files_upload(
    State(state): State<StubState>,
    mut multipart: Multipart,
) -> Result<Json<UploadReceipt>, StubError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| StubError::bad_request("Malformed multipart body"))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field
            .file_name()
            .unwrap_or("upload.bin")
            .to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|_| StubError::bad_request("Unreadable file field"))?;

        let file_type = filename
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let info = FileInfo {
            id: Uuid::new_v4().to_string(),
            filename: filename.clone(),
            file_type,
            size: bytes.len() as i64,
            uploaded_at: Utc::now(),
            status: FileStatus::Pending,
            chunks_indexed: None,
        };

        let receipt = UploadReceipt {
            message: "File uploaded, indexing started".to_string(),
            file_id: info.id.clone(),
            filename,
            status: FileStatus::Pending,
        };

        let mut inner = state.inner.lock().expect("stub state poisoned");
        inner.files.insert(info.id.clone(), info);
        return Ok(Json(receipt));
    }
    Err(StubError::bad_request("Missing file field"))
}

async fn files_list(State(state): State<StubState>) -> Json<Vec<FileInfo>> {
    let inner = state.inner.lock().expect("stub state poisoned");
    Json(inner.files.values().cloned().collect())
}

async fn files_status(
    State(state): State<StubState>,
    Path(file_id): Path<String>,
) -> Result<Json<FileStatusReport>, StubError> {
    let mut inner = state.inner.lock().expect("stub state poisoned");
    let Some(info) = inner.files.get_mut(&file_id) else {
        return Err(StubError::not_found("File not found"));
    };

    // The real pipeline indexes in the background; the stub settles on the
    // first status poll.
    if info.status == FileStatus::Pending {
        info.status = FileStatus::Indexed;
        info.chunks_indexed = Some(info.size / 500 + 1);
    }

    Ok(Json(FileStatusReport {
        status: info.status,
        chunks_indexed: info.chunks_indexed,
    }))
}

async fn files_delete(
    State(state): State<StubState>,
    Path(file_id): Path<String>,
) -> Result<Json<Value>, StubError> {
    let mut inner = state.inner.lock().expect("stub state poisoned");
    if inner.files.remove(&file_id).is_none() {
        return Err(StubError::not_found("File not found"));
    }
    Ok(Json(json!({
        "message": "File deleted successfully",
        "file_id": file_id,
    })))
}

async fn clusters_list(State(state): State<StubState>) -> Json<Vec<Cluster>> {
    let inner = state.inner.lock().expect("stub state poisoned");
    Json(inner.clusters.clone())
}

async fn cluster_start(
    State(state): State<StubState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<Value>, StubError> {
    set_cluster_state(&state, &cluster_id, "PENDING")?;
    Ok(Json(json!({
        "message": "Cluster start initiated",
        "cluster_id": cluster_id,
    })))
}

async fn cluster_stop(
    State(state): State<StubState>,
    Path(cluster_id): Path<String>,
) -> Result<Json<Value>, StubError> {
    set_cluster_state(&state, &cluster_id, "TERMINATING")?;
    Ok(Json(json!({
        "message": "Cluster termination initiated",
        "cluster_id": cluster_id,
    })))
}

fn set_cluster_state(state: &StubState, cluster_id: &str, new_state: &str) -> Result<(), StubError> {
    let mut inner = state.inner.lock().expect("stub state poisoned");
    let Some(cluster) = inner
        .clusters
        .iter_mut()
        .find(|c| c.cluster_id == cluster_id)
    else {
        return Err(StubError::not_found("Cluster not found"));
    };
    cluster.state = new_state.to_string();
    Ok(())
}

#[derive(Deserialize)]
struct ExecuteRequest {
    cluster_id: String,
    code: String,
    #[serde(default = "default_language")]
    language: String,
}

fn default_language() -> String {
    "python".to_string()
}

async fn execute(
    State(state): State<StubState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<ExecutionResult>, StubError> {
    {
        let inner = state.inner.lock().expect("stub state poisoned");
        if !inner
            .clusters
            .iter()
            .any(|c| c.cluster_id == request.cluster_id)
        {
            return Err(StubError::not_found("Cluster not found"));
        }
    }

    if !matches!(request.language.as_str(), "python" | "sql" | "scala" | "r") {
        return Err(StubError::bad_request("Unsupported language"));
    }

    // fixed short delay, like the real mock path
    tokio::time::sleep(Duration::from_millis(100)).await;

    // `raise` statements fail, so callers can exercise the error path
    if let Some(line) = request
        .code
        .lines()
        .map(str::trim)
        .find(|l| l.starts_with("raise"))
    {
        return Ok(Json(ExecutionResult {
            status: "error".to_string(),
            output: None,
            error: Some(format!("Exception: {line}")),
        }));
    }

    Ok(Json(ExecutionResult {
        status: "finished".to_string(),
        output: Some(format!(
            "[stub execution] Result: {} chars processed.\nData processed successfully.",
            request.code.len()
        )),
        error: None,
    }))
}

#[derive(Deserialize)]
struct DestroyParams {
    cluster_id: String,
}

async fn context_destroy(Query(params): Query<DestroyParams>) -> Json<Value> {
    Json(json!({
        "message": "Context destroyed",
        "cluster_id": params.cluster_id,
    }))
}
