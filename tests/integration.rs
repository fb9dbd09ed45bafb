//! End-to-end flows against the in-process stub backend: chat round-trips,
//! upload batches, and notebook execution over real HTTP.

use std::sync::Arc;

use analyst_console::backend::Backend;
use analyst_console::chat_client::ChatClient;
use analyst_console::chat_panel::ChatPanel;
use analyst_console::cluster_client::ClusterClient;
use analyst_console::config::{BackendConfig, ChatConfig, NotebookConfig, UploadConfig};
use analyst_console::file_client::{FileClient, FileStatus};
use analyst_console::models::{DataSourceKind, DataSourceStatus, MessageRole};
use analyst_console::notebook::{CellKind, CellStatus, Notebook};
use analyst_console::persist::MemorySnapshotStore;
use analyst_console::store::AppStore;
use analyst_console::stub;
use analyst_console::upload::upload_batch;

async fn serve_stub() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, stub::router()).await.unwrap();
    });
    format!("http://{addr}/api/v1")
}

fn backend(base_url: &str) -> Backend {
    Backend::new(&BackendConfig {
        base_url: base_url.to_string(),
        timeout_secs: 10,
    })
    .unwrap()
}

async fn fresh_store() -> AppStore {
    AppStore::open(Box::new(MemorySnapshotStore::default()), "test").await
}

#[tokio::test]
async fn chat_round_trip_parses_code_and_suggestions() {
    let base = serve_stub().await;
    let mut store = fresh_store().await;
    let mut panel = ChatPanel::new(ChatClient::new(backend(&base)), &ChatConfig::default());

    let outcome = panel
        .send(&mut store, "Plot monthly revenue", None)
        .await
        .unwrap();
    assert!(!outcome.failed);

    let message = &outcome.message;
    assert_eq!(message.role, MessageRole::Assistant);
    assert!(message.code.as_deref().unwrap().contains("import pandas"));
    assert_eq!(message.suggestions.as_ref().unwrap().len(), 3);
    assert!(!message.content.contains("```"));
    assert!(!message.content.to_lowercase().contains("suggestions:"));
    assert!(!panel.is_typing());

    // second turn stays in the same backend session
    let first_session = panel.client().session_id().unwrap().to_string();
    panel
        .send(&mut store, "And split it by region?", Some("analyst"))
        .await
        .unwrap();
    assert_eq!(panel.client().session_id().unwrap(), first_session);

    let history = panel.client().history().await.unwrap();
    assert_eq!(history.message_count, 4);
    assert_eq!(store.state().ai_messages.len(), 4);
}

#[tokio::test]
async fn backend_health_and_agent_listing() {
    let base = serve_stub().await;
    let backend = backend(&base);

    let health = backend.health().await.unwrap();
    assert_eq!(health.status, "healthy");

    let client = ChatClient::new(backend);
    let agents = client.list_agents().await.unwrap();
    assert_eq!(agents.len(), 6);
    assert!(agents.iter().any(|a| a.name == "Orchestrator"));
}

#[tokio::test]
async fn clearing_history_resets_backend_and_session() {
    let base = serve_stub().await;
    let mut store = fresh_store().await;
    let mut panel = ChatPanel::new(ChatClient::new(backend(&base)), &ChatConfig::default());

    panel.send(&mut store, "hello", None).await.unwrap();
    assert!(panel.client().session_id().is_some());

    panel.clear_transcript(&mut store).await;
    assert!(store.state().ai_messages.is_empty());
    assert_eq!(panel.client().session_id(), None);
    assert!(panel.client().history().await.is_err());
}

#[tokio::test]
async fn upload_batch_continues_past_failures() {
    let base = serve_stub().await;
    let dir = tempfile::TempDir::new().unwrap();
    let good_csv = dir.path().join("orders.csv");
    std::fs::write(&good_csv, "order_id,revenue\n1,100\n").unwrap();
    let missing = dir.path().join("absent.csv");
    let good_json = dir.path().join("regions.json");
    std::fs::write(&good_json, "{\"regions\": []}").unwrap();

    let mut store = fresh_store().await;
    let client = FileClient::new(backend(&base));
    let report = upload_batch(
        &mut store,
        &client,
        &UploadConfig::default(),
        &[good_csv, missing, good_json],
        false,
    )
    .await
    .unwrap();

    assert_eq!(report.entries.len(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);

    // all three attempts produced a data source, in selection order
    let sources = &store.state().data_sources;
    assert_eq!(sources.len(), 3);
    assert_eq!(sources[0].status, DataSourceStatus::Connected);
    assert_eq!(sources[0].kind, DataSourceKind::TabularFile);
    assert_eq!(sources[1].status, DataSourceStatus::Error);
    assert_eq!(sources[2].status, DataSourceStatus::Connected);
    assert_eq!(sources[2].kind, DataSourceKind::StructuredFile);
    assert!(store.state().is_connected);

    // only the readable files reached the backend
    let files = client.list_files().await.unwrap();
    assert_eq!(files.len(), 2);
}

#[tokio::test]
async fn wait_for_indexing_settles() {
    let base = serve_stub().await;
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("orders.csv");
    std::fs::write(&path, "order_id,revenue\n1,100\n").unwrap();

    let mut store = fresh_store().await;
    let client = FileClient::new(backend(&base));
    let report = upload_batch(
        &mut store,
        &client,
        &UploadConfig::default(),
        &[path],
        true,
    )
    .await
    .unwrap();

    assert_eq!(report.failed(), 0);
    assert!(report.entries[0].detail.contains("indexed"));

    let files = client.list_files().await.unwrap();
    assert_eq!(files[0].status, FileStatus::Indexed);
    assert!(files[0].chunks_indexed.is_some());
}

#[tokio::test]
async fn file_delete_round_trip() {
    let base = serve_stub().await;
    let client = FileClient::new(backend(&base));

    let receipt = client
        .upload_file("orders.csv", b"order_id\n1\n".to_vec())
        .await
        .unwrap();
    assert_eq!(receipt.status, FileStatus::Pending);

    client.delete_file(&receipt.file_id).await.unwrap();
    assert!(client.list_files().await.unwrap().is_empty());
    assert!(client.file_status(&receipt.file_id).await.is_err());
}

#[tokio::test]
async fn notebook_runs_and_fails_fast_over_http() {
    let base = serve_stub().await;
    let client = ClusterClient::new(backend(&base));

    let clusters = client.list_clusters().await.unwrap();
    let running = clusters.iter().find(|c| c.is_running()).unwrap();
    assert_eq!(running.cluster_id, "mock-cluster-1");

    let config = NotebookConfig {
        language: "python".to_string(),
        markdown_pacing_ms: 1,
    };
    let mut notebook = Notebook::new(Arc::new(client), &config);
    notebook.select_cluster(running.cluster_id.as_str());

    let ok = notebook.add_cell(CellKind::Code);
    notebook.change_cell(&ok, "print('ok')");
    let summary = notebook.run_all().await.unwrap();
    assert_eq!(summary.failed_cell, None);
    assert!(notebook.cells()[0]
        .output
        .as_deref()
        .unwrap()
        .contains("chars processed"));

    // a raising cell stops the run before later cells execute
    let failing = notebook.add_cell(CellKind::Code);
    notebook.change_cell(&failing, "raise ValueError('bad')");
    let after = notebook.add_cell(CellKind::Code);
    notebook.change_cell(&after, "print('never')");
    notebook.clear_outputs();

    let summary = notebook.run_all().await.unwrap();
    assert_eq!(summary.failed_cell.as_deref(), Some(failing.as_str()));
    assert_eq!(notebook.cells()[0].status, CellStatus::Success);
    assert_eq!(notebook.cells()[1].status, CellStatus::Error);
    assert!(notebook.cells()[1]
        .output
        .as_deref()
        .unwrap()
        .contains("Exception"));
    assert_eq!(notebook.cells()[2].status, CellStatus::Idle);
    assert_eq!(notebook.cells()[2].output, None);
}

#[tokio::test]
async fn cluster_lifecycle_and_context_restart() {
    let base = serve_stub().await;
    let client = ClusterClient::new(backend(&base));

    client.start_cluster("mock-cluster-2").await.unwrap();
    let clusters = client.list_clusters().await.unwrap();
    let gpu = clusters
        .iter()
        .find(|c| c.cluster_id == "mock-cluster-2")
        .unwrap();
    assert_eq!(gpu.state, "PENDING");

    client.stop_cluster("mock-cluster-2").await.unwrap();
    client.restart_context("mock-cluster-1").await.unwrap();

    // unknown cluster surfaces as an error, not a panic
    assert!(client.start_cluster("nope").await.is_err());
}
