//! Notebook execution controller for the code sandbox.
//!
//! The notebook owns an ordered sequence of cells (code or markdown), each
//! with an execution status, and runs them against the cluster-execution
//! backend through the [`CodeExecutor`] seam. Cells are ephemeral view state:
//! they are never persisted, and the active query seeds the working cell when
//! the sandbox opens.
//!
//! Run-all treats the notebook as a sequential script, not a collection of
//! independent cells: execution is strictly ordered and stops at the first
//! code cell that fails, leaving later cells in whatever status they had.

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::cluster_client::{Cluster, ClusterClient, CodeExecutor};
use crate::config::NotebookConfig;
use crate::models::Query;

/// Output shown when the execution service cannot be reached at all (as
/// opposed to the service reporting a failed run).
pub const EXECUTION_FAILURE_MESSAGE: &str =
    "Failed to reach the execution service. Check that the analysis backend is running.";

/// Starter text for a fresh markdown cell.
pub const MARKDOWN_PLACEHOLDER: &str = "## Notes\n\nDescribe this step.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Code,
    Markdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellStatus {
    Idle,
    Running,
    Success,
    Error,
}

/// One notebook cell. Ordering within the notebook is significant and
/// user-controlled.
#[derive(Debug, Clone)]
pub struct NotebookCell {
    pub id: String,
    pub kind: CellKind,
    pub source: String,
    pub output: Option<String>,
    pub status: CellStatus,
}

impl NotebookCell {
    fn new(kind: CellKind, source: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            source: source.into(),
            output: None,
            status: CellStatus::Idle,
        }
    }
}

/// Result of a [`Notebook::run_all`] pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    /// Cells that reached a terminal status this pass.
    pub executed: usize,
    /// Id of the code cell that failed and stopped the run, if any.
    pub failed_cell: Option<String>,
}

/// The notebook controller.
pub struct Notebook {
    cells: Vec<NotebookCell>,
    cluster_id: Option<String>,
    executor: Arc<dyn CodeExecutor>,
    language: String,
    markdown_pacing: Duration,
}

impl Notebook {
    pub fn new(executor: Arc<dyn CodeExecutor>, config: &NotebookConfig) -> Self {
        Self {
            cells: vec![],
            cluster_id: None,
            executor,
            language: config.language.clone(),
            markdown_pacing: Duration::from_millis(config.markdown_pacing_ms),
        }
    }

    pub fn cells(&self) -> &[NotebookCell] {
        &self.cells
    }

    pub fn select_cluster(&mut self, cluster_id: impl Into<String>) {
        self.cluster_id = Some(cluster_id.into());
    }

    pub fn selected_cluster(&self) -> Option<&str> {
        self.cluster_id.as_deref()
    }

    /// Replace the notebook contents with the query's code as the working
    /// cell.
    pub fn seed_from_query(&mut self, query: &Query) {
        self.cells = vec![NotebookCell::new(CellKind::Code, query.code.clone())];
    }

    /// Append a new idle cell: empty for code, placeholder for markdown.
    /// Returns its id.
    pub fn add_cell(&mut self, kind: CellKind) -> String {
        let source = match kind {
            CellKind::Code => String::new(),
            CellKind::Markdown => MARKDOWN_PLACEHOLDER.to_string(),
        };
        let cell = NotebookCell::new(kind, source);
        let id = cell.id.clone();
        self.cells.push(cell);
        id
    }

    /// Update a cell's source text. Allowed in any status; no-op if absent.
    pub fn change_cell(&mut self, id: &str, source: &str) {
        if let Some(cell) = self.cells.iter_mut().find(|c| c.id == id) {
            cell.source = source.to_string();
        }
    }

    /// Swap the cell with its predecessor; no-op at the top.
    pub fn move_up(&mut self, id: &str) {
        if let Some(index) = self.cells.iter().position(|c| c.id == id) {
            if index > 0 {
                self.cells.swap(index - 1, index);
            }
        }
    }

    /// Swap the cell with its successor; no-op at the bottom.
    pub fn move_down(&mut self, id: &str) {
        if let Some(index) = self.cells.iter().position(|c| c.id == id) {
            if index + 1 < self.cells.len() {
                self.cells.swap(index, index + 1);
            }
        }
    }

    pub fn delete_cell(&mut self, id: &str) {
        self.cells.retain(|c| c.id != id);
    }

    /// Run one cell. Requires a selected cluster; without one this is a
    /// validation error and no cell state changes.
    pub async fn run_cell(&mut self, id: &str) -> Result<CellStatus> {
        let cluster_id = self.require_cluster()?.to_string();
        let Some(index) = self.cells.iter().position(|c| c.id == id) else {
            bail!("No such cell: {id}");
        };
        Ok(self.run_cell_at(index, &cluster_id).await)
    }

    /// Run every cell in order, stopping immediately at the first code cell
    /// that resolves to an error. Cells after the failure keep whatever
    /// status they had.
    pub async fn run_all(&mut self) -> Result<RunSummary> {
        let cluster_id = self.require_cluster()?.to_string();
        let ids: Vec<String> = self.cells.iter().map(|c| c.id.clone()).collect();

        let mut executed = 0;
        for id in ids {
            let Some(index) = self.cells.iter().position(|c| c.id == id) else {
                continue;
            };
            // Markdown renders instantly; the pacing delay is visual only.
            if self.cells[index].kind == CellKind::Markdown {
                tokio::time::sleep(self.markdown_pacing).await;
            }
            let status = self.run_cell_at(index, &cluster_id).await;
            executed += 1;
            if status == CellStatus::Error {
                return Ok(RunSummary {
                    executed,
                    failed_cell: Some(id),
                });
            }
        }
        Ok(RunSummary {
            executed,
            failed_cell: None,
        })
    }

    /// Ask the backend to destroy the cluster's execution context, then
    /// reset every cell locally. The local reset does not wait on the remote
    /// outcome — a failed destroy is logged and the notebook still resets.
    pub async fn restart_context(&mut self) -> Result<()> {
        let cluster_id = self.require_cluster()?.to_string();
        if let Err(err) = self.executor.destroy_context(&cluster_id).await {
            tracing::warn!("context destroy for {cluster_id} failed: {err:#}");
        }
        self.clear_outputs();
        Ok(())
    }

    /// Reset every cell to idle with no output. Purely local.
    pub fn clear_outputs(&mut self) {
        for cell in &mut self.cells {
            cell.status = CellStatus::Idle;
            cell.output = None;
        }
    }

    /// Concatenate the outputs of successfully-run cells, in order.
    pub fn collected_output(&self) -> String {
        self.cells
            .iter()
            .filter_map(|c| c.output.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn require_cluster(&self) -> Result<&str> {
        self.cluster_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("No cluster selected. Pick a running cluster first."))
    }

    async fn run_cell_at(&mut self, index: usize, cluster_id: &str) -> CellStatus {
        let (kind, source) = {
            let cell = &mut self.cells[index];
            cell.status = CellStatus::Running;
            cell.output = None;
            (cell.kind, cell.source.clone())
        };

        let (status, output) = match kind {
            CellKind::Markdown => (CellStatus::Success, None),
            CellKind::Code => {
                let executor = self.executor.clone();
                match executor.execute(cluster_id, &source, &self.language).await {
                    Ok(result) => {
                        let status = if result.is_finished() {
                            CellStatus::Success
                        } else {
                            CellStatus::Error
                        };
                        (status, result.error.or(result.output))
                    }
                    Err(err) => {
                        tracing::warn!("execute on {cluster_id} failed: {err:#}");
                        (CellStatus::Error, Some(EXECUTION_FAILURE_MESSAGE.to_string()))
                    }
                }
            }
        };

        let cell = &mut self.cells[index];
        cell.status = status;
        cell.output = output;
        status
    }
}

/// Cached cluster list for the sandbox's cluster picker.
///
/// Lifecycle requests update the cached state optimistically (start →
/// `PENDING`, stop → `TERMINATING`) before the call and are not rolled back
/// on failure; the next refresh reconciles with the backend.
#[derive(Default)]
pub struct ClusterPanel {
    clusters: Vec<Cluster>,
}

impl ClusterPanel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub async fn refresh(&mut self, client: &ClusterClient) -> Result<&[Cluster]> {
        self.clusters = client.list_clusters().await?;
        Ok(&self.clusters)
    }

    pub async fn start(&mut self, client: &ClusterClient, cluster_id: &str) -> Result<()> {
        self.mark(cluster_id, "PENDING");
        client.start_cluster(cluster_id).await
    }

    pub async fn stop(&mut self, client: &ClusterClient, cluster_id: &str) -> Result<()> {
        self.mark(cluster_id, "TERMINATING");
        client.stop_cluster(cluster_id).await
    }

    fn mark(&mut self, cluster_id: &str, state: &str) {
        if let Some(cluster) = self.clusters.iter_mut().find(|c| c.cluster_id == cluster_id) {
            cluster.state = state.to_string();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster_client::ExecutionResult;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Scripted executor: pops one canned response per execute call.
    #[derive(Default)]
    struct FakeExecutor {
        script: Mutex<VecDeque<Script>>,
        executed: Mutex<Vec<String>>,
        destroys: Mutex<usize>,
        fail_destroy: bool,
    }

    enum Script {
        Finished(&'static str),
        Failed(&'static str),
        Unreachable,
    }

    impl FakeExecutor {
        fn scripted(script: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                ..Self::default()
            })
        }
    }

    #[async_trait]
    impl CodeExecutor for FakeExecutor {
        async fn execute(
            &self,
            _cluster_id: &str,
            code: &str,
            _language: &str,
        ) -> Result<ExecutionResult> {
            self.executed.lock().unwrap().push(code.to_string());
            match self.script.lock().unwrap().pop_front() {
                Some(Script::Finished(output)) => Ok(ExecutionResult {
                    status: "finished".to_string(),
                    output: Some(output.to_string()),
                    error: None,
                }),
                Some(Script::Failed(error)) => Ok(ExecutionResult {
                    status: "error".to_string(),
                    output: None,
                    error: Some(error.to_string()),
                }),
                Some(Script::Unreachable) | None => bail!("connection refused"),
            }
        }

        async fn destroy_context(&self, _cluster_id: &str) -> Result<()> {
            *self.destroys.lock().unwrap() += 1;
            if self.fail_destroy {
                bail!("destroy failed");
            }
            Ok(())
        }
    }

    fn notebook(executor: Arc<FakeExecutor>) -> Notebook {
        let mut nb = Notebook::new(executor, &NotebookConfig {
            language: "python".to_string(),
            markdown_pacing_ms: 1,
        });
        nb.select_cluster("cluster-1");
        nb
    }

    #[tokio::test]
    async fn run_cell_without_cluster_is_rejected_and_state_unchanged() {
        let executor = FakeExecutor::scripted(vec![]);
        let mut nb = Notebook::new(executor.clone(), &NotebookConfig::default());
        let id = nb.add_cell(CellKind::Code);
        nb.change_cell(&id, "print(1)");

        assert!(nb.run_cell(&id).await.is_err());
        assert_eq!(nb.cells()[0].status, CellStatus::Idle);
        assert!(executor.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn code_cell_success_mirrors_result() {
        let executor = FakeExecutor::scripted(vec![Script::Finished("42")]);
        let mut nb = notebook(executor);
        let id = nb.add_cell(CellKind::Code);
        nb.change_cell(&id, "print(42)");

        let status = nb.run_cell(&id).await.unwrap();
        assert_eq!(status, CellStatus::Success);
        assert_eq!(nb.cells()[0].output.as_deref(), Some("42"));
    }

    #[tokio::test]
    async fn failed_result_prefers_error_text() {
        let executor = FakeExecutor::scripted(vec![Script::Failed("NameError: x")]);
        let mut nb = notebook(executor);
        let id = nb.add_cell(CellKind::Code);

        let status = nb.run_cell(&id).await.unwrap();
        assert_eq!(status, CellStatus::Error);
        assert_eq!(nb.cells()[0].output.as_deref(), Some("NameError: x"));
    }

    #[tokio::test]
    async fn transport_failure_sets_fixed_message() {
        let executor = FakeExecutor::scripted(vec![Script::Unreachable]);
        let mut nb = notebook(executor);
        let id = nb.add_cell(CellKind::Code);

        let status = nb.run_cell(&id).await.unwrap();
        assert_eq!(status, CellStatus::Error);
        assert_eq!(
            nb.cells()[0].output.as_deref(),
            Some(EXECUTION_FAILURE_MESSAGE)
        );
    }

    #[tokio::test]
    async fn markdown_cell_succeeds_without_remote_call() {
        let executor = FakeExecutor::scripted(vec![]);
        let mut nb = notebook(executor.clone());
        let id = nb.add_cell(CellKind::Markdown);

        let status = nb.run_cell(&id).await.unwrap();
        assert_eq!(status, CellStatus::Success);
        assert!(executor.executed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_all_stops_at_first_failing_code_cell() {
        let executor = FakeExecutor::scripted(vec![Script::Failed("boom")]);
        let mut nb = notebook(executor.clone());
        let a = nb.add_cell(CellKind::Code);
        nb.change_cell(&a, "raise");
        let b = nb.add_cell(CellKind::Code);
        nb.change_cell(&b, "print('never runs')");

        let summary = nb.run_all().await.unwrap();
        assert_eq!(summary.failed_cell.as_deref(), Some(a.as_str()));
        assert_eq!(summary.executed, 1);
        assert_eq!(nb.cells()[0].status, CellStatus::Error);
        // B is untouched: still idle, never sent to the executor
        assert_eq!(nb.cells()[1].status, CellStatus::Idle);
        assert_eq!(executor.executed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn run_all_executes_in_order_across_kinds() {
        let executor =
            FakeExecutor::scripted(vec![Script::Finished("one"), Script::Finished("two")]);
        let mut nb = notebook(executor.clone());
        let first = nb.add_cell(CellKind::Code);
        nb.change_cell(&first, "first");
        nb.add_cell(CellKind::Markdown);
        let last = nb.add_cell(CellKind::Code);
        nb.change_cell(&last, "last");

        let summary = nb.run_all().await.unwrap();
        assert_eq!(summary.executed, 3);
        assert_eq!(summary.failed_cell, None);
        assert_eq!(
            *executor.executed.lock().unwrap(),
            vec!["first".to_string(), "last".to_string()]
        );
        assert!(nb.cells().iter().all(|c| c.status == CellStatus::Success));
    }

    #[tokio::test]
    async fn restart_context_resets_even_when_destroy_fails() {
        let executor = Arc::new(FakeExecutor {
            script: Mutex::new(vec![Script::Finished("ok")].into()),
            fail_destroy: true,
            ..FakeExecutor::default()
        });
        let mut nb = notebook(executor.clone());
        let id = nb.add_cell(CellKind::Code);
        nb.run_cell(&id).await.unwrap();
        assert_eq!(nb.cells()[0].status, CellStatus::Success);

        nb.restart_context().await.unwrap();
        assert_eq!(*executor.destroys.lock().unwrap(), 1);
        assert_eq!(nb.cells()[0].status, CellStatus::Idle);
        assert_eq!(nb.cells()[0].output, None);
    }

    #[tokio::test]
    async fn move_operations_noop_at_boundaries() {
        let executor = FakeExecutor::scripted(vec![]);
        let mut nb = notebook(executor);
        let a = nb.add_cell(CellKind::Code);
        let b = nb.add_cell(CellKind::Markdown);

        nb.move_up(&a); // already first
        assert_eq!(nb.cells()[0].id, a);
        nb.move_down(&b); // already last
        assert_eq!(nb.cells()[1].id, b);

        nb.move_down(&a);
        assert_eq!(nb.cells()[0].id, b);
        assert_eq!(nb.cells()[1].id, a);

        nb.delete_cell(&b);
        assert_eq!(nb.cells().len(), 1);
    }

    #[test]
    fn cluster_panel_marks_optimistically() {
        let mut panel = ClusterPanel::new();
        panel.clusters = vec![Cluster {
            cluster_id: "c1".to_string(),
            cluster_name: "Dev".to_string(),
            state: "TERMINATED".to_string(),
            driver_type: None,
            num_workers: None,
        }];
        panel.mark("c1", "PENDING");
        assert_eq!(panel.clusters()[0].state, "PENDING");
    }
}
