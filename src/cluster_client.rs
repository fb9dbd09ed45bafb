//! Client for the cluster-execution backend.
//!
//! The backend fronts a Databricks-style workspace: clusters have lifecycle
//! states (`RUNNING`, `PENDING`, `TERMINATED`, ...) and code executes inside
//! a per-cluster context that can be destroyed to get a fresh interpreter.
//!
//! The [`CodeExecutor`] trait is the seam the notebook controller executes
//! through; [`ClusterClient`] is its production implementation and tests
//! substitute a scripted fake.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{ensure_success, Backend};

/// One remote compute cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: String,
    pub cluster_name: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub driver_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_workers: Option<i64>,
}

impl Cluster {
    pub fn is_running(&self) -> bool {
        self.state == "RUNNING"
    }
}

/// Response of `POST /databricks/execute`.
///
/// `status` is `"finished"` on success; anything else (`"error"`,
/// `"timeout"`) is a failed run with the cause in `error`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn is_finished(&self) -> bool {
        self.status == "finished"
    }
}

#[derive(Serialize)]
struct ExecuteBody<'a> {
    cluster_id: &'a str,
    code: &'a str,
    language: &'a str,
}

/// What the notebook controller needs from the execution backend.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Execute a code string in the cluster's context.
    async fn execute(&self, cluster_id: &str, code: &str, language: &str)
        -> Result<ExecutionResult>;

    /// Destroy the cluster's execution context (kernel restart).
    async fn destroy_context(&self, cluster_id: &str) -> Result<()>;
}

/// Typed wrapper around the cluster-execution backend.
#[derive(Clone)]
pub struct ClusterClient {
    backend: Backend,
}

impl ClusterClient {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    pub async fn list_clusters(&self) -> Result<Vec<Cluster>> {
        let response = self
            .backend
            .http()
            .get(self.backend.url("databricks/clusters"))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn start_cluster(&self, cluster_id: &str) -> Result<()> {
        let response = self
            .backend
            .http()
            .post(self.backend.url(&format!("databricks/clusters/{cluster_id}/start")))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn stop_cluster(&self, cluster_id: &str) -> Result<()> {
        let response = self
            .backend
            .http()
            .post(self.backend.url(&format!("databricks/clusters/{cluster_id}/stop")))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }

    pub async fn execute_code(
        &self,
        cluster_id: &str,
        code: &str,
        language: &str,
    ) -> Result<ExecutionResult> {
        let body = ExecuteBody {
            cluster_id,
            code,
            language,
        };
        let response = self
            .backend
            .http()
            .post(self.backend.url("databricks/execute"))
            .json(&body)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn restart_context(&self, cluster_id: &str) -> Result<()> {
        let response = self
            .backend
            .http()
            .post(self.backend.url(&format!(
                "databricks/context/destroy?cluster_id={cluster_id}"
            )))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl CodeExecutor for ClusterClient {
    async fn execute(
        &self,
        cluster_id: &str,
        code: &str,
        language: &str,
    ) -> Result<ExecutionResult> {
        self.execute_code(cluster_id, code, language).await
    }

    async fn destroy_context(&self, cluster_id: &str) -> Result<()> {
        self.restart_context(cluster_id).await
    }
}
