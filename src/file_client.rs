//! Client for the file indexing backend.
//!
//! Uploads hand the binary to the backend, which indexes it asynchronously:
//! the returned status starts at `pending` and advances through the
//! `processing → indexed | failed` pipeline, observable via
//! [`FileClient::file_status`]. The client is stateless and performs no
//! retry; the upload flow owns per-file failure handling.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{ensure_success, Backend};

/// Where a file is in the indexing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Indexed,
    Failed,
}

impl FileStatus {
    /// Whether the pipeline is done with this file, for better or worse.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FileStatus::Indexed | FileStatus::Failed)
    }
}

/// Response of `POST /files/upload`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    pub file_id: String,
    pub filename: String,
    pub status: FileStatus,
}

/// One entry of `GET /files/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub id: String,
    pub filename: String,
    pub file_type: String,
    pub size: i64,
    pub uploaded_at: DateTime<Utc>,
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_indexed: Option<i64>,
}

/// Response of `GET /files/{id}/status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStatusReport {
    pub status: FileStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunks_indexed: Option<i64>,
}

/// Typed wrapper around the file backend.
#[derive(Clone)]
pub struct FileClient {
    backend: Backend,
}

impl FileClient {
    pub fn new(backend: Backend) -> Self {
        Self { backend }
    }

    /// Upload one file as multipart field `file`.
    pub async fn upload_file(&self, filename: &str, bytes: Vec<u8>) -> Result<UploadReceipt> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .backend
            .http()
            .post(self.backend.url("files/upload"))
            .multipart(form)
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn list_files(&self) -> Result<Vec<FileInfo>> {
        let response = self
            .backend
            .http()
            .get(self.backend.url("files/list"))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn file_status(&self, id: &str) -> Result<FileStatusReport> {
        let response = self
            .backend
            .http()
            .get(self.backend.url(&format!("files/{id}/status")))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    pub async fn delete_file(&self, id: &str) -> Result<()> {
        let response = self
            .backend
            .http()
            .delete(self.backend.url(&format!("files/{id}")))
            .send()
            .await?;
        ensure_success(response).await?;
        Ok(())
    }
}
