//! Multi-file upload into the indexing backend.
//!
//! The batch is strictly sequential: files are processed one at a time, in
//! selection order, so store updates stay deterministic. Every attempt —
//! success or failure — produces a DataSource entry; a failed file flips its
//! entry to `error` and the batch moves on to the next file.
//!
//! Directories are expanded with the configured include/exclude globs.
//! Explicitly named files are uploaded as-is, globs or not.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::Duration;
use walkdir::WalkDir;

use crate::config::UploadConfig;
use crate::file_client::{FileClient, FileStatus};
use crate::models::{DataSourceKind, DataSourceStatus};
use crate::store::AppStore;

/// Outcome for one file of the batch.
#[derive(Debug, Clone)]
pub struct UploadEntry {
    pub path: PathBuf,
    pub source_id: String,
    pub status: DataSourceStatus,
    pub detail: String,
}

/// Outcome of the whole batch.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    pub entries: Vec<UploadEntry>,
}

impl UploadReport {
    pub fn succeeded(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == DataSourceStatus::Connected)
            .count()
    }

    pub fn failed(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| e.status == DataSourceStatus::Error)
            .count()
    }
}

/// Upload a batch of files and directories, one file at a time.
///
/// With `wait` set, each successful upload is followed by status polling
/// until the indexing pipeline reports `indexed` or `failed`, or the
/// configured deadline passes.
pub async fn upload_batch(
    store: &mut AppStore,
    client: &FileClient,
    config: &UploadConfig,
    paths: &[PathBuf],
    wait: bool,
) -> Result<UploadReport> {
    let files = expand_paths(paths, config)?;

    let mut report = UploadReport::default();
    for path in files {
        let entry = upload_one(store, client, config, &path, wait).await;
        report.entries.push(entry);
    }
    Ok(report)
}

/// Expand the selection: files pass through untouched, directories are
/// walked with the include/exclude globs, in path order.
pub fn expand_paths(paths: &[PathBuf], config: &UploadConfig) -> Result<Vec<PathBuf>> {
    let include = build_globset(&config.include_globs).context("Invalid upload.include_globs")?;
    let exclude = build_globset(&config.exclude_globs).context("Invalid upload.exclude_globs")?;

    let mut files = vec![];
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                if !entry.file_type().is_file() {
                    continue;
                }
                let relative = entry.path().strip_prefix(path).unwrap_or(entry.path());
                if include.is_match(relative) && !exclude.is_match(relative) {
                    files.push(entry.path().to_path_buf());
                }
            }
        } else {
            // explicitly selected: no glob filtering, missing files surface
            // as failed entries during the batch
            files.push(path.clone());
        }
    }
    Ok(files)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

async fn upload_one(
    store: &mut AppStore,
    client: &FileClient,
    config: &UploadConfig,
    path: &Path,
    wait: bool,
) -> UploadEntry {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let kind = DataSourceKind::from_filename(&filename);
    let source = store.add_data_source(&filename, kind).await;

    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            store.set_data_source_error(&source.id).await;
            return UploadEntry {
                path: path.to_path_buf(),
                source_id: source.id,
                status: DataSourceStatus::Error,
                detail: format!("unreadable: {err}"),
            };
        }
    };

    let receipt = match client.upload_file(&filename, bytes).await {
        Ok(receipt) => receipt,
        Err(err) => {
            tracing::warn!("upload of {} failed: {err:#}", path.display());
            store.set_data_source_error(&source.id).await;
            return UploadEntry {
                path: path.to_path_buf(),
                source_id: source.id,
                status: DataSourceStatus::Error,
                detail: format!("upload failed: {err}"),
            };
        }
    };

    let detail = if wait {
        match wait_for_indexing(client, config, &receipt.file_id).await {
            IndexingOutcome::Indexed(chunks) => match chunks {
                Some(n) => format!("indexed ({n} chunks)"),
                None => "indexed".to_string(),
            },
            IndexingOutcome::Failed => {
                store.set_data_source_error(&source.id).await;
                return UploadEntry {
                    path: path.to_path_buf(),
                    source_id: source.id,
                    status: DataSourceStatus::Error,
                    detail: "indexing failed".to_string(),
                };
            }
            IndexingOutcome::StillRunning => "uploaded, still indexing".to_string(),
            IndexingOutcome::Unknown => "uploaded, status unavailable".to_string(),
        }
    } else {
        format!("uploaded, status {:?}", receipt.status).to_lowercase()
    };

    UploadEntry {
        path: path.to_path_buf(),
        source_id: source.id,
        status: DataSourceStatus::Connected,
        detail,
    }
}

enum IndexingOutcome {
    Indexed(Option<i64>),
    Failed,
    StillRunning,
    Unknown,
}

/// Poll the indexing pipeline until it settles or the deadline passes.
async fn wait_for_indexing(
    client: &FileClient,
    config: &UploadConfig,
    file_id: &str,
) -> IndexingOutcome {
    let interval = Duration::from_secs(config.poll_interval_secs);
    let attempts = (config.poll_timeout_secs / config.poll_interval_secs).max(1);

    for _ in 0..attempts {
        match client.file_status(file_id).await {
            Ok(report) => match report.status {
                FileStatus::Indexed => return IndexingOutcome::Indexed(report.chunks_indexed),
                FileStatus::Failed => return IndexingOutcome::Failed,
                FileStatus::Pending | FileStatus::Processing => {}
            },
            Err(err) => {
                tracing::warn!("status poll for {file_id} failed: {err:#}");
                return IndexingOutcome::Unknown;
            }
        }
        tokio::time::sleep(interval).await;
    }
    IndexingOutcome::StillRunning
}
