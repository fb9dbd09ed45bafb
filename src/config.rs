use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub storage: StorageConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub notebook: NotebookConfig,
    #[serde(default)]
    pub upload: UploadConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

fn default_namespace() -> String {
    "analyst-console".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000/api/v1".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_agent")]
    pub default_agent: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            default_agent: default_agent(),
        }
    }
}

fn default_agent() -> String {
    "orchestrator".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotebookConfig {
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_markdown_pacing_ms")]
    pub markdown_pacing_ms: u64,
}

impl Default for NotebookConfig {
    fn default() -> Self {
        Self {
            language: default_language(),
            markdown_pacing_ms: default_markdown_pacing_ms(),
        }
    }
}

fn default_language() -> String {
    "python".to_string()
}
fn default_markdown_pacing_ms() -> u64 {
    400
}

#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_poll_timeout_secs")]
    pub poll_timeout_secs: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: vec![],
            poll_interval_secs: default_poll_interval_secs(),
            poll_timeout_secs: default_poll_timeout_secs(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    [
        "**/*.csv", "**/*.tsv", "**/*.xlsx", "**/*.xls", "**/*.json", "**/*.parquet",
        "**/*.txt", "**/*.md", "**/*.pdf", "**/*.docx",
    ]
    .iter()
    .map(|g| g.to_string())
    .collect()
}
fn default_poll_interval_secs() -> u64 {
    2
}
fn default_poll_timeout_secs() -> u64 {
    120
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    // Validate backend
    if config.backend.base_url.trim().is_empty() {
        anyhow::bail!("backend.base_url must not be empty");
    }
    if config.backend.timeout_secs == 0 {
        anyhow::bail!("backend.timeout_secs must be > 0");
    }

    // Validate upload polling
    if config.upload.poll_interval_secs == 0 {
        anyhow::bail!("upload.poll_interval_secs must be > 0");
    }
    if config.upload.poll_timeout_secs < config.upload.poll_interval_secs {
        anyhow::bail!("upload.poll_timeout_secs must be >= upload.poll_interval_secs");
    }

    Ok(config)
}
