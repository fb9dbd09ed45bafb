//! Core data models for the console's application state.
//!
//! These are the entity types held by the [store](crate::store): connected
//! data sources, analytical queries with their result artifacts, and the
//! assistant transcript. All of them serialize with serde so the persisted
//! snapshot can round-trip through local storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a connected data source is: an uploaded file or a live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DataSourceKind {
    TabularFile,
    SpreadsheetFile,
    StructuredFile,
    DatabaseConnection,
    ApiConnection,
}

impl DataSourceKind {
    /// Infer the kind from a filename's extension.
    ///
    /// Delimited text maps to tabular, Excel workbooks to spreadsheet, and
    /// everything else to structured — the indexing backend accepts any file.
    pub fn from_filename(name: &str) -> Self {
        let ext = name
            .rsplit('.')
            .next()
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "csv" | "tsv" => DataSourceKind::TabularFile,
            "xlsx" | "xls" => DataSourceKind::SpreadsheetFile,
            _ => DataSourceKind::StructuredFile,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DataSourceKind::TabularFile => "tabular-file",
            DataSourceKind::SpreadsheetFile => "spreadsheet-file",
            DataSourceKind::StructuredFile => "structured-file",
            DataSourceKind::DatabaseConnection => "database-connection",
            DataSourceKind::ApiConnection => "api-connection",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSourceStatus {
    Connected,
    Disconnected,
    Error,
}

/// A connected input: an uploaded file or a live connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub id: String,
    pub name: String,
    pub kind: DataSourceKind,
    pub connected_at: DateTime<Utc>,
    pub status: DataSourceStatus,
}

impl DataSource {
    pub fn new(name: impl Into<String>, kind: DataSourceKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            kind,
            connected_at: Utc::now(),
            status: DataSourceStatus::Connected,
        }
    }
}

/// How an [`Artifact`] renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Chart,
    Table,
    Kpi,
    Model,
}

/// A renderable result attached to a [`Query`]. The payload is opaque to the
/// console; the canvas view hands it to the matching renderer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// One unit of analytical work: a natural-language prompt paired with the
/// generated code and its result.
///
/// `number` is a display label assigned at creation time (count of existing
/// queries + 1). It is never reassigned, so deletions leave gaps — treat it
/// as a label, not a key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub id: String,
    pub number: u32,
    pub prompt: String,
    pub code: String,
    pub output: String,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// One turn in the assistant transcript. Immutable once created; the
/// transcript is append-only apart from an explicit clear-all.
///
/// When `code` is set, it was extracted from a fenced block in the raw
/// response and `content` has had the fence (and any suggestions section)
/// removed. `suggestions: None` means the assistant offered none — distinct
/// from an explicitly empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiMessage {
    pub id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_inference_covers_known_extensions() {
        assert_eq!(
            DataSourceKind::from_filename("sales.csv"),
            DataSourceKind::TabularFile
        );
        assert_eq!(
            DataSourceKind::from_filename("Q3 Forecast.XLSX"),
            DataSourceKind::SpreadsheetFile
        );
        assert_eq!(
            DataSourceKind::from_filename("events.json"),
            DataSourceKind::StructuredFile
        );
        assert_eq!(
            DataSourceKind::from_filename("no_extension"),
            DataSourceKind::StructuredFile
        );
    }

    #[test]
    fn kind_serializes_kebab_case() {
        let json = serde_json::to_string(&DataSourceKind::TabularFile).unwrap();
        assert_eq!(json, "\"tabular-file\"");
    }
}
