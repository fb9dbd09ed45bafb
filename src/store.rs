//! The application store: the console's single source of truth.
//!
//! State is split in two layers:
//!
//! - [`AppState`] holds the entities and exposes the mutation set. Every
//!   mutation is synchronous and atomic — no partial-failure state can be
//!   observed between suspension points.
//! - [`AppStore`] wraps the state with change listeners and a
//!   [`SnapshotStore`](crate::persist::SnapshotStore) backend. After every
//!   mutation the persisted subset is flushed; a failed flush is logged and
//!   never surfaced as a mutation failure.
//!
//! There is no global singleton: the store is constructed once in `main` and
//! passed explicitly to the controllers that need it. Views read through
//! [`AppStore::state`] and subscribe with [`AppStore::subscribe`]; they never
//! mutate entity fields directly.
//!
//! The persisted subset is `{data_sources, queries, ai_messages,
//! is_connected, ai_scroll_position}`. Everything else — panel toggles, the
//! active query, the active artifact — is ephemeral and resets to defaults on
//! restart regardless of what was persisted.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::models::{
    AiMessage, Artifact, ArtifactKind, DataSource, DataSourceKind, DataSourceStatus, MessageRole,
    Query,
};
use crate::persist::SnapshotStore;

/// The artifact currently open in the detail view, with its originating code.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveArtifact {
    pub artifact: Artifact,
    pub code: Option<String>,
}

/// Field-wise patch for [`AppState::update_query`]. Unset fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct QueryPatch {
    pub prompt: Option<String>,
    pub code: Option<String>,
    pub output: Option<String>,
    pub artifacts: Option<Vec<Artifact>>,
}

/// The subset of the state that survives restarts, serialized as one JSON
/// document under the configured namespace key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub data_sources: Vec<DataSource>,
    pub queries: Vec<Query>,
    pub ai_messages: Vec<AiMessage>,
    pub is_connected: bool,
    pub ai_scroll_position: f64,
}

/// In-memory application state plus the full mutation set.
#[derive(Debug, Clone)]
pub struct AppState {
    pub data_sources: Vec<DataSource>,
    pub queries: Vec<Query>,
    pub ai_messages: Vec<AiMessage>,
    pub is_connected: bool,
    pub ai_scroll_position: f64,
    pub active_query_id: Option<String>,
    pub sidebar_open: bool,
    pub ai_panel_open: bool,
    pub active_artifact: Option<ActiveArtifact>,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            data_sources: vec![],
            queries: demo_queries(),
            ai_messages: vec![],
            is_connected: false,
            ai_scroll_position: 0.0,
            active_query_id: None,
            sidebar_open: true,
            ai_panel_open: true,
            active_artifact: None,
        }
    }
}

impl AppState {
    // ---- data sources ----

    /// Append a freshly-connected data source. Always succeeds.
    pub fn add_data_source(&mut self, name: &str, kind: DataSourceKind) -> DataSource {
        let source = DataSource::new(name, kind);
        self.data_sources.push(source.clone());
        self.is_connected = true;
        source
    }

    /// Remove a data source by id; no-op if absent. The "has any source"
    /// flag is recomputed from what remains.
    pub fn remove_data_source(&mut self, id: &str) {
        self.data_sources.retain(|s| s.id != id);
        self.is_connected = !self.data_sources.is_empty();
    }

    /// Mark a data source as failed. Only the connected→error transition is
    /// allowed; an errored source never goes back to connected.
    pub fn set_data_source_error(&mut self, id: &str) {
        if let Some(source) = self.data_sources.iter_mut().find(|s| s.id == id) {
            if source.status == DataSourceStatus::Connected {
                source.status = DataSourceStatus::Error;
            }
        }
    }

    // ---- queries ----

    /// Create a new query numbered `count + 1`, make it active, and return
    /// it. Numbers are not reassigned on deletion, so gaps can appear.
    pub fn add_query(&mut self, prompt: &str, code: &str) -> Query {
        let now = Utc::now();
        let query = Query {
            id: Uuid::new_v4().to_string(),
            number: self.queries.len() as u32 + 1,
            prompt: prompt.to_string(),
            code: code.to_string(),
            output: String::new(),
            artifacts: vec![],
            created_at: now,
            updated_at: now,
        };
        self.queries.push(query.clone());
        self.active_query_id = Some(query.id.clone());
        query
    }

    /// Merge a patch into the matching query and refresh its
    /// updated-timestamp; no-op if absent.
    pub fn update_query(&mut self, id: &str, patch: QueryPatch) {
        if let Some(query) = self.queries.iter_mut().find(|q| q.id == id) {
            if let Some(prompt) = patch.prompt {
                query.prompt = prompt;
            }
            if let Some(code) = patch.code {
                query.code = code;
            }
            if let Some(output) = patch.output {
                query.output = output;
            }
            if let Some(artifacts) = patch.artifacts {
                query.artifacts = artifacts;
            }
            query.updated_at = Utc::now();
        }
    }

    /// Delete a query. If it was active, there is no active query afterward.
    pub fn remove_query(&mut self, id: &str) {
        self.queries.retain(|q| q.id != id);
        if self.active_query_id.as_deref() == Some(id) {
            self.active_query_id = None;
        }
    }

    /// Set or clear the active query. An id that matches no held query is
    /// ignored, so the active id always references an existing query.
    pub fn set_active_query(&mut self, id: Option<&str>) {
        match id {
            Some(id) if self.queries.iter().any(|q| q.id == id) => {
                self.active_query_id = Some(id.to_string());
            }
            Some(_) => {}
            None => self.active_query_id = None,
        }
    }

    pub fn active_query(&self) -> Option<&Query> {
        let id = self.active_query_id.as_deref()?;
        self.queries.iter().find(|q| q.id == id)
    }

    // ---- transcript ----

    /// Append an immutable message to the transcript and return it.
    pub fn add_ai_message(
        &mut self,
        role: MessageRole,
        content: &str,
        code: Option<String>,
        suggestions: Option<Vec<String>>,
    ) -> AiMessage {
        let message = AiMessage {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.to_string(),
            code,
            suggestions,
            timestamp: Utc::now(),
        };
        self.ai_messages.push(message.clone());
        message
    }

    /// Empty the transcript. Queries and data sources are untouched.
    pub fn clear_ai_messages(&mut self) {
        self.ai_messages.clear();
    }

    // ---- view toggles and ephemera ----

    pub fn toggle_sidebar(&mut self) {
        self.sidebar_open = !self.sidebar_open;
    }

    pub fn toggle_ai_panel(&mut self) {
        self.ai_panel_open = !self.ai_panel_open;
    }

    pub fn set_ai_scroll_position(&mut self, px: f64) {
        self.ai_scroll_position = px;
    }

    pub fn set_active_artifact(&mut self, artifact: Option<Artifact>, code: Option<String>) {
        self.active_artifact = artifact.map(|artifact| ActiveArtifact { artifact, code });
    }

    // ---- snapshot ----

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            data_sources: self.data_sources.clone(),
            queries: self.queries.clone(),
            ai_messages: self.ai_messages.clone(),
            is_connected: self.is_connected,
            ai_scroll_position: self.ai_scroll_position,
        }
    }

    /// Replace the persisted subset with a restored snapshot and reset every
    /// ephemeral field, whatever the snapshot contained.
    pub fn restore(&mut self, snapshot: Snapshot) {
        self.data_sources = snapshot.data_sources;
        self.queries = snapshot.queries;
        self.ai_messages = snapshot.ai_messages;
        self.is_connected = snapshot.is_connected;
        self.ai_scroll_position = snapshot.ai_scroll_position;
        self.active_query_id = None;
        self.sidebar_open = true;
        self.ai_panel_open = true;
        self.active_artifact = None;
    }
}

/// Demo content shown before the user has run anything of their own.
fn demo_queries() -> Vec<Query> {
    let now = Utc::now();
    vec![
        Query {
            id: Uuid::new_v4().to_string(),
            number: 1,
            prompt: "Show monthly revenue for the last 12 months".to_string(),
            code: "import pandas as pd\n\ndf = spark.table(\"sales.orders\").toPandas()\nmonthly = df.groupby(df.order_date.dt.to_period(\"M\")).revenue.sum()\nprint(monthly.tail(12))"
                .to_string(),
            output: String::new(),
            artifacts: vec![Artifact {
                kind: ArtifactKind::Chart,
                payload: json!({
                    "type": "line",
                    "x": "month",
                    "y": "revenue",
                    "series": [12.4, 13.1, 12.9, 14.2, 15.0, 14.7, 15.8, 16.3, 15.9, 17.1, 17.8, 18.2],
                }),
                title: Some("Monthly revenue".to_string()),
            }],
            created_at: now,
            updated_at: now,
        },
        Query {
            id: Uuid::new_v4().to_string(),
            number: 2,
            prompt: "Top 10 customers by lifetime value".to_string(),
            code: "ltv = df.groupby(\"customer_id\").revenue.sum().nlargest(10)\nprint(ltv)".to_string(),
            output: String::new(),
            artifacts: vec![
                Artifact {
                    kind: ArtifactKind::Table,
                    payload: json!({
                        "columns": ["customer_id", "lifetime_value"],
                        "rows": [["C-1042", 91200], ["C-0881", 87350], ["C-1311", 80125]],
                    }),
                    title: Some("Top customers".to_string()),
                },
                Artifact {
                    kind: ArtifactKind::Kpi,
                    payload: json!({ "label": "Median LTV", "value": 41780, "unit": "USD" }),
                    title: None,
                },
            ],
            created_at: now,
            updated_at: now,
        },
    ]
}

type Listener = Box<dyn Fn(&AppState) + Send>;

/// The persisted store handed to controllers and views.
pub struct AppStore {
    state: AppState,
    namespace: String,
    snapshots: Box<dyn SnapshotStore>,
    listeners: Vec<Listener>,
}

impl AppStore {
    /// Open the store: restore the persisted snapshot over the defaults.
    ///
    /// A missing or unreadable snapshot falls back to the defaults — startup
    /// never fails because of persisted state.
    pub async fn open(snapshots: Box<dyn SnapshotStore>, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let mut state = AppState::default();
        match snapshots.load(&namespace).await {
            Ok(Some(snapshot)) => state.restore(snapshot),
            Ok(None) => {}
            Err(err) => {
                tracing::warn!("failed to restore persisted state, using defaults: {err:#}");
            }
        }
        Self {
            state,
            namespace,
            snapshots,
            listeners: vec![],
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Register a change listener, called after every mutation.
    pub fn subscribe(&mut self, listener: impl Fn(&AppState) + Send + 'static) {
        self.listeners.push(Box::new(listener));
    }

    async fn after_mutation(&mut self) {
        for listener in &self.listeners {
            listener(&self.state);
        }
        if let Err(err) = self
            .snapshots
            .save(&self.namespace, &self.state.snapshot())
            .await
        {
            tracing::warn!("failed to persist state snapshot: {err:#}");
        }
    }

    pub async fn add_data_source(&mut self, name: &str, kind: DataSourceKind) -> DataSource {
        let source = self.state.add_data_source(name, kind);
        self.after_mutation().await;
        source
    }

    pub async fn remove_data_source(&mut self, id: &str) {
        self.state.remove_data_source(id);
        self.after_mutation().await;
    }

    pub async fn set_data_source_error(&mut self, id: &str) {
        self.state.set_data_source_error(id);
        self.after_mutation().await;
    }

    pub async fn add_query(&mut self, prompt: &str, code: &str) -> Query {
        let query = self.state.add_query(prompt, code);
        self.after_mutation().await;
        query
    }

    pub async fn update_query(&mut self, id: &str, patch: QueryPatch) {
        self.state.update_query(id, patch);
        self.after_mutation().await;
    }

    pub async fn remove_query(&mut self, id: &str) {
        self.state.remove_query(id);
        self.after_mutation().await;
    }

    pub async fn set_active_query(&mut self, id: Option<&str>) {
        self.state.set_active_query(id);
        self.after_mutation().await;
    }

    pub async fn add_ai_message(
        &mut self,
        role: MessageRole,
        content: &str,
        code: Option<String>,
        suggestions: Option<Vec<String>>,
    ) -> AiMessage {
        let message = self.state.add_ai_message(role, content, code, suggestions);
        self.after_mutation().await;
        message
    }

    pub async fn clear_ai_messages(&mut self) {
        self.state.clear_ai_messages();
        self.after_mutation().await;
    }

    pub async fn toggle_sidebar(&mut self) {
        self.state.toggle_sidebar();
        self.after_mutation().await;
    }

    pub async fn toggle_ai_panel(&mut self) {
        self.state.toggle_ai_panel();
        self.after_mutation().await;
    }

    pub async fn set_ai_scroll_position(&mut self, px: f64) {
        self.state.set_ai_scroll_position(px);
        self.after_mutation().await;
    }

    pub async fn set_active_artifact(&mut self, artifact: Option<Artifact>, code: Option<String>) {
        self.state.set_active_artifact(artifact, code);
        self.after_mutation().await;
    }

    /// Drop the persisted snapshot and reset to defaults.
    pub async fn reset(&mut self) -> Result<()> {
        self.snapshots.clear(&self.namespace).await?;
        self.state = AppState::default();
        for listener in &self.listeners {
            listener(&self.state);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persist::MemorySnapshotStore;

    fn bare_state() -> AppState {
        AppState {
            queries: vec![],
            ..AppState::default()
        }
    }

    #[test]
    fn query_numbers_run_one_to_n() {
        let mut state = bare_state();
        for i in 1..=5u32 {
            let q = state.add_query(&format!("prompt {i}"), "code");
            assert_eq!(q.number, i);
        }
    }

    #[test]
    fn query_numbers_keep_gaps_after_deletion() {
        let mut state = bare_state();
        let q1 = state.add_query("one", "");
        let _q2 = state.add_query("two", "");
        state.remove_query(&q1.id);
        let q3 = state.add_query("three", "");
        // two held queries before the add, so the new label repeats "3" only
        // by count, never by renumbering the survivors
        assert_eq!(q3.number, 2);
        assert!(state.queries.iter().any(|q| q.number == 2 && q.id != q3.id));
    }

    #[test]
    fn removing_active_query_clears_active() {
        let mut state = bare_state();
        let q1 = state.add_query("one", "");
        let q2 = state.add_query("two", "");
        assert_eq!(state.active_query_id.as_deref(), Some(q2.id.as_str()));

        // removing a non-active query leaves the active id alone
        state.remove_query(&q1.id);
        assert_eq!(state.active_query_id.as_deref(), Some(q2.id.as_str()));

        state.remove_query(&q2.id);
        assert_eq!(state.active_query_id, None);
    }

    #[test]
    fn set_active_query_ignores_unknown_ids() {
        let mut state = bare_state();
        let q = state.add_query("one", "");
        state.set_active_query(Some("not-a-query"));
        assert_eq!(state.active_query_id.as_deref(), Some(q.id.as_str()));
        state.set_active_query(None);
        assert_eq!(state.active_query_id, None);
    }

    #[test]
    fn data_source_flag_tracks_remaining_sources() {
        let mut state = bare_state();
        assert!(!state.is_connected);
        let a = state.add_data_source("orders.csv", DataSourceKind::TabularFile);
        let b = state.add_data_source("model.json", DataSourceKind::StructuredFile);
        assert!(state.is_connected);
        state.remove_data_source(&a.id);
        assert!(state.is_connected);
        state.remove_data_source(&b.id);
        assert!(!state.is_connected);
    }

    #[test]
    fn data_source_error_transition_is_one_way() {
        let mut state = bare_state();
        let s = state.add_data_source("broken.csv", DataSourceKind::TabularFile);
        state.set_data_source_error(&s.id);
        assert_eq!(state.data_sources[0].status, DataSourceStatus::Error);
        // a second error call is a no-op, and there is no way back
        state.set_data_source_error(&s.id);
        assert_eq!(state.data_sources[0].status, DataSourceStatus::Error);
    }

    #[test]
    fn update_query_merges_and_refreshes_timestamp() {
        let mut state = bare_state();
        let q = state.add_query("prompt", "code");
        let before = state.queries[0].updated_at;
        state.update_query(
            &q.id,
            QueryPatch {
                output: Some("42 rows".to_string()),
                ..QueryPatch::default()
            },
        );
        let updated = &state.queries[0];
        assert_eq!(updated.output, "42 rows");
        assert_eq!(updated.prompt, "prompt");
        assert_eq!(updated.code, "code");
        assert!(updated.updated_at >= before);

        // unknown id: no-op
        state.update_query("missing", QueryPatch::default());
    }

    #[test]
    fn clear_transcript_leaves_other_entities() {
        let mut state = bare_state();
        state.add_data_source("a.csv", DataSourceKind::TabularFile);
        state.add_query("q", "c");
        state.add_ai_message(MessageRole::User, "hello", None, None);
        state.clear_ai_messages();
        assert!(state.ai_messages.is_empty());
        assert_eq!(state.data_sources.len(), 1);
        assert_eq!(state.queries.len(), 1);
    }

    #[test]
    fn restore_resets_ephemeral_fields() {
        let mut state = bare_state();
        let q = state.add_query("q", "c");
        state.toggle_sidebar();
        state.set_active_artifact(
            Some(Artifact {
                kind: ArtifactKind::Kpi,
                payload: json!({}),
                title: None,
            }),
            Some("code".to_string()),
        );
        let snapshot = state.snapshot();

        let mut fresh = AppState::default();
        fresh.restore(snapshot);
        assert_eq!(fresh.queries.len(), 1);
        assert_eq!(fresh.queries[0].id, q.id);
        assert_eq!(fresh.active_query_id, None);
        assert!(fresh.sidebar_open);
        assert!(fresh.active_artifact.is_none());
    }

    #[tokio::test]
    async fn store_notifies_listeners_on_mutation() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let mut store =
            AppStore::open(Box::new(MemorySnapshotStore::default()), "test-ns").await;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        store.subscribe(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });

        store
            .add_data_source("orders.csv", DataSourceKind::TabularFile)
            .await;
        store.toggle_ai_panel().await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn store_round_trips_through_memory_backend() {
        let backend = MemorySnapshotStore::default();
        let expected = {
            let mut store = AppStore::open(Box::new(backend.clone()), "ns").await;
            store
                .add_data_source("orders.csv", DataSourceKind::TabularFile)
                .await;
            store.add_query("prompt", "code").await;
            store
                .add_ai_message(MessageRole::User, "hi", None, None)
                .await;
            store.set_ai_scroll_position(640.0).await;
            store.state().snapshot()
        };

        let reopened = AppStore::open(Box::new(backend), "ns").await;
        assert_eq!(reopened.state().snapshot(), expected);
        assert_eq!(reopened.state().active_query_id, None);
    }
}
