//! Client for the chat/completions backend.
//!
//! The chat client is the only stateful client: it remembers the session
//! identifier returned by the first send so subsequent turns land in the
//! same conversation. One session is tracked at a time.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backend::{ensure_success, Backend};

/// Response of `POST /chat/send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatReply {
    pub session_id: String,
    pub agent: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// One stored turn in `GET /chat/history/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
}

/// Response of `GET /chat/history/{id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatHistory {
    pub session_id: String,
    pub messages: Vec<HistoryMessage>,
    pub message_count: usize,
}

/// One backend agent persona from `GET /agents/list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInfo {
    pub name: String,
    pub description: String,
    pub capabilities: Vec<String>,
    pub status: String,
}

#[derive(Serialize)]
struct SendBody<'a> {
    message: &'a str,
    agent: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
}

/// Typed wrapper around the chat backend.
pub struct ChatClient {
    backend: Backend,
    session_id: Option<String>,
}

impl ChatClient {
    pub fn new(backend: Backend) -> Self {
        Self {
            backend,
            session_id: None,
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// Send one message to the named agent and remember the returned session
    /// id for conversation continuity. No retry; failures propagate.
    pub async fn send_message(&mut self, text: &str, agent: &str) -> Result<ChatReply> {
        let body = SendBody {
            message: text,
            agent,
            session_id: self.session_id.as_deref(),
        };
        let response = self
            .backend
            .http()
            .post(self.backend.url("chat/send"))
            .json(&body)
            .send()
            .await?;
        let reply: ChatReply = ensure_success(response).await?.json().await?;
        self.session_id = Some(reply.session_id.clone());
        Ok(reply)
    }

    /// Forget the tracked session; the next send starts a new conversation.
    pub fn reset_session(&mut self) {
        self.session_id = None;
    }

    /// Fetch the backend's transcript for the tracked session.
    pub async fn history(&self) -> Result<ChatHistory> {
        let Some(session_id) = self.session_id.as_deref() else {
            bail!("No active chat session");
        };
        let response = self
            .backend
            .http()
            .get(self.backend.url(&format!("chat/history/{session_id}")))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// Delete the backend's transcript for the tracked session (if any) and
    /// reset the local session id.
    pub async fn clear_history(&mut self) -> Result<()> {
        if let Some(session_id) = self.session_id.take() {
            let response = self
                .backend
                .http()
                .delete(self.backend.url(&format!("chat/history/{session_id}")))
                .send()
                .await?;
            ensure_success(response).await?;
        }
        Ok(())
    }

    /// `GET /agents/list` — the personas a message can be addressed to.
    pub async fn list_agents(&self) -> Result<Vec<AgentInfo>> {
        let response = self
            .backend
            .http()
            .get(self.backend.url("agents/list"))
            .send()
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}
