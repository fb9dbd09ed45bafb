//! Chat panel controller: the assistant transcript and its send flow.
//!
//! The panel owns ephemeral view state only — the typing indicator and the
//! transcript viewport geometry. The transcript itself lives in the store.
//!
//! Send flow: blank input is rejected before anything else happens; the user
//! message is appended optimistically; the reply is parsed into prose, code,
//! and suggestions before it is appended; a transport failure appends a
//! fixed assistant-style notice naming the backend location instead of
//! surfacing an error. The typing indicator clears on every path out.
//!
//! Scrolling preserves the reader's place: a new message pins the viewport to
//! the bottom only when it was already near the bottom, and the offset is
//! persisted so the panel reopens where the user left it.

use anyhow::{bail, Result};

use crate::chat_client::ChatClient;
use crate::config::ChatConfig;
use crate::models::{AiMessage, MessageRole, Query};
use crate::reply::parse_reply;
use crate::store::{AppState, AppStore};

/// How close to the bottom (px) still counts as "following the
/// conversation".
pub const NEAR_BOTTOM_THRESHOLD_PX: f64 = 120.0;

/// Nominal rendered height of one transcript message.
const ESTIMATED_MESSAGE_PX: f64 = 96.0;

/// Scroll geometry of the transcript: `offset` px of content are above the
/// top edge, `viewport_px` are visible, `content_px` exist in total.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub offset: f64,
    pub viewport_px: f64,
    pub content_px: f64,
}

impl Viewport {
    pub fn new(viewport_px: f64) -> Self {
        Self {
            offset: 0.0,
            viewport_px,
            content_px: 0.0,
        }
    }

    pub fn distance_from_bottom(&self) -> f64 {
        (self.content_px - self.viewport_px - self.offset).max(0.0)
    }

    pub fn near_bottom(&self) -> bool {
        self.distance_from_bottom() <= NEAR_BOTTOM_THRESHOLD_PX
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset = (self.content_px - self.viewport_px).max(0.0);
    }
}

/// What a send produced: the assistant message appended to the transcript,
/// and whether it is the transport-failure notice rather than a real reply.
#[derive(Debug, Clone)]
pub struct SendOutcome {
    pub message: AiMessage,
    pub failed: bool,
}

/// The chat panel controller.
pub struct ChatPanel {
    client: ChatClient,
    default_agent: String,
    typing: bool,
    viewport: Viewport,
}

impl ChatPanel {
    pub fn new(client: ChatClient, config: &ChatConfig) -> Self {
        Self {
            client,
            default_agent: config.default_agent.clone(),
            typing: false,
            viewport: Viewport::new(480.0),
        }
    }

    pub fn client(&self) -> &ChatClient {
        &self.client
    }

    pub fn is_typing(&self) -> bool {
        self.typing
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Restore viewport geometry from persisted state on remount.
    pub fn restore_viewport(&mut self, state: &AppState) {
        self.viewport.content_px = state.ai_messages.len() as f64 * ESTIMATED_MESSAGE_PX;
        self.viewport.offset = state
            .ai_scroll_position
            .clamp(0.0, (self.viewport.content_px - self.viewport.viewport_px).max(0.0));
    }

    /// The user scrolled the transcript; remember where.
    pub async fn record_scroll(&mut self, store: &mut AppStore, offset: f64) {
        let max = (self.viewport.content_px - self.viewport.viewport_px).max(0.0);
        self.viewport.offset = offset.clamp(0.0, max);
        store.set_ai_scroll_position(self.viewport.offset).await;
    }

    /// Send one message through the chat backend and append both sides of
    /// the turn to the transcript.
    pub async fn send(
        &mut self,
        store: &mut AppStore,
        text: &str,
        agent: Option<&str>,
    ) -> Result<SendOutcome> {
        let text = text.trim();
        if text.is_empty() {
            bail!("Message is empty");
        }
        let agent = agent.unwrap_or(&self.default_agent).to_string();

        store
            .add_ai_message(MessageRole::User, text, None, None)
            .await;
        self.note_message_appended(store).await;

        self.typing = true;
        let outcome = match self.client.send_message(text, &agent).await {
            Ok(reply) => {
                let parsed = parse_reply(&reply.response);
                let message = store
                    .add_ai_message(
                        MessageRole::Assistant,
                        &parsed.content,
                        parsed.code,
                        parsed.suggestions,
                    )
                    .await;
                SendOutcome {
                    message,
                    failed: false,
                }
            }
            Err(err) => {
                tracing::warn!("chat send failed: {err:#}");
                let message = store
                    .add_ai_message(MessageRole::Assistant, &self.failure_notice(), None, None)
                    .await;
                SendOutcome {
                    message,
                    failed: true,
                }
            }
        };
        self.typing = false;
        self.note_message_appended(store).await;

        Ok(outcome)
    }

    /// Clear the local transcript; backend history cleanup is best-effort.
    pub async fn clear_transcript(&mut self, store: &mut AppStore) {
        store.clear_ai_messages().await;
        self.viewport.content_px = 0.0;
        self.viewport.offset = 0.0;
        store.set_ai_scroll_position(0.0).await;
        if let Err(err) = self.client.clear_history().await {
            tracing::debug!("backend history clear failed: {err:#}");
        }
    }

    /// Hand a message's extracted code to the sandbox: creates a new active
    /// query seeded with the originating prompt and the code.
    pub async fn send_to_sandbox(
        &self,
        store: &mut AppStore,
        prompt: &str,
        code: &str,
    ) -> Query {
        store.add_query(prompt, code).await
    }

    fn failure_notice(&self) -> String {
        format!(
            "I couldn't reach the assistant backend at {}. Make sure the API server is running and try again.",
            self.client.backend().base_url()
        )
    }

    async fn note_message_appended(&mut self, store: &mut AppStore) {
        let was_near_bottom = self.viewport.near_bottom();
        self.viewport.content_px += ESTIMATED_MESSAGE_PX;
        if was_near_bottom {
            self.viewport.scroll_to_bottom();
            store.set_ai_scroll_position(self.viewport.offset).await;
        }
    }
}
