//! Webhook HTTP surface.
//!
//! `POST /webhook` accepts a Whapi payload, processes its messages
//! concurrently (per-user order is kept by the intake lock), and answers
//! with one outcome per message.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::{debug, info};

use crate::pipeline::{InboundMessage, IntakeProcessor, MessageBody};

/// Shared state for the webhook routes.
#[derive(Clone)]
pub struct WebhookState {
    pub processor: Arc<IntakeProcessor>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub messages: Vec<WhapiMessage>,
}

#[derive(Debug, Default, Deserialize)]
pub struct WhapiMessage {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub chat_id: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub image: Option<LinkContent>,
    #[serde(default)]
    pub document: Option<LinkContent>,
    #[serde(default)]
    pub media: Option<MediaContent>,
    #[serde(default)]
    pub media_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub body: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LinkContent {
    #[serde(default)]
    pub link: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MediaContent {
    #[serde(default)]
    pub url: Option<String>,
}

impl WhapiMessage {
    /// Decode into a pipeline message. `None` for echoes of our own replies
    /// and messages without a sender.
    pub fn into_inbound(self) -> Option<InboundMessage> {
        if self.from_me {
            return None;
        }
        let chat_id = self.chat_id.or(self.from).filter(|c| !c.is_empty())?;

        let media_url = self
            .image
            .and_then(|i| i.link)
            .or_else(|| self.document.and_then(|d| d.link))
            .or_else(|| self.media.and_then(|m| m.url))
            .or(self.media_url)
            .filter(|u| !u.is_empty());

        let body = match (media_url, self.text) {
            (Some(url), _) => MessageBody::Media { url },
            (None, Some(text)) if !text.body.trim().is_empty() => MessageBody::Text(text.body),
            _ => {
                debug!(chat_id = %chat_id, kind = ?self.kind, "Message carries no media or text");
                MessageBody::Empty
            }
        };

        let message = InboundMessage::new(chat_id, body);
        Some(match self.id {
            Some(id) => message.with_id(id),
            None => message,
        })
    }
}

/// GET /
async fn index() -> &'static str {
    "Document Processing Bot is running"
}

/// GET /health
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// GET /webhook
async fn webhook_probe() -> &'static str {
    "Webhook endpoint is active"
}

/// POST /webhook
async fn receive(
    State(state): State<WebhookState>,
    Json(payload): Json<WebhookPayload>,
) -> impl IntoResponse {
    if payload.messages.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "No messages in payload"})),
        )
            .into_response();
    }

    let received = payload.messages.len();
    let inbound: Vec<InboundMessage> = payload
        .messages
        .into_iter()
        .filter_map(WhapiMessage::into_inbound)
        .collect();
    let skipped = received - inbound.len();
    debug!(received, skipped, "Webhook payload decoded");

    let outcomes = futures::future::join_all(
        inbound
            .into_iter()
            .map(|message| state.processor.process(message)),
    )
    .await;

    info!(processed = outcomes.len(), skipped, "Webhook handled");
    Json(serde_json::json!({
        "processed": outcomes.len(),
        "skipped": skipped,
        "outcomes": outcomes,
    }))
    .into_response()
}

/// Build the bot's routes.
pub fn webhook_routes(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/webhook", get(webhook_probe).post(receive))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
