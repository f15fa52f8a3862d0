//! Shared types for the intake pipeline.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::documents::DocumentType;
use crate::error::SyncError;
use crate::intake::IntakeState;
use crate::sync::SyncReceipt;

// ── Inbound message ─────────────────────────────────────────────────

/// One message from the messaging channel, already decoded from the
/// webhook payload.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Channel-native message id, or a generated UUID.
    pub id: String,
    /// Chat the message came from; also the intake key.
    pub chat_id: String,
    pub body: MessageBody,
    pub received_at: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(chat_id: impl Into<String>, body: MessageBody) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chat_id: chat_id.into(),
            body,
            received_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    /// An image or document attachment to download.
    Media { url: String },
    /// Neither text nor media (stickers, reactions, ...).
    Empty,
}

// ── Commands ────────────────────────────────────────────────────────

/// Chat commands, matched case-insensitively on the whole message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Status,
    Reset,
}

impl Command {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_uppercase().as_str() {
            "HELP" => Some(Self::Help),
            "CHECK_STATUS" | "STATUS" => Some(Self::Status),
            "RESET" => Some(Self::Reset),
            _ => None,
        }
    }

    /// `(command, description)` pairs for the help reply.
    pub fn descriptions() -> &'static [(&'static str, &'static str)] {
        &[
            ("HELP", "Show this list of commands"),
            ("CHECK_STATUS", "See which documents you have uploaded"),
            ("RESET", "Discard your uploads and start over"),
        ]
    }
}

// ── Outcome ─────────────────────────────────────────────────────────

/// What happened to one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeKind {
    Welcome,
    Command,
    DocumentAccepted,
    ClassificationFailed,
    ModelFailed,
    MediaFailed,
    AlreadyComplete,
    UnknownMessage,
}

/// Delivery of the accepted record to the external system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncStatus {
    /// No record was produced.
    NotApplicable,
    /// Record sync is not configured.
    Disabled,
    Synced { item_id: String, attempts: u32 },
    Failed { error: String, retriable: bool },
}

impl From<Result<SyncReceipt, SyncError>> for SyncStatus {
    fn from(result: Result<SyncReceipt, SyncError>) -> Self {
        match result {
            Ok(receipt) => Self::Synced {
                item_id: receipt.item_id,
                attempts: receipt.attempts,
            },
            Err(e) => Self::Failed {
                retriable: e.is_retriable(),
                error: e.to_string(),
            },
        }
    }
}

/// Result of processing one inbound message, returned to the webhook caller.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub message_id: String,
    pub chat_id: String,
    pub kind: OutcomeKind,
    /// Intake state after the message.
    pub state: IntakeState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_type: Option<DocumentType>,
    pub sync: SyncStatus,
    pub reply: String,
    pub reply_sent: bool,
}
