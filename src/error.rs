//! Error types for the document intake service.

use std::time::Duration;

use crate::documents::DocumentType;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Raw model text that does not match a document type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("No text could be extracted from the image")]
    EmptyText,

    #[error("Invalid {document_type} format: {reason}")]
    NotRecognized {
        document_type: DocumentType,
        reason: String,
    },
}

/// Every registered document type rejected the text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassifyError {
    #[error("Could not identify document type: {}", join_failures(.failures))]
    Unidentified {
        failures: Vec<(DocumentType, ValidationError)>,
    },
}

fn join_failures(failures: &[(DocumentType, ValidationError)]) -> String {
    failures
        .iter()
        .map(|(_, e)| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Vision model errors.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model {model} is not available: {reason}")]
    Unavailable { model: String, reason: String },

    #[error("Model {model} request failed: {reason}")]
    RequestFailed { model: String, reason: String },

    #[error("Invalid response from model {model}: {reason}")]
    InvalidResponse { model: String, reason: String },

    #[error("Model {model} timed out after {timeout:?}")]
    Timeout { model: String, timeout: Duration },

    #[error("Model {model} failed to start after {attempts} attempts: {reason}")]
    StartupFailed {
        model: String,
        attempts: u32,
        reason: String,
    },
}

/// Record sync errors.
///
/// `RetriesExhausted` is the only retriable class; every other variant is
/// terminal and returned on the attempt that produced it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("Record sync gave up after {attempts} attempts: {reason}")]
    RetriesExhausted { attempts: u32, reason: String },

    #[error("Record system rejected the API token")]
    Unauthorized,

    #[error("Record system rejected the request: {body}")]
    BadRequest { body: String },

    #[error("Record system returned errors: {messages}")]
    Rejected { messages: String },

    #[error("Record system returned unexpected status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Invalid response from record system: {reason}")]
    InvalidResponse { reason: String },
}

impl SyncError {
    /// Whether the failure came from transient conditions (rate limit,
    /// transport) rather than a definitive rejection.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::RetriesExhausted { .. })
    }
}

/// Intake state errors. Callers turn these into informative no-ops.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    #[error("No intake exists for user {user_id}")]
    UnknownUser { user_id: String },

    #[error("Intake for user {user_id} is already complete")]
    AlreadyComplete { user_id: String },
}

/// Messaging gateway errors.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Failed to send message on channel {name}: {reason}")]
    SendFailed { name: String, reason: String },

    #[error("Failed to fetch media from {url}: {reason}")]
    MediaFetchFailed { url: String, reason: String },

    #[error("Webhook registration failed: {0}")]
    WebhookSetup(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unidentified_joins_every_reason() {
        let err = ClassifyError::Unidentified {
            failures: vec![
                (DocumentType::IdCard, ValidationError::EmptyText),
                (
                    DocumentType::LogCard,
                    ValidationError::NotRecognized {
                        document_type: DocumentType::LogCard,
                        reason: "missing marker".into(),
                    },
                ),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Could not identify document type: No text could be extracted from the image; \
             Invalid log card format: missing marker"
        );
    }

    #[test]
    fn only_exhausted_retries_are_retriable() {
        assert!(
            SyncError::RetriesExhausted {
                attempts: 3,
                reason: "rate limited".into()
            }
            .is_retriable()
        );
        assert!(!SyncError::Unauthorized.is_retriable());
        assert!(!SyncError::Rejected { messages: "bad column".into() }.is_retriable());
    }
}
