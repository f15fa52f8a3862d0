//! Record sync client — delivers normalized records as board items.
//!
//! `create_item` is not idempotent: a retry after a transport failure of
//! unknown outcome may create a duplicate item.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};

use super::columns::{ColumnMap, item_name};
use super::retry::RetryPolicy;
use crate::documents::NormalizedRecord;
use crate::error::SyncError;

const API_VERSION: &str = "2024-01";

const CREATE_ITEM_MUTATION: &str = "mutation createItem ($boardId: ID!, $itemName: String!, $columnValues: JSON!) { create_item (board_id: $boardId, item_name: $itemName, column_values: $columnValues) { id } }";

/// Raw HTTP answer from the record system.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub retry_after: Option<Duration>,
    pub body: String,
}

impl TransportResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            retry_after: None,
            body: body.into(),
        }
    }

    pub fn with_retry_after(mut self, wait: Duration) -> Self {
        self.retry_after = Some(wait);
        self
    }
}

/// Sends one GraphQL request. An `Err` means the request never produced a
/// response (connection refused, reset, TLS failure).
#[async_trait]
pub trait SyncTransport: Send + Sync {
    async fn post(&self, payload: &Value) -> anyhow::Result<TransportResponse>;
}

/// `reqwest` transport with bearer auth.
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    token: SecretString,
}

impl HttpTransport {
    pub fn new(api_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
            token,
        }
    }
}

#[async_trait]
impl SyncTransport for HttpTransport {
    async fn post(&self, payload: &Value) -> anyhow::Result<TransportResponse> {
        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(self.token.expose_secret())
            .header("API-Version", API_VERSION)
            .header(ACCEPT, "application/json")
            .json(payload)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = resp.text().await?;

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Successful delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReceipt {
    pub item_id: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
}

/// What one delivery try produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Created { item_id: String },
    RateLimited { retry_after: Option<Duration> },
    TransportFailed { reason: String },
    /// Terminal: retrying would not change the answer.
    Rejected(SyncError),
}

/// One delivery try, for logging.
#[derive(Debug, Clone)]
pub struct SyncAttempt {
    pub attempt: u32,
    pub outcome: AttemptOutcome,
}

/// Classify a record-system response.
pub fn interpret_response(resp: &TransportResponse) -> AttemptOutcome {
    match resp.status {
        200 => {}
        429 => {
            return AttemptOutcome::RateLimited {
                retry_after: resp.retry_after,
            };
        }
        401 => return AttemptOutcome::Rejected(SyncError::Unauthorized),
        400 => {
            return AttemptOutcome::Rejected(SyncError::BadRequest {
                body: resp.body.clone(),
            });
        }
        status => {
            return AttemptOutcome::Rejected(SyncError::UnexpectedStatus {
                status,
                body: resp.body.clone(),
            });
        }
    }

    let body: Value = match serde_json::from_str(&resp.body) {
        Ok(v) => v,
        Err(e) => {
            return AttemptOutcome::Rejected(SyncError::InvalidResponse {
                reason: format!("body is not JSON: {e}"),
            });
        }
    };

    if let Some(errors) = body.get("errors").and_then(Value::as_array) {
        let messages = errors
            .iter()
            .map(|e| {
                e.get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("Unknown error")
            })
            .collect::<Vec<_>>()
            .join(", ");
        return AttemptOutcome::Rejected(SyncError::Rejected { messages });
    }

    let item_id = body
        .pointer("/data/create_item/id")
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        });

    match item_id {
        Some(item_id) => AttemptOutcome::Created { item_id },
        None => AttemptOutcome::Rejected(SyncError::InvalidResponse {
            reason: "missing data.create_item.id".into(),
        }),
    }
}

/// Pushes normalized records to one board.
pub struct RecordSyncClient {
    transport: Arc<dyn SyncTransport>,
    board_id: String,
    columns: ColumnMap,
    policy: RetryPolicy,
    call_timeout: Duration,
}

impl RecordSyncClient {
    pub fn new(transport: Arc<dyn SyncTransport>, board_id: impl Into<String>) -> Self {
        Self {
            transport,
            board_id: board_id.into(),
            columns: ColumnMap::default(),
            policy: RetryPolicy::default(),
            call_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = columns;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// GraphQL request body for a record. `columnValues` is a JSON string.
    pub fn build_payload(&self, record: &NormalizedRecord) -> Value {
        let column_values: serde_json::Map<String, Value> = self
            .columns
            .column_values(record)
            .into_iter()
            .map(|(column, value)| (column, Value::String(value)))
            .collect();

        json!({
            "query": CREATE_ITEM_MUTATION,
            "variables": {
                "boardId": self.board_id,
                "itemName": item_name(record),
                "columnValues": Value::Object(column_values).to_string(),
            }
        })
    }

    /// Deliver a record, retrying rate limits and transport failures.
    pub async fn sync_record(&self, record: &NormalizedRecord) -> Result<SyncReceipt, SyncError> {
        let payload = self.build_payload(record);
        let document_type = record.document_type();
        debug!(%document_type, payload = %payload, "Syncing record");

        let mut last_reason = String::new();
        for attempt in 1..=self.policy.max_attempts {
            let current = SyncAttempt {
                attempt,
                outcome: self.attempt_once(&payload).await,
            };
            debug!(?current, "Sync attempt finished");

            let wait = match current.outcome {
                AttemptOutcome::Created { item_id } => {
                    info!(%document_type, %item_id, attempt, "Record synced");
                    return Ok(SyncReceipt {
                        item_id,
                        attempts: attempt,
                    });
                }
                AttemptOutcome::Rejected(e) => {
                    error!(%document_type, attempt, error = %e, "Record sync failed");
                    return Err(e);
                }
                AttemptOutcome::RateLimited { retry_after } => {
                    warn!(%document_type, attempt, status = 429, "Record system rate limited");
                    last_reason = "rate limited".into();
                    self.policy.rate_limit_delay(attempt, retry_after)
                }
                AttemptOutcome::TransportFailed { reason } => {
                    warn!(%document_type, attempt, %reason, "Record sync request failed");
                    last_reason = reason;
                    self.policy.delay_for(attempt)
                }
            };

            if self.policy.should_retry(attempt) {
                debug!(attempt, wait_ms = wait.as_millis() as u64, "Waiting before retry");
                tokio::time::sleep(wait).await;
            }
        }

        let err = SyncError::RetriesExhausted {
            attempts: self.policy.max_attempts,
            reason: last_reason,
        };
        error!(%document_type, error = %err, "Record sync gave up");
        Err(err)
    }

    async fn attempt_once(&self, payload: &Value) -> AttemptOutcome {
        match tokio::time::timeout(self.call_timeout, self.transport.post(payload)).await {
            Ok(Ok(resp)) => interpret_response(&resp),
            Ok(Err(e)) => AttemptOutcome::TransportFailed {
                reason: e.to_string(),
            },
            Err(_) => AttemptOutcome::TransportFailed {
                reason: format!("timed out after {}ms", self.call_timeout.as_millis()),
            },
        }
    }
}
