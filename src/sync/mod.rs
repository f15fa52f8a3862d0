//! Delivery of normalized records to the external record system.

pub mod client;
pub mod columns;
pub mod retry;

pub use client::{
    AttemptOutcome, HttpTransport, RecordSyncClient, SyncAttempt, SyncReceipt, SyncTransport,
    TransportResponse,
};
pub use columns::ColumnMap;
pub use retry::RetryPolicy;
