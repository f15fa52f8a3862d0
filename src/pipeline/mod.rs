//! Inbound message pipeline.
//!
//! Every message from the webhook goes through
//! [`IntakeProcessor::process`](processor::IntakeProcessor::process):
//! media fetch → vision model → classifier → intake transition → record
//! sync → reply.

pub mod processor;
pub mod replies;
pub mod types;

pub use processor::IntakeProcessor;
pub use types::{InboundMessage, MessageBody, OutcomeKind, ProcessOutcome, SyncStatus};
