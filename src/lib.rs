//! Document intake — WhatsApp document collection, extraction and record sync.

pub mod channels;
pub mod config;
pub mod documents;
pub mod error;
pub mod intake;
pub mod pipeline;
pub mod sync;
pub mod vision;
pub mod webhook;
