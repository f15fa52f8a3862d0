//! Messaging gateway abstraction for replies and media downloads.

pub mod whapi;

pub use whapi::WhapiGateway;

use async_trait::async_trait;

use crate::error::ChannelError;

/// Outbound side of a messaging channel.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    /// Gateway name (for logging).
    fn name(&self) -> &str;

    /// Send a text reply to a chat.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), ChannelError>;

    /// Download media referenced by an inbound message.
    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, ChannelError>;
}
