//! Whapi gateway — WhatsApp send, media download, webhook registration.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use super::MessagingGateway;
use crate::error::ChannelError;

/// Maximum length of one outgoing message, in characters.
const WHAPI_MAX_MESSAGE_LENGTH: usize = 4096;

const CHANNEL_NAME: &str = "whapi";

/// Upper bound on any single gateway request, body included.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for a Whapi-style WhatsApp gateway.
pub struct WhapiGateway {
    api_url: String,
    token: SecretString,
    client: reqwest::Client,
    timeout: Duration,
}

impl WhapiGateway {
    pub fn new(api_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.api_url)
    }

    fn send_failed(reason: impl ToString) -> ChannelError {
        ChannelError::SendFailed {
            name: CHANNEL_NAME.into(),
            reason: reason.to_string(),
        }
    }

    /// Point the gateway's message webhook at `bot_url`.
    pub async fn register_webhook(&self, bot_url: &str) -> Result<(), ChannelError> {
        let settings = json!({
            "webhooks": [{
                "url": bot_url,
                "events": [{"type": "messages", "method": "post"}],
                "mode": "method"
            }]
        });

        let resp = self
            .client
            .patch(self.api_url("settings"))
            .bearer_auth(self.token.expose_secret())
            .timeout(self.timeout)
            .json(&settings)
            .send()
            .await
            .map_err(|e| ChannelError::WebhookSetup(e.to_string()))?;

        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ChannelError::WebhookSetup(body));
        }

        tracing::info!(bot_url, "Webhook registered with gateway");
        Ok(())
    }

    async fn send_chunk(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        let resp = self
            .client
            .post(self.api_url("send"))
            .bearer_auth(self.token.expose_secret())
            .timeout(self.timeout)
            .json(&json!({ "chat_id": chat_id, "text": text }))
            .send()
            .await
            .map_err(Self::send_failed)?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(Self::send_failed(format!("send returned {status}: {body}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MessagingGateway for WhapiGateway {
    fn name(&self) -> &str {
        CHANNEL_NAME
    }

    /// Splits replies over the gateway limit.
    async fn send_text(&self, chat_id: &str, text: &str) -> Result<(), ChannelError> {
        for chunk in split_message(text, WHAPI_MAX_MESSAGE_LENGTH) {
            self.send_chunk(chat_id, &chunk).await?;
        }
        tracing::debug!(chat_id, "Reply sent");
        Ok(())
    }

    async fn fetch_media(&self, url: &str) -> Result<Vec<u8>, ChannelError> {
        let fetch_failed = |reason: String| ChannelError::MediaFetchFailed {
            url: url.to_string(),
            reason,
        };

        let resp = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| fetch_failed(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(fetch_failed(format!("status {}", resp.status())));
        }

        let bytes = resp.bytes().await.map_err(|e| fetch_failed(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Split text into chunks of at most `max_chars` characters, preferring a
/// newline, then a space, as the break point.
pub(crate) fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_chars {
        // Byte offset of the first character past the limit.
        let limit = remaining
            .char_indices()
            .nth(max_chars)
            .map_or(remaining.len(), |(idx, _)| idx);
        let window = &remaining[..limit];

        let split_at = window
            .rfind('\n')
            .or_else(|| window.rfind(' '))
            .filter(|&idx| idx > 0)
            .unwrap_or(limit);

        chunks.push(remaining[..split_at].to_string());
        remaining = remaining[split_at..].trim_start();
    }

    if !remaining.is_empty() || chunks.is_empty() {
        chunks.push(remaining.to_string());
    }
    chunks
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    /// Accepts connections and never answers.
    async fn silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut open = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                open.push(socket);
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn stalled_media_download_times_out() {
        let url = silent_server().await;
        let gw = WhapiGateway::new(&url, SecretString::from("t"))
            .with_timeout(Duration::from_millis(200));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            gw.fetch_media(&format!("{url}/media/1.jpg")),
        )
        .await
        .expect("fetch_media hung past its timeout");
        assert!(matches!(result, Err(ChannelError::MediaFetchFailed { .. })));
    }

    #[tokio::test]
    async fn stalled_send_times_out() {
        let url = silent_server().await;
        let gw = WhapiGateway::new(&url, SecretString::from("t"))
            .with_timeout(Duration::from_millis(200));

        let result = tokio::time::timeout(Duration::from_secs(5), gw.send_text("u1", "hi"))
            .await
            .expect("send_text hung past its timeout");
        assert!(matches!(result, Err(ChannelError::SendFailed { .. })));
    }

    #[test]
    fn api_url_trims_trailing_slash() {
        let gw = WhapiGateway::new("https://gate.whapi.cloud/", SecretString::from("t"));
        assert_eq!(gw.api_url("send"), "https://gate.whapi.cloud/send");
        assert_eq!(gw.name(), "whapi");
    }

    #[test]
    fn split_message_short() {
        assert_eq!(split_message("Hello", 4096), vec!["Hello"]);
        assert_eq!(split_message("", 4096), vec![""]);
    }

    #[test]
    fn split_message_exact_limit() {
        let msg = "a".repeat(4096);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn split_message_on_newline() {
        let msg = format!("{}\n{}", "a".repeat(2000), "b".repeat(3000));
        assert_eq!(split_message(&msg, 4096), vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_on_space() {
        let msg = format!("{} {}", "a".repeat(2000), "b".repeat(3000));
        assert_eq!(split_message(&msg, 4096), vec!["a".repeat(2000), "b".repeat(3000)]);
    }

    #[test]
    fn split_message_hard_break() {
        let chunks = split_message(&"a".repeat(5000), 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 4096);
        assert_eq!(chunks[1].len(), 904);
    }

    #[test]
    fn split_message_respects_multibyte_characters() {
        let msg = "✅".repeat(5000);
        let chunks = split_message(&msg, 4096);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chars().count(), 4096);
        assert_eq!(chunks[1].chars().count(), 904);
    }
}
