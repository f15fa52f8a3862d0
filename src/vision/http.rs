//! HTTP client for a vision inference server.
//!
//! Endpoints: `GET /health`, `POST /load {"model"}`, and `POST /infer` with a
//! multipart form (`image`, `prompt`, `model`) answered by `{"text"}`.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::debug;

use super::{EXTRACTION_PROMPT, VisionModel};
use crate::error::ModelError;

#[derive(Debug, Deserialize)]
struct InferResponse {
    #[serde(default)]
    text: String,
}

/// Talks to an inference server that hosts the model.
pub struct HttpVisionModel {
    client: reqwest::Client,
    base_url: String,
    model: String,
}

impl HttpVisionModel {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn unavailable(&self, reason: impl ToString) -> ModelError {
        ModelError::Unavailable {
            model: self.model.clone(),
            reason: reason.to_string(),
        }
    }

    fn request_failed(&self, reason: impl ToString) -> ModelError {
        ModelError::RequestFailed {
            model: self.model.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl VisionModel for HttpVisionModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<(), ModelError> {
        let resp = self
            .client
            .get(self.url("health"))
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !resp.status().is_success() {
            return Err(self.unavailable(format!("health check returned {}", resp.status())));
        }
        Ok(())
    }

    async fn load(&self) -> Result<(), ModelError> {
        let resp = self
            .client
            .post(self.url("load"))
            .json(&serde_json::json!({ "model": self.model }))
            .send()
            .await
            .map_err(|e| self.unavailable(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(self.unavailable(format!("load returned {status}: {body}")));
        }
        debug!(model = %self.model, "Model loaded on inference server");
        Ok(())
    }

    async fn infer(&self, image: &[u8]) -> Result<String, ModelError> {
        let form = Form::new()
            .part("image", Part::bytes(image.to_vec()).file_name("document.jpg"))
            .text("prompt", EXTRACTION_PROMPT)
            .text("model", self.model.clone());

        let resp = self
            .client
            .post(self.url("infer"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| self.request_failed(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(self.request_failed(format!("infer returned {status}: {body}")));
        }

        let parsed: InferResponse = resp.json().await.map_err(|e| ModelError::InvalidResponse {
            model: self.model.clone(),
            reason: e.to_string(),
        })?;
        debug!(model = %self.model, chars = parsed.text.len(), "Inference finished");
        Ok(parsed.text)
    }

    /// The server owns the weights; there is nothing to release client-side.
    async fn shutdown(&self) -> Result<(), ModelError> {
        debug!(model = %self.model, "Vision client closed");
        Ok(())
    }
}
