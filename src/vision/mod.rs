//! Vision-to-text model integration.
//!
//! The model is an injected [`VisionModel`]; [`ModelHandle`] owns its
//! lifecycle: availability check and load at startup (bounded retries),
//! a hard timeout around every inference, and teardown on shutdown.

pub mod http;

pub use http::HttpVisionModel;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::ModelError;

/// Instruction sent with every image.
pub const EXTRACTION_PROMPT: &str = "Read this document photo and list every field \
printed on it, one per line, as `Label: value`. Start with the document title. \
Write `Not found` for fields you cannot read.";

/// A model that turns an image into text.
#[async_trait]
pub trait VisionModel: Send + Sync {
    /// Model identifier (used in logs and errors).
    fn model_name(&self) -> &str;

    /// Check that the backend is reachable.
    async fn health_check(&self) -> Result<(), ModelError>;

    /// Make the model ready for inference.
    async fn load(&self) -> Result<(), ModelError>;

    /// Extract text from an image. Empty text is a valid answer.
    async fn infer(&self, image: &[u8]) -> Result<String, ModelError>;

    /// Release the model.
    async fn shutdown(&self) -> Result<(), ModelError>;
}

/// Startup and inference limits.
#[derive(Debug, Clone)]
pub struct ModelOptions {
    pub startup_attempts: u32,
    pub startup_retry_delay: Duration,
    pub infer_timeout: Duration,
}

impl Default for ModelOptions {
    fn default() -> Self {
        Self {
            startup_attempts: 3,
            startup_retry_delay: Duration::from_secs(2),
            infer_timeout: Duration::from_secs(60),
        }
    }
}

/// A started model, shared by every request.
#[derive(Clone)]
pub struct ModelHandle {
    model: Arc<dyn VisionModel>,
    infer_timeout: Duration,
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("model", &self.model.model_name())
            .field("infer_timeout", &self.infer_timeout)
            .finish()
    }
}

impl ModelHandle {
    /// Health-check then load, retrying up to `startup_attempts` times.
    pub async fn start(
        model: Arc<dyn VisionModel>,
        options: ModelOptions,
    ) -> Result<Self, ModelError> {
        let attempts = options.startup_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let ready = match model.health_check().await {
                Ok(()) => model.load().await,
                Err(e) => Err(e),
            };

            match ready {
                Ok(()) => {
                    info!(model = model.model_name(), attempt, "Vision model ready");
                    return Ok(Self {
                        model,
                        infer_timeout: options.infer_timeout,
                    });
                }
                Err(e) => {
                    warn!(model = model.model_name(), attempt, error = %e, "Vision model not ready");
                    last_error = e.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(options.startup_retry_delay).await;
                    }
                }
            }
        }

        Err(ModelError::StartupFailed {
            model: model.model_name().to_string(),
            attempts,
            reason: last_error,
        })
    }

    pub fn model_name(&self) -> &str {
        self.model.model_name()
    }

    /// Run inference with the configured timeout. No retry.
    pub async fn infer(&self, image: &[u8]) -> Result<String, ModelError> {
        match tokio::time::timeout(self.infer_timeout, self.model.infer(image)).await {
            Ok(result) => result,
            Err(_) => Err(ModelError::Timeout {
                model: self.model.model_name().to_string(),
                timeout: self.infer_timeout,
            }),
        }
    }

    pub async fn shutdown(self) -> Result<(), ModelError> {
        info!(model = self.model.model_name(), "Shutting down vision model");
        self.model.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    /// Fails health checks until `ready_after` calls have been made.
    struct FlakyModel {
        ready_after: u32,
        health_calls: AtomicU32,
        loads: AtomicU32,
        shutdowns: AtomicU32,
        infer_delay: Duration,
    }

    impl FlakyModel {
        fn new(ready_after: u32) -> Arc<Self> {
            Arc::new(Self {
                ready_after,
                health_calls: AtomicU32::new(0),
                loads: AtomicU32::new(0),
                shutdowns: AtomicU32::new(0),
                infer_delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl VisionModel for FlakyModel {
        fn model_name(&self) -> &str {
            "flaky"
        }

        async fn health_check(&self) -> Result<(), ModelError> {
            let call = self.health_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call < self.ready_after {
                return Err(ModelError::Unavailable {
                    model: "flaky".into(),
                    reason: "warming up".into(),
                });
            }
            Ok(())
        }

        async fn load(&self) -> Result<(), ModelError> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn infer(&self, _image: &[u8]) -> Result<String, ModelError> {
            tokio::time::sleep(self.infer_delay).await;
            Ok("Identity Card".into())
        }

        async fn shutdown(&self) -> Result<(), ModelError> {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn fast_options() -> ModelOptions {
        ModelOptions {
            startup_attempts: 3,
            startup_retry_delay: Duration::from_millis(1),
            infer_timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn start_retries_until_healthy() {
        let model = FlakyModel::new(3);
        let handle = ModelHandle::start(model.clone(), fast_options()).await.unwrap();
        assert_eq!(model.health_calls.load(Ordering::SeqCst), 3);
        assert_eq!(model.loads.load(Ordering::SeqCst), 1);

        handle.shutdown().await.unwrap();
        assert_eq!(model.shutdowns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_gives_up_after_bounded_attempts() {
        let model = FlakyModel::new(10);
        let err = ModelHandle::start(model.clone(), fast_options()).await.unwrap_err();
        assert!(matches!(err, ModelError::StartupFailed { attempts: 3, .. }));
        assert!(err.to_string().contains("warming up"));
        assert_eq!(model.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_inference_times_out() {
        let model = Arc::new(FlakyModel {
            infer_delay: Duration::from_secs(5),
            ..Arc::into_inner(FlakyModel::new(1)).unwrap()
        });
        let handle = ModelHandle::start(model, fast_options()).await.unwrap();
        let err = handle.infer(b"image").await.unwrap_err();
        assert!(matches!(err, ModelError::Timeout { .. }));
    }

    #[tokio::test]
    async fn inference_within_timeout_returns_text() {
        let handle = ModelHandle::start(FlakyModel::new(1), fast_options()).await.unwrap();
        assert_eq!(handle.infer(b"image").await.unwrap(), "Identity Card");
        assert_eq!(handle.model_name(), "flaky");
    }
}
