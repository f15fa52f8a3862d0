use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, Layer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use doc_intake::channels::WhapiGateway;
use doc_intake::config::AppConfig;
use doc_intake::intake::{IntakeStore, spawn_expiry_task};
use doc_intake::pipeline::IntakeProcessor;
use doc_intake::sync::{HttpTransport, RecordSyncClient, RetryPolicy};
use doc_intake::vision::{HttpVisionModel, ModelHandle, ModelOptions};
use doc_intake::webhook::{WebhookState, webhook_routes};

/// How often idle intakes are swept.
const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let log_dir = std::env::var("LOG_DIR").ok().filter(|d| !d.trim().is_empty());
    let _log_guard = init_tracing(log_dir.as_deref());

    let config = AppConfig::from_env().context("Invalid configuration")?;

    eprintln!("📄 Document intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://0.0.0.0:{}/webhook", config.port);
    eprintln!("   Vision model: {} at {}", config.vision.model, config.vision.base_url);
    eprintln!(
        "   Record sync: {}",
        if config.sync.is_some() { "enabled" } else { "disabled" }
    );

    // ── Vision model ────────────────────────────────────────────────
    let vision = Arc::new(HttpVisionModel::new(
        &config.vision.base_url,
        &config.vision.model,
    ));
    let model = ModelHandle::start(
        vision,
        ModelOptions {
            startup_attempts: config.vision.startup_attempts,
            infer_timeout: config.vision.infer_timeout,
            ..Default::default()
        },
    )
    .await
    .context("Vision model failed to start")?;

    // ── Messaging gateway ───────────────────────────────────────────
    let gateway = Arc::new(
        WhapiGateway::new(&config.gateway.api_url, config.gateway.token.clone())
            .with_timeout(config.gateway.timeout),
    );
    if let Some(bot_url) = &config.gateway.bot_url {
        if let Err(e) = gateway.register_webhook(bot_url).await {
            tracing::error!(error = %e, "Webhook registration failed, continuing");
        }
    }

    // ── Pipeline ────────────────────────────────────────────────────
    let store = IntakeStore::new();
    let expiry_task = spawn_expiry_task(Arc::clone(&store), config.expiry, EXPIRY_SWEEP_INTERVAL);
    let mut processor = IntakeProcessor::new(store, model.clone(), gateway);
    if let Some(sync) = &config.sync {
        let transport = Arc::new(HttpTransport::new(&sync.api_url, sync.token.clone()));
        let client = RecordSyncClient::new(transport, &sync.board_id)
            .with_columns(sync.columns.clone())
            .with_policy(RetryPolicy::default().with_max_attempts(sync.max_attempts))
            .with_call_timeout(sync.call_timeout);
        processor = processor.with_sync(Arc::new(client));
    }

    let app = webhook_routes(WebhookState {
        processor: Arc::new(processor),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Webhook server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutdown signal received");
        })
        .await
        .context("Server error")?;

    expiry_task.abort();
    model.shutdown().await?;
    Ok(())
}

/// Console logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file when `log_dir` is set. The guard must live until exit.
fn init_tracing(
    log_dir: Option<&str>,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "doc-intake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(filter());
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_filter(filter()),
        )
        .with(file_layer)
        .init();

    guard
}
