//! Configuration types, read from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::error::ConfigError;
use crate::intake::ExpiryPolicy;
use crate::sync::ColumnMap;

const DEFAULT_PORT: u16 = 80;
const DEFAULT_VISION_URL: &str = "http://127.0.0.1:8000";
const DEFAULT_VISION_MODEL: &str = "HuggingFaceTB/SmolVLM-Instruct";
const DEFAULT_MONDAY_URL: &str = "https://api.monday.com/v2";

/// Messaging gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_url: String,
    pub token: SecretString,
    /// Public webhook URL registered at startup, if set.
    pub bot_url: Option<String>,
    /// Per-request limit for replies and media downloads.
    pub timeout: Duration,
}

/// Vision model settings.
#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub base_url: String,
    pub model: String,
    pub infer_timeout: Duration,
    pub startup_attempts: u32,
}

/// Record sync settings. Absent when the token or board id is missing.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub api_url: String,
    pub token: SecretString,
    pub board_id: String,
    pub call_timeout: Duration,
    pub max_attempts: u32,
    pub columns: ColumnMap,
}

/// Everything the binary needs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub port: u16,
    pub gateway: GatewayConfig,
    pub vision: VisionConfig,
    pub sync: Option<SyncConfig>,
    /// When idle intakes are dropped from memory.
    pub expiry: ExpiryPolicy,
    /// Rolling log file directory, if set.
    pub log_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Build config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key → value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.into()));

        let gateway = GatewayConfig {
            api_url: require("API_URL")?,
            token: SecretString::from(require("TOKEN")?),
            bot_url: get("BOT_URL"),
            timeout: Duration::from_secs(parse_or(&get, "GATEWAY_TIMEOUT_SECS", 30)?),
        };

        let vision = VisionConfig {
            base_url: get("VISION_MODEL_URL").unwrap_or_else(|| DEFAULT_VISION_URL.into()),
            model: get("VISION_MODEL_NAME").unwrap_or_else(|| DEFAULT_VISION_MODEL.into()),
            infer_timeout: Duration::from_secs(parse_or(&get, "VISION_TIMEOUT_SECS", 60)?),
            startup_attempts: parse_or(&get, "VISION_STARTUP_ATTEMPTS", 3)?,
        };

        let sync = match (get("MONDAY_API_TOKEN"), get("POLICY_BOARD_ID")) {
            (Some(token), Some(board_id)) => Some(SyncConfig {
                api_url: get("MONDAY_API_URL").unwrap_or_else(|| DEFAULT_MONDAY_URL.into()),
                token: SecretString::from(token),
                board_id,
                call_timeout: Duration::from_secs(parse_or(&get, "MONDAY_TIMEOUT_SECS", 30)?),
                max_attempts: parse_or(&get, "MONDAY_MAX_ATTEMPTS", 3)?,
                columns: ColumnMap::from_lookup(&get),
            }),
            _ => {
                warn!("MONDAY_API_TOKEN or POLICY_BOARD_ID not set, record sync disabled");
                None
            }
        };

        let defaults = ExpiryPolicy::default();
        let expiry = ExpiryPolicy {
            idle_ttl: Duration::from_secs(parse_or(
                &get,
                "INTAKE_IDLE_TTL_SECS",
                defaults.idle_ttl.as_secs(),
            )?),
            complete_ttl: Duration::from_secs(parse_or(
                &get,
                "INTAKE_COMPLETE_TTL_SECS",
                defaults.complete_ttl.as_secs(),
            )?),
        };

        Ok(Self {
            port: parse_port(get("PORT").as_deref()),
            gateway,
            vision,
            sync,
            expiry,
            log_dir: get("LOG_DIR").map(PathBuf::from),
        })
    }
}

fn parse_or<T, F>(get: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.into(),
            message: format!("{raw:?}: {e}"),
        }),
    }
}

/// Port with any `# comment` stripped; invalid values fall back to 80.
fn parse_port(raw: Option<&str>) -> u16 {
    let Some(raw) = raw else {
        return DEFAULT_PORT;
    };
    let cleaned = raw.split('#').next().unwrap_or_default().trim();
    cleaned.parse().unwrap_or_else(|_| {
        warn!(value = cleaned, "Invalid PORT value, falling back to {DEFAULT_PORT}");
        DEFAULT_PORT
    })
}
