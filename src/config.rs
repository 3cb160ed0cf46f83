//! Configuration types for attachvault

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, path::PathBuf, time::Duration};
use utoipa::ToSchema;

/// Largest chunk the attachment host accepts (25 MiB)
pub const MAX_CHUNK_SIZE: usize = 25 * 1024 * 1024;

/// Hard limit on URLs per refresh request imposed by the host
pub const MAX_REFRESH_BATCH: usize = 40;

/// Upper bound for concurrent chunk uploads
pub const MAX_UPLOAD_CONCURRENCY: usize = 8;

/// Attachment host connection settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct HostConfig {
    /// Base URL of the host REST API (default: "https://discord.com/api/v9")
    #[serde(default = "default_api_base")]
    pub api_base: String,

    /// Bot token used for uploads (sent as `Bot <token>`)
    #[serde(default)]
    pub bot_token: Option<String>,

    /// User token used for the attachment refresh endpoint
    #[serde(default)]
    pub user_token: Option<String>,

    /// Channel that receives chunk messages
    #[serde(default)]
    pub channel_id: Option<String>,

    /// Timeout for a single chunk upload (default: 120 seconds)
    #[serde(default = "default_upload_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub upload_timeout: Duration,

    /// Timeout for a single refresh batch (default: 30 seconds)
    #[serde(default = "default_refresh_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub refresh_timeout: Duration,

    /// Timeout until a chunk fetch returns response headers (default: 30 seconds)
    #[serde(default = "default_fetch_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub fetch_timeout: Duration,

    /// Maximum silence between two body reads of a chunk (default: 60 seconds)
    #[serde(default = "default_fetch_idle_timeout", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub fetch_idle_timeout: Duration,

    /// User-Agent header sent to the host
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            bot_token: None,
            user_token: None,
            channel_id: None,
            upload_timeout: default_upload_timeout(),
            refresh_timeout: default_refresh_timeout(),
            fetch_timeout: default_fetch_timeout(),
            fetch_idle_timeout: default_fetch_idle_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// When chunk links are refreshed before a download
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Refresh on every download
    #[default]
    Always,
    /// Skip the refresh while every link's `ex=` expiry is further away than `margin`
    WhenExpiring {
        /// Safety margin before expiry, in seconds
        #[serde(with = "duration_serde")]
        #[schema(value_type = u64)]
        margin: Duration,
    },
}

/// Chunking and streaming behavior
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct TransferConfig {
    /// Maximum bytes per chunk (default: 25 MiB)
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: usize,

    /// Chunk uploads in flight at once (default: 4, max: 8)
    #[serde(default = "default_upload_concurrency")]
    pub upload_concurrency: usize,

    /// Size of the pieces a download stream yields (default: 8 KiB)
    #[serde(default = "default_download_buffer_size")]
    pub download_buffer_size: usize,

    /// Chunk connections opened ahead of the one being streamed (default: 1)
    #[serde(default = "default_download_prefetch")]
    pub download_prefetch: usize,

    /// URLs per refresh request (default: 40, never more than 40)
    #[serde(default = "default_refresh_batch_size")]
    pub refresh_batch_size: usize,

    /// Link refresh policy (default: always)
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_chunk_size: default_max_chunk_size(),
            upload_concurrency: default_upload_concurrency(),
            download_buffer_size: default_download_buffer_size(),
            download_prefetch: default_download_prefetch(),
            refresh_batch_size: default_refresh_batch_size(),
            refresh_policy: RefreshPolicy::default(),
        }
    }
}

/// Registry persistence settings
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct PersistenceConfig {
    /// Registry document path (default: "uploads.json")
    #[serde(default = "default_registry_path")]
    #[schema(value_type = String)]
    pub registry_path: PathBuf,

    /// Move an unparsable registry aside and start empty instead of failing (default: false)
    #[serde(default)]
    pub quarantine_corrupt: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            registry_path: default_registry_path(),
            quarantine_corrupt: false,
        }
    }
}

/// Retry configuration for idempotent host calls (refresh and chunk fetch)
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct RetryConfig {
    /// Maximum number of retry attempts (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 30 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    #[schema(value_type = u64)]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// REST API configuration
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct ApiConfig {
    /// Address to bind to (default: 127.0.0.1:6790)
    #[serde(default = "default_bind_address")]
    #[schema(value_type = String)]
    pub bind_address: SocketAddr,

    /// Optional API key for authentication
    #[serde(default)]
    pub api_key: Option<String>,

    /// Enable CORS for browser access (default: true)
    #[serde(default = "default_true")]
    pub cors_enabled: bool,

    /// Allowed CORS origins (default: ["*"])
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Enable Swagger UI at /swagger-ui (default: true)
    #[serde(default = "default_true")]
    pub swagger_ui: bool,

    /// Request body limit for uploads in bytes (None = unlimited)
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_key: None,
            cors_enabled: true,
            cors_origins: default_cors_origins(),
            swagger_ui: true,
            max_upload_bytes: None,
        }
    }
}

/// Main configuration for [`AttachmentVault`](crate::AttachmentVault)
#[derive(Clone, Debug, Default, Serialize, Deserialize, ToSchema)]
pub struct Config {
    /// Attachment host connection settings
    #[serde(default)]
    pub host: HostConfig,

    /// Chunking and streaming behavior
    #[serde(default)]
    pub transfer: TransferConfig,

    /// Registry persistence
    #[serde(default)]
    pub persistence: PersistenceConfig,

    /// Retry policy for refresh and fetch calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// REST API settings
    #[serde(default)]
    pub api: ApiConfig,
}

impl Config {
    /// Build a config from defaults overlaid with environment variables
    ///
    /// Reads `BOT_TOKEN`, `USER_TOKEN`, `UPLOAD_CHANNEL_ID`,
    /// `ATTACHVAULT_API_BASE`, `ATTACHVAULT_REGISTRY` and `ATTACHVAULT_BIND`.
    /// Loading a `.env` file beforehand is up to the caller.
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Ok(token) = std::env::var("BOT_TOKEN") {
            config.host.bot_token = Some(token);
        }
        if let Ok(token) = std::env::var("USER_TOKEN") {
            config.host.user_token = Some(token);
        }
        if let Ok(channel) = std::env::var("UPLOAD_CHANNEL_ID") {
            config.host.channel_id = Some(channel);
        }
        if let Ok(base) = std::env::var("ATTACHVAULT_API_BASE") {
            config.host.api_base = base;
        }
        if let Ok(path) = std::env::var("ATTACHVAULT_REGISTRY") {
            config.persistence.registry_path = PathBuf::from(path);
        }
        if let Ok(bind) = std::env::var("ATTACHVAULT_BIND") {
            config.api.bind_address = bind.parse().map_err(|e| Error::Config {
                message: format!("ATTACHVAULT_BIND is not a socket address: {e}"),
                key: Some("api.bind_address".into()),
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a config from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        let t = &self.transfer;

        if t.max_chunk_size == 0 || t.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(config_error(
                format!("max_chunk_size must be between 1 and {MAX_CHUNK_SIZE}"),
                "transfer.max_chunk_size",
            ));
        }
        if t.upload_concurrency == 0 || t.upload_concurrency > MAX_UPLOAD_CONCURRENCY {
            return Err(config_error(
                format!("upload_concurrency must be between 1 and {MAX_UPLOAD_CONCURRENCY}"),
                "transfer.upload_concurrency",
            ));
        }
        if t.download_buffer_size == 0 {
            return Err(config_error(
                "download_buffer_size must be positive",
                "transfer.download_buffer_size",
            ));
        }
        if t.download_prefetch == 0 {
            return Err(config_error(
                "download_prefetch must be at least 1",
                "transfer.download_prefetch",
            ));
        }
        if t.refresh_batch_size == 0 || t.refresh_batch_size > MAX_REFRESH_BATCH {
            return Err(config_error(
                format!("refresh_batch_size must be between 1 and {MAX_REFRESH_BATCH}"),
                "transfer.refresh_batch_size",
            ));
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(config_error(
                "backoff_multiplier must be at least 1.0",
                "retry.backoff_multiplier",
            ));
        }
        if url::Url::parse(&self.host.api_base).is_err() {
            return Err(config_error(
                format!("api_base {:?} is not a valid URL", self.host.api_base),
                "host.api_base",
            ));
        }

        Ok(())
    }
}

fn config_error(message: impl Into<String>, key: &str) -> Error {
    Error::Config {
        message: message.into(),
        key: Some(key.to_string()),
    }
}

fn default_api_base() -> String {
    "https://discord.com/api/v9".to_string()
}

fn default_user_agent() -> String {
    concat!("attachvault/", env!("CARGO_PKG_VERSION")).to_string()
}

fn default_upload_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_refresh_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_fetch_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_fetch_idle_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_max_chunk_size() -> usize {
    MAX_CHUNK_SIZE
}

fn default_upload_concurrency() -> usize {
    4
}

fn default_download_buffer_size() -> usize {
    8 * 1024
}

fn default_download_prefetch() -> usize {
    1
}

fn default_refresh_batch_size() -> usize {
    MAX_REFRESH_BATCH
}

fn default_registry_path() -> PathBuf {
    PathBuf::from("uploads.json")
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(30)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_bind_address() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 6790))
}

fn default_cors_origins() -> Vec<String> {
    vec!["*".into()]
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
