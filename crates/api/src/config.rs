use std::path::PathBuf;
use std::time::Duration;

use axum::http::HeaderValue;
use sampler_pipeline::ExecutorConfig;

/// Problems found while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} must be a valid {expected}, got '{value}'")]
    Invalid {
        name: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// Everything except `DATABASE_URL` has a default suitable for local
/// development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS` env var.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// How long shutdown waits for in-flight requests (default: `30`).
    pub shutdown_timeout_secs: u64,
    pub database_url: String,
    /// ComfyUI REST base URL.
    pub comfyui_url: String,
    /// ComfyUI WebSocket base URL, derived from `comfyui_url` when unset.
    pub comfyui_ws_url: String,
    /// Root directory for generated samples.
    pub sample_dir: PathBuf,
    /// Directory holding `<name>.json` workflow templates.
    pub workflow_dir: PathBuf,
    pub work_tick_ms: u64,
    pub reconnect_interval_secs: u64,
    /// Per-item watchdog; `0` disables it.
    pub item_timeout_secs: u64,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                   | Default                   |
    /// |---------------------------|---------------------------|
    /// | `HOST`                    | `0.0.0.0`                 |
    /// | `PORT`                    | `3000`                    |
    /// | `CORS_ORIGINS`            | `http://localhost:5173`   |
    /// | `REQUEST_TIMEOUT_SECS`    | `30`                      |
    /// | `SHUTDOWN_TIMEOUT_SECS`   | `30`                      |
    /// | `DATABASE_URL`            | required                  |
    /// | `COMFYUI_URL`             | `http://127.0.0.1:8188`   |
    /// | `COMFYUI_WS_URL`          | derived from `COMFYUI_URL`|
    /// | `SAMPLE_DIR`              | `./samples`               |
    /// | `WORKFLOW_DIR`            | `./workflows`             |
    /// | `WORK_TICK_MS`            | `1000`                    |
    /// | `RECONNECT_INTERVAL_SECS` | `10`                      |
    /// | `ITEM_TIMEOUT_SECS`       | `1800`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

        let cors_origins: Vec<String> = var("CORS_ORIGINS", "http://localhost:5173")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if let Some(bad) = cors_origins.iter().find(|o| o.parse::<HeaderValue>().is_err()) {
            return Err(ConfigError::Invalid {
                name: "CORS_ORIGINS",
                expected: "origin list",
                value: bad.clone(),
            });
        }

        let database_url = lookup("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let comfyui_url = var("COMFYUI_URL", "http://127.0.0.1:8188")
            .trim_end_matches('/')
            .to_string();
        let comfyui_ws_url = lookup("COMFYUI_WS_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| derive_ws_url(&comfyui_url));

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port: parse("PORT", &var("PORT", "3000"), "u16")?,
            cors_origins,
            request_timeout_secs: parse("REQUEST_TIMEOUT_SECS", &var("REQUEST_TIMEOUT_SECS", "30"), "u64")?,
            shutdown_timeout_secs: parse("SHUTDOWN_TIMEOUT_SECS", &var("SHUTDOWN_TIMEOUT_SECS", "30"), "u64")?,
            database_url,
            comfyui_url,
            comfyui_ws_url,
            sample_dir: PathBuf::from(var("SAMPLE_DIR", "./samples")),
            workflow_dir: PathBuf::from(var("WORKFLOW_DIR", "./workflows")),
            work_tick_ms: parse("WORK_TICK_MS", &var("WORK_TICK_MS", "1000"), "u64")?,
            reconnect_interval_secs: parse(
                "RECONNECT_INTERVAL_SECS",
                &var("RECONNECT_INTERVAL_SECS", "10"),
                "u64",
            )?,
            item_timeout_secs: parse("ITEM_TIMEOUT_SECS", &var("ITEM_TIMEOUT_SECS", "1800"), "u64")?,
        })
    }

    /// Executor settings derived from this configuration.
    pub fn executor_config(&self) -> ExecutorConfig {
        let mut config = ExecutorConfig::new(&self.sample_dir);
        config.work_tick = Duration::from_millis(self.work_tick_ms.max(1));
        config.reconnect_interval = Duration::from_secs(self.reconnect_interval_secs.max(1));
        config.item_timeout = (self.item_timeout_secs > 0).then(|| Duration::from_secs(self.item_timeout_secs));
        config
    }
}

fn parse<T: std::str::FromStr>(name: &'static str, value: &str, expected: &'static str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        name,
        expected,
        value: value.to_string(),
    })
}

/// `http://host` → `ws://host`, `https://host` → `wss://host`.
fn derive_ws_url(http_url: &str) -> String {
    if let Some(rest) = http_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = http_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        http_url.to_string()
    }
}
