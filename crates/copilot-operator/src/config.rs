use std::time::Duration;

use copilot_core::RetryPolicy;
use copilot_provider::DEFAULT_COMPLETION_URL;
use serde::{Deserialize, Serialize};

/// Environment variable consulted when `provider.api_key` is not configured.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub provider: ProviderSettings,
    #[serde(default)]
    pub controller: ControllerSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the custom-resource API server lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL of the API server, e.g. a local `kubectl proxy`.
    #[serde(default = "default_api_base_url")]
    pub base_url: String,
    /// Optional bearer token for the API server.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

fn default_api_base_url() -> String {
    "http://127.0.0.1:8001".to_string()
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: default_api_base_url(),
            bearer_token: None,
        }
    }
}

/// Completion provider endpoint and credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(default = "default_provider_endpoint")]
    pub endpoint: String,
    /// Bearer credential; falls back to the `OPENAI_API_KEY` environment
    /// variable when empty. Read once at startup.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_provider_endpoint() -> String {
    DEFAULT_COMPLETION_URL.to_string()
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            endpoint: default_provider_endpoint(),
            api_key: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ProviderSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Resolve the credential: config value first, then the process
    /// environment.
    pub fn resolve_api_key(&self) -> Result<String, String> {
        if !self.api_key.is_empty() {
            return Ok(self.api_key.clone());
        }
        match std::env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(format!(
                "no provider credential: set provider.api_key or the {API_KEY_ENV} environment variable"
            )),
        }
    }
}

/// Reconcile-loop behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    /// Debounce window applied per resource key, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Directory receiving `<name>.json` error artifacts.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: String,
    /// Backoff for re-establishing the watch connection; exhausting it is
    /// fatal.
    #[serde(default)]
    pub reconnect: RetryPolicy,
    /// Backoff for requeueing a resource after a failed reconcile pass.
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_debounce_ms() -> u64 {
    1_000
}

fn default_artifact_dir() -> String {
    ".".to_string()
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            artifact_dir: default_artifact_dir(),
            reconnect: RetryPolicy::default(),
            retry: RetryPolicy::default(),
        }
    }
}

impl ControllerSettings {
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // API server validations
        url::Url::parse(&self.api.base_url)
            .map_err(|e| format!("api.base_url is not a valid URL: {e}"))?;
        // Provider validations
        url::Url::parse(&self.provider.endpoint)
            .map_err(|e| format!("provider.endpoint is not a valid URL: {e}"))?;
        if self.provider.request_timeout_ms == 0 {
            return Err("provider.request_timeout_ms must be > 0".into());
        }
        // Controller validations
        if self.controller.debounce_ms == 0 {
            return Err("controller.debounce_ms must be > 0".into());
        }
        for (section, policy) in [
            ("controller.reconnect", &self.controller.reconnect),
            ("controller.retry", &self.controller.retry),
        ] {
            if policy.max_attempts == 0 {
                return Err(format!("{section}.max_attempts must be > 0"));
            }
            if policy.base_delay_ms == 0 {
                return Err(format!("{section}.base_delay_ms must be > 0"));
            }
            if policy.max_delay_ms < policy.base_delay_ms {
                return Err(format!("{section}.max_delay_ms must be >= base_delay_ms"));
            }
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                let default_path = PathBuf::from("copilot.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., COPILOT__CONTROLLER__DEBOUNCE_MS=250
        builder = builder.add_source(
            Environment::with_prefix("COPILOT")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
