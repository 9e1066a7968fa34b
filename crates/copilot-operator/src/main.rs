use std::{env, sync::Arc};

use copilot_kube::CustomObjectsClient;
use copilot_operator::config::loader::load_config;
use copilot_operator::{Controller, ReconcileEngine};
use copilot_provider::CompletionClient;

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From COPILOT_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (copilot.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (COPILOT_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else), so the provider
    // credential can come from .env for local development.
    if let Err(e) = dotenvy::dotenv() {
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound)
        {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    copilot_operator::observability::init_tracing();

    // Parse config path from CLI, environment, or use default
    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    copilot_operator::observability::apply_logging_level(&cfg.logging.level);

    // The credential is read exactly once, here.
    let api_key = match cfg.provider.resolve_api_key() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    let provider = match CompletionClient::new(
        &cfg.provider.endpoint,
        api_key,
        cfg.provider.request_timeout(),
    ) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("Provider client initialization failed: {e}");
            std::process::exit(2);
        }
    };

    let kube = Arc::new(CustomObjectsClient::new(
        &cfg.api.base_url,
        cfg.api.bearer_token.clone(),
    ));

    tracing::info!(
        api = %cfg.api.base_url,
        provider = %cfg.provider.endpoint,
        debounce_ms = cfg.controller.debounce_ms,
        "Starting controller"
    );

    let engine = Arc::new(ReconcileEngine::new(Arc::clone(&kube), Arc::new(provider)));
    let controller = Controller::new(kube, engine, cfg.controller.clone());

    if let Err(err) = controller.run().await {
        eprintln!("Controller error: {err}");
        std::process::exit(1);
    }
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: COPILOT_CONFIG
/// 3. Default: copilot.toml
fn resolve_config_path() -> (String, ConfigSource) {
    // 1. Check CLI: --config <path>
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    // 2. Check environment variable
    if let Ok(path) = env::var("COPILOT_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    // 3. Default to copilot.toml
    ("copilot.toml".to_string(), ConfigSource::Default)
}
