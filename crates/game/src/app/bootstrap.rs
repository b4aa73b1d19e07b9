use std::env;
use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::{load_config_file, ConfigError, SandboxConfig, CONFIG_ENV_VAR};
use super::services::SandboxServices;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("failed to read environment variable {var}: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug)]
pub(crate) struct AppWiring {
    pub(crate) config: SandboxConfig,
    pub(crate) services: SandboxServices,
}

pub(crate) fn build_app() -> Result<AppWiring, AppError> {
    init_tracing();
    info!("=== Behaviour Sandbox Startup ===");

    let config = match config_path_from_env()? {
        Some(path) => {
            info!(path = %path.display(), "config_loading");
            load_config_file(&path)?
        }
        None => {
            info!("config_builtin");
            SandboxConfig::builtin()
        }
    };
    Ok(wire(config))
}

pub(crate) fn wire(config: SandboxConfig) -> AppWiring {
    let services = SandboxServices::new(config.pool_capacity_per_tick);
    AppWiring { config, services }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn config_path_from_env() -> Result<Option<PathBuf>, AppError> {
    match env::var(CONFIG_ENV_VAR) {
        Ok(raw) if raw.trim().is_empty() => Ok(None),
        Ok(raw) => Ok(Some(PathBuf::from(raw.trim()))),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(source) => Err(AppError::EnvVar {
            var: CONFIG_ENV_VAR,
            source,
        }),
    }
}
