use crate::domain::ContainerRuntime;
use crate::infra::DockerAdapter;
use crate::infra::config::{DEFAULT_CONFIG_NAME, load_app_config};
use anyhow::{Result, bail};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub fn run(config_path: Option<&Path>) -> Result<()> {
    let config = load_app_config(config_path)?;
    let runtime = DockerAdapter::with_binary(config.engine_binary());
    check(&runtime, config_path)
}

/// Reports engine reachability and config presence; fails when the engine is unusable
pub fn check(runtime: &dyn ContainerRuntime, config_path: Option<&Path>) -> Result<()> {
    info!("Checking dependencies and configuration...");

    let config_file = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_NAME));
    if config_file.exists() {
        info!("Config file: {:?}", config_file);
    } else {
        warn!(
            "No config file at {:?}; built-in defaults apply (run 'image-scan init')",
            config_file
        );
    }

    if !runtime.is_available() {
        bail!("Container engine is not reachable; is the daemon running?");
    }
    info!("Container engine reachable");

    Ok(())
}
