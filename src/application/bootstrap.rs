use crate::infrastructure::config::{ensure_default_config, load_config_from_lookup, ClientConfig};
use crate::infrastructure::error::InfraError;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct BootstrapResult {
    pub workspace_root: PathBuf,
    pub config_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub config: ClientConfig,
}

pub fn bootstrap_workspace(workspace_root: &Path) -> Result<BootstrapResult, InfraError> {
    bootstrap_workspace_with_lookup(workspace_root, |key| std::env::var(key).ok())
}

pub fn bootstrap_workspace_with_lookup<F>(
    workspace_root: &Path,
    lookup: F,
) -> Result<BootstrapResult, InfraError>
where
    F: Fn(&str) -> Option<String>,
{
    let config_dir = workspace_root.join("config");
    let logs_dir = workspace_root.join("logs");

    fs::create_dir_all(&config_dir)?;
    fs::create_dir_all(&logs_dir)?;

    ensure_default_config(&config_dir)?;
    let config = load_config_from_lookup(&config_dir, lookup)?;

    Ok(BootstrapResult {
        workspace_root: workspace_root.to_path_buf(),
        config_dir,
        logs_dir,
        config,
    })
}
