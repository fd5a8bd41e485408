use crate::infrastructure::config::LauncherSettings;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Key the process is tracked under for a later stop.
    pub name: String,
    pub environment: Option<String>,
    pub script: PathBuf,
    pub port: u16,
    /// When set, the child writes to this file and outlives the client.
    /// Otherwise its output is forwarded to tracing and it dies with us.
    pub log_file: Option<PathBuf>,
}

#[async_trait]
pub trait ProcessLauncher: Send + Sync {
    async fn start_process(&self, request: &LaunchRequest) -> Result<(), InfraError>;
    async fn stop_process(&self, name: &str) -> Result<(), InfraError>;
    async fn list_environments(&self) -> Result<Vec<String>, InfraError>;
}

/// Spawns the backend script with a local interpreter and keeps the child
/// handles so they can be killed on stop.
pub struct ScriptLauncher {
    settings: LauncherSettings,
    children: Mutex<HashMap<String, Child>>,
}

impl ScriptLauncher {
    pub fn new(settings: LauncherSettings) -> Self {
        Self {
            settings,
            children: Mutex::new(HashMap::new()),
        }
    }

    fn interpreter(&self, environment: Option<&str>) -> Result<PathBuf, InfraError> {
        let Some(environment) = environment.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(PathBuf::from(&self.settings.python));
        };
        let environments_dir = self.settings.environments_dir.as_deref().ok_or_else(|| {
            InfraError::Launcher(format!(
                "environment '{environment}' requested but launcher.environmentsDir is not set"
            ))
        })?;
        let python = environment_python(&Path::new(environments_dir).join(environment));
        if !python.is_file() {
            return Err(InfraError::Launcher(format!(
                "environment '{environment}' has no interpreter at {}",
                python.display()
            )));
        }
        Ok(python)
    }
}

fn environment_python(environment_dir: &Path) -> PathBuf {
    environment_dir.join("bin").join("python")
}

fn forward_output<R>(name: String, stream: &'static str, reader: R)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim().is_empty() {
                continue;
            }
            tracing::debug!(process = %name, stream, "{}", line);
        }
    });
}

#[async_trait]
impl ProcessLauncher for ScriptLauncher {
    async fn start_process(&self, request: &LaunchRequest) -> Result<(), InfraError> {
        let mut children = self.children.lock().await;
        if let Some(existing) = children.get_mut(&request.name) {
            if matches!(existing.try_wait(), Ok(None)) {
                tracing::info!(process = %request.name, "backend process already running");
                return Ok(());
            }
            children.remove(&request.name);
        }

        let python = self.interpreter(request.environment.as_deref())?;
        let mut command = Command::new(&python);
        command
            .arg(&request.script)
            .arg(request.port.to_string())
            .stdin(Stdio::null());
        match &request.log_file {
            Some(path) => {
                let file = tokio::fs::OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?
                    .into_std()
                    .await;
                command
                    .stdout(Stdio::from(file.try_clone()?))
                    .stderr(Stdio::from(file));
            }
            None => {
                command
                    .stdout(Stdio::piped())
                    .stderr(Stdio::piped())
                    .kill_on_drop(true);
            }
        }

        let mut child = command.spawn().map_err(|error| {
            InfraError::Launcher(format!(
                "failed to spawn {} {}: {error}",
                python.display(),
                request.script.display()
            ))
        })?;

        if let Some(stdout) = child.stdout.take() {
            forward_output(request.name.clone(), "stdout", stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_output(request.name.clone(), "stderr", stderr);
        }

        tracing::info!(
            process = %request.name,
            pid = child.id(),
            port = request.port,
            "backend process started"
        );
        children.insert(request.name.clone(), child);
        Ok(())
    }

    async fn stop_process(&self, name: &str) -> Result<(), InfraError> {
        let mut child = self
            .children
            .lock()
            .await
            .remove(name.trim())
            .ok_or_else(|| InfraError::Launcher(format!("no tracked process named '{name}'")))?;

        child
            .kill()
            .await
            .map_err(|error| InfraError::Launcher(format!("failed to stop '{name}': {error}")))?;
        tracing::info!(process = %name, "backend process stopped");
        Ok(())
    }

    async fn list_environments(&self) -> Result<Vec<String>, InfraError> {
        let Some(environments_dir) = self.settings.environments_dir.as_deref() else {
            return Ok(Vec::new());
        };

        let mut entries = tokio::fs::read_dir(environments_dir).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            if !environment_python(&entry.path()).is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }
}
