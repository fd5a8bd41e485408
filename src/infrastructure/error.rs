use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Backend rejected request (http {status}): {}", .detail.as_deref().unwrap_or("no detail"))]
    Backend { status: u16, detail: Option<String> },
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Launcher error: {0}")]
    Launcher(String),
    #[error("Backend did not become ready after {attempts} attempts")]
    ConnectTimeout { attempts: u32 },
    #[error("A chat response is still streaming")]
    ChatBusy,
    #[error("Stream error: {0}")]
    Stream(String),
}

impl InfraError {
    /// Backend-provided detail, when the backend answered with one.
    pub fn backend_detail(&self) -> Option<&str> {
        match self {
            Self::Backend { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}
