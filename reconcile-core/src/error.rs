use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Bad request: {0}")]
    BadRequest(anyhow::Error),

    #[error("Not found: {0}")]
    NotFound(anyhow::Error),

    #[error("Backend error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Backend responded with HTTP {status}")]
    Http { status: u16 },

    #[error("Transport error: {0}")]
    Transport(anyhow::Error),

    #[error("Backend call timed out")]
    Timeout,

    #[error("Malformed payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl EngineError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        EngineError::BadRequest(anyhow::anyhow!(message.into()))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        EngineError::NotFound(anyhow::anyhow!(message.into()))
    }

    /// Short label used for metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::BadRequest(_) => "bad_request",
            EngineError::NotFound(_) => "not_found",
            EngineError::Rpc { .. } => "rpc",
            EngineError::Http { .. } => "http",
            EngineError::Transport(_) => "transport",
            EngineError::Timeout => "timeout",
            EngineError::Decode(_) => "decode",
            EngineError::ConfigError(_) => "config",
            EngineError::InternalError(_) => "internal",
        }
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return EngineError::Timeout;
        }
        if let Some(status) = err.status() {
            return EngineError::Http {
                status: status.as_u16(),
            };
        }
        EngineError::Transport(anyhow::Error::new(err))
    }
}
