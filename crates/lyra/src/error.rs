use lyra_control::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid load control config: {0}")]
    LoadControl(#[from] ConfigError),

    #[error("failed to parse session config: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;
