use throng_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Invalid run configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Unable to build the HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("User pool has already been started")]
    AlreadyStarted,

    #[error("User pool driver terminated abnormally: {0}")]
    PoolDriver(#[from] tokio::task::JoinError),
}
