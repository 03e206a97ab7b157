use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum LandingError {
    #[error("archive service request failed: {0}")]
    Service(String),

    #[error("stack '{name}' ({namespace}) not found")]
    StackNotFound { name: String, namespace: String },

    #[error("invalid stack configuration in {path}: {reason}")]
    StackConfig { path: PathBuf, reason: String },

    #[error("silo '{0}' is not configured")]
    SiloNotConfigured(String),

    #[error("silo '{0}' is not part of the configured pool")]
    SiloUnknown(String),

    #[error("settings file not found at {0}")]
    ConfigNotFound(PathBuf),

    #[error("invalid settings: {0}")]
    InvalidConfig(String),

    #[error("state persistence failed: {0}")]
    State(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl From<reqwest::Error> for LandingError {
    fn from(err: reqwest::Error) -> Self {
        LandingError::Service(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LandingError>;
