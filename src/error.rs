use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum HarvestError {
    #[error("Index page fetch failed: {0}")]
    IndexFetchFailure(String),

    #[error("Error Status Code: {0}")]
    HttpStatus(u16),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Not a valid image: {0}")]
    InvalidImage(String),

    #[error("Filesystem error: {0}")]
    FilesystemError(String),

    #[error("Another harvest is already running against {0}")]
    AlreadyRunning(PathBuf),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Task panicked: {0}")]
    TaskPanicked(String),
}

impl HarvestError {
    /// Fatal errors abort the whole run; everything else only fails the
    /// task it happened in.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HarvestError::IndexFetchFailure(_)
                | HarvestError::AlreadyRunning(_)
                | HarvestError::ConfigurationError(_)
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            HarvestError::IndexFetchFailure(_) => ErrorKind::IndexFetch,
            HarvestError::HttpStatus(_) => ErrorKind::HttpStatus,
            HarvestError::NetworkError(_) => ErrorKind::Network,
            HarvestError::InvalidImage(_) => ErrorKind::InvalidImage,
            HarvestError::FilesystemError(_) => ErrorKind::Filesystem,
            HarvestError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
            HarvestError::ConfigurationError(_) => ErrorKind::Configuration,
            HarvestError::TaskPanicked(_) => ErrorKind::Panic,
        }
    }
}

/// Fieldless tag of a [`HarvestError`], carried by failed outcomes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    IndexFetch,
    HttpStatus,
    Network,
    InvalidImage,
    Filesystem,
    AlreadyRunning,
    Configuration,
    Panic,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::IndexFetch => write!(f, "INDEX_FETCH"),
            ErrorKind::HttpStatus => write!(f, "HTTP_STATUS"),
            ErrorKind::Network => write!(f, "NETWORK"),
            ErrorKind::InvalidImage => write!(f, "INVALID_IMAGE"),
            ErrorKind::Filesystem => write!(f, "FILESYSTEM"),
            ErrorKind::AlreadyRunning => write!(f, "ALREADY_RUNNING"),
            ErrorKind::Configuration => write!(f, "CONFIGURATION"),
            ErrorKind::Panic => write!(f, "PANIC"),
        }
    }
}

impl From<std::io::Error> for HarvestError {
    fn from(err: std::io::Error) -> Self {
        HarvestError::FilesystemError(err.to_string())
    }
}

impl From<serde_json::Error> for HarvestError {
    fn from(err: serde_json::Error) -> Self {
        HarvestError::ConfigurationError(err.to_string())
    }
}

impl From<reqwest::Error> for HarvestError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return HarvestError::HttpStatus(status.as_u16());
        }
        if err.is_timeout() {
            HarvestError::NetworkError(format!("request timed out: {err}"))
        } else {
            HarvestError::NetworkError(err.to_string())
        }
    }
}
