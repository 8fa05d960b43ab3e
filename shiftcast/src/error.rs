//! Application-wide error types.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A field required for the requested purpose is missing or out of range.
    /// Not retried until the configuration changes.
    #[error("Invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// Recorded data required by the job does not exist yet.
    #[error("Not ready: {0}")]
    NotReady(String),

    #[error("Failed to spawn {program}: {source}")]
    ProcessSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid state transition: cannot transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error while {op} {}: {source}", path.display())]
    IoPath {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    pub fn not_ready(msg: impl Into<String>) -> Self {
        Self::NotReady(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn io_path(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::IoPath {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Whether the enforcer should simply try again on the next tick.
    ///
    /// `InvalidConfig` is retried too (the snapshot may change), but it is
    /// not expected to resolve on its own.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NotReady(_) | Self::ProcessSpawn { .. } | Self::Io(_) | Self::IoPath { .. }
        )
    }

    /// Whether this failure should count toward restart backoff.
    pub fn counts_as_failure(&self) -> bool {
        matches!(self, Self::ProcessSpawn { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::not_ready("warming up").is_retryable());
        assert!(!Error::invalid_config("no output").is_retryable());
        assert!(
            Error::ProcessSpawn {
                program: "ffmpeg".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_only_spawn_failures_count() {
        assert!(!Error::not_ready("x").counts_as_failure());
        assert!(!Error::invalid_config("x").counts_as_failure());
        assert!(
            Error::ProcessSpawn {
                program: "ffmpeg".into(),
                source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
            }
            .counts_as_failure()
        );
    }

    #[test]
    fn test_io_path_message() {
        let err = Error::io_path(
            "creating directory",
            Path::new("/tmp/x"),
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let msg = err.to_string();
        assert!(msg.contains("creating directory"));
        assert!(msg.contains("/tmp/x"));
    }
}
