//! Error types for sidecar line parsing and process spawning.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed sidecar line: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum SpawnError {
    #[error("sidecar binary not found (searched: {})", display_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },
    #[error("sidecar binary missing at {path}: {source}")]
    Missing {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("elevation required to start {path}: {source}")]
    ElevationRequired {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to spawn sidecar {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("sidecar stdout was not captured")]
    NoStdout,
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

// ERROR_ELEVATION_REQUIRED
#[cfg(windows)]
const ELEVATION_REQUIRED: i32 = 740;

impl SpawnError {
    pub fn from_io(path: PathBuf, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            return SpawnError::Missing { path, source };
        }
        #[cfg(windows)]
        if source.raw_os_error() == Some(ELEVATION_REQUIRED) {
            return SpawnError::ElevationRequired { path, source };
        }
        SpawnError::Io { path, source }
    }
}
