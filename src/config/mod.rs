//! Environment and release descriptors
//!
//! Descriptors are TOML files found through a [`SearchPath`]:
//! - `environments/<name>.toml`: build service profile, topdir, auth, signer
//! - `releases/<release_id>.toml`: tags and signing keys of a release

mod environment;
mod release;
mod search;

use std::path::{Path, PathBuf};

pub use environment::{Environment, EnvironmentConfig, SigningSettings, DEFAULT_ENVIRONMENT, ENVIRONMENTS_DIR};
pub use release::{Release, ReleaseConfig, ReleaseSigning, ReleaseTags, SigningLevel, RELEASES_DIR};
pub use search::{SearchPath, APP_DIR, SYSTEM_CONFIG_DIR};

use crate::package::EmptyKeyList;

/// Errors that can occur when loading descriptors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Couldn't find config file '{filename}' in: {}", display_paths(.searched))]
    NotFound { filename: String, searched: Vec<PathBuf> },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{path}: {source}")]
    InFile {
        path: PathBuf,
        #[source]
        source: Box<ConfigError>,
    },

    #[error("Missing required field '{field}'")]
    MissingField { field: String },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Neither compose nor release tag is set for release: {0}")]
    NoTag(String),

    #[error("Unknown signing level: '{0}' (expected beta or gold)")]
    UnknownLevel(String),

    #[error(transparent)]
    Keys(#[from] EmptyKeyList),
}

impl ConfigError {
    /// Attach the descriptor path to a content error.
    pub fn at(self, path: &Path) -> Self {
        ConfigError::InFile {
            path: path.to_path_buf(),
            source: Box::new(self),
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
