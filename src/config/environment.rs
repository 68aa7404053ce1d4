//! Environment descriptor (`environments/<name>.toml`)
//!
//! Names the build service instance and how to talk to it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::search::SearchPath;
use super::ConfigError;
use crate::service::AuthMode;
use crate::sign::{BatchLimits, SignerContext, DEFAULT_PARALLELISM, RPM_RESIGN};

/// Subdirectory holding environment descriptors
pub const ENVIRONMENTS_DIR: &str = "environments";

/// Name of the environment used when none is given
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Environment descriptor contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Build service profile name
    pub profile: String,

    /// Build service topdir
    pub topdir: PathBuf,

    #[serde(default)]
    pub auth: AuthMode,

    /// Signer registry name
    #[serde(default = "default_signer")]
    pub signer: String,

    #[serde(default)]
    pub signing: SigningSettings,

    /// Key id to GPG uid overrides
    #[serde(default)]
    pub gpg_names: BTreeMap<String, String>,
}

fn default_signer() -> String {
    RPM_RESIGN.to_string()
}

/// `[signing]` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningSettings {
    /// Probe worker count
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,

    /// Batch size bound in MiB; 0 disables it
    #[serde(default = "default_batch_max_size_mib")]
    pub batch_max_size_mib: u64,

    /// Batch file count bound; 0 disables it
    #[serde(default = "default_batch_max_files")]
    pub batch_max_files: usize,
}

fn default_parallelism() -> usize {
    DEFAULT_PARALLELISM
}

fn default_batch_max_size_mib() -> u64 {
    2
}

fn default_batch_max_files() -> usize {
    20
}

impl Default for SigningSettings {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            batch_max_size_mib: default_batch_max_size_mib(),
            batch_max_files: default_batch_max_files(),
        }
    }
}

impl SigningSettings {
    pub fn batch_limits(&self) -> BatchLimits {
        BatchLimits::from_config(self.batch_max_size_mib, self.batch_max_files)
    }
}

/// A loaded environment
#[derive(Debug, Clone)]
pub struct Environment {
    pub name: String,
    /// Canonical descriptor path
    pub config_path: PathBuf,
    pub config: EnvironmentConfig,
}

impl Environment {
    /// Find and load the environment called `name`.
    pub fn load(name: &str, search: &SearchPath) -> Result<Self, ConfigError> {
        let config_path = search.find(ENVIRONMENTS_DIR, name)?;
        let config = EnvironmentConfig::load(&config_path)?;
        Ok(Self {
            name: name.to_string(),
            config_path,
            config,
        })
    }

    pub fn signer_context(&self) -> SignerContext {
        SignerContext {
            gpg_names: self.config.gpg_names.clone(),
        }
    }
}

impl EnvironmentConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|e| e.at(path))
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: EnvironmentConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.profile.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "profile".to_string(),
            });
        }
        if self.topdir.as_os_str().is_empty() {
            return Err(ConfigError::MissingField {
                field: "topdir".to_string(),
            });
        }
        if self.signer.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "signer".to_string(),
                reason: "signer name cannot be empty".to_string(),
            });
        }
        if self.signing.parallelism == 0 {
            return Err(ConfigError::InvalidValue {
                field: "signing.parallelism".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
