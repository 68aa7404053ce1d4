//! Descriptor search path
//!
//! Descriptors are looked up by name in each directory of the search path,
//! highest priority first. An explicit override replaces the default path.

use std::path::{Path, PathBuf};

use super::ConfigError;

/// Application directory name under config roots
pub const APP_DIR: &str = "releng-sign";

/// System-wide config root
pub const SYSTEM_CONFIG_DIR: &str = "/etc/releng-sign";

/// Config roots in priority order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPath {
    roots: Vec<PathBuf>,
}

impl SearchPath {
    /// User config dir (`$XDG_CONFIG_HOME` or `~/.config`), then `/etc`.
    pub fn default_roots() -> Self {
        let mut roots = Vec::new();
        if let Some(user) = user_config_home() {
            roots.push(user.join(APP_DIR));
        }
        roots.push(PathBuf::from(SYSTEM_CONFIG_DIR));
        Self { roots }
    }

    /// Search only `dir`.
    pub fn override_with(dir: impl Into<PathBuf>) -> Self {
        Self {
            roots: vec![dir.into()],
        }
    }

    /// `--config-dir` if given, the default roots otherwise
    pub fn resolve(config_dir: Option<&Path>) -> Self {
        match config_dir {
            Some(dir) => Self::override_with(dir),
            None => Self::default_roots(),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Find `{root}/{subdir}/{name}.toml` in priority order.
    ///
    /// The returned path is canonical, so a `default.toml` symlink resolves
    /// to the descriptor it points at.
    pub fn find(&self, subdir: &str, name: &str) -> Result<PathBuf, ConfigError> {
        let filename = format!("{}.toml", name);
        let dirs: Vec<PathBuf> = self.roots.iter().map(|root| root.join(subdir)).collect();
        for dir in &dirs {
            let candidate = dir.join(&filename);
            if candidate.is_file() {
                return candidate.canonicalize().map_err(|source| ConfigError::Read {
                    path: candidate.clone(),
                    source,
                });
            }
        }
        Err(ConfigError::NotFound {
            filename,
            searched: dirs,
        })
    }
}

fn user_config_home() -> Option<PathBuf> {
    match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => Some(PathBuf::from(dir)),
        _ => std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")),
    }
}
