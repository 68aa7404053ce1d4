//! Release descriptor (`releases/<release_id>.toml`)

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::search::SearchPath;
use super::ConfigError;
use crate::package::SigKeys;

/// Subdirectory holding release descriptors
pub const RELEASES_DIR: &str = "releases";

/// Release descriptor contents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseConfig {
    #[serde(default)]
    pub tags: ReleaseTags,

    #[serde(default)]
    pub signing: ReleaseSigning,
}

/// `[tags]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseTags {
    /// Tag composes are built from
    pub compose: Option<String>,
    /// Tag the release ships from
    pub release: Option<String>,
}

/// `[signing]` table
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseSigning {
    pub sigkey_beta: Option<String>,
    pub sigkey_gold: Option<String>,
}

/// Signing level of a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SigningLevel {
    /// Beta key, gold key accepted
    Beta,
    /// Gold key only
    Gold,
}

impl FromStr for SigningLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beta" => Ok(SigningLevel::Beta),
            "gold" => Ok(SigningLevel::Gold),
            other => Err(ConfigError::UnknownLevel(other.to_string())),
        }
    }
}

impl fmt::Display for SigningLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningLevel::Beta => f.write_str("beta"),
            SigningLevel::Gold => f.write_str("gold"),
        }
    }
}

/// A loaded release
#[derive(Debug, Clone)]
pub struct Release {
    pub release_id: String,
    /// Canonical descriptor path
    pub config_path: PathBuf,
    pub config: ReleaseConfig,
}

impl Release {
    /// Find and load the release `release_id`.
    pub fn load(release_id: &str, search: &SearchPath) -> Result<Self, ConfigError> {
        let config_path = search.find(RELEASES_DIR, release_id)?;
        let config = ReleaseConfig::load(&config_path)?;
        Ok(Self {
            release_id: release_id.to_string(),
            config_path,
            config,
        })
    }

    /// Compose tag if set, release tag otherwise.
    pub fn tag(&self) -> Result<&str, ConfigError> {
        let tags = &self.config.tags;
        [tags.compose.as_deref(), tags.release.as_deref()]
            .into_iter()
            .flatten()
            .find(|t| !t.trim().is_empty())
            .ok_or_else(|| ConfigError::NoTag(self.release_id.clone()))
    }

    /// Accepted keys for `level`, highest priority first.
    pub fn sigkeys(&self, level: SigningLevel) -> Result<SigKeys, ConfigError> {
        let signing = &self.config.signing;
        let gold = self.required(signing.sigkey_gold.as_deref(), "signing.sigkey_gold")?;
        let raw = match level {
            SigningLevel::Beta => {
                let beta = self.required(signing.sigkey_beta.as_deref(), "signing.sigkey_beta")?;
                vec![beta, gold]
            }
            SigningLevel::Gold => vec![gold],
        };
        Ok(SigKeys::new(raw)?)
    }

    fn required<'s>(&self, value: Option<&'s str>, field: &str) -> Result<&'s str, ConfigError> {
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                field: format!("{} (release {})", field, self.release_id),
            })
    }
}

impl ReleaseConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|e| e.at(path))
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(content: &str) -> Release {
        Release {
            release_id: "f40".to_string(),
            config_path: PathBuf::from("/etc/releng-sign/releases/f40.toml"),
            config: ReleaseConfig::parse(content).unwrap(),
        }
    }

    #[test]
    fn test_compose_tag_preferred() {
        let r = release("[tags]\ncompose = \"f40-compose\"\nrelease = \"f40\"\n");
        assert_eq!(r.tag().unwrap(), "f40-compose");

        let r = release("[tags]\nrelease = \"f40\"\n");
        assert_eq!(r.tag().unwrap(), "f40");
    }

    #[test]
    fn test_no_tag() {
        let r = release("[tags]\ncompose = \"\"\n");
        assert!(matches!(r.tag(), Err(ConfigError::NoTag(id)) if id == "f40"));
    }

    #[test]
    fn test_sigkeys_by_level() {
        let r = release("[signing]\nsigkey_beta = \"B1B1B1B1\"\nsigkey_gold = \"901d901d\"\n");
        assert_eq!(r.sigkeys(SigningLevel::Beta).unwrap().to_string(), "b1b1b1b1, 901d901d");
        assert_eq!(r.sigkeys(SigningLevel::Gold).unwrap().to_string(), "901d901d");
    }

    #[test]
    fn test_missing_gold_key() {
        let r = release("[signing]\nsigkey_beta = \"b1b1b1b1\"\n");
        assert!(matches!(r.sigkeys(SigningLevel::Beta), Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_level_parse() {
        assert_eq!("beta".parse::<SigningLevel>().unwrap(), SigningLevel::Beta);
        assert_eq!(SigningLevel::Gold.to_string(), "gold");
        assert!(matches!("rc".parse::<SigningLevel>(), Err(ConfigError::UnknownLevel(_))));
    }
}
