//! Signing requests as assembled by the command line
//!
//! A request ties an environment to a package source, the accepted keys and
//! the pass options, and renders the details block printed before any work.

use std::path::PathBuf;

use crate::config::{ConfigError, Environment, Release, SigningLevel};
use crate::package::{filter_by_packages, PackageRef, SigKeys};
use crate::service::{BuildService, ServiceResult};
use crate::sign::ReconcileOptions;

/// Where the packages of a pass come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageSource {
    /// Builds tagged into a tag
    Tag { tag: String, latest: bool, inherit: bool },
    /// Explicit `name-version-release` builds
    Builds(Vec<String>),
}

impl PackageSource {
    pub fn fetch(&self, service: &dyn BuildService) -> ServiceResult<Vec<PackageRef>> {
        match self {
            PackageSource::Tag { tag, latest, inherit } => service.list_tagged_rpms(tag, *latest, *inherit),
            PackageSource::Builds(nvrs) => service.list_build_rpms(nvrs),
        }
    }
}

/// Release context of a request
#[derive(Debug, Clone)]
pub struct ReleaseTarget {
    pub release_id: String,
    pub config_path: PathBuf,
    pub level: SigningLevel,
}

/// Everything a signing pass needs, resolved from configuration and flags
#[derive(Debug, Clone)]
pub struct SigningRequest {
    pub env_name: String,
    pub env_path: PathBuf,
    pub profile: String,
    pub signer: String,
    pub release: Option<ReleaseTarget>,
    pub source: PackageSource,
    pub keys: SigKeys,
    /// Source package names to restrict to, sorted; empty means all
    pub packages: Vec<String>,
    pub options: ReconcileOptions,
}

impl SigningRequest {
    /// Sign the latest builds in a release's tag.
    pub fn for_release(
        env: &Environment,
        release: &Release,
        level: SigningLevel,
        packages: Vec<String>,
        options: ReconcileOptions,
    ) -> Result<Self, ConfigError> {
        let tag = release.tag()?.to_string();
        let keys = release.sigkeys(level)?;
        let mut request = Self::new(
            env,
            PackageSource::Tag {
                tag,
                latest: true,
                inherit: false,
            },
            keys,
            options,
        );
        request.release = Some(ReleaseTarget {
            release_id: release.release_id.clone(),
            config_path: release.config_path.clone(),
            level,
        });
        request.packages = packages;
        request.packages.sort();
        request.packages.dedup();
        Ok(request)
    }

    /// Sign packages from an arbitrary source with explicit keys.
    pub fn new(env: &Environment, source: PackageSource, keys: SigKeys, options: ReconcileOptions) -> Self {
        Self {
            env_name: env.name.clone(),
            env_path: env.config_path.clone(),
            profile: env.config.profile.clone(),
            signer: env.config.signer.clone(),
            release: None,
            source,
            keys,
            packages: Vec::new(),
            options,
        }
    }

    /// Packages of the pass, filtered to the requested source packages.
    pub fn collect(&self, service: &dyn BuildService) -> ServiceResult<Vec<PackageRef>> {
        let rpms = self.source.fetch(service)?;
        if self.packages.is_empty() {
            Ok(rpms)
        } else {
            Ok(filter_by_packages(rpms, &self.packages))
        }
    }

    /// Details block printed before the pass
    pub fn details(&self) -> Vec<String> {
        let title = if self.release.is_some() {
            "Signing RPMs in a release"
        } else {
            "Signing RPMs"
        };
        let mut lines = vec![
            title.to_string(),
            format!(" * env name:                {}", self.env_name),
            format!(" * env config:              {}", self.env_path.display()),
        ];
        if let Some(release) = &self.release {
            lines.push(format!(" * release source:          {}", release.config_path.display()));
        }
        lines.push(format!(" * profile:                 {}", self.profile));
        if let Some(release) = &self.release {
            lines.push(format!(" * release_id:              {}", release.release_id));
        }
        match &self.source {
            PackageSource::Tag { tag, latest, inherit } => {
                lines.push(format!(" * tag:                     {}", tag));
                lines.push(format!(" * latest only:             {}", latest));
                lines.push(format!(" * inherit:                 {}", inherit));
            }
            PackageSource::Builds(nvrs) => {
                lines.push(" * builds:".to_string());
                lines.extend(nvrs.iter().map(|nvr| format!("     - {}", nvr)));
            }
        }
        if let Some(release) = &self.release {
            lines.push(format!(" * level:                   {}", release.level));
        }
        lines.push(format!(" * sigkeys:                 {}", self.keys));
        lines.push(format!(" * just_sign:               {}", self.options.just_sign));
        lines.push(format!(" * just_write:              {}", self.options.just_write));
        lines.push(format!(" * signer:                  {}", self.signer));
        if !self.packages.is_empty() {
            lines.push(" * packages:".to_string());
            lines.extend(self.packages.iter().map(|p| format!("     - {}", p)));
        }
        if !self.options.commit {
            lines.push("*** TEST MODE ***".to_string());
        }
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EnvironmentConfig, ReleaseConfig};

    fn env() -> Environment {
        Environment {
            name: "default".to_string(),
            config_path: PathBuf::from("/etc/releng-sign/environments/fedora.toml"),
            config: EnvironmentConfig::parse("profile = \"koji\"\ntopdir = \"/mnt/koji\"\n").unwrap(),
        }
    }

    fn release() -> Release {
        Release {
            release_id: "f40".to_string(),
            config_path: PathBuf::from("/etc/releng-sign/releases/f40.toml"),
            config: ReleaseConfig::parse(
                "[tags]\nrelease = \"f40\"\n[signing]\nsigkey_beta = \"b1b1b1b1\"\nsigkey_gold = \"901d901d\"\n",
            )
            .unwrap(),
        }
    }

    #[test]
    fn test_release_details() {
        let request = SigningRequest::for_release(
            &env(),
            &release(),
            SigningLevel::Beta,
            vec!["zsh".to_string(), "bash".to_string()],
            ReconcileOptions::default(),
        )
        .unwrap();

        let details = request.details();
        assert_eq!(details[0], "Signing RPMs in a release");
        assert!(details.contains(&" * tag:                     f40".to_string()));
        assert!(details.contains(&" * sigkeys:                 b1b1b1b1, 901d901d".to_string()));
        assert!(details.contains(&"     - bash".to_string()));
        assert_eq!(details.last().map(String::as_str), Some("*** TEST MODE ***"));
        assert_eq!(request.packages, vec!["bash", "zsh"]);
    }

    #[test]
    fn test_commit_hides_test_mode() {
        let options = ReconcileOptions {
            commit: true,
            ..ReconcileOptions::default()
        };
        let keys = SigKeys::new(["901d901d"]).unwrap();
        let request = SigningRequest::new(&env(), PackageSource::Builds(vec!["bash-5.2-1".to_string()]), keys, options);
        let details = request.details();
        assert_eq!(details[0], "Signing RPMs");
        assert!(!details.iter().any(|l| l.contains("TEST MODE")));
        assert!(details.contains(&"     - bash-5.2-1".to_string()));
    }
}
