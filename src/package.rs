//! Package references and signing key identifiers
//!
//! A [`PackageRef`] is one built binary or source RPM as reported by the
//! build service. It is immutable for the duration of a reconciliation pass.

use std::collections::{BTreeSet, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Build-service identifier of a single RPM
pub type RpmId = u64;

/// The build an RPM belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Build-service identifier
    pub id: u64,
    /// Package (source RPM) name
    pub name: String,
    pub version: String,
    pub release: String,
}

impl BuildInfo {
    /// `name-version-release`
    pub fn nvr(&self) -> String {
        format!("{}-{}-{}", self.name, self.version, self.release)
    }
}

/// One built artifact
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PackageRef {
    pub id: RpmId,
    pub build: BuildInfo,
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    /// Size of the unsigned artifact in bytes
    pub size: u64,
}

impl PackageRef {
    /// `name-version-release.arch`
    pub fn nvra(&self) -> String {
        format!("{}-{}-{}.{}", self.name, self.version, self.release, self.arch)
    }

    /// File name of the artifact, identical for signed and unsigned copies
    pub fn filename(&self) -> String {
        format!("{}.rpm", self.nvra())
    }
}

/// Number of distinct builds among `rpms`
pub fn count_builds(rpms: &[PackageRef]) -> usize {
    rpms.iter().map(|r| r.build.id).collect::<HashSet<_>>().len()
}

/// Keep RPMs whose build belongs to one of `packages` (source package names).
pub fn filter_by_packages(rpms: Vec<PackageRef>, packages: &[String]) -> Vec<PackageRef> {
    let wanted: HashSet<&str> = packages.iter().map(String::as_str).collect();
    rpms.into_iter()
        .filter(|rpm| wanted.contains(rpm.build.name.as_str()))
        .collect()
}

/// Normalized (trimmed, lowercase) signing key identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SigKey(String);

impl SigKey {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for the empty key, i.e. no signature
    pub fn is_unsigned(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SigKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// Error for an empty key list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("at least one signing key is required")]
pub struct EmptyKeyList;

/// Priority-ordered list of accepted signing keys.
///
/// The first key is the one used to sign; the rest are only accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigKeys(Vec<SigKey>);

impl SigKeys {
    /// Build from raw identifiers, dropping blanks and repeated keys.
    pub fn new<I, S>(keys: I) -> Result<Self, EmptyKeyList>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let keys: Vec<SigKey> = keys
            .into_iter()
            .map(SigKey::new)
            .filter(|k| !k.is_unsigned() && seen.insert(k.clone()))
            .collect();
        if keys.is_empty() {
            return Err(EmptyKeyList);
        }
        Ok(Self(keys))
    }

    /// Highest-priority key
    pub fn primary(&self) -> &SigKey {
        &self.0[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &SigKey> {
        self.0.iter()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.iter().any(|k| k.as_str() == key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for SigKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(SigKey::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rpm(id: RpmId, build_id: u64, build_name: &str) -> PackageRef {
        PackageRef {
            id,
            build: BuildInfo {
                id: build_id,
                name: build_name.to_string(),
                version: "1.0".to_string(),
                release: "1".to_string(),
            },
            name: format!("{}-libs", build_name),
            version: "1.0".to_string(),
            release: "1".to_string(),
            arch: "x86_64".to_string(),
            size: 10,
        }
    }

    #[test]
    fn test_sigkey_normalized() {
        assert_eq!(SigKey::new("  FD431D51 ").as_str(), "fd431d51");
    }

    #[test]
    fn test_sigkeys_order_and_dedup() {
        let keys = SigKeys::new(["Beta1", "gold1", "BETA1", ""]).unwrap();
        assert_eq!(keys.primary().as_str(), "beta1");
        assert_eq!(keys.len(), 2);
        assert!(keys.contains("gold1"));
        assert_eq!(keys.to_string(), "beta1, gold1");
    }

    #[test]
    fn test_sigkeys_empty() {
        assert_eq!(SigKeys::new(Vec::<String>::new()), Err(EmptyKeyList));
        assert_eq!(SigKeys::new([" "]), Err(EmptyKeyList));
    }

    #[test]
    fn test_filenames() {
        let r = rpm(1, 10, "bash");
        assert_eq!(r.nvra(), "bash-libs-1.0-1.x86_64");
        assert_eq!(r.filename(), "bash-libs-1.0-1.x86_64.rpm");
        assert_eq!(r.build.nvr(), "bash-1.0-1");
    }

    #[test]
    fn test_filter_and_count() {
        let rpms = vec![rpm(1, 10, "bash"), rpm(2, 10, "bash"), rpm(3, 11, "zsh")];
        assert_eq!(count_builds(&rpms), 2);

        let filtered = filter_by_packages(rpms, &["zsh".to_string()]);
        assert_eq!(filtered.iter().map(|r| r.id).collect::<Vec<_>>(), vec![3]);
    }
}
