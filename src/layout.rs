//! Artifact locations in a build-service topdir
//!
//! Layout rules are static; computing a location never touches the
//! filesystem or the network.

use std::path::{Path, PathBuf};

use crate::package::{BuildInfo, PackageRef, SigKey};

/// Layout rules rooted at a build-service topdir
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathInfo {
    topdir: PathBuf,
}

impl PathInfo {
    pub fn new(topdir: impl Into<PathBuf>) -> Self {
        Self {
            topdir: topdir.into(),
        }
    }

    pub fn topdir(&self) -> &Path {
        &self.topdir
    }

    /// `{topdir}/packages/{name}/{version}/{release}`
    pub fn build_dir(&self, build: &BuildInfo) -> PathBuf {
        self.topdir
            .join("packages")
            .join(&build.name)
            .join(&build.version)
            .join(&build.release)
    }

    /// Location of the signed copy for `sigkey`, or of the unsigned main copy
    /// when no key is given.
    pub fn locate(&self, rpm: &PackageRef, sigkey: Option<&SigKey>) -> PathBuf {
        let build_dir = self.build_dir(&rpm.build);
        match sigkey {
            Some(key) if !key.is_unsigned() => build_dir
                .join("data/signed")
                .join(key.as_str())
                .join(&rpm.arch)
                .join(rpm.filename()),
            _ => build_dir.join(&rpm.arch).join(rpm.filename()),
        }
    }

    /// Location of the cached signature header for `sigkey`
    pub fn sigcache(&self, rpm: &PackageRef, sigkey: &SigKey) -> PathBuf {
        self.build_dir(&rpm.build)
            .join("data/sigcache")
            .join(sigkey.as_str())
            .join(&rpm.arch)
            .join(format!("{}.sig", rpm.filename()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PackageRef {
        PackageRef {
            id: 7,
            build: BuildInfo {
                id: 3,
                name: "bash".to_string(),
                version: "5.2".to_string(),
                release: "1.fc40".to_string(),
            },
            name: "bash-doc".to_string(),
            version: "5.2".to_string(),
            release: "1.fc40".to_string(),
            arch: "noarch".to_string(),
            size: 1024,
        }
    }

    #[test]
    fn test_unsigned_location() {
        let paths = PathInfo::new("/mnt/koji");
        assert_eq!(
            paths.locate(&sample(), None),
            PathBuf::from("/mnt/koji/packages/bash/5.2/1.fc40/noarch/bash-doc-5.2-1.fc40.noarch.rpm")
        );
    }

    #[test]
    fn test_signed_location() {
        let paths = PathInfo::new("/mnt/koji");
        let key = SigKey::new("FD431D51");
        assert_eq!(
            paths.locate(&sample(), Some(&key)),
            PathBuf::from(
                "/mnt/koji/packages/bash/5.2/1.fc40/data/signed/fd431d51/noarch/bash-doc-5.2-1.fc40.noarch.rpm"
            )
        );
    }

    #[test]
    fn test_empty_key_is_main_copy() {
        let paths = PathInfo::new("/t");
        let empty = SigKey::new("");
        assert_eq!(paths.locate(&sample(), Some(&empty)), paths.locate(&sample(), None));
    }

    #[test]
    fn test_sigcache_location() {
        let paths = PathInfo::new("/t");
        let key = SigKey::new("abcd0001");
        assert_eq!(
            paths.sigcache(&sample(), &key),
            PathBuf::from("/t/packages/bash/5.2/1.fc40/data/sigcache/abcd0001/noarch/bash-doc-5.2-1.fc40.noarch.rpm.sig")
        );
    }

    #[test]
    fn test_deterministic() {
        let paths = PathInfo::new("/t");
        let key = SigKey::new("k");
        assert_eq!(paths.locate(&sample(), Some(&key)), paths.locate(&sample(), Some(&key)));
    }
}
