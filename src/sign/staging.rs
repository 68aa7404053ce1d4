//! Scratch workspace for local signing
//!
//! A workspace owns exactly the files it copied in. Cleanup removes those
//! files one by one and then the (now empty) directory; it never removes a
//! directory tree.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

use crate::layout::PathInfo;
use crate::package::{PackageRef, SigKey};

use super::signer::{Signer, SignerError};

/// Staging failures
#[derive(Debug, Error)]
pub enum StagingError {
    #[error("failed to create scratch directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to clean up {path}: {source}")]
    Cleanup {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Uniquely named scratch directory holding staged copies
#[derive(Debug)]
pub struct Workspace {
    dir: PathBuf,
    files: Vec<PathBuf>,
    cleaned: bool,
}

impl Workspace {
    fn create(root: &Path) -> Result<Self, StagingError> {
        let dir = root.join(format!("sign_rpms_{}", Uuid::new_v4().simple()));
        fs::create_dir(&dir).map_err(|source| StagingError::CreateDir {
            path: dir.clone(),
            source,
        })?;
        Ok(Self {
            dir,
            files: Vec::new(),
            cleaned: false,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Staged copies, in staging order
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Remove the staged files, then the directory.
    pub fn cleanup(mut self) -> Result<(), StagingError> {
        self.cleaned = true;
        self.remove_owned()
    }

    fn remove_owned(&mut self) -> Result<(), StagingError> {
        for file in self.files.drain(..) {
            match fs::remove_file(&file) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(StagingError::Cleanup { path: file, source }),
            }
        }
        fs::remove_dir(&self.dir).map_err(|source| StagingError::Cleanup {
            path: self.dir.clone(),
            source,
        })
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        if self.cleaned {
            return;
        }
        if let Err(e) = self.remove_owned() {
            tracing::warn!("scratch workspace left behind: {}", e);
        }
    }
}

/// Copies unsigned artifacts into scratch space and runs the signer on them
#[derive(Debug, Clone)]
pub struct Stager {
    scratch_root: PathBuf,
    commit: bool,
}

impl Stager {
    pub fn new(scratch_root: impl Into<PathBuf>, commit: bool) -> Self {
        Self {
            scratch_root: scratch_root.into(),
            commit,
        }
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Copy each package's unsigned artifact into a fresh workspace.
    ///
    /// Returns `None` in dry-run mode. Copies are listed in input order.
    pub fn stage(&self, paths: &PathInfo, rpms: &[PackageRef]) -> Result<Option<Workspace>, StagingError> {
        if !self.commit {
            return Ok(None);
        }

        let mut workspace = Workspace::create(&self.scratch_root)?;
        for rpm in rpms {
            let from = paths.locate(rpm, None);
            let to = workspace.dir.join(rpm.filename());
            // a partially staged workspace cleans itself up on drop
            fs::copy(&from, &to).map_err(|source| StagingError::Copy {
                from: from.clone(),
                to: to.clone(),
                source,
            })?;
            workspace.files.push(to);
        }
        tracing::debug!("staged {} file(s) in {}", rpms.len(), workspace.dir.display());
        Ok(Some(workspace))
    }

    /// Run `signer` over the staged copies; no-op in dry-run mode.
    pub fn invoke_signer(
        &self,
        signer: &dyn Signer,
        key: &SigKey,
        workspace: Option<&Workspace>,
    ) -> Result<(), SignerError> {
        match workspace {
            Some(ws) if self.commit => signer.sign(key, ws.files()),
            _ => Ok(()),
        }
    }

    /// Remove a workspace; no-op in dry-run mode.
    pub fn cleanup(&self, workspace: Option<Workspace>) -> Result<(), StagingError> {
        match workspace {
            Some(ws) => ws.cleanup(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::package::BuildInfo;
    use tempfile::TempDir;

    fn rpm(name: &str) -> PackageRef {
        PackageRef {
            id: 1,
            build: BuildInfo {
                id: 1,
                name: "src".to_string(),
                version: "1".to_string(),
                release: "1".to_string(),
            },
            name: name.to_string(),
            version: "1".to_string(),
            release: "1".to_string(),
            arch: "noarch".to_string(),
            size: 4,
        }
    }

    fn seed(paths: &PathInfo, rpm: &PackageRef, bytes: &[u8]) {
        let main = paths.locate(rpm, None);
        fs::create_dir_all(main.parent().unwrap()).unwrap();
        fs::write(main, bytes).unwrap();
    }

    #[test]
    fn test_stage_and_cleanup() {
        let top = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let paths = PathInfo::new(top.path());
        let rpms = vec![rpm("a"), rpm("b")];
        seed(&paths, &rpms[0], b"aaaa");
        seed(&paths, &rpms[1], b"bbbb");

        let stager = Stager::new(scratch.path(), true);
        let ws = stager.stage(&paths, &rpms).unwrap().unwrap();
        assert!(ws.dir().file_name().unwrap().to_string_lossy().starts_with("sign_rpms_"));
        assert_eq!(ws.files().len(), 2);
        assert!(ws.files()[0].ends_with("a-1-1.noarch.rpm"));
        assert_eq!(fs::read(&ws.files()[1]).unwrap(), b"bbbb");

        let dir = ws.dir().to_path_buf();
        stager.cleanup(Some(ws)).unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_cleanup_refuses_foreign_content() {
        let top = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let paths = PathInfo::new(top.path());
        let rpms = vec![rpm("a")];
        seed(&paths, &rpms[0], b"a");

        let stager = Stager::new(scratch.path(), true);
        let ws = stager.stage(&paths, &rpms).unwrap().unwrap();
        let stray = ws.dir().join("unrelated.txt");
        fs::write(&stray, b"keep me").unwrap();

        assert!(matches!(stager.cleanup(Some(ws)), Err(StagingError::Cleanup { .. })));
        assert!(stray.exists());
    }

    #[test]
    fn test_failed_copy_cleans_up() {
        let top = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let paths = PathInfo::new(top.path());
        let rpms = vec![rpm("a"), rpm("missing")];
        seed(&paths, &rpms[0], b"a");

        let stager = Stager::new(scratch.path(), true);
        assert!(matches!(stager.stage(&paths, &rpms), Err(StagingError::Copy { .. })));
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let top = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let paths = PathInfo::new(top.path());

        let stager = Stager::new(scratch.path(), false);
        assert!(stager.stage(&paths, &[rpm("a")]).unwrap().is_none());
        stager.cleanup(None).unwrap();
        assert_eq!(fs::read_dir(scratch.path()).unwrap().count(), 0);
    }
}
