//! Pushes freshly produced signature headers into the build service cache

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::package::{PackageRef, SigKey};
use crate::service::{BuildService, ServiceError};

use super::directory::SignatureDirectory;
use super::inspector::InspectError;

/// Import consistency failures
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("{refs} package reference(s) but {paths} local path(s)")]
    LengthMismatch { refs: usize, paths: usize },

    #[error("local file {actual} does not match expected file name {expected}")]
    FilenameMismatch { expected: String, actual: PathBuf },

    #[error(transparent)]
    Header(#[from] InspectError),

    #[error("{nvra} is signed with '{actual}', expected '{expected}'")]
    WrongKey {
        nvra: String,
        expected: SigKey,
        actual: String,
    },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// What an import call did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Headers appended to the cache
    pub imported: usize,
    /// Headers skipped because the cache already had them
    pub already_cached: usize,
}

/// Appends signature headers, verifying the signing key first
pub struct SignatureImporter<'a> {
    service: &'a dyn BuildService,
    commit: bool,
}

impl<'a> SignatureImporter<'a> {
    pub fn new(service: &'a dyn BuildService, commit: bool) -> Self {
        Self { service, commit }
    }

    /// Import the headers of locally signed copies of `rpms`.
    ///
    /// All pairs are validated and all headers are read before the first
    /// remote call. No-op in dry-run mode.
    pub fn import(
        &self,
        rpms: &[PackageRef],
        local_paths: &[PathBuf],
        expected: &SigKey,
        known: &SignatureDirectory,
    ) -> Result<ImportOutcome, ImportError> {
        if !self.commit {
            return Ok(ImportOutcome::default());
        }

        if rpms.len() != local_paths.len() {
            return Err(ImportError::LengthMismatch {
                refs: rpms.len(),
                paths: local_paths.len(),
            });
        }
        for (rpm, path) in rpms.iter().zip(local_paths) {
            check_filename(rpm, path)?;
        }

        let mut headers = Vec::with_capacity(rpms.len());
        for (rpm, path) in rpms.iter().zip(local_paths) {
            let sighdr = read_header(path)?;
            check_key(rpm, &sighdr.1, expected)?;
            headers.push(sighdr.0);
        }

        let mut outcome = ImportOutcome::default();
        for (rpm, sighdr) in rpms.iter().zip(&headers) {
            if self.submit(rpm, sighdr, expected, known)? {
                outcome.imported += 1;
            } else {
                outcome.already_cached += 1;
            }
        }
        Ok(outcome)
    }

    /// Import one header already read from a signed main copy.
    ///
    /// Returns whether the header was appended. No-op in dry-run mode.
    pub fn import_header(
        &self,
        rpm: &PackageRef,
        sighdr: &[u8],
        sigkey: &SigKey,
        known: &SignatureDirectory,
    ) -> Result<bool, ImportError> {
        if !self.commit {
            return Ok(false);
        }
        self.submit(rpm, sighdr, sigkey, known)
    }

    fn submit(
        &self,
        rpm: &PackageRef,
        sighdr: &[u8],
        sigkey: &SigKey,
        known: &SignatureDirectory,
    ) -> Result<bool, ImportError> {
        if known.has(rpm.id, sigkey) {
            tracing::debug!("{} already cached for {}", rpm.nvra(), sigkey);
            return Ok(false);
        }
        self.service.add_rpm_sig(rpm, sighdr)?;
        tracing::debug!("imported {} signature for {}", sigkey, rpm.nvra());
        Ok(true)
    }
}

fn check_filename(rpm: &PackageRef, path: &Path) -> Result<(), ImportError> {
    let expected = rpm.filename();
    match path.file_name() {
        Some(name) if name == expected.as_str() => Ok(()),
        _ => Err(ImportError::FilenameMismatch {
            expected,
            actual: path.to_path_buf(),
        }),
    }
}

fn check_key(rpm: &PackageRef, actual: &str, expected: &SigKey) -> Result<(), ImportError> {
    if actual == expected.as_str() {
        Ok(())
    } else {
        Err(ImportError::WrongKey {
            nvra: rpm.nvra(),
            expected: expected.clone(),
            actual: actual.to_string(),
        })
    }
}

// staged copies are read fresh, never through the pass cache
fn read_header(path: &Path) -> Result<(Vec<u8>, String), InspectError> {
    let wrap = |source| InspectError {
        path: path.to_path_buf(),
        source,
    };
    let sighdr = rpm_sighdr::rip_sighdr(path).map_err(wrap)?;
    let sigkey = rpm_sighdr::header_key_id(&sighdr).map_err(wrap)?;
    Ok((sighdr, sigkey))
}
