//! Build service seam
//!
//! The signing engine talks to the build service only through
//! [`BuildService`]. Every method is a single round trip; batch methods either
//! apply to every item or to none.
//!
//! - [`LocalBuildService`]: a build-service topdir on a local or shared mount
//! - [`crate::mock::RecordingService`]: call counting and failure injection

mod local;

use std::io;
use std::process::Command;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::layout::PathInfo;
use crate::package::{PackageRef, RpmId, SigKey};

pub use local::{Catalog, CatalogBuild, CatalogRpm, CatalogTag, LocalBuildService, SignatureRow, CATALOG_FILE};

/// One cached signature as reported by the build service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignatureEntry {
    pub rpm_id: RpmId,
    pub sigkey: SigKey,
    pub sighash: String,
}

/// Build service errors
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("unknown tag: {0}")]
    UnknownTag(String),

    #[error("unknown build: {0}")]
    UnknownBuild(String),

    #[error("unknown rpm id: {0}")]
    UnknownRpm(RpmId),

    #[error("no cached signature for {nvra} with key '{sigkey}'")]
    NoCachedSignature { nvra: String, sigkey: SigKey },

    #[error("signature for {nvra} with key '{sigkey}' already exists")]
    DuplicateSignature { nvra: String, sigkey: SigKey },

    #[error("header for {nvra} carries no signature")]
    UnsignedHeader { nvra: String },

    #[error("invalid signature header: {0}")]
    Header(#[from] rpm_sighdr::SigHdrError),

    #[error("catalog error: {0}")]
    Catalog(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("remote call failed: {0}")]
    Remote(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Query and mutation capability of the build service
pub trait BuildService: Send + Sync {
    /// Exchange credentials; called once before any other call.
    fn login(&self) -> ServiceResult<()> {
        Ok(())
    }

    /// Layout rules of the service's artifact storage
    fn path_info(&self) -> &PathInfo;

    /// RPMs of builds tagged into `tag`.
    ///
    /// `latest` keeps only the newest build per package; `inherit` follows the
    /// tag's parents.
    fn list_tagged_rpms(&self, tag: &str, latest: bool, inherit: bool) -> ServiceResult<Vec<PackageRef>>;

    /// RPMs of the given builds (`name-version-release`); unknown builds fail.
    fn list_build_rpms(&self, nvrs: &[String]) -> ServiceResult<Vec<PackageRef>>;

    /// Cached signatures, one list per requested id, in request order.
    fn query_rpm_sigs(&self, rpm_ids: &[RpmId]) -> ServiceResult<Vec<Vec<SignatureEntry>>>;

    /// Materialize signed copies from cached headers.
    fn write_signed_rpms(&self, rpms: &[PackageRef], sigkey: &SigKey) -> ServiceResult<()>;

    /// Append a signature header to the cache; the key is read from the header.
    fn add_rpm_sig(&self, rpm: &PackageRef, sighdr: &[u8]) -> ServiceResult<()>;
}

/// How a session authenticates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMode {
    /// No credential exchange
    #[default]
    None,
    /// Requires a valid Kerberos ticket
    Kerberos,
}

impl AuthMode {
    /// Check that the credentials this mode needs are present.
    pub fn check(self) -> ServiceResult<()> {
        match self {
            AuthMode::None => Ok(()),
            AuthMode::Kerberos => {
                let status = Command::new("klist")
                    .arg("-s")
                    .status()
                    .map_err(|e| ServiceError::Auth(format!("failed to run klist: {}", e)))?;
                if status.success() {
                    Ok(())
                } else {
                    Err(ServiceError::Auth("no valid Kerberos ticket (run kinit)".to_string()))
                }
            }
        }
    }
}
