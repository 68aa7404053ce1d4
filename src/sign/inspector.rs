//! Pass-scoped signature header inspection
//!
//! Reading a header means opening the package and parsing its signature
//! header, so results are memoized per path for one reconciliation pass.
//! Only successful reads are memoized.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rpm_sighdr::SigHdrError;
use thiserror::Error;

/// Signature header bytes and the key that produced them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SigInfo {
    /// Raw, padded signature header
    pub sighdr: Vec<u8>,
    /// Lowercase key id; empty when the package is unsigned
    pub sigkey: String,
}

/// Header could not be read or parsed
#[derive(Debug, Error)]
#[error("cannot read signature header of {path}: {source}")]
pub struct InspectError {
    pub path: PathBuf,
    #[source]
    pub source: SigHdrError,
}

/// Memoizing header reader, owned by a single pass
#[derive(Debug, Default)]
pub struct HeaderInspector {
    cache: Mutex<HashMap<PathBuf, Arc<SigInfo>>>,
}

impl HeaderInspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the signature header at `path` and extract its key id.
    pub fn inspect(&self, path: &Path) -> Result<Arc<SigInfo>, InspectError> {
        if let Some(hit) = self.lock().get(path) {
            return Ok(Arc::clone(hit));
        }

        let info = read_sig_info(path).map_err(|source| InspectError {
            path: path.to_path_buf(),
            source,
        })?;
        let info = Arc::new(info);
        self.lock()
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::clone(&info));
        Ok(info)
    }

    /// Key id at `path`, or `None` when the header is unreadable.
    pub fn sigkey_lenient(&self, path: &Path) -> Option<String> {
        match self.inspect(path) {
            Ok(info) => Some(info.sigkey.clone()),
            Err(e) => {
                tracing::debug!("{}", e);
                None
            }
        }
    }

    /// Number of memoized paths
    pub fn cached(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<SigInfo>>> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn read_sig_info(path: &Path) -> Result<SigInfo, SigHdrError> {
    let sighdr = rpm_sighdr::rip_sighdr(path)?;
    let sigkey = rpm_sighdr::header_key_id(&sighdr)?;
    Ok(SigInfo { sighdr, sigkey })
}
