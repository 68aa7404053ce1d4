//! Reconciliation errors

use thiserror::Error;

use crate::package::EmptyKeyList;
use crate::service::{ServiceError, ServiceResult};

use super::importer::ImportError;
use super::inspector::InspectError;
use super::signer::SignerError;
use super::staging::StagingError;

/// A failed reconciliation, named by the phase that failed
#[derive(Debug, Error)]
pub enum SignError {
    #[error("just-sign and just-write are mutually exclusive")]
    ConflictingModes,

    #[error("{phase} failed: {source}")]
    Service {
        phase: &'static str,
        #[source]
        source: ServiceError,
    },

    #[error("reading main copy header failed: {0}")]
    Inspect(#[from] InspectError),

    #[error("staging failed: {0}")]
    Staging(#[from] StagingError),

    #[error("signing failed: {0}")]
    Signer(#[from] SignerError),

    #[error("signature import failed: {0}")]
    Import(#[from] ImportError),

    #[error("cannot start probe workers: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Keys(#[from] EmptyKeyList),
}

pub type SignResult<T> = Result<T, SignError>;

/// Tag a service error with the phase it happened in
pub(crate) trait InPhase<T> {
    fn in_phase(self, phase: &'static str) -> SignResult<T>;
}

impl<T> InPhase<T> for ServiceResult<T> {
    fn in_phase(self, phase: &'static str) -> SignResult<T> {
        self.map_err(|source| SignError::Service { phase, source })
    }
}
