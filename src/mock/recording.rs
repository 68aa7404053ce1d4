//! Call-recording build service wrapper

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::failure::{FailureConfig, FailureInjector, ServiceOp};
use crate::layout::PathInfo;
use crate::package::{PackageRef, RpmId, SigKey};
use crate::service::{BuildService, ServiceError, ServiceResult, SignatureEntry};

/// One `write_signed_rpms` batch as seen by the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub sigkey: SigKey,
    pub rpm_ids: Vec<RpmId>,
}

#[derive(Debug, Default)]
struct Journal {
    calls: HashMap<ServiceOp, usize>,
    writes: Vec<RecordedWrite>,
    added: Vec<RpmId>,
}

/// Wraps a build service, recording every call
pub struct RecordingService<S> {
    inner: S,
    journal: Mutex<Journal>,
    failures: Mutex<FailureInjector>,
}

impl<S: BuildService> RecordingService<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            journal: Mutex::new(Journal::default()),
            failures: Mutex::new(FailureInjector::new()),
        }
    }

    /// The wrapped service
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Fail `op` according to `config`
    pub fn inject(&self, op: ServiceOp, config: FailureConfig) {
        self.failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .inject(op, config);
    }

    /// Number of calls made to `op`, failed ones included
    pub fn calls(&self, op: ServiceOp) -> usize {
        self.journal().calls.get(&op).copied().unwrap_or(0)
    }

    /// Successful write batches in call order
    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.journal().writes.clone()
    }

    /// RPM ids whose signature was appended, in call order
    pub fn added_signatures(&self) -> Vec<RpmId> {
        self.journal().added.clone()
    }

    /// Forget all recorded calls
    pub fn reset(&self) {
        *self.journal() = Journal::default();
    }

    fn journal(&self) -> MutexGuard<'_, Journal> {
        self.journal.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Count the call and report an injected failure, if any
    fn enter(&self, op: ServiceOp) -> ServiceResult<()> {
        *self.journal().calls.entry(op).or_insert(0) += 1;
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        match failures.check(op) {
            Some(config) => Err(ServiceError::Remote(format!("{}: {}", op, config.message))),
            None => Ok(()),
        }
    }
}

impl<S: BuildService> BuildService for RecordingService<S> {
    fn login(&self) -> ServiceResult<()> {
        self.enter(ServiceOp::Login)?;
        self.inner.login()
    }

    fn path_info(&self) -> &PathInfo {
        self.inner.path_info()
    }

    fn list_tagged_rpms(&self, tag: &str, latest: bool, inherit: bool) -> ServiceResult<Vec<PackageRef>> {
        self.enter(ServiceOp::ListTagged)?;
        self.inner.list_tagged_rpms(tag, latest, inherit)
    }

    fn list_build_rpms(&self, nvrs: &[String]) -> ServiceResult<Vec<PackageRef>> {
        self.enter(ServiceOp::ListBuilds)?;
        self.inner.list_build_rpms(nvrs)
    }

    fn query_rpm_sigs(&self, rpm_ids: &[RpmId]) -> ServiceResult<Vec<Vec<SignatureEntry>>> {
        self.enter(ServiceOp::QuerySigs)?;
        self.inner.query_rpm_sigs(rpm_ids)
    }

    fn write_signed_rpms(&self, rpms: &[PackageRef], sigkey: &SigKey) -> ServiceResult<()> {
        self.enter(ServiceOp::WriteSigned)?;
        self.inner.write_signed_rpms(rpms, sigkey)?;
        self.journal().writes.push(RecordedWrite {
            sigkey: sigkey.clone(),
            rpm_ids: rpms.iter().map(|r| r.id).collect(),
        });
        Ok(())
    }

    fn add_rpm_sig(&self, rpm: &PackageRef, sighdr: &[u8]) -> ServiceResult<()> {
        self.enter(ServiceOp::AddSig)?;
        self.inner.add_rpm_sig(rpm, sighdr)?;
        self.journal().added.push(rpm.id);
        Ok(())
    }
}
