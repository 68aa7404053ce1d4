//! Cached signature lookup table
//!
//! `{rpm id -> {key -> sighash}}`, read with one batched service call.

use std::collections::{BTreeMap, HashMap};

use crate::package::{PackageRef, RpmId, SigKey, SigKeys};
use crate::service::{BuildService, ServiceResult};

use super::prober::Partition;

/// Signature cache contents for a set of RPMs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignatureDirectory {
    by_rpm: HashMap<RpmId, BTreeMap<SigKey, String>>,
}

impl SignatureDirectory {
    /// Query cached signatures for `rpms` in a single round trip.
    pub fn read(service: &dyn BuildService, rpms: &[PackageRef]) -> ServiceResult<Self> {
        if rpms.is_empty() {
            return Ok(Self::default());
        }

        let ids: Vec<RpmId> = rpms.iter().map(|r| r.id).collect();
        let mut directory = Self::default();
        for entry in service.query_rpm_sigs(&ids)?.into_iter().flatten() {
            directory.insert(entry.rpm_id, entry.sigkey, entry.sighash);
        }
        Ok(directory)
    }

    pub fn insert(&mut self, rpm_id: RpmId, sigkey: SigKey, sighash: String) {
        self.by_rpm
            .entry(rpm_id)
            .or_default()
            .insert(sigkey, sighash);
    }

    /// Cached signatures of one RPM; empty when nothing is cached.
    pub fn signatures(&self, rpm_id: RpmId) -> impl Iterator<Item = (&SigKey, &String)> {
        self.by_rpm.get(&rpm_id).into_iter().flatten()
    }

    pub fn has(&self, rpm_id: RpmId, sigkey: &SigKey) -> bool {
        self.by_rpm
            .get(&rpm_id)
            .map_or(false, |sigs| sigs.contains_key(sigkey))
    }

    /// Highest-priority accepted key with a cached signature
    pub fn best_key<'k>(&self, rpm_id: RpmId, keys: &'k SigKeys) -> Option<&'k SigKey> {
        keys.iter().find(|k| self.has(rpm_id, k))
    }

    /// Split into (cached for an accepted key, not cached), order preserved.
    pub fn partition_cached(&self, rpms: &[PackageRef], keys: &SigKeys) -> Partition {
        let (matched, unmatched) = rpms
            .iter()
            .cloned()
            .partition(|rpm| self.best_key(rpm.id, keys).is_some());
        Partition { matched, unmatched }
    }

    /// Number of RPMs with at least one cached signature
    pub fn len(&self) -> usize {
        self.by_rpm.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_rpm.is_empty()
    }
}
