//! Bounded-concurrency existence probing
//!
//! A fixed-size worker pool classifies packages by a predicate and joins
//! before returning. Output keeps input order within each side.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder};

use crate::layout::PathInfo;
use crate::package::{PackageRef, SigKey, SigKeys};

use super::inspector::HeaderInspector;

/// Default worker count
pub const DEFAULT_PARALLELISM: usize = 10;

/// Stable two-way split of a package list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub matched: Vec<PackageRef>,
    pub unmatched: Vec<PackageRef>,
}

impl Partition {
    pub fn len(&self) -> usize {
        self.matched.len() + self.unmatched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Worker pool used to run probe predicates
pub struct Prober {
    pool: ThreadPool,
    parallelism: usize,
}

impl Prober {
    /// Create a pool of `parallelism` workers (at least one).
    pub fn new(parallelism: usize) -> Result<Self, ThreadPoolBuildError> {
        let parallelism = parallelism.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(parallelism)
            .thread_name(|i| format!("probe-{}", i))
            .build()?;
        Ok(Self { pool, parallelism })
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Classify every package by `pred`; blocks until all are evaluated.
    pub fn partition<F>(&self, rpms: &[PackageRef], pred: F) -> Partition
    where
        F: Fn(&PackageRef) -> bool + Sync,
    {
        let verdicts: Vec<bool> = self
            .pool
            .install(|| rpms.par_iter().map(|rpm| pred(rpm)).collect());

        let mut out = Partition::default();
        for (rpm, matched) in rpms.iter().zip(verdicts) {
            if matched {
                out.matched.push(rpm.clone());
            } else {
                out.unmatched.push(rpm.clone());
            }
        }
        out
    }
}

/// First accepted key, in priority order, with a signed copy on disk
pub fn signed_copy_key<'k>(paths: &PathInfo, rpm: &PackageRef, keys: &'k SigKeys) -> Option<&'k SigKey> {
    keys.iter().find(|key| paths.locate(rpm, Some(key)).is_file())
}

/// A signed copy exists for some accepted key.
pub fn has_signed_copy(paths: &PathInfo, rpm: &PackageRef, keys: &SigKeys) -> bool {
    signed_copy_key(paths, rpm, keys).is_some()
}

/// The main copy is signed with an accepted key.
///
/// Unreadable headers count as unsigned.
pub fn main_copy_signed(inspector: &HeaderInspector, paths: &PathInfo, rpm: &PackageRef, keys: &SigKeys) -> bool {
    match inspector.sigkey_lenient(&paths.locate(rpm, None)) {
        Some(key) if !key.is_empty() => {
            let accepted = keys.contains(&key);
            if !accepted {
                tracing::debug!("{} main copy signed with unaccepted key {}", rpm.nvra(), key);
            }
            accepted
        }
        _ => false,
    }
}
