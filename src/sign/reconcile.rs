//! Reconciliation pass
//!
//! Brings a package set to a signed state. Every package gets exactly one
//! action, chosen in priority order:
//!
//! 1. a signed copy exists for an accepted key: skip
//! 2. the signature cache holds an accepted key: write from cache
//! 3. the main copy is signed with an accepted key: import it, then write
//! 4. otherwise: stage, sign, import and write, in bounded batches
//!
//! The whole plan is computed from one read snapshot before the first
//! mutation. Dry runs compute the same plan and mutate nothing.

use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info};

use crate::package::{count_builds, PackageRef, SigKey, SigKeys};
use crate::service::BuildService;
use crate::summary::{Action, ReconcileReport};

use super::batch::{split_batches, BatchLimits};
use super::directory::SignatureDirectory;
use super::error::{InPhase, SignError, SignResult};
use super::importer::SignatureImporter;
use super::inspector::HeaderInspector;
use super::prober::{has_signed_copy, main_copy_signed, Prober, DEFAULT_PARALLELISM};
use super::signer::Signer;
use super::staging::Stager;

/// Mode switches for one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Sign and import only; never write signed copies
    pub just_sign: bool,
    /// Write from cache only; never invoke the signer
    pub just_write: bool,
    /// Apply changes; false is a dry run
    pub commit: bool,
}

impl ReconcileOptions {
    pub fn validate(&self) -> SignResult<()> {
        if self.just_sign && self.just_write {
            return Err(SignError::ConflictingModes);
        }
        Ok(())
    }
}

/// Classified package set
#[derive(Debug, Clone, Default)]
pub struct Plan {
    pub skip: Vec<PackageRef>,
    /// Packages and the cached key their copy is written with
    pub write_from_cache: Vec<(PackageRef, SigKey)>,
    /// Packages and the key found in their main copy
    pub import_from_main: Vec<(PackageRef, SigKey)>,
    pub sign: Vec<PackageRef>,
    /// Signature snapshot the plan was computed from
    pub directory: SignatureDirectory,
}

impl Plan {
    pub fn len(&self) -> usize {
        self.skip.len() + self.write_from_cache.len() + self.import_from_main.len() + self.sign.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Drives reconciliation passes against one build service
pub struct Reconciler<'a> {
    service: &'a dyn BuildService,
    signer: Arc<dyn Signer>,
    prober: Prober,
    limits: BatchLimits,
    scratch_root: PathBuf,
}

impl<'a> Reconciler<'a> {
    pub fn new(service: &'a dyn BuildService, signer: Arc<dyn Signer>) -> SignResult<Self> {
        Ok(Self {
            service,
            signer,
            prober: Prober::new(DEFAULT_PARALLELISM)?,
            limits: BatchLimits::default(),
            scratch_root: std::env::temp_dir(),
        })
    }

    /// Use `parallelism` probe workers.
    pub fn with_parallelism(mut self, parallelism: usize) -> SignResult<Self> {
        self.prober = Prober::new(parallelism)?;
        Ok(self)
    }

    pub fn with_limits(mut self, limits: BatchLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Create scratch workspaces under `root`.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    /// Split `rpms` into (has a signed copy for some key, has none).
    pub fn classify(&self, rpms: &[PackageRef], keys: &SigKeys) -> (Vec<PackageRef>, Vec<PackageRef>) {
        let paths = self.service.path_info();
        let split = self.prober.partition(rpms, |rpm| has_signed_copy(paths, rpm, keys));
        (split.matched, split.unmatched)
    }

    /// Compute the action for every package without changing anything.
    pub fn plan(&self, rpms: &[PackageRef], keys: &SigKeys) -> SignResult<Plan> {
        self.plan_with(rpms, keys, &HeaderInspector::new())
    }

    fn plan_with(&self, rpms: &[PackageRef], keys: &SigKeys, inspector: &HeaderInspector) -> SignResult<Plan> {
        let paths = self.service.path_info();

        info!("Reading known package signatures");
        let directory = SignatureDirectory::read(self.service, rpms).in_phase("reading package signatures")?;

        let cached = directory.partition_cached(rpms, keys);
        info!("RPMs with cached signature:    {}", cached.matched.len());
        info!("RPMs without cached signature: {}", cached.unmatched.len());

        let signed = self
            .prober
            .partition(&cached.matched, |rpm| has_signed_copy(paths, rpm, keys));
        info!("RPMs with cached signature and signed RPM:   {}", signed.matched.len());
        info!("RPMs with cached signature and unsigned RPM: {}", signed.unmatched.len());

        info!("Looking for signed main copies");
        let main = self
            .prober
            .partition(&cached.unmatched, |rpm| main_copy_signed(inspector, paths, rpm, keys));
        info!("RPMs with signed main copies:    {}", main.matched.len());
        info!("RPMs without signed main copies: {}", main.unmatched.len());

        let mut write_from_cache = Vec::with_capacity(signed.unmatched.len());
        for rpm in signed.unmatched {
            let key = write_key(&directory, &rpm, keys);
            write_from_cache.push((rpm, key));
        }

        let mut import_from_main = Vec::with_capacity(main.matched.len());
        for rpm in main.matched {
            // memoized by the probe
            let info = inspector.inspect(&paths.locate(&rpm, None))?;
            let key = SigKey::new(&info.sigkey);
            import_from_main.push((rpm, key));
        }

        let plan = Plan {
            skip: signed.matched,
            write_from_cache,
            import_from_main,
            sign: main.unmatched,
            directory,
        };
        for rpm in &plan.skip {
            debug!("{}: {}", rpm.nvra(), Action::Skip);
        }
        for (rpm, key) in &plan.write_from_cache {
            debug!("{}: {} ({})", rpm.nvra(), Action::WriteFromCache, key);
        }
        for (rpm, key) in &plan.import_from_main {
            debug!("{}: {} ({})", rpm.nvra(), Action::ImportFromMainCopy, key);
        }
        for rpm in &plan.sign {
            debug!("{}: {}", rpm.nvra(), Action::Sign);
        }
        Ok(plan)
    }

    /// Run one reconciliation pass over `rpms`.
    pub fn reconcile(&self, rpms: &[PackageRef], keys: &SigKeys, opts: ReconcileOptions) -> SignResult<ReconcileReport> {
        opts.validate()?;
        let started = Instant::now();
        let commit = opts.commit;
        let primary = keys.primary();
        let paths = self.service.path_info();

        let mut report = ReconcileReport::new(keys.iter().cloned().collect(), commit, opts.just_sign, opts.just_write);
        report.build_count = count_builds(rpms);
        report.rpm_count = rpms.len();
        info!("Builds found: {}", report.build_count);
        info!("RPMs found:   {}", report.rpm_count);

        let inspector = HeaderInspector::new();
        let plan = self.plan_with(rpms, keys, &inspector)?;
        record_plan(&mut report, &plan);
        report.order_by(rpms);

        let importer = SignatureImporter::new(self.service, commit);

        // write from cache
        if !opts.just_sign {
            announce(commit, "Writing RPMs from sigcache");
            if plan.write_from_cache.is_empty() {
                info!("- Nothing to do");
            }
            for key in keys.iter() {
                let group: Vec<PackageRef> = plan
                    .write_from_cache
                    .iter()
                    .filter(|(_, k)| k == key)
                    .map(|(rpm, _)| rpm.clone())
                    .collect();
                report.performed.signed_copies_written += self.write_signed(&group, key, commit)?;
            }
        }

        // writes above may have populated cache entries the imports depend on
        info!("Reading known package signatures (refresh)");
        let directory = SignatureDirectory::read(self.service, rpms).in_phase("refreshing package signatures")?;

        if !plan.import_from_main.is_empty() {
            announce(commit, "Importing signed RPMs from main copies");
        }
        for (rpm, key) in &plan.import_from_main {
            let info = inspector.inspect(&paths.locate(rpm, None))?;
            if importer.import_header(rpm, &info.sighdr, key, &directory)? {
                report.performed.signatures_imported += 1;
            }
            if !opts.just_sign {
                report.performed.signed_copies_written += self.write_signed(std::slice::from_ref(rpm), key, commit)?;
            }
        }

        if !opts.just_write {
            announce(commit, "Signing and importing RPMs");
            if plan.sign.is_empty() {
                info!("- Nothing to do");
            }
            let stager = Stager::new(&self.scratch_root, commit);
            let mut signed_count = 0;
            for chunk in split_batches(&plan.sign, self.limits) {
                let workspace = stager.stage(paths, chunk)?;
                if workspace.is_some() {
                    report.performed.signer_invocations += 1;
                }
                stager.invoke_signer(self.signer.as_ref(), primary, workspace.as_ref())?;

                let local_paths = workspace.as_ref().map(|ws| ws.files().to_vec()).unwrap_or_default();
                let outcome = importer.import(chunk, &local_paths, primary, &directory)?;
                report.performed.signatures_imported += outcome.imported;
                stager.cleanup(workspace)?;

                if !opts.just_sign {
                    report.performed.signed_copies_written += self.write_signed(chunk, primary, commit)?;
                }

                signed_count += chunk.len();
                if commit {
                    report.performed.batches += 1;
                }
                announce(commit, format!("Signed {}/{} RPMs", signed_count, plan.sign.len()));
            }
        }

        announce(commit, "All RPMs signed.");
        report.duration_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }

    // one batched call; returns the number of copies written
    fn write_signed(&self, rpms: &[PackageRef], key: &SigKey, commit: bool) -> SignResult<usize> {
        if rpms.is_empty() || !commit {
            return Ok(0);
        }
        self.service
            .write_signed_rpms(rpms, key)
            .in_phase("writing signed copies")?;
        Ok(rpms.len())
    }
}

/// Key a cached package is written with: the primary key when cached,
/// otherwise the best cached accepted key.
fn write_key(directory: &SignatureDirectory, rpm: &PackageRef, keys: &SigKeys) -> SigKey {
    directory
        .best_key(rpm.id, keys)
        .unwrap_or_else(|| keys.primary())
        .clone()
}

fn record_plan(report: &mut ReconcileReport, plan: &Plan) {
    for rpm in &plan.skip {
        report.push(rpm, Action::Skip, None);
    }
    for (rpm, key) in &plan.write_from_cache {
        report.push(rpm, Action::WriteFromCache, Some(key));
    }
    for (rpm, key) in &plan.import_from_main {
        report.push(rpm, Action::ImportFromMainCopy, Some(key));
    }
    for rpm in &plan.sign {
        report.push(rpm, Action::Sign, None);
    }
}

/// Log a progress line, marked as a dry run when not committing.
fn announce(commit: bool, msg: impl Display) {
    if commit {
        info!("{}", msg);
    } else {
        info!("[TEST] {}", msg);
    }
}
