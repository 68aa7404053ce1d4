//! Reconciliation report (reconcile_report.json)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::package::{PackageRef, RpmId, SigKey};

/// Schema version for reconcile_report.json
pub const REPORT_SCHEMA_VERSION: u32 = 1;

/// Schema identifier for reconcile_report.json
pub const REPORT_SCHEMA_ID: &str = "releng-sign/reconcile_report@1";

/// What a pass does for one package
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A signed copy already exists
    Skip,
    /// Materialize the signed copy from the cached header
    WriteFromCache,
    /// Register the main copy's signature, then write from cache
    ImportFromMainCopy,
    /// Stage, sign, import, then write from cache
    Sign,
}

impl Action {
    /// Steps the action expands to
    pub fn steps(self) -> &'static str {
        match self {
            Action::Skip => "SKIP",
            Action::WriteFromCache => "WRITE-FROM-CACHE",
            Action::ImportFromMainCopy => "IMPORT-FROM-MAIN-COPY -> WRITE-FROM-CACHE",
            Action::Sign => "STAGE -> SIGN -> IMPORT -> WRITE-FROM-CACHE",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.steps())
    }
}

/// Planned action for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageAction {
    pub rpm_id: RpmId,
    pub nvra: String,
    pub action: Action,
    /// Key the action works with, when it has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sigkey: Option<SigKey>,
}

/// Number of packages per action
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCounts {
    pub skip: usize,
    pub write_from_cache: usize,
    pub import_from_main_copy: usize,
    pub sign: usize,
}

/// Mutations actually carried out (all zero in dry-run mode)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Performed {
    /// Signed copies materialized from cache
    pub signed_copies_written: usize,
    /// Headers appended to the signature cache
    pub signatures_imported: usize,
    /// Calls made to the signer
    pub signer_invocations: usize,
    /// Signing batches processed
    pub batches: usize,
}

/// Reconciliation report (reconcile_report.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Schema version
    pub schema_version: u32,

    /// Schema identifier
    pub schema_id: String,

    /// When the report was created
    pub created_at: DateTime<Utc>,

    /// False for dry runs
    pub committed: bool,

    pub just_sign: bool,

    pub just_write: bool,

    /// Accepted keys, highest priority first
    pub keys: Vec<SigKey>,

    pub build_count: usize,

    pub rpm_count: usize,

    /// Planned action per package, in input order
    pub actions: Vec<PackageAction>,

    pub counts: ActionCounts,

    pub performed: Performed,

    /// Wall-clock duration of the pass in milliseconds
    pub duration_ms: u64,
}

impl ReconcileReport {
    pub fn new(keys: Vec<SigKey>, committed: bool, just_sign: bool, just_write: bool) -> Self {
        Self {
            schema_version: REPORT_SCHEMA_VERSION,
            schema_id: REPORT_SCHEMA_ID.to_string(),
            created_at: Utc::now(),
            committed,
            just_sign,
            just_write,
            keys,
            build_count: 0,
            rpm_count: 0,
            actions: Vec::new(),
            counts: ActionCounts::default(),
            performed: Performed::default(),
            duration_ms: 0,
        }
    }

    /// Record the planned action for `rpm`.
    pub fn push(&mut self, rpm: &PackageRef, action: Action, sigkey: Option<&SigKey>) {
        match action {
            Action::Skip => self.counts.skip += 1,
            Action::WriteFromCache => self.counts.write_from_cache += 1,
            Action::ImportFromMainCopy => self.counts.import_from_main_copy += 1,
            Action::Sign => self.counts.sign += 1,
        }
        self.actions.push(PackageAction {
            rpm_id: rpm.id,
            nvra: rpm.nvra(),
            action,
            sigkey: sigkey.cloned(),
        });
    }

    /// Planned action for a package id
    pub fn action_for(&self, rpm_id: RpmId) -> Option<Action> {
        self.actions.iter().find(|a| a.rpm_id == rpm_id).map(|a| a.action)
    }

    /// Sort actions back into the order of `rpms`.
    pub fn order_by(&mut self, rpms: &[PackageRef]) {
        let position = |id: RpmId| rpms.iter().position(|r| r.id == id).unwrap_or(usize::MAX);
        self.actions.sort_by_key(|a| position(a.rpm_id));
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Human-readable summary
    pub fn summary_lines(&self) -> Vec<String> {
        let mode = if self.committed { "commit" } else { "dry run" };
        vec![
            format!("Reconciliation ({}) over {} RPM(s) from {} build(s)", mode, self.rpm_count, self.build_count),
            format!("  skip:                  {}", self.counts.skip),
            format!("  write from cache:      {}", self.counts.write_from_cache),
            format!("  import from main copy: {}", self.counts.import_from_main_copy),
            format!("  sign:                  {}", self.counts.sign),
            format!(
                "  performed: {} written, {} imported, {} signer call(s) in {} batch(es)",
                self.performed.signed_copies_written,
                self.performed.signatures_imported,
                self.performed.signer_invocations,
                self.performed.batches
            ),
            format!("  duration: {} ms", self.duration_ms),
        ]
    }
}
