//! Reconciliation report (reconcile_report.json)

mod report;

pub use report::{
    Action, ActionCounts, PackageAction, Performed, ReconcileReport, REPORT_SCHEMA_ID, REPORT_SCHEMA_VERSION,
};
