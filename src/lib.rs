//! releng-sign - RPM signing reconciliation for a package build service
//!
//! Brings a set of built RPMs to a signed state: existing signed copies are
//! kept, cached signatures are materialized, signed main copies are adopted,
//! and only what remains is handed to a signer, in bounded batches.

pub mod config;
pub mod layout;
pub mod mock;
pub mod package;
pub mod request;
pub mod service;
pub mod sign;
pub mod summary;

pub use layout::PathInfo;
pub use package::{PackageRef, SigKey, SigKeys};
pub use service::{BuildService, LocalBuildService, ServiceError};
pub use sign::{ReconcileOptions, Reconciler, SignError};
pub use summary::{Action, ReconcileReport};
