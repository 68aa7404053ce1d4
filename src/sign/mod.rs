//! RPM signing reconciliation engine
//!
//! Leaf-first:
//! - [`inspector`]: pass-scoped signature header reads
//! - [`directory`]: cached signature lookup
//! - [`prober`]: bounded worker pool classification
//! - [`batch`]: size and count bounded chunking
//! - [`staging`]: scratch workspaces and signer invocation
//! - [`importer`]: verified signature cache appends
//! - [`reconcile`]: the orchestrating pass

pub mod batch;
pub mod directory;
mod error;
pub mod importer;
pub mod inspector;
pub mod prober;
pub mod reconcile;
pub mod signer;
pub mod staging;

pub use batch::{split_batches, BatchLimits, Batches};
pub use directory::SignatureDirectory;
pub use error::{SignError, SignResult};
pub use importer::{ImportError, ImportOutcome, SignatureImporter};
pub use inspector::{HeaderInspector, InspectError, SigInfo};
pub use prober::{Partition, Prober, DEFAULT_PARALLELISM};
pub use reconcile::{Plan, ReconcileOptions, Reconciler};
pub use signer::{RpmResignSigner, Signer, SignerContext, SignerError, SignerRegistry, RPM_RESIGN};
pub use staging::{Stager, StagingError, Workspace};
