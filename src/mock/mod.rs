//! Test doubles for the build service
//!
//! [`RecordingService`] wraps any [`crate::service::BuildService`], counts
//! calls per operation and can fail selected operations before they reach
//! the wrapped service.

mod failure;
mod recording;

pub use failure::{FailureConfig, FailureInjector, ServiceOp};
pub use recording::{RecordingService, RecordedWrite};
