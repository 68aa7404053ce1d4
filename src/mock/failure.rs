//! Failure injection for build service calls
//!
//! Supports configurable failures per operation for testing error paths.

use std::collections::HashMap;
use std::fmt;

/// Build service operations that can be counted or failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOp {
    Login,
    ListTagged,
    ListBuilds,
    QuerySigs,
    WriteSigned,
    AddSig,
}

impl fmt::Display for ServiceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Login => "login",
            Self::ListTagged => "listTaggedRPMs",
            Self::ListBuilds => "listBuildRPMs",
            Self::QuerySigs => "queryRPMSigs",
            Self::WriteSigned => "writeSignedRPM",
            Self::AddSig => "addRPMSig",
        };
        f.write_str(name)
    }
}

/// Failure configuration for an operation
#[derive(Debug, Clone)]
pub struct FailureConfig {
    /// Error message to return
    pub message: String,
    /// Number of times to fail before succeeding (None = always fail)
    pub fail_count: Option<u32>,
}

impl FailureConfig {
    /// Create a config that always fails with `message`
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            fail_count: None,
        }
    }

    /// Set the number of times to fail before succeeding
    pub fn with_fail_count(mut self, count: u32) -> Self {
        self.fail_count = Some(count);
        self
    }
}

/// Failure injector keyed by operation
#[derive(Debug, Default)]
pub struct FailureInjector {
    configs: HashMap<ServiceOp, FailureConfig>,
    call_counts: HashMap<ServiceOp, u32>,
}

impl FailureInjector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inject a failure for an operation
    pub fn inject(&mut self, op: ServiceOp, config: FailureConfig) {
        self.configs.insert(op, config);
        self.call_counts.insert(op, 0);
    }

    /// Inject a permanent error for an operation
    pub fn inject_error(&mut self, op: ServiceOp, message: impl Into<String>) {
        self.inject(op, FailureConfig::error(message));
    }

    /// Clear all failure injections
    pub fn clear(&mut self) {
        self.configs.clear();
        self.call_counts.clear();
    }

    /// Returns the failure to report for this call, if any
    pub fn check(&mut self, op: ServiceOp) -> Option<&FailureConfig> {
        let config = self.configs.get(&op)?;
        let count = self.call_counts.entry(op).or_insert(0);
        *count += 1;

        match config.fail_count {
            Some(limit) if *count > limit => None,
            _ => Some(config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_injector_basic() {
        let mut injector = FailureInjector::new();
        assert!(injector.check(ServiceOp::QuerySigs).is_none());

        injector.inject_error(ServiceOp::WriteSigned, "multicall failed");
        let config = injector.check(ServiceOp::WriteSigned);
        assert_eq!(config.map(|c| c.message.as_str()), Some("multicall failed"));
    }

    #[test]
    fn test_failure_injector_fail_count() {
        let mut injector = FailureInjector::new();
        injector.inject(ServiceOp::AddSig, FailureConfig::error("busy").with_fail_count(2));

        assert!(injector.check(ServiceOp::AddSig).is_some());
        assert!(injector.check(ServiceOp::AddSig).is_some());
        assert!(injector.check(ServiceOp::AddSig).is_none());
    }

    #[test]
    fn test_failure_injector_clear() {
        let mut injector = FailureInjector::new();
        injector.inject_error(ServiceOp::Login, "no ticket");
        injector.clear();
        assert!(injector.check(ServiceOp::Login).is_none());
    }

    #[test]
    fn test_op_names() {
        assert_eq!(ServiceOp::AddSig.to_string(), "addRPMSig");
        assert_eq!(ServiceOp::WriteSigned.to_string(), "writeSignedRPM");
    }
}
