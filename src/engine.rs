//! Single-test execution.
//!
//! The registry never runs a composed leaf itself: it hands it to an
//! [`ExecutionEngine`], which owns the invocation and turns it into a
//! [`TestReport`]. [`Reporter`] is the engine used by the service and CLI.

use std::time::Instant;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::{Deserialize, Serialize};

use crate::compose::ComposedLeaf;
use crate::handle::{Assertion, ExecutionContext, Failure, TestHandle};

/// Result of one invocation as delivered to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    pub name: String,
    pub passed: bool,
    pub duration_ms: u64,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    #[serde(default)]
    pub failures: Vec<Failure>,
}

impl TestReport {
    /// The failure that decided the verdict, if any.
    pub fn primary_failure(&self) -> Option<&Failure> {
        self.failures.first()
    }
}

/// Runs one composed leaf to completion.
///
/// Implementations must resolve exactly once per call and must not panic;
/// whatever happened during the run belongs in the report.
pub trait ExecutionEngine: Send + Sync {
    fn run(
        &self,
        name: String,
        leaf: ComposedLeaf,
        context: ExecutionContext,
    ) -> BoxFuture<'static, TestReport>;
}

/// Default engine: runs the leaf, times it and collects its assertions.
#[derive(Debug, Clone, Copy, Default)]
pub struct Reporter;

impl ExecutionEngine for Reporter {
    fn run(
        &self,
        name: String,
        leaf: ComposedLeaf,
        context: ExecutionContext,
    ) -> BoxFuture<'static, TestReport> {
        async move {
            let handle = TestHandle::new(name.clone(), context);
            let started = Instant::now();
            let outcome = leaf.run(handle.clone()).await;
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let assertions = handle.assertions();
            let passed = outcome.passed() && assertions.iter().all(|a| a.passed);
            if passed {
                tracing::info!(test = %name, duration_ms, "passed");
            } else {
                tracing::info!(
                    test = %name,
                    duration_ms,
                    failures = outcome.failures.len(),
                    "failed"
                );
            }

            TestReport {
                name,
                passed,
                duration_ms,
                assertions,
                failures: outcome.failures,
            }
        }
        .boxed()
    }
}
