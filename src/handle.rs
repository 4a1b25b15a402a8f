//! The per-invocation test object.
//!
//! Every hook and test body receives a [`TestHandle`]. It carries the
//! execution context supplied by the remote caller, a fixture map shared by
//! the hooks and the body of one invocation, and the assertion log the
//! execution engine turns into a report.

use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ambient data attached to one invocation by the caller.
pub type ExecutionContext = Value;

// =====================
// Failures
// =====================

/// Stage of a composed test in which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    SetUp,
    Body,
    TearDown,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Phase::SetUp => "setUp",
            Phase::Body => "test",
            Phase::TearDown => "tearDown",
        };
        f.write_str(name)
    }
}

/// A failed hook or test body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct Failure {
    pub message: String,
    pub phase: Phase,
    /// Dotted path of the group whose hook failed; `None` for the body and
    /// for hooks declared at module level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default)]
    pub panicked: bool,
}

impl Failure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            phase: Phase::Body,
            scope: None,
            panicked: false,
        }
    }

    pub(crate) fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "test panicked with a non-string payload".to_string()
        };
        Self {
            panicked: true,
            ..Self::new(message)
        }
    }

    /// Tags the failure with the stage and group it was raised in.
    pub(crate) fn during(mut self, phase: Phase, scope: &str) -> Self {
        self.phase = phase;
        self.scope = (!scope.is_empty()).then(|| scope.to_string());
        self
    }
}

// =====================
// Assertions
// =====================

/// One recorded assertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assertion {
    pub message: String,
    pub passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// =====================
// Handle
// =====================

#[derive(Debug)]
struct HandleState {
    name: String,
    context: ExecutionContext,
    assertions: Mutex<Vec<Assertion>>,
    fixtures: Mutex<HashMap<String, Value>>,
}

/// Cheaply cloneable handle passed to every hook and body of one invocation.
#[derive(Debug, Clone)]
pub struct TestHandle {
    state: Arc<HandleState>,
}

impl TestHandle {
    pub fn new(name: impl Into<String>, context: ExecutionContext) -> Self {
        Self {
            state: Arc::new(HandleState {
                name: name.into(),
                context,
                assertions: Mutex::new(Vec::new()),
                fixtures: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Full dotted name of the test being run.
    pub fn name(&self) -> &str {
        &self.state.name
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.state.context
    }

    /// Records an assertion and fails with `message` if `condition` is false.
    pub fn ok(&self, condition: bool, message: impl Into<String>) -> Result<(), Failure> {
        let message = message.into();
        self.record(Assertion {
            message: message.clone(),
            passed: condition,
            detail: None,
        });
        if condition {
            Ok(())
        } else {
            Err(Failure::new(message))
        }
    }

    /// Records an equality assertion.
    pub fn equal<T>(&self, actual: T, expected: T, message: impl Into<String>) -> Result<(), Failure>
    where
        T: PartialEq + Debug,
    {
        let message = message.into();
        let passed = actual == expected;
        let detail = (!passed).then(|| format!("expected {expected:?}, got {actual:?}"));
        self.record(Assertion {
            message: message.clone(),
            passed,
            detail: detail.clone(),
        });
        match detail {
            None => Ok(()),
            Some(detail) => Err(Failure::new(format!("{message}: {detail}"))),
        }
    }

    /// Assertions recorded so far, in order.
    pub fn assertions(&self) -> Vec<Assertion> {
        lock(&self.state.assertions).clone()
    }

    /// Stores a value for later hooks or the body of this invocation.
    pub fn set_fixture(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        lock(&self.state.fixtures).insert(key.into(), value)
    }

    pub fn fixture(&self, key: &str) -> Option<Value> {
        lock(&self.state.fixtures).get(key).cloned()
    }

    fn record(&self, assertion: Assertion) {
        lock(&self.state.assertions).push(assertion);
    }
}

// A test that panicked while holding the lock must not take the report down
// with it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
