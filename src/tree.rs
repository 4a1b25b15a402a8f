//! Test tree data model.
//!
//! A test module is a [`TestGroup`]: an ordered mapping from names to either
//! a runnable leaf or a nested group. A group may also declare a `setUp` and
//! a `tearDown` hook which are inherited by everything below it. The shape
//! of a node is fixed when it is built, never inferred while walking.

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::{self, BoxFuture};
use futures_util::FutureExt;

use crate::handle::{Failure, TestHandle};

/// Reserved key under which a group declares its setUp hook.
pub const SET_UP: &str = "setUp";
/// Reserved key under which a group declares its tearDown hook.
pub const TEAR_DOWN: &str = "tearDown";

/// What a hook or a test body resolves to.
pub type TestResult = Result<(), Failure>;

type BoxedTestFn = dyn Fn(TestHandle) -> BoxFuture<'static, TestResult> + Send + Sync;

// =====================
// Test functions
// =====================

/// A shareable asynchronous test body or hook.
///
/// The function resolves exactly once. Panics raised while it is called or
/// polled are caught by [`TestFn::call`] and reported as a [`Failure`].
#[derive(Clone)]
pub struct TestFn(Arc<BoxedTestFn>);

impl TestFn {
    /// Wraps an async closure.
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(TestHandle) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = TestResult> + Send + 'static,
    {
        Self(Arc::new(move |handle| f(handle).boxed()))
    }

    /// Wraps a closure that completes synchronously.
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(&TestHandle) -> TestResult + Send + Sync + 'static,
    {
        Self(Arc::new(move |handle| future::ready(f(&handle)).boxed()))
    }

    /// Runs the function to completion, converting panics into failures.
    pub async fn call(&self, handle: TestHandle) -> TestResult {
        let pending = match std::panic::catch_unwind(AssertUnwindSafe(|| (self.0)(handle))) {
            Ok(pending) => pending,
            Err(payload) => return Err(Failure::from_panic(payload.as_ref())),
        };
        match AssertUnwindSafe(pending).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => Err(Failure::from_panic(payload.as_ref())),
        }
    }
}

impl fmt::Debug for TestFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("TestFn(..)")
    }
}

// =====================
// Tree nodes
// =====================

#[derive(Debug, Clone)]
pub enum TestNode {
    Leaf(TestFn),
    Group(TestGroup),
}

/// A named collection of tests and subgroups with optional hooks.
#[derive(Debug, Clone, Default)]
pub struct TestGroup {
    entries: Vec<(String, TestNode)>,
    set_up: Option<TestFn>,
    tear_down: Option<TestFn>,
}

/// A loaded test module is simply its root group.
pub type TestTree = TestGroup;

impl TestGroup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node under `name`, replacing an existing entry in place.
    ///
    /// A leaf inserted under [`SET_UP`] or [`TEAR_DOWN`] becomes the group's
    /// hook instead of a test. Returns the node previously stored there.
    pub fn insert(&mut self, name: impl Into<String>, node: TestNode) -> Option<TestNode> {
        let name = name.into();
        let node = match (name.as_str(), node) {
            (SET_UP, TestNode::Leaf(hook)) => {
                return self.set_up.replace(hook).map(TestNode::Leaf);
            }
            (TEAR_DOWN, TestNode::Leaf(hook)) => {
                return self.tear_down.replace(hook).map(TestNode::Leaf);
            }
            (_, node) => node,
        };

        if let Some(slot) = self.entries.iter_mut().find(|(key, _)| *key == name) {
            return Some(std::mem::replace(&mut slot.1, node));
        }
        self.entries.push((name, node));
        None
    }

    pub fn with_test(mut self, name: impl Into<String>, test: TestFn) -> Self {
        self.insert(name, TestNode::Leaf(test));
        self
    }

    pub fn with_group(mut self, name: impl Into<String>, group: TestGroup) -> Self {
        self.insert(name, TestNode::Group(group));
        self
    }

    pub fn with_set_up(mut self, hook: TestFn) -> Self {
        self.set_up = Some(hook);
        self
    }

    pub fn with_tear_down(mut self, hook: TestFn) -> Self {
        self.tear_down = Some(hook);
        self
    }

    pub fn set_up(&self) -> Option<&TestFn> {
        self.set_up.as_ref()
    }

    pub fn tear_down(&self) -> Option<&TestFn> {
        self.tear_down.as_ref()
    }

    pub fn has_hooks(&self) -> bool {
        self.set_up.is_some() || self.tear_down.is_some()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &TestNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn get(&self, name: &str) -> Option<&TestNode> {
        self.entries
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, node)| node)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of runnable tests at any depth. Hooks are not counted.
    pub fn test_count(&self) -> usize {
        self.entries
            .iter()
            .map(|(_, node)| match node {
                TestNode::Leaf(_) => 1,
                TestNode::Group(group) => group.test_count(),
            })
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pass() -> TestFn {
        TestFn::sync(|_| Ok(()))
    }

    #[test]
    fn reserved_leaf_keys_become_hooks() {
        let mut group = TestGroup::new();
        group.insert(SET_UP, TestNode::Leaf(pass()));
        group.insert(TEAR_DOWN, TestNode::Leaf(pass()));
        group.insert("real", TestNode::Leaf(pass()));

        assert!(group.set_up().is_some());
        assert!(group.tear_down().is_some());
        assert_eq!(group.len(), 1);
        assert_eq!(group.test_count(), 1);
    }

    #[test]
    fn reserved_key_holding_a_group_stays_a_group() {
        let group = TestGroup::new().with_group(SET_UP, TestGroup::new().with_test("t", pass()));
        assert!(group.set_up().is_none());
        assert!(matches!(group.get(SET_UP), Some(TestNode::Group(_))));
    }

    #[test]
    fn reinserting_a_name_keeps_its_position() {
        let mut group = TestGroup::new()
            .with_test("a", pass())
            .with_test("b", pass());
        let previous = group.insert("a", TestNode::Group(TestGroup::new()));

        assert!(matches!(previous, Some(TestNode::Leaf(_))));
        let names: Vec<_> = group.entries().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
