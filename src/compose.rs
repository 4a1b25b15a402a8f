//! Setup/teardown composition.
//!
//! [`compose`] rewrites a [`TestTree`] into a [`ComposedTree`] of the same
//! shape in which every leaf carries the hooks of all of its ancestors and no
//! group carries hooks of its own.
//!
//! Hooks are inherited as a chain of *scopes*, one per ancestor group that
//! declares a `setUp` and/or a `tearDown`, outermost first. A scope keeps
//! both hooks of its group together, so that a run only tears down the
//! scopes it actually entered:
//!
//! ```text
//! G1 { setUp: A, tearDown: D, G2 { setUp: B, tearDown: C, leaf } }
//!
//! all pass   : A, B, leaf, C, D
//! B fails    : A, B, D
//! leaf fails : A, B, leaf, C, D
//! ```

use std::sync::Arc;

use crate::handle::{Failure, Phase, TestHandle};
use crate::tree::{TestFn, TestNode, TestTree};

/// Hooks contributed by one ancestor group.
#[derive(Debug, Clone)]
struct Scope {
    path: String,
    set_up: Option<TestFn>,
    tear_down: Option<TestFn>,
}

// =====================
// Composed tree
// =====================

#[derive(Debug, Clone)]
pub enum ComposedNode {
    Leaf(ComposedLeaf),
    Group(ComposedTree),
}

/// A hook-free tree of composed leaves, in the order of the source tree.
#[derive(Debug, Clone, Default)]
pub struct ComposedTree {
    entries: Vec<(String, ComposedNode)>,
}

impl ComposedTree {
    pub fn entries(&self) -> impl Iterator<Item = (&str, &ComposedNode)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Composes inherited hooks into every leaf of `tree`.
pub fn compose(tree: &TestTree) -> ComposedTree {
    compose_group(tree, "", &[])
}

fn compose_group(group: &TestTree, path: &str, inherited: &[Scope]) -> ComposedTree {
    let mut scopes = inherited.to_vec();
    if group.has_hooks() {
        scopes.push(Scope {
            path: path.to_string(),
            set_up: group.set_up().cloned(),
            tear_down: group.tear_down().cloned(),
        });
    }
    let scopes: Arc<[Scope]> = scopes.into();

    let entries = group
        .entries()
        .map(|(name, node)| {
            let composed = match node {
                TestNode::Leaf(body) => ComposedNode::Leaf(ComposedLeaf {
                    body: body.clone(),
                    scopes: Arc::clone(&scopes),
                }),
                TestNode::Group(child) => {
                    let child_path = if path.is_empty() {
                        name.to_string()
                    } else {
                        format!("{path}.{name}")
                    };
                    ComposedNode::Group(compose_group(child, &child_path, &scopes))
                }
            };
            (name.to_string(), composed)
        })
        .collect();

    ComposedTree { entries }
}

// =====================
// Composed leaf
// =====================

/// Everything that went wrong during one run of a composed leaf.
///
/// Failures are kept in the order they happened: a setUp or body failure
/// comes first, teardown failures follow it. Nothing is ever overwritten.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LeafOutcome {
    pub failures: Vec<Failure>,
}

impl LeafOutcome {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    /// The failure that decided the verdict.
    pub fn primary(&self) -> Option<&Failure> {
        self.failures.first()
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    /// Entering scope `i`.
    SetUp(usize),
    Body,
    /// `n` entered scopes remain to be torn down.
    TearDown(usize),
    Done,
}

/// A test body wrapped in its inherited setUp/tearDown chain.
#[derive(Debug, Clone)]
pub struct ComposedLeaf {
    body: TestFn,
    scopes: Arc<[Scope]>,
}

impl ComposedLeaf {
    /// Number of ancestor groups contributing hooks.
    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Runs setUps outer to inner, the body, then the teardowns of every
    /// entered scope inner to outer. Stages never overlap.
    pub async fn run(&self, handle: TestHandle) -> LeafOutcome {
        let mut outcome = LeafOutcome::default();
        let mut stage = Stage::SetUp(0);

        while stage != Stage::Done {
            stage = match stage {
                Stage::SetUp(i) if i == self.scopes.len() => Stage::Body,
                Stage::SetUp(i) => {
                    let scope = &self.scopes[i];
                    match run_hook(scope.set_up.as_ref(), &handle).await {
                        Ok(()) => Stage::SetUp(i + 1),
                        Err(failure) => {
                            tracing::debug!(test = handle.name(), scope = %scope.path, "setUp failed");
                            outcome.failures.push(failure.during(Phase::SetUp, &scope.path));
                            Stage::TearDown(i)
                        }
                    }
                }
                Stage::Body => {
                    if let Err(failure) = self.body.call(handle.clone()).await {
                        outcome.failures.push(failure.during(Phase::Body, ""));
                    }
                    Stage::TearDown(self.scopes.len())
                }
                Stage::TearDown(0) => Stage::Done,
                Stage::TearDown(n) => {
                    let scope = &self.scopes[n - 1];
                    if let Err(failure) = run_hook(scope.tear_down.as_ref(), &handle).await {
                        tracing::debug!(test = handle.name(), scope = %scope.path, "tearDown failed");
                        outcome.failures.push(failure.during(Phase::TearDown, &scope.path));
                    }
                    Stage::TearDown(n - 1)
                }
                Stage::Done => Stage::Done,
            };
        }

        outcome
    }
}

async fn run_hook(hook: Option<&TestFn>, handle: &TestHandle) -> Result<(), Failure> {
    match hook {
        Some(hook) => hook.call(handle.clone()).await,
        None => Ok(()),
    }
}
