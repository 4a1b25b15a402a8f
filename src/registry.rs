//! The test registry.
//!
//! Loaded modules are composed, flattened and stored under an identifier
//! derived from each test's full dotted name. The identifier is the
//! lowercase hex SHA-256 of the name: identical names always map to the same
//! identifier, so re-loading a test replaces it.
//!
//! Registry Invariant: the store is only mutated by `load`. `enumerate` and
//! `invoke` only read it. [`SharedRegistry`] guards the store for callers on
//! more than one task; an invocation never holds the lock while it runs.
//!
//! # Example
//! ```
//! use tether::{identifier_for, Registry, TestFn, TestGroup};
//!
//! let module = TestGroup::new()
//!     .with_group("Group A", TestGroup::new().with_test("test one", TestFn::sync(|_| Ok(()))));
//!
//! let mut registry = Registry::new();
//! assert_eq!(registry.load_tree(&module), 1);
//!
//! let listing = registry.enumerate();
//! assert_eq!(listing[0].name, "Group A.test one");
//! assert_eq!(listing[0].identifier, identifier_for("Group A.test one"));
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use im::OrdMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::compose::{compose, ComposedLeaf};
use crate::diagnostics::TetherError;
use crate::engine::{ExecutionEngine, TestReport};
use crate::flatten::flatten_tests;
use crate::handle::ExecutionContext;
use crate::loader::Loader;
use crate::tree::TestTree;

/// Derives the stable external identifier of a test from its full name.
pub fn identifier_for(name: &str) -> String {
    let digest = Sha256::digest(name.as_bytes());
    format!("{digest:x}")
}

// =====================
// Entries and listings
// =====================

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub identifier: String,
    pub name: String,
    pub runnable: ComposedLeaf,
}

/// What `enumerate` reports for each test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestListing {
    pub name: String,
    pub identifier: String,
}

// =====================
// Sources and load reports
// =====================

/// Something the registry can load tests from.
#[derive(Debug, Clone)]
pub enum Source {
    /// An in-memory module.
    Module { label: String, tree: TestTree },
    /// A module file or a directory of module files.
    Path(PathBuf),
}

impl Source {
    pub fn module(label: impl Into<String>, tree: TestTree) -> Self {
        Source::Module {
            label: label.into(),
            tree,
        }
    }
}

impl From<TestTree> for Source {
    fn from(tree: TestTree) -> Self {
        Source::module("<module>", tree)
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

/// Outcome of loading one module.
#[derive(Debug)]
pub struct SourceOutcome {
    pub origin: String,
    /// Number of tests registered from the module.
    pub result: Result<usize, TetherError>,
}

/// Per-module outcomes of one `load` call.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub outcomes: Vec<SourceOutcome>,
}

impl LoadReport {
    /// Tests registered across all modules.
    pub fn loaded(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().ok())
            .sum()
    }

    pub fn errors(&self) -> impl Iterator<Item = &TetherError> {
        self.outcomes
            .iter()
            .filter_map(|outcome| outcome.result.as_ref().err())
    }

    pub fn into_errors(self) -> Vec<TetherError> {
        self.outcomes
            .into_iter()
            .filter_map(|outcome| outcome.result.err())
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.errors().next().is_none()
    }

    fn record(&mut self, origin: String, result: Result<usize, TetherError>) {
        match &result {
            Ok(count) => tracing::debug!(%origin, tests = count, "module loaded"),
            Err(error) => tracing::warn!(%origin, %error, "module failed to load"),
        }
        self.outcomes.push(SourceOutcome { origin, result });
    }
}

// =====================
// Staging
// =====================

/// A module read from a source but not yet stored.
struct Staged {
    origin: String,
    tree: Result<TestTree, TetherError>,
}

/// Reads every source into trees. This is the part of loading that touches
/// the filesystem and needs no access to the store.
fn stage<I>(sources: I, loader: &Loader) -> Vec<Staged>
where
    I: IntoIterator,
    I::Item: Into<Source>,
{
    let mut staged = Vec::new();
    for source in sources {
        match source.into() {
            Source::Module { label, tree } => staged.push(Staged {
                origin: label,
                tree: Ok(tree),
            }),
            Source::Path(path) => {
                staged.extend(loader.resolve(&path).into_iter().map(|resolved| Staged {
                    origin: resolved.origin.display().to_string(),
                    tree: resolved.tree,
                }));
            }
        }
    }
    staged
}

// =====================
// Registry
// =====================

/// Identifier-keyed store of composed, named tests.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: OrdMap<String, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads every source. A source that fails is recorded in the report and
    /// loading carries on with the next one.
    pub fn load<I>(&mut self, sources: I, loader: &Loader) -> LoadReport
    where
        I: IntoIterator,
        I::Item: Into<Source>,
    {
        self.commit(stage(sources, loader))
    }

    fn commit(&mut self, staged: Vec<Staged>) -> LoadReport {
        let mut report = LoadReport::default();
        for Staged { origin, tree } in staged {
            let result = tree.map(|tree| self.load_tree(&tree));
            report.record(origin, result);
        }
        tracing::info!(
            tests = self.len(),
            loaded = report.loaded(),
            failed = report.errors().count(),
            "registry loaded"
        );
        report
    }

    /// Loads a single source.
    pub fn load_source(&mut self, source: impl Into<Source>, loader: &Loader) -> LoadReport {
        self.load(std::iter::once(source.into()), loader)
    }

    /// Composes, flattens and stores one in-memory module. Returns the number
    /// of tests it contributed.
    pub fn load_tree(&mut self, tree: &TestTree) -> usize {
        let tests = flatten_tests(&compose(tree));
        let count = tests.len();
        for test in tests {
            self.insert(test.name, test.runnable);
        }
        count
    }

    fn insert(&mut self, name: String, runnable: ComposedLeaf) -> Option<RegistryEntry> {
        let identifier = identifier_for(&name);
        let entry = RegistryEntry {
            identifier: identifier.clone(),
            name,
            runnable,
        };
        let previous = self.entries.insert(identifier, entry);
        if let Some(previous) = &previous {
            tracing::debug!(name = %previous.name, "replaced previously loaded test");
        }
        previous
    }

    pub fn get(&self, identifier: &str) -> Option<&RegistryEntry> {
        self.entries.get(identifier)
    }

    /// Lists every stored test, ordered by identifier.
    pub fn enumerate(&self) -> Vec<TestListing> {
        self.entries
            .values()
            .map(|entry| TestListing {
                name: entry.name.clone(),
                identifier: entry.identifier.clone(),
            })
            .collect()
    }

    /// Finds a test by its full dotted name.
    pub fn find_by_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.get(&identifier_for(name))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Runs the test registered under `identifier` on `engine`, attaching
    /// `context` to the invocation. An unknown identifier is an error value,
    /// never a panic.
    pub async fn invoke(
        &self,
        identifier: &str,
        context: ExecutionContext,
        engine: &dyn ExecutionEngine,
    ) -> Result<TestReport, TetherError> {
        let entry = self.lookup(identifier)?;
        Ok(run_entry(entry, context, engine).await)
    }

    fn lookup(&self, identifier: &str) -> Result<RegistryEntry, TetherError> {
        self.get(identifier)
            .cloned()
            .ok_or_else(|| TetherError::NotFound {
                identifier: identifier.to_string(),
            })
    }
}

async fn run_entry(
    entry: RegistryEntry,
    context: ExecutionContext,
    engine: &dyn ExecutionEngine,
) -> TestReport {
    tracing::debug!(test = %entry.name, identifier = %entry.identifier, "invoking");
    engine.run(entry.name, entry.runnable, context).await
}

// =====================
// Shared registry
// =====================

/// A registry shared between tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    inner: Arc<RwLock<Registry>>,
}

impl SharedRegistry {
    pub fn new(registry: Registry) -> Self {
        Self {
            inner: Arc::new(RwLock::new(registry)),
        }
    }

    /// Reads the sources on the blocking pool, then takes the write lock only
    /// to store the result. Enumerations and invocations keep being served
    /// while files are read.
    pub async fn load<I>(&self, sources: I, loader: &Loader) -> LoadReport
    where
        I: IntoIterator,
        I::Item: Into<Source>,
    {
        let sources: Vec<Source> = sources.into_iter().map(Into::into).collect();
        let loader = loader.clone();
        let staged = match tokio::task::spawn_blocking(move || stage(sources, &loader)).await {
            Ok(staged) => staged,
            Err(error) if error.is_panic() => std::panic::resume_unwind(error.into_panic()),
            Err(error) => {
                tracing::warn!(%error, "load cancelled");
                return LoadReport::default();
            }
        };
        self.inner.write().await.commit(staged)
    }

    pub async fn enumerate(&self) -> Vec<TestListing> {
        self.inner.read().await.enumerate()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Like [`Registry::invoke`], but the read lock is released before the
    /// test starts so concurrent invocations and loads do not wait on it.
    pub async fn invoke(
        &self,
        identifier: &str,
        context: ExecutionContext,
        engine: &dyn ExecutionEngine,
    ) -> Result<TestReport, TetherError> {
        let entry = self.inner.read().await.lookup(identifier)?;
        Ok(run_entry(entry, context, engine).await)
    }
}
