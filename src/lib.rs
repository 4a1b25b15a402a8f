//! # Tether
//!
//! Serves a tree of unit tests as a registry that can be enumerated and
//! invoked remotely, one test at a time, by an opaque identifier.
//!
//! The pipeline is:
//!
//! 1. **Load**: a [`Loader`] turns module files (or in-memory [`TestTree`]s)
//!    into trees of groups and leaves.
//! 2. **Compose**: [`compose()`] folds every group's `setUp`/`tearDown` into the
//!    leaves below it.
//! 3. **Flatten**: [`flatten()`] names every leaf by its dotted group path.
//! 4. **Register**: the [`Registry`] stores each test under
//!    [`identifier_for`] its name.
//! 5. **Invoke**: an [`ExecutionEngine`] runs one composed leaf and returns a
//!    [`TestReport`], locally or through the [`Service`].

pub use crate::catalog::Catalog;
pub use crate::compose::{compose, ComposedLeaf, ComposedNode, ComposedTree, LeafOutcome};
pub use crate::diagnostics::{ErrorCategory, TetherError};
pub use crate::engine::{ExecutionEngine, Reporter, TestReport};
pub use crate::flatten::{flatten, flatten_tests, FlattenedTest, NAME_SEPARATOR};
pub use crate::handle::{Assertion, ExecutionContext, Failure, Phase, TestHandle};
pub use crate::loader::{Loader, Resolved};
pub use crate::registry::{
    identifier_for, LoadReport, Registry, RegistryEntry, SharedRegistry, Source, TestListing,
};
pub use crate::service::{Request, Response, Service, ServiceConfig};
pub use crate::tree::{TestFn, TestGroup, TestNode, TestResult, TestTree, SET_UP, TEAR_DOWN};

pub mod catalog;
pub mod cli;
pub mod compose;
pub mod diagnostics;
pub mod engine;
pub mod flatten;
pub mod handle;
pub mod loader;
pub mod registry;
pub mod service;
pub mod tree;
