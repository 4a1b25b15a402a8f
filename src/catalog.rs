//! Named test functions.
//!
//! Test manifests on disk cannot carry code, so their leaves and hooks name
//! functions that the host program registered in a [`Catalog`]. The loader
//! resolves every name when a manifest is loaded.
//!
//! Catalog Invariant: the catalog is built once at the entrypoint and shared
//! by reference with every loader. Loading never registers functions.

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::handle::Failure;
use crate::tree::TestFn;

/// Map from function name to test function.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    functions: HashMap<String, TestFn>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `function` under `name`, returning the function it replaced.
    pub fn register(&mut self, name: &str, function: TestFn) -> Option<TestFn> {
        self.functions.insert(name.to_string(), function)
    }

    pub fn get(&self, name: &str) -> Option<&TestFn> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.functions.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Registers the `std.*` functions available to every manifest.
pub fn register_builtins(catalog: &mut Catalog) {
    catalog.register("std.pass", TestFn::sync(|_| Ok(())));
    catalog.register(
        "std.fail",
        TestFn::sync(|handle| Err(Failure::new(format!("{} failed on purpose", handle.name())))),
    );
    catalog.register(
        "std.require-context",
        TestFn::sync(|handle| {
            let present = handle
                .context()
                .as_object()
                .is_some_and(|fields| !fields.is_empty());
            handle.ok(present, "execution context is a non-empty object")
        }),
    );
}

static DEFAULT_CATALOG: Lazy<Arc<Catalog>> = Lazy::new(|| Arc::new(build_default_catalog()));

/// Builds a catalog holding only the built-in functions.
///
/// # Example
/// ```
/// use tether::catalog::build_default_catalog;
/// let catalog = build_default_catalog();
/// assert!(catalog.contains("std.pass"));
/// ```
pub fn build_default_catalog() -> Catalog {
    let mut catalog = Catalog::new();
    register_builtins(&mut catalog);
    catalog
}

/// Shared built-in catalog used by the `tether` binary.
pub fn default_catalog() -> Arc<Catalog> {
    Arc::clone(&DEFAULT_CATALOG)
}
