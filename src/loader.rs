//! Resolving paths into test modules.
//!
//! A test module on disk is a YAML (or JSON) mapping. A string value names a
//! [`Catalog`] function: a test, or a hook under the reserved `setUp` and
//! `tearDown` keys. A mapping value is a nested group.
//!
//! ```yaml
//! setUp: db.open
//! tearDown: db.close
//! Accounts:
//!   opens an account: accounts.open
//!   Overdraft:
//!     setUp: accounts.fund
//!     rejects withdrawal: accounts.overdraw
//! ```
//!
//! A directory is scanned recursively. Each module found below a
//! subdirectory is nested under groups named after the subdirectories, so
//! `suite/a.yaml` contributes `test` and `suite/io/b.yaml` contributes
//! `io.test`.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde_yaml::{Mapping, Value};
use walkdir::WalkDir;

use crate::catalog::Catalog;
use crate::diagnostics::TetherError;
use crate::flatten::NAME_SEPARATOR;
use crate::tree::{TestFn, TestGroup, TestNode, TestTree};

/// One module file resolved from a source, or the reason it could not be.
#[derive(Debug)]
pub struct Resolved {
    pub origin: PathBuf,
    pub tree: Result<TestTree, TetherError>,
}

/// Turns paths into test trees, resolving function names through a catalog.
#[derive(Debug, Clone)]
pub struct Loader {
    catalog: Arc<Catalog>,
}

impl Loader {
    pub fn new(catalog: Arc<Catalog>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    // =====================
    // Public API - Resolution
    // =====================

    /// Resolves a file or directory into the modules it holds.
    ///
    /// Failures are reported per file; a broken module never hides its
    /// siblings.
    pub fn resolve(&self, path: &Path) -> Vec<Resolved> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(source) => {
                return vec![Resolved {
                    origin: path.to_path_buf(),
                    tree: Err(TetherError::Io {
                        path: path.to_path_buf(),
                        source,
                    }),
                }]
            }
        };

        if metadata.is_dir() {
            return self.resolve_dir(path);
        }
        vec![Resolved {
            origin: path.to_path_buf(),
            tree: self.load_file(path),
        }]
    }

    /// Reads and parses a single module file.
    pub fn load_file(&self, path: &Path) -> Result<TestTree, TetherError> {
        if !Self::is_module_file(path) {
            return Err(TetherError::not_a_module(
                path,
                "expected a .yaml, .yml or .json file",
            ));
        }
        let source = fs::read_to_string(path).map_err(|source| TetherError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_module(&source, path)
    }

    /// Parses module source text. `path` is only used for diagnostics.
    pub fn parse_module(&self, source: &str, path: &Path) -> Result<TestTree, TetherError> {
        let value: Value = serde_yaml::from_str(source)
            .map_err(|e| TetherError::not_a_module(path, e.to_string()))?;
        let Value::Mapping(mapping) = value else {
            return Err(TetherError::not_a_module(
                path,
                format!("top level is {}, expected a mapping", describe(&value)),
            ));
        };
        self.build_group(&mapping, path, "")
    }

    // =====================
    // Internal - Directories
    // =====================

    fn resolve_dir(&self, root: &Path) -> Vec<Resolved> {
        let mut resolved = Vec::new();
        let mut files = Vec::new();
        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    let path = source.path().unwrap_or(root).to_path_buf();
                    tracing::warn!(path = %path.display(), "directory walk failed");
                    resolved.push(Resolved {
                        origin: path.clone(),
                        tree: Err(TetherError::Walk { path, source }),
                    });
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }
            if !Self::is_module_file(entry.path()) {
                continue;
            }
            files.push(entry.into_path());
        }
        files.sort();

        resolved.extend(files.into_iter().map(|file| {
            let tree = self
                .load_file(&file)
                .map(|tree| nest_under_directories(root, &file, tree));
            Resolved { origin: file, tree }
        }));
        resolved
    }

    // =====================
    // Internal - Module structure
    // =====================

    fn build_group(
        &self,
        mapping: &Mapping,
        path: &Path,
        prefix: &str,
    ) -> Result<TestGroup, TetherError> {
        let mut group = TestGroup::new();
        for (key, value) in mapping {
            let Some(name) = key.as_str() else {
                return Err(TetherError::not_a_module(
                    path,
                    format!("key {} is {}, expected a string", display_key(prefix), describe(key)),
                ));
            };
            let qualified = qualify(prefix, name);
            let node = match value {
                Value::String(function) => TestNode::Leaf(self.lookup(function, &qualified, path)?),
                Value::Mapping(nested) => {
                    TestNode::Group(self.build_group(nested, path, &qualified)?)
                }
                other => {
                    return Err(TetherError::not_a_module(
                        path,
                        format!(
                            "'{qualified}' is {}, expected a function name or a group",
                            describe(other)
                        ),
                    ))
                }
            };
            group.insert(name, node);
        }
        Ok(group)
    }

    fn lookup(&self, function: &str, test: &str, path: &Path) -> Result<TestFn, TetherError> {
        if let Some(found) = self.catalog.get(function) {
            return Ok(found.clone());
        }
        let known = self.catalog.names();
        let help = (!known.is_empty()).then(|| format!("registered functions: {}", known.join(", ")));
        Err(TetherError::UnknownFunction {
            path: path.to_path_buf(),
            test: test.to_string(),
            function: function.to_string(),
            help,
        })
    }

    /// Returns true if the path has a module extension.
    fn is_module_file(path: &Path) -> bool {
        path.extension()
            .is_some_and(|ext| ext == "yaml" || ext == "yml" || ext == "json")
    }
}

/// Wraps `tree` in one group per directory between `root` and `file`.
fn nest_under_directories(root: &Path, file: &Path, tree: TestTree) -> TestTree {
    let relative = file
        .parent()
        .and_then(|parent| parent.strip_prefix(root).ok())
        .unwrap_or_else(|| Path::new(""));
    relative.components().rev().fold(tree, |inner, component| {
        TestGroup::new().with_group(component.as_os_str().to_string_lossy(), inner)
    })
}

fn qualify(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}{NAME_SEPARATOR}{name}")
    }
}

fn display_key(prefix: &str) -> String {
    if prefix.is_empty() {
        "at top level".to_string()
    } else {
        format!("under '{prefix}'")
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "empty",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Sequence(_) => "a list",
        Value::Mapping(_) => "a mapping",
        Value::Tagged(_) => "a tagged value",
    }
}
