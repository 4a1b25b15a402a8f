//! Module loading tests: manifest parsing and directory resolution.

mod common;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use common::Journal;
use serde_json::json;
use tempfile::TempDir;
use tether::catalog::{build_default_catalog, Catalog};
use tether::{identifier_for, ErrorCategory, Loader, Registry, Reporter, TetherError};

fn write(dir: &Path, relative: &str, contents: &str) {
    let path = dir.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn loader() -> Loader {
    Loader::new(Arc::new(build_default_catalog()))
}

fn sorted_names(registry: &Registry) -> Vec<String> {
    let mut names: Vec<_> = registry.enumerate().into_iter().map(|t| t.name).collect();
    names.sort();
    names
}

#[cfg(test)]
mod directory_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn directory_and_subdirectory_yield_three_tests() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "math.yaml", "adds: std.pass\nsubtracts: std.pass\n");
        write(dir.path(), "io/files.yaml", "reads: std.pass\n");

        let mut registry = Registry::new();
        let report = registry.load_source(dir.path(), &loader());

        assert!(report.is_clean());
        assert_eq!(report.loaded(), 3);
        assert_eq!(sorted_names(&registry), vec!["adds", "io.reads", "subtracts"]);
    }

    #[test]
    fn non_module_files_are_ignored_in_directories() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "README.md", "# not a module");
        write(dir.path(), "suite.yml", "only: std.pass\n");

        let mut registry = Registry::new();
        let report = registry.load_source(dir.path(), &loader());

        assert!(report.is_clean());
        assert_eq!(sorted_names(&registry), vec!["only"]);
    }

    #[test]
    fn broken_file_does_not_hide_its_siblings() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.yaml", "- just\n- a list\n");
        write(dir.path(), "b.yaml", "fine: std.pass\n");

        let mut registry = Registry::new();
        let report = registry.load_source(dir.path(), &loader());

        assert_eq!(report.loaded(), 1);
        let errors = report.into_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], TetherError::NotAModule { .. }));
        assert_eq!(sorted_names(&registry), vec!["fine"]);
    }

    #[test]
    fn json_modules_are_accepted() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "suite.json", r#"{ "group": { "t": "std.pass" } }"#);

        let mut registry = Registry::new();
        registry.load_source(dir.path(), &loader());

        assert_eq!(sorted_names(&registry), vec!["group.t"]);
    }
}

#[cfg(test)]
mod manifest_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn hooks_in_manifests_are_not_tests() {
        let tree = loader()
            .parse_module(
                "setUp: std.pass\nGroup A:\n  setUp: std.pass\n  tearDown: std.pass\n  test one: std.pass\n",
                Path::new("inline.yaml"),
            )
            .unwrap();

        let mut registry = Registry::new();
        registry.load_tree(&tree);

        assert_eq!(sorted_names(&registry), vec!["Group A.test one"]);
    }

    #[test]
    fn unknown_function_names_the_test_and_function() {
        let err = loader()
            .parse_module("outer:\n  inner: no.such.fn\n", Path::new("bad.yaml"))
            .unwrap_err();

        match err {
            TetherError::UnknownFunction {
                test,
                function,
                help,
                ..
            } => {
                assert_eq!(test, "outer.inner");
                assert_eq!(function, "no.such.fn");
                assert!(help.unwrap().contains("std.pass"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn scalar_entries_are_rejected() {
        let err = loader()
            .parse_module("count: 3\n", Path::new("bad.yaml"))
            .unwrap_err();

        assert!(matches!(err, TetherError::NotAModule { .. }));
        assert!(err.to_string().contains("'count' is a number"));
    }

    #[test]
    fn wrong_extension_is_not_a_module() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "notes.txt", "t: std.pass\n");

        let err = loader().load_file(&dir.path().join("notes.txt")).unwrap_err();

        assert!(matches!(err, TetherError::NotAModule { .. }));
    }

    #[test]
    fn missing_path_is_an_io_error() {
        let resolved = loader().resolve(Path::new("/no/such/suite"));

        assert_eq!(resolved.len(), 1);
        let err = resolved.into_iter().next().unwrap().tree.unwrap_err();
        assert!(matches!(err, TetherError::Io { .. }));
        assert_eq!(err.category(), ErrorCategory::Load);
    }
}

#[cfg(test)]
mod catalog_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn host_functions_run_through_the_registry() {
        let journal = Journal::new();
        let mut catalog = Catalog::new();
        catalog.register("db.open", journal.step("open"));
        catalog.register("db.close", journal.step("close"));
        catalog.register("db.query", journal.step("query"));

        let dir = TempDir::new().unwrap();
        write(
            dir.path(),
            "db.yaml",
            "Database:\n  setUp: db.open\n  tearDown: db.close\n  queries: db.query\n",
        );

        let mut registry = Registry::new();
        registry.load_source(dir.path(), &Loader::new(Arc::new(catalog)));
        let report = registry
            .invoke(&identifier_for("Database.queries"), json!(null), &Reporter)
            .await
            .unwrap();

        assert!(report.passed);
        assert_eq!(journal.entries(), vec!["open", "query", "close"]);
    }

    #[tokio::test]
    async fn builtin_require_context_checks_the_context() {
        let mut registry = Registry::new();
        let tree = loader()
            .parse_module("needs context: std.require-context\n", Path::new("ctx.yaml"))
            .unwrap();
        registry.load_tree(&tree);
        let id = identifier_for("needs context");

        let without = registry.invoke(&id, json!(null), &Reporter).await.unwrap();
        let with = registry
            .invoke(&id, json!({ "user": "ci" }), &Reporter)
            .await
            .unwrap();

        assert!(!without.passed);
        assert!(with.passed);
    }
}
