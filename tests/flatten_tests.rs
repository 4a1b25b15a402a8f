//! Tree flattening tests.

mod common;

use common::pass;
use proptest::prelude::*;
use rstest::rstest;
use tether::{compose, flatten, ComposedLeaf, flatten_tests, TestGroup, TestNode, SET_UP, TEAR_DOWN};

fn names(tree: &TestGroup) -> Vec<String> {
    flatten_tests(&compose(tree))
        .into_iter()
        .map(|test| test.name)
        .collect()
}

#[cfg(test)]
mod naming_tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn group_name_prefixes_its_tests() {
        let tree = TestGroup::new().with_group(
            "Group A",
            TestGroup::new()
                .with_set_up(pass())
                .with_test("test one", pass()),
        );

        assert_eq!(names(&tree), vec!["Group A.test one"]);
    }

    #[test]
    fn names_follow_traversal_order() {
        let tree = TestGroup::new()
            .with_test("first", pass())
            .with_group(
                "outer",
                TestGroup::new()
                    .with_group("inner", TestGroup::new().with_test("deep", pass()))
                    .with_test("shallow", pass()),
            )
            .with_test("last", pass());

        assert_eq!(
            names(&tree),
            vec!["first", "outer.inner.deep", "outer.shallow", "last"]
        );
    }

    #[test]
    fn hooks_never_become_tests() {
        let mut inner = TestGroup::new().with_test("t", pass());
        inner.insert(SET_UP, TestNode::Leaf(pass()));
        inner.insert(TEAR_DOWN, TestNode::Leaf(pass()));
        let tree = TestGroup::new()
            .with_set_up(pass())
            .with_tear_down(pass())
            .with_group("g", inner);

        assert_eq!(names(&tree), vec!["g.t"]);
    }

    #[test]
    fn empty_tree_flattens_to_nothing() {
        assert!(names(&TestGroup::new()).is_empty());
        let only_hooks = TestGroup::new().with_set_up(pass()).with_tear_down(pass());
        assert!(names(&only_hooks).is_empty());
    }

    #[rstest]
    #[case("", "g.t")]
    #[case("suite.", "suite.g.t")]
    fn formatter_receives_the_prefixed_name(#[case] prefix: &str, #[case] expected: &str) {
        let tree = TestGroup::new().with_group("g", TestGroup::new().with_test("t", pass()));
        let composed = compose(&tree);

        let formatted = flatten(&composed, &mut |leaf: &ComposedLeaf, name: String| (name, leaf.depth()), prefix);

        assert_eq!(formatted, vec![(expected.to_string(), 0)]);
    }
}

/// Builds a tree from a nesting shape: each entry is the number of leaves
/// in a group at that depth.
fn tree_with_shape(shape: &[usize]) -> TestGroup {
    shape.iter().enumerate().rev().fold(TestGroup::new(), |inner, (depth, leaves)| {
        let mut group = TestGroup::new().with_set_up(pass()).with_tear_down(pass());
        for i in 0..*leaves {
            group = group.with_test(format!("t{i}"), pass());
        }
        group.with_group(format!("level{depth}"), inner)
    })
}

proptest! {
    #[test]
    fn one_entry_per_reachable_leaf(shape in prop::collection::vec(0usize..4, 0..5)) {
        let tree = tree_with_shape(&shape);
        let flattened = names(&tree);

        prop_assert_eq!(flattened.len(), tree.test_count());
        prop_assert_eq!(flattened.len(), shape.iter().sum::<usize>());
        prop_assert!(flattened.iter().all(|name| !name.contains(SET_UP) && !name.contains(TEAR_DOWN)));
    }
}
