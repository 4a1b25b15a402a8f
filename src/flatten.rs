//! Flattening composed trees into named tests.

use crate::compose::{ComposedLeaf, ComposedNode, ComposedTree};

/// Joins group names and the leaf key into a test name.
pub const NAME_SEPARATOR: &str = ".";

/// A runnable test with its full dotted name.
#[derive(Debug, Clone)]
pub struct FlattenedTest {
    pub name: String,
    pub runnable: ComposedLeaf,
}

/// Walks `tree` depth first and applies `formatter` to every leaf together
/// with its prefixed name. Results of nested groups are spliced in place.
pub fn flatten<T, F>(tree: &ComposedTree, formatter: &mut F, prefix: &str) -> Vec<T>
where
    F: FnMut(&ComposedLeaf, String) -> T,
{
    let mut out = Vec::new();
    for (key, node) in tree.entries() {
        match node {
            ComposedNode::Leaf(leaf) => out.push(formatter(leaf, format!("{prefix}{key}"))),
            ComposedNode::Group(group) => {
                let nested = format!("{prefix}{key}{NAME_SEPARATOR}");
                out.extend(flatten(group, formatter, &nested));
            }
        }
    }
    out
}

/// Flattens `tree` into [`FlattenedTest`]s.
pub fn flatten_tests(tree: &ComposedTree) -> Vec<FlattenedTest> {
    flatten(
        tree,
        &mut |leaf: &ComposedLeaf, name: String| FlattenedTest {
            name,
            runnable: leaf.clone(),
        },
        "",
    )
}
