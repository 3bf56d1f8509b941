/*!
# Tree Walks

Parent-free walks over a [`SyntaxTree`]: structural comparison and subtree
searches used by rules.
*/

use super::{Node, NodeId, SyntaxTree};

/// Structural equality of two subtrees, ignoring node identities
pub fn nodes_equal(tree: &SyntaxTree, a: NodeId, b: NodeId) -> bool {
    if a == b {
        return true;
    }
    let (left, right) = (tree.node(a), tree.node(b));
    if left.kind() != right.kind() || !same_payload(left, right) {
        return false;
    }
    let (left_children, right_children) = (left.children(), right.children());
    left_children.len() == right_children.len()
        && left_children
            .iter()
            .zip(&right_children)
            .all(|(x, y)| nodes_equal(tree, *x, *y))
}

fn same_payload(left: &Node, right: &Node) -> bool {
    match (left, right) {
        (Node::Variable { .. }, Node::Variable { .. }) => {
            left.variable_name() == right.variable_name()
        }
        (Node::String { value: a, .. }, Node::String { value: b, .. }) => a == b,
        (Node::Number { value: a }, Node::Number { value: b }) => a == b,
        (Node::Bool { value: a }, Node::Bool { value: b }) => a == b,
        (Node::Binary { op: a, .. }, Node::Binary { op: b, .. }) => a == b,
        (Node::Unary { op: a, .. }, Node::Unary { op: b, .. }) => a == b,
        (Node::Cast { ty: a, .. }, Node::Cast { ty: b, .. }) => a == b,
        (Node::Call { name: a, .. }, Node::Call { name: b, .. }) => a.eq_ignore_ascii_case(b),
        (Node::MethodCall { method: a, .. }, Node::MethodCall { method: b, .. }) => a == b,
        (Node::New { class: a, .. }, Node::New { class: b, .. }) => a == b,
        (Node::PropertyFetch { property: a, .. }, Node::PropertyFetch { property: b, .. }) => {
            a == b
        }
        (
            Node::ClassConstFetch {
                class: a,
                constant: x,
            },
            Node::ClassConstFetch {
                class: b,
                constant: y,
            },
        ) => a == b && x == y,
        (Node::ClassDecl { name: a, .. }, Node::ClassDecl { name: b, .. })
        | (Node::FunctionDecl { name: a, .. }, Node::FunctionDecl { name: b, .. })
        | (Node::Param { name: a }, Node::Param { name: b })
        | (Node::PropertyDecl { name: a, .. }, Node::PropertyDecl { name: b, .. }) => a == b,
        _ => true,
    }
}

/// First node under `root` (pre-order, `root` included) matching `predicate`
pub fn find_first<F>(tree: &SyntaxTree, root: NodeId, mut predicate: F) -> Option<NodeId>
where
    F: FnMut(NodeId, &Node) -> bool,
{
    tree.descendants(root)
        .into_iter()
        .find(|&id| predicate(id, tree.node(id)))
}

/// Every node under `root` matching `predicate`, in pre-order
pub fn find_all<F>(tree: &SyntaxTree, root: NodeId, mut predicate: F) -> Vec<NodeId>
where
    F: FnMut(NodeId, &Node) -> bool,
{
    tree.descendants(root)
        .into_iter()
        .filter(|&id| predicate(id, tree.node(id)))
        .collect()
}

/// Whether the subtree at `root` assigns to `variable` as a whole,
/// i.e. `variable = ...`. Appends like `variable[] = ...` do not count.
pub fn assigns_to(tree: &SyntaxTree, root: NodeId, variable: NodeId) -> bool {
    find_first(tree, root, |_, node| match node {
        Node::Assign { target, .. } => {
            tree.kind(*target) == tree.kind(variable) && nodes_equal(tree, *target, variable)
        }
        _ => false,
    })
    .is_some()
}

/// Whether `id` is `target[] = ...` for a target equal to `variable`
pub fn is_append_to(tree: &SyntaxTree, id: NodeId, variable: NodeId) -> bool {
    match tree.node(id) {
        Node::Assign { target, .. } => match tree.node(*target) {
            Node::ArrayDimFetch { array, index: None } => nodes_equal(tree, *array, variable),
            _ => false,
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{NodeKind, ScriptParser, SourceParser};

    #[test]
    fn test_nodes_equal_ignores_sigil_and_identity() {
        let file = ScriptParser::new().parse("$a = 1; a = 1; a = 2;").unwrap();
        let stmts = file.tree.children(file.tree.root());
        assert!(nodes_equal(&file.tree, stmts[0], stmts[1]));
        assert!(!nodes_equal(&file.tree, stmts[1], stmts[2]));
    }

    #[test]
    fn test_assigns_to_ignores_appends() {
        let file = ScriptParser::new().parse("a[] = 1; a = 2;").unwrap();
        let tree = &file.tree;
        let stmts = tree.children(tree.root());
        let var = find_first(tree, stmts[0], |_, n| n.kind() == NodeKind::Variable).unwrap();
        assert!(!assigns_to(tree, stmts[0], var));
        assert!(assigns_to(tree, stmts[1], var));
        let append = tree.children(stmts[0])[0];
        assert!(is_append_to(tree, append, var));
    }
}
