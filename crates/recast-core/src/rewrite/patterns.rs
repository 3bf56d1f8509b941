/*!
# Node Pattern Matching

Small composable matchers over arena nodes, used by rules to recognise call
shapes without hand-writing nested `match` blocks every time.
*/

use crate::syntax::walk;
use crate::syntax::{Node, NodeId, NodeKind, SyntaxTree};

/// Pattern over one node of a tree
pub trait NodePattern {
    /// Check if this pattern matches the node at `id`
    fn matches(&self, tree: &SyntaxTree, id: NodeId) -> bool;
}

/// Pattern matcher utility
pub struct PatternMatcher;

impl PatternMatcher {
    /// Match any node of a kind
    pub fn kind(kind: NodeKind) -> KindMatcher {
        KindMatcher { kind }
    }

    /// Match a function call by name, case-insensitively
    pub fn call(name: &str) -> CallMatcher {
        CallMatcher {
            name: name.to_string(),
            arity: None,
        }
    }

    /// Match a method call by method name
    pub fn method_call(method: &str) -> MethodCallMatcher {
        MethodCallMatcher {
            method: method.to_string(),
        }
    }

    /// Match a variable by name, with or without its sigil
    pub fn variable(name: &str) -> VariableMatcher {
        VariableMatcher {
            name: name.trim_start_matches('$').to_string(),
        }
    }

    /// Match the empty string literal in either quote style
    pub fn empty_string() -> impl NodePattern {
        NodeTypeMatcher {
            predicate: |node: &Node| matches!(node, Node::String { value, .. } if value.is_empty()),
        }
    }

    /// Combine patterns with OR logic
    pub fn any<P1: NodePattern, P2: NodePattern>(p1: P1, p2: P2) -> OrPattern<P1, P2> {
        OrPattern { p1, p2 }
    }
}

struct NodeTypeMatcher<F>
where
    F: Fn(&Node) -> bool,
{
    predicate: F,
}

impl<F> NodePattern for NodeTypeMatcher<F>
where
    F: Fn(&Node) -> bool,
{
    fn matches(&self, tree: &SyntaxTree, id: NodeId) -> bool {
        (self.predicate)(tree.node(id))
    }
}

pub struct KindMatcher {
    kind: NodeKind,
}

impl NodePattern for KindMatcher {
    fn matches(&self, tree: &SyntaxTree, id: NodeId) -> bool {
        tree.kind(id) == self.kind
    }
}

/// Function call matcher
pub struct CallMatcher {
    name: String,
    arity: Option<usize>,
}

impl CallMatcher {
    /// Also require an exact argument count
    pub fn with_arity(mut self, arity: usize) -> Self {
        self.arity = Some(arity);
        self
    }
}

impl NodePattern for CallMatcher {
    fn matches(&self, tree: &SyntaxTree, id: NodeId) -> bool {
        match tree.node(id) {
            Node::Call { name, args } => {
                name.trim_start_matches('\\').eq_ignore_ascii_case(&self.name)
                    && self.arity.map_or(true, |arity| args.len() == arity)
            }
            _ => false,
        }
    }
}

pub struct MethodCallMatcher {
    method: String,
}

impl NodePattern for MethodCallMatcher {
    fn matches(&self, tree: &SyntaxTree, id: NodeId) -> bool {
        matches!(tree.node(id), Node::MethodCall { method, .. } if method.eq_ignore_ascii_case(&self.method))
    }
}

pub struct VariableMatcher {
    name: String,
}

impl NodePattern for VariableMatcher {
    fn matches(&self, tree: &SyntaxTree, id: NodeId) -> bool {
        tree.node(id).variable_name() == Some(self.name.as_str())
    }
}

/// OR pattern combinator
pub struct OrPattern<P1: NodePattern, P2: NodePattern> {
    p1: P1,
    p2: P2,
}

impl<P1: NodePattern, P2: NodePattern> NodePattern for OrPattern<P1, P2> {
    fn matches(&self, tree: &SyntaxTree, id: NodeId) -> bool {
        self.p1.matches(tree, id) || self.p2.matches(tree, id)
    }
}

/// Pattern-driven searches on top of the plain walks in [`crate::syntax::walk`]
pub struct TreeWalker;

impl TreeWalker {
    /// Every node under `root` matching `pattern`, in pre-order
    pub fn find_all<P: NodePattern>(tree: &SyntaxTree, root: NodeId, pattern: &P) -> Vec<NodeId> {
        walk::find_all(tree, root, |id, _| pattern.matches(tree, id))
    }

    pub fn contains<P: NodePattern>(tree: &SyntaxTree, root: NodeId, pattern: &P) -> bool {
        walk::find_first(tree, root, |id, _| pattern.matches(tree, id)).is_some()
    }
}

/// Arguments of a call, method call or `new`
pub fn call_args(tree: &SyntaxTree, id: NodeId) -> &[NodeId] {
    match tree.node(id) {
        Node::Call { args, .. } | Node::MethodCall { args, .. } | Node::New { args, .. } => args,
        _ => &[],
    }
}

/// The only argument of a one-argument call
pub fn single_arg(tree: &SyntaxTree, id: NodeId) -> Option<NodeId> {
    match call_args(tree, id) {
        [arg] => Some(*arg),
        _ => None,
    }
}

/// Position of `arg` among the arguments of `call`
pub fn arg_position(tree: &SyntaxTree, call: NodeId, arg: NodeId) -> Option<usize> {
    call_args(tree, call).iter().position(|&a| a == arg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{ScriptParser, SourceParser};

    #[test]
    fn test_call_matcher_ignores_case_and_leading_backslash() {
        let file = ScriptParser::new().parse("RESET(a); \\key(a); end(a, b);").unwrap();
        let tree = &file.tree;
        let root = tree.root();
        assert_eq!(TreeWalker::find_all(tree, root, &PatternMatcher::call("reset")).len(), 1);
        assert_eq!(TreeWalker::find_all(tree, root, &PatternMatcher::call("key")).len(), 1);
        assert!(!TreeWalker::contains(tree, root, &PatternMatcher::call("end").with_arity(1)));
    }

    #[test]
    fn test_empty_string_and_any() {
        let file = ScriptParser::new().parse("a = ''; b = 'x'; c = 1;").unwrap();
        let tree = &file.tree;
        let empty = TreeWalker::find_all(tree, tree.root(), &PatternMatcher::empty_string());
        assert_eq!(empty.len(), 1);

        let literal = PatternMatcher::any(PatternMatcher::empty_string(), PatternMatcher::kind(NodeKind::Number));
        assert_eq!(TreeWalker::find_all(tree, tree.root(), &literal).len(), 2);
    }

    #[test]
    fn test_variable_matcher_ignores_sigil() {
        let file = ScriptParser::new().parse("$a = a;").unwrap();
        let tree = &file.tree;
        let found = TreeWalker::find_all(tree, tree.root(), &PatternMatcher::variable("$a"));
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn test_single_arg() {
        let file = ScriptParser::new().parse("key(x); f(a, b);").unwrap();
        let tree = &file.tree;
        let calls = TreeWalker::find_all(tree, tree.root(), &PatternMatcher::kind(NodeKind::Call));
        assert!(single_arg(tree, calls[0]).is_some());
        assert!(single_arg(tree, calls[1]).is_none());
        let b = call_args(tree, calls[1])[1];
        assert_eq!(arg_position(tree, calls[1], b), Some(1));
    }
}
