/*!
# Scope Decorator

Runs once per freshly parsed file and attaches an [`AttributeBag`] to every
reachable node. The tree's shape is never touched.

Decoration happens in two walks. The first records structure (parent link,
source file, original span, enclosing class and function). The second asks
the type resolver for scope and static type, which needs the parent links
from the first walk. A scope the resolver cannot determine is stored as
[`Scope::Unknown`] instead of failing the file.
*/

use tracing::debug;

use crate::attributes::{AttributeBag, Attributes, FileId, Scope};
use crate::syntax::{Node, NodeId, ParsedFile};
use crate::types::TypeResolver;

/// Result of decorating one file
#[derive(Debug, Clone)]
pub struct Decorated {
    pub attributes: Attributes,
    /// Nodes whose enclosing scope could not be resolved
    pub unknown_scopes: Vec<NodeId>,
}

pub struct ScopeDecorator<'r> {
    resolver: &'r dyn TypeResolver,
}

impl<'r> ScopeDecorator<'r> {
    pub fn new(resolver: &'r dyn TypeResolver) -> Self {
        Self { resolver }
    }

    pub fn decorate(&self, file: &ParsedFile, source_file: &FileId) -> Decorated {
        let tree = &file.tree;
        let mut attributes = Attributes::new();

        let mut stack: Vec<(NodeId, Option<NodeId>, Option<String>, Option<String>)> =
            vec![(tree.root(), None, None, None)];
        let mut order = Vec::new();
        while let Some((id, parent, class, function)) = stack.pop() {
            let bag = AttributeBag {
                parent,
                original_span: file.span(id),
                enclosing_class: class.clone(),
                enclosing_function: function.clone(),
                ..AttributeBag::new(source_file.clone())
            };
            attributes.insert(id, bag);
            order.push(id);

            let (class, function) = match tree.node(id) {
                Node::ClassDecl { name, .. } => (Some(name.clone()), None),
                Node::FunctionDecl { name, .. } => (class, Some(name.clone())),
                _ => (class, function),
            };
            for child in tree.children(id).into_iter().rev() {
                stack.push((child, Some(id), class.clone(), function.clone()));
            }
        }

        let mut unknown_scopes = Vec::new();
        for id in order {
            let scope = self.resolver.resolve_scope(tree, &attributes, id);
            let resolved_type = if tree.kind(id).is_expression() {
                self.resolver.resolve_type(tree, &attributes, id)
            } else {
                None
            };
            if scope.is_none() {
                unknown_scopes.push(id);
            }
            if let Some(bag) = attributes.get_mut(id) {
                bag.enclosing_scope = scope.map_or(Scope::Unknown, Scope::Known);
                bag.resolved_type = resolved_type;
            }
        }

        debug!(
            file = %source_file,
            nodes = attributes.len(),
            unknown = unknown_scopes.len(),
            "decorated tree"
        );
        Decorated {
            attributes,
            unknown_scopes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attributes::{ScopeHandle, TypeHandle};
    use crate::syntax::{ScriptParser, SourceParser, SyntaxTree};
    use crate::types::LocalTypeResolver;

    struct NoScope;

    impl TypeResolver for NoScope {
        fn resolve_scope(&self, _: &SyntaxTree, _: &Attributes, _: NodeId) -> Option<ScopeHandle> {
            None
        }

        fn resolve_type(&self, _: &SyntaxTree, _: &Attributes, _: NodeId) -> Option<TypeHandle> {
            None
        }
    }

    #[test]
    fn test_every_reachable_node_is_decorated() {
        let file = ScriptParser::new()
            .parse("class A {\n    function f($x) {\n        return $x . 'y';\n    }\n}\n")
            .unwrap();
        let resolver = LocalTypeResolver::new();
        let decorated = ScopeDecorator::new(&resolver).decorate(&file, &FileId::new("a.php"));
        let root = file.tree.root();

        for id in file.tree.descendants(root) {
            let bag = decorated.attributes.get(id).expect("bag present");
            assert_eq!(bag.source_file.as_str(), "a.php");
            assert!(bag.original_span.is_some());
            assert!(bag.enclosing_scope.is_known());
            if id != root {
                assert!(bag.parent.is_some());
            }
        }
        assert!(decorated.unknown_scopes.is_empty());
    }

    #[test]
    fn test_enclosing_class_and_function() {
        let file = ScriptParser::new()
            .parse("class A {\n    function f() {\n        $a = 1;\n    }\n}")
            .unwrap();
        let resolver = LocalTypeResolver::new();
        let decorated = ScopeDecorator::new(&resolver).decorate(&file, &FileId::new("a.php"));
        let number = file
            .tree
            .descendants(file.tree.root())
            .into_iter()
            .find(|&id| matches!(file.tree.node(id), Node::Number { .. }))
            .unwrap();
        let bag = decorated.attributes.get(number).unwrap();
        assert_eq!(bag.enclosing_class.as_deref(), Some("A"));
        assert_eq!(bag.enclosing_function.as_deref(), Some("f"));
        assert_eq!(bag.resolved_type, Some(TypeHandle::Int));
    }

    #[test]
    fn test_unresolved_scope_becomes_sentinel() {
        let file = ScriptParser::new().parse("$a = 1;").unwrap();
        let decorated = ScopeDecorator::new(&NoScope).decorate(&file, &FileId::new("a.php"));
        assert_eq!(decorated.unknown_scopes.len(), file.tree.len());
        let root = file.tree.root();
        assert_eq!(decorated.attributes.scope(root), Scope::Unknown);
        // Shape is untouched
        assert_eq!(file.tree.children(root).len(), 1);
    }
}
