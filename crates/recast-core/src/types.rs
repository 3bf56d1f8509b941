//! Static type and scope lookup.
//!
//! The engine only talks to [`TypeResolver`]; [`LocalTypeResolver`] is a
//! flow-insensitive, single-file resolver good enough for literal-driven
//! rewrites.

use crate::attributes::{Attributes, ScopeHandle, TypeHandle};
use crate::syntax::{BinaryOp, CastType, Node, NodeId, NodeKind, SyntaxTree};

/// Depth bound when following variable assignments
const MAX_RESOLVE_DEPTH: usize = 16;

/// Answers scope and type questions about nodes of the current file
pub trait TypeResolver: Send + Sync {
    /// Scope enclosing `node`, or `None` when it cannot be determined
    fn resolve_scope(&self, tree: &SyntaxTree, attrs: &Attributes, node: NodeId) -> Option<ScopeHandle>;

    /// Static type of the expression at `node`, or `None` when unknown
    fn resolve_type(&self, tree: &SyntaxTree, attrs: &Attributes, node: NodeId) -> Option<TypeHandle>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LocalTypeResolver;

impl LocalTypeResolver {
    pub fn new() -> Self {
        LocalTypeResolver
    }

    fn type_of(&self, tree: &SyntaxTree, attrs: &Attributes, node: NodeId, depth: usize) -> Option<TypeHandle> {
        if depth > MAX_RESOLVE_DEPTH {
            return None;
        }
        match tree.node(node) {
            Node::String { .. } => Some(TypeHandle::String),
            Node::Number { .. } => Some(TypeHandle::Int),
            Node::Bool { .. } => Some(TypeHandle::Bool),
            Node::Null => Some(TypeHandle::Null),
            Node::Array { .. } => Some(TypeHandle::Array),
            Node::New { class, .. } => Some(TypeHandle::Object(
                class.trim_start_matches('\\').to_string(),
            )),
            Node::Cast { ty, .. } => Some(match ty {
                CastType::Array => TypeHandle::Array,
                CastType::String => TypeHandle::String,
                CastType::Int => TypeHandle::Int,
                CastType::Bool => TypeHandle::Bool,
            }),
            Node::Binary { op, .. } => Some(match op {
                BinaryOp::Concat => TypeHandle::String,
                BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo => TypeHandle::Int,
                _ => TypeHandle::Bool,
            }),
            Node::Unary { .. } => None,
            Node::Assign { value, .. } => self.type_of(tree, attrs, *value, depth + 1),
            Node::Variable { .. } => self.variable_type(tree, attrs, node, depth),
            Node::PropertyFetch { object, property } => {
                self.property_type(tree, attrs, *object, property, depth)
            }
            _ => None,
        }
    }

    fn variable_type(&self, tree: &SyntaxTree, attrs: &Attributes, node: NodeId, depth: usize) -> Option<TypeHandle> {
        let name = tree.node(node).variable_name()?;
        if name == "this" {
            let class = attrs.enclosing_of_kind(tree, node, NodeKind::ClassDecl)?;
            return match tree.node(class) {
                Node::ClassDecl { name, .. } => Some(TypeHandle::Object(name.clone())),
                _ => None,
            };
        }

        // Walk statement lists outward, latest preceding assignment first,
        // without leaving the enclosing function.
        let mut stmt = attrs.enclosing_statement(tree, node)?;
        loop {
            let (owner, index) = attrs.statement_position(tree, stmt)?;
            let siblings = tree.children(owner);
            for &previous in siblings[..index].iter().rev() {
                if let Some(value) = assigned_value(tree, previous, name) {
                    return self.type_of(tree, attrs, value, depth + 1);
                }
            }
            let above = attrs.parent(owner)?;
            if matches!(tree.kind(above), NodeKind::FunctionDecl | NodeKind::ClassDecl) {
                return None;
            }
            stmt = attrs.enclosing_statement(tree, above)?;
        }
    }

    fn property_type(
        &self,
        tree: &SyntaxTree,
        attrs: &Attributes,
        object: NodeId,
        property: &str,
        depth: usize,
    ) -> Option<TypeHandle> {
        if tree.node(object).variable_name() != Some("this") {
            return None;
        }
        let class = attrs.enclosing_of_kind(tree, object, NodeKind::ClassDecl)?;
        let default = tree.children(class).into_iter().find_map(|member| match tree.node(member) {
            Node::PropertyDecl { name, default, .. } if name.trim_start_matches('$') == property => {
                *default
            }
            _ => None,
        })?;
        self.type_of(tree, attrs, default, depth + 1)
    }
}

/// Value assigned to variable `name` by a statement `name = value;`
fn assigned_value(tree: &SyntaxTree, stmt: NodeId, name: &str) -> Option<NodeId> {
    let Node::ExprStmt { expr } = tree.node(stmt) else {
        return None;
    };
    match tree.node(*expr) {
        Node::Assign { target, value } if tree.node(*target).variable_name() == Some(name) => Some(*value),
        _ => None,
    }
}

impl TypeResolver for LocalTypeResolver {
    fn resolve_scope(&self, tree: &SyntaxTree, attrs: &Attributes, node: NodeId) -> Option<ScopeHandle> {
        if node == tree.root() {
            return Some(ScopeHandle(node.raw()));
        }
        attrs
            .ancestors(node)
            .find(|&ancestor| {
                matches!(
                    tree.kind(ancestor),
                    NodeKind::FunctionDecl | NodeKind::ClassDecl | NodeKind::Program
                )
            })
            .map(|scope| ScopeHandle(scope.raw()))
    }

    fn resolve_type(&self, tree: &SyntaxTree, attrs: &Attributes, node: NodeId) -> Option<TypeHandle> {
        self.type_of(tree, attrs, node, 0)
    }
}
