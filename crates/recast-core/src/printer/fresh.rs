//! Canonical rendering for nodes that have no source text of their own.
//! Children still go through `Printer::render`, so preserved subtrees inside a
//! fresh node keep their original text.

use super::Printer;
use crate::syntax::{Node, NodeId, NodeKind, SyntaxTree};

/// Binding power of assignment, lowest of all expressions
const ASSIGN_PRECEDENCE: u8 = 0;
/// Prefix operators and casts
const PREFIX_PRECEDENCE: u8 = 8;
/// Postfix forms and primaries
const POSTFIX_PRECEDENCE: u8 = 9;

/// Sequence kinds whose elements go one per line
pub(super) fn is_line_separated(kind: NodeKind) -> bool {
    matches!(kind, NodeKind::Program | NodeKind::Block | NodeKind::ClassDecl)
}

fn precedence(node: &Node) -> u8 {
    match node {
        Node::Assign { .. } => ASSIGN_PRECEDENCE,
        Node::Binary { op, .. } => op.precedence(),
        Node::Unary { .. } | Node::Cast { .. } => PREFIX_PRECEDENCE,
        _ => POSTFIX_PRECEDENCE,
    }
}

/// Whether `child` must be parenthesised in its slot under `parent`
pub(super) fn needs_parens(tree: &SyntaxTree, parent: NodeId, child: NodeId) -> bool {
    let inner = tree.node(child);
    if !inner.kind().is_expression() {
        return false;
    }
    let inner_precedence = precedence(inner);
    match tree.node(parent) {
        Node::Binary { op, left, right } => {
            let outer = op.precedence();
            if child == *left {
                inner_precedence < outer
            } else if child == *right {
                inner_precedence <= outer
            } else {
                false
            }
        }
        Node::Unary { .. } | Node::Cast { .. } => inner_precedence < PREFIX_PRECEDENCE,
        Node::MethodCall { object: base, .. }
        | Node::PropertyFetch { object: base, .. }
        | Node::ArrayDimFetch { array: base, .. } => {
            child == *base && (inner_precedence < POSTFIX_PRECEDENCE || matches!(inner, Node::New { .. }))
        }
        _ => false,
    }
}

impl Printer<'_> {
    /// Canonical text of `id` at block indentation `indent`
    pub(super) fn fresh(&self, id: NodeId, indent: &str) -> String {
        let child = |child: NodeId| self.render_child(id, child, indent);
        let list = |items: &[NodeId]| items.iter().map(|&item| child(item)).collect::<Vec<_>>().join(", ");

        match self.tree.node(id) {
            Node::Program { stmts } => stmts
                .iter()
                .map(|&stmt| self.render(stmt, indent))
                .collect::<Vec<_>>()
                .join("\n"),
            Node::ClassDecl { name, members } => {
                format!("class {} {}", name, self.block(members, indent))
            }
            Node::PropertyDecl {
                modifiers,
                name,
                default,
            } => {
                let modifiers = if modifiers.is_empty() {
                    "var".to_string()
                } else {
                    modifiers.join(" ")
                };
                match default {
                    Some(value) => format!("{} {} = {};", modifiers, name, child(*value)),
                    None => format!("{} {};", modifiers, name),
                }
            }
            Node::FunctionDecl {
                modifiers,
                name,
                params,
                body,
            } => {
                let mut head = modifiers.join(" ");
                if !head.is_empty() {
                    head.push(' ');
                }
                format!("{}function {}({}) {}", head, name, list(params), self.render(*body, indent))
            }
            Node::Param { name } => name.clone(),
            Node::Block { stmts } => self.block(stmts, indent),
            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut out = format!("if ({}) {}", child(*condition), self.render(*then_branch, indent));
                if let Some(otherwise) = else_branch {
                    out.push_str(" else ");
                    out.push_str(&self.render(*otherwise, indent));
                }
                out
            }
            Node::Return { value } => match value {
                Some(value) => format!("return {};", child(*value)),
                None => "return;".to_string(),
            },
            Node::Echo { values } => format!("echo {};", list(values)),
            Node::ExprStmt { expr } => format!("{};", child(*expr)),
            Node::Assign { target, value } => format!("{} = {}", child(*target), child(*value)),
            Node::Binary { op, left, right } => {
                format!("{} {} {}", child(*left), op.symbol(), child(*right))
            }
            Node::Unary { op, operand } => format!("{}{}", op.symbol(), child(*operand)),
            Node::Cast { ty, expr } => format!("({}) {}", ty.keyword(), child(*expr)),
            Node::Call { name, args } => format!("{}({})", name, list(args)),
            Node::MethodCall {
                object,
                method,
                args,
            } => format!("{}->{}({})", child(*object), method, list(args)),
            Node::New { class, args } => format!("new {}({})", class, list(args)),
            Node::ClassConstFetch { class, constant } => format!("{}::{}", class, constant),
            Node::PropertyFetch { object, property } => format!("{}->{}", child(*object), property),
            Node::ArrayDimFetch { array, index } => {
                let index = index.map(child).unwrap_or_default();
                format!("{}[{}]", child(*array), index)
            }
            Node::Array { items } => format!("[{}]", list(items)),
            Node::Variable { name } => name.clone(),
            Node::String { value, quote } => format!("{0}{1}{0}", quote.char(), value),
            Node::Number { value } => value.to_string(),
            Node::Bool { value } => value.to_string(),
            Node::Null => "null".to_string(),
        }
    }

    /// `{ ... }` with one statement or member per line
    fn block(&self, items: &[NodeId], indent: &str) -> String {
        if items.is_empty() {
            return "{\n".to_string() + indent + "}";
        }
        let inner = format!("{}{}", indent, self.indent_unit);
        let mut out = String::from("{");
        for &item in items {
            out.push('\n');
            out.push_str(&inner);
            out.push_str(&self.render(item, &inner));
        }
        out.push('\n');
        out.push_str(indent);
        out.push('}');
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::syntax::{BinaryOp, ScriptParser, SourceParser};

    #[test]
    fn test_binary_parenthesisation() {
        let mut tree = SyntaxTree::new();
        let a = tree.alloc(Node::variable("a"));
        let b = tree.alloc(Node::variable("b"));
        let c = tree.alloc(Node::variable("c"));
        let sum = tree.alloc(Node::Binary {
            op: BinaryOp::Subtract,
            left: b,
            right: c,
        });
        let difference = tree.alloc(Node::Binary {
            op: BinaryOp::Subtract,
            left: a,
            right: sum,
        });
        assert!(needs_parens(&tree, difference, sum));
        assert!(!needs_parens(&tree, difference, a));

        let product = tree.alloc(Node::Binary {
            op: BinaryOp::Multiply,
            left: difference,
            right: a,
        });
        assert!(needs_parens(&tree, product, difference));
    }

    #[test]
    fn test_postfix_base() {
        let file = ScriptParser::new().parse("x = (new A())->run();").unwrap();
        let tree = &file.tree;
        let call = tree
            .descendants(tree.root())
            .into_iter()
            .find(|&id| tree.kind(id) == NodeKind::MethodCall)
            .unwrap();
        let object = tree.children(call)[0];
        assert!(needs_parens(tree, call, object));
    }
}
