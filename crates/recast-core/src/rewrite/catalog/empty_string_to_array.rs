//! `x = ''; x[] = v;` stops working once strings refuse array appends.
//! The empty-string initialiser becomes `[]`; without a visible initialiser
//! the append is preceded by an explicit `(array)` retype.

use std::collections::HashSet;

use crate::attributes::TypeHandle;
use crate::rewrite::context::RuleContext;
use crate::rewrite::patterns::{NodePattern, PatternMatcher, TreeWalker};
use crate::rewrite::rules::{Outcome, Rule, RuleError};
use crate::syntax::walk::{assigns_to, find_first, is_append_to};
use crate::syntax::{CastType, Node, NodeId, NodeKind, SyntaxTree};

#[derive(Debug, Default)]
pub struct EmptyStringToArray {
    /// `''` property defaults whose property is appended to in its class
    property_defaults: HashSet<NodeId>,
    /// Names of those properties
    properties: HashSet<String>,
}

impl EmptyStringToArray {
    pub fn new() -> Self {
        Self::default()
    }

    fn initialiser(&self, node: NodeId, ctx: &mut RuleContext<'_>) -> Outcome {
        let Some(assign) = ctx.parent(node) else {
            return Outcome::Unchanged;
        };
        let target = match ctx.node(assign) {
            Node::Assign { target, value } if *value == node => *target,
            _ => return Outcome::Unchanged,
        };
        let assignable = PatternMatcher::any(
            PatternMatcher::kind(NodeKind::Variable),
            PatternMatcher::kind(NodeKind::PropertyFetch),
        );
        if !assignable.matches(ctx.tree(), target) {
            return Outcome::Unchanged;
        }
        let Some(stmt) = ctx.enclosing_statement(assign) else {
            return Outcome::Unchanged;
        };

        for next in ctx.next_statements(stmt) {
            let tree = ctx.tree();
            if find_first(tree, next, |id, _| is_append_to(tree, id, target)).is_some() {
                return Outcome::Replace(ctx.alloc(Node::empty_array()));
            }
            if assigns_to(tree, next, target) {
                break;
            }
        }
        Outcome::Unchanged
    }

    /// `x[] = v` on a string-typed `x` with no initialiser in sight
    fn retype(&self, node: NodeId, ctx: &mut RuleContext<'_>) -> Outcome {
        let array = match ctx.node(node) {
            Node::Assign { target, .. } => match ctx.node(*target) {
                Node::ArrayDimFetch { array, index: None } => *array,
                _ => return Outcome::Unchanged,
            },
            _ => return Outcome::Unchanged,
        };
        if let Node::PropertyFetch { property, .. } = ctx.node(array) {
            if self.properties.contains(property) {
                return Outcome::Unchanged;
            }
        }
        if ctx.static_type(array) != Some(TypeHandle::String) {
            return Outcome::Unchanged;
        }
        let Some(stmt) = ctx.enclosing_statement(node) else {
            return Outcome::Unchanged;
        };

        let append = ctx.deep_clone(node);
        ctx.insert_after(stmt, append);

        let target = ctx.deep_clone(array);
        let operand = ctx.deep_clone(array);
        let cast = ctx.alloc(Node::Cast {
            ty: CastType::Array,
            expr: operand,
        });
        Outcome::Replace(ctx.alloc(Node::Assign { target, value: cast }))
    }
}

fn appends_to_property(tree: &SyntaxTree, id: NodeId, property: &str) -> bool {
    let Node::Assign { target, .. } = tree.node(id) else {
        return false;
    };
    let Node::ArrayDimFetch { array, index: None } = tree.node(*target) else {
        return false;
    };
    matches!(
        tree.node(*array),
        Node::PropertyFetch { object, property: p }
            if p == property && PatternMatcher::variable("this").matches(tree, *object)
    )
}

impl Rule for EmptyStringToArray {
    fn name(&self) -> &'static str {
        "empty-string-to-array"
    }

    fn description(&self) -> &'static str {
        "Initialise appended-to variables with [] instead of ''"
    }

    fn declared_kinds(&self) -> &'static [NodeKind] {
        &[NodeKind::String, NodeKind::Assign]
    }

    fn reset(&mut self) {
        self.property_defaults.clear();
        self.properties.clear();
    }

    fn before_traverse(&mut self, ctx: &RuleContext<'_>) -> Result<(), RuleError> {
        self.reset();
        let tree = ctx.tree();
        let empty_string = PatternMatcher::empty_string();
        for class in TreeWalker::find_all(tree, ctx.root(), &PatternMatcher::kind(NodeKind::ClassDecl)) {
            for member in tree.children(class) {
                let Node::PropertyDecl {
                    name,
                    default: Some(default),
                    ..
                } = tree.node(member)
                else {
                    continue;
                };
                if !empty_string.matches(tree, *default) {
                    continue;
                }
                let property = name.trim_start_matches('$');
                if find_first(tree, class, |id, _| appends_to_property(tree, id, property)).is_some() {
                    self.property_defaults.insert(*default);
                    self.properties.insert(property.to_string());
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
        if !ctx.is_scope_known(node) {
            return Ok(Outcome::Unchanged);
        }
        if PatternMatcher::empty_string().matches(ctx.tree(), node) {
            if self.property_defaults.contains(&node) {
                return Ok(Outcome::Replace(ctx.alloc(Node::empty_array())));
            }
            return Ok(self.initialiser(node, ctx));
        }
        if ctx.kind(node) == NodeKind::Assign {
            return Ok(self.retype(node, ctx));
        }
        Ok(Outcome::Unchanged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::catalog::testing::rewrite;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_string_initialiser() {
        assert_eq!(rewrite(EmptyStringToArray::new(), "a = ''; a[] = 1;"), "a = []; a[] = 1;");
    }

    #[test]
    fn test_appends_inside_later_blocks() {
        let source = "$list = \"\";\nif ($x) {\n    $list[] = $x;\n}\n";
        let expected = "$list = [];\nif ($x) {\n    $list[] = $x;\n}\n";
        assert_eq!(rewrite(EmptyStringToArray::new(), source), expected);
    }

    #[test]
    fn test_reassignment_before_append_blocks_rewrite() {
        let source = "a = ''; a = []; a[] = 1;";
        assert_eq!(rewrite(EmptyStringToArray::new(), source), source);
    }

    #[test]
    fn test_string_without_append_is_kept() {
        let source = "a = ''; echo a;";
        assert_eq!(rewrite(EmptyStringToArray::new(), source), source);
    }

    #[test]
    fn test_property_default() {
        let source = "class A {\n    var $items = '';\n    function add($x) {\n        $this->items[] = $x;\n    }\n}\n";
        let expected = "class A {\n    var $items = [];\n    function add($x) {\n        $this->items[] = $x;\n    }\n}\n";
        assert_eq!(rewrite(EmptyStringToArray::new(), source), expected);
    }

    #[test]
    fn test_retype_when_initialiser_is_not_empty() {
        let source = "a = 'abc';\na[] = 1;\n";
        let expected = "a = 'abc';\na = (array) a;\na[] = 1;\n";
        assert_eq!(rewrite(EmptyStringToArray::new(), source), expected);
    }
}
