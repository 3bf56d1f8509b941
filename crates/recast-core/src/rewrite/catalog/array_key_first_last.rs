//! Fuse `reset(x); ... key(x)` into `array_key_first(x)` and
//! `end(x); ... key(x)` into `array_key_last(x)`.

use crate::config::LanguageVersion;
use crate::rewrite::context::RuleContext;
use crate::rewrite::patterns::{single_arg, NodePattern, PatternMatcher};
use crate::rewrite::rules::{Outcome, Rule, RuleError};
use crate::syntax::walk::{assigns_to, nodes_equal};
use crate::syntax::{Node, NodeId, NodeKind};

const MIN_VERSION: LanguageVersion = LanguageVersion::new(7, 3);

/// Pointer-moving calls and the function replacing the pair
const REPLACEMENTS: &[(&str, &str)] = &[("reset", "array_key_first"), ("end", "array_key_last")];

#[derive(Debug, Default)]
pub struct ArrayKeyFirstLast;

impl ArrayKeyFirstLast {
    pub fn new() -> Self {
        ArrayKeyFirstLast
    }
}

/// If `stmt` is `reset(x);` or `end(x);` for an `x` equal to `array`, the
/// replacement function name
fn pointer_move(ctx: &RuleContext<'_>, stmt: NodeId, array: NodeId) -> Option<&'static str> {
    let tree = ctx.tree();
    let Node::ExprStmt { expr } = tree.node(stmt) else {
        return None;
    };
    REPLACEMENTS.iter().find_map(|(from, to)| {
        let moved = PatternMatcher::call(from).with_arity(1).matches(tree, *expr)
            && single_arg(tree, *expr).is_some_and(|arg| nodes_equal(tree, arg, array));
        moved.then_some(*to)
    })
}

impl Rule for ArrayKeyFirstLast {
    fn name(&self) -> &'static str {
        "array-key-first-last"
    }

    fn description(&self) -> &'static str {
        "Make use of array_key_first() and array_key_last()"
    }

    fn priority(&self) -> u32 {
        150
    }

    fn declared_kinds(&self) -> &'static [NodeKind] {
        &[NodeKind::Call]
    }

    fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
        if !ctx.is_at_least(MIN_VERSION) || !ctx.is_scope_known(node) {
            return Ok(Outcome::Unchanged);
        }
        if !PatternMatcher::call("key").with_arity(1).matches(ctx.tree(), node) {
            return Ok(Outcome::Unchanged);
        }
        let Some(array) = single_arg(ctx.tree(), node) else {
            return Ok(Outcome::Unchanged);
        };
        let Some(stmt) = ctx.enclosing_statement(node) else {
            return Ok(Outcome::Unchanged);
        };

        for previous in ctx.previous_statements(stmt) {
            if ctx.is_removed(previous) {
                continue;
            }
            if let Some(function) = pointer_move(ctx, previous, array) {
                ctx.remove(previous);
                let call = ctx.alloc(Node::call(function, vec![array]));
                return Ok(Outcome::Replace(call));
            }
            if assigns_to(ctx.tree(), previous, array) {
                break;
            }
        }
        Ok(Outcome::Unchanged)
    }
}
