//! Configurable function renames: `sizeof(x)` → `count(x)`.

use indexmap::IndexMap;

use crate::rewrite::context::RuleContext;
use crate::rewrite::rules::{Outcome, Rule, RuleError};
use crate::syntax::{Node, NodeId, NodeKind};

#[derive(Debug, Default, Clone)]
pub struct RenameFunction {
    /// Lowercased old name to new name
    renames: IndexMap<String, String>,
}

impl RenameFunction {
    pub fn new<I, K, V>(renames: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let renames = renames
            .into_iter()
            .map(|(old, new)| (old.as_ref().trim_start_matches('\\').to_ascii_lowercase(), new.into()))
            .collect();
        Self { renames }
    }

    pub fn len(&self) -> usize {
        self.renames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.renames.is_empty()
    }
}

impl Rule for RenameFunction {
    fn name(&self) -> &'static str {
        "rename-function"
    }

    fn description(&self) -> &'static str {
        "Rename function calls according to the configured map"
    }

    fn priority(&self) -> u32 {
        200
    }

    fn declared_kinds(&self) -> &'static [NodeKind] {
        &[NodeKind::Call]
    }

    fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
        let Node::Call { name, args } = ctx.node(node) else {
            return Ok(Outcome::Unchanged);
        };
        let key = name.trim_start_matches('\\').to_ascii_lowercase();
        let Some(renamed) = self.renames.get(&key) else {
            return Ok(Outcome::Unchanged);
        };
        if renamed.eq_ignore_ascii_case(name.trim_start_matches('\\')) {
            return Ok(Outcome::Unchanged);
        }
        let call = Node::call(renamed.clone(), args.clone());
        Ok(Outcome::Replace(ctx.alloc(call)))
    }
}
