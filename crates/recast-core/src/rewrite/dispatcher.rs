/*!
# Rule Dispatcher

Drives one pre-order, depth-first pass of a [`RuleSet`] over a file's tree.

For every visited node the rules registered for its kind run in rule order,
each one seeing what the previous one produced. A replacement is spliced into
the parent slot on the spot, its attribute bag mirrored from the node it
replaces, and recorded in the [`ChangedSet`]. Removals and insertions are only
queued; the commanders apply them once the pass is over.
*/

use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, warn};

use super::context::RuleContext;
use super::rules::{Outcome, RuleError, RuleSet};
use crate::attributes::{Attributes, FileId};
use crate::commander::Commanders;
use crate::config::LanguageVersion;
use crate::syntax::{Node, NodeId, NodeKind, ParsedFile, SyntaxTree, TokenStream};
use crate::types::TypeResolver;

/// Identities of nodes replaced during a pass
#[derive(Debug, Default, Clone)]
pub struct ChangedSet {
    nodes: HashSet<NodeId>,
}

impl ChangedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: NodeId) -> bool {
        self.nodes.insert(id)
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
    }

    pub fn extend(&mut self, other: &ChangedSet) {
        self.nodes.extend(other.nodes.iter().copied());
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().copied()
    }
}

/// Everything the engine holds for one file between parse and print
#[derive(Debug)]
pub struct FileState {
    pub file: FileId,
    pub tokens: TokenStream,
    /// Tree as parsed, kept for the printer
    pub original: SyntaxTree,
    pub tree: SyntaxTree,
    pub attrs: Attributes,
    pub commanders: Commanders,
    pub changed: ChangedSet,
}

impl FileState {
    pub fn new(file: FileId, parsed: ParsedFile, attrs: Attributes) -> Self {
        Self {
            file,
            tokens: parsed.tokens,
            original: parsed.tree.clone(),
            tree: parsed.tree,
            attrs,
            commanders: Commanders::new(),
            changed: ChangedSet::new(),
        }
    }

    pub fn context<'s>(
        &'s mut self,
        resolver: &'s dyn TypeResolver,
        version: LanguageVersion,
    ) -> RuleContext<'s> {
        RuleContext::new(
            &mut self.tree,
            &self.attrs,
            &self.tokens,
            resolver,
            &mut self.commanders,
            &self.file,
            version,
        )
    }
}

/// A rule error caught during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RuleFailure {
    pub rule: String,
    pub node: NodeId,
    pub kind: NodeKind,
    pub message: String,
}

/// Tally of one dispatch pass
#[derive(Debug, Default, Clone)]
pub struct PassReport {
    pub visited: usize,
    pub replacements: usize,
    pub removals: usize,
    pub failures: Vec<RuleFailure>,
}

impl PassReport {
    pub fn made_changes(&self) -> bool {
        self.replacements > 0 || self.removals > 0
    }
}

pub struct Dispatcher<'r> {
    resolver: &'r dyn TypeResolver,
    version: LanguageVersion,
}

impl<'r> Dispatcher<'r> {
    pub fn new(resolver: &'r dyn TypeResolver, version: LanguageVersion) -> Self {
        Self { resolver, version }
    }

    /// Run every rule of `rules` over the tree once
    pub fn run_pass(&self, state: &mut FileState, rules: &mut RuleSet) -> PassReport {
        state.changed.clear();
        let mut report = PassReport::default();
        let root = state.tree.root();

        for index in 0..rules.len() {
            let (rule, stats) = rules.rule_mut(index);
            let result = {
                let ctx = state.context(self.resolver, self.version);
                rule.before_traverse(&ctx)
            };
            if let Err(error) = result {
                stats.errors += 1;
                report
                    .failures
                    .push(failure(rule.name(), root, NodeKind::Program, &error));
            }
        }

        // Per-rule count of enclosing subtrees that rule produced
        let mut suppressed = vec![0u32; rules.len()];
        self.visit(state, rules, root, &mut suppressed, &mut report);

        debug!(
            file = %state.file,
            visited = report.visited,
            replaced = report.replacements,
            removed = report.removals,
            "dispatch pass finished"
        );
        report
    }

    fn visit(
        &self,
        state: &mut FileState,
        rules: &mut RuleSet,
        node: NodeId,
        suppressed: &mut [u32],
        report: &mut PassReport,
    ) {
        if state.commanders.removal.is_queued(node) {
            return;
        }
        report.visited += 1;

        let mut current = node;
        let mut last_rule: Option<usize> = None;
        let mut producers = Vec::new();

        loop {
            let kind = state.tree.kind(current);
            let next = rules
                .rules_for(kind)
                .iter()
                .copied()
                .find(|&index| last_rule.map_or(true, |last| index > last) && suppressed[index] == 0);
            let Some(index) = next else {
                break;
            };
            last_rule = Some(index);

            let (rule, stats) = rules.rule_mut(index);
            let checkpoint = state.commanders.checkpoint();
            let started = Instant::now();
            stats.applications += 1;
            let result = {
                let mut ctx = state.context(self.resolver, self.version);
                rule.apply(current, &mut ctx)
            };
            stats.total_time_us += started.elapsed().as_micros() as u64;

            match result {
                Ok(Outcome::Unchanged) => {}
                Ok(Outcome::Replace(replacement)) if replacement == current => {}
                Ok(Outcome::Replace(replacement)) => match self.splice(state, current, replacement) {
                    Ok(placed) => {
                        state.commanders.retarget(current, placed);
                        debug!(rule = rule.name(), node = %current, replacement = %placed, "replaced node");
                        stats.transformations += 1;
                        report.replacements += 1;
                        producers.push(index);
                        current = placed;
                    }
                    Err(error) => {
                        state.commanders.rollback(checkpoint);
                        warn!(rule = rule.name(), node = %current, %error, "rule replacement rejected");
                        stats.errors += 1;
                        report.failures.push(failure(rule.name(), current, kind, &error));
                    }
                },
                Ok(Outcome::Remove) => {
                    debug!(rule = rule.name(), node = %current, "queued removal");
                    stats.transformations += 1;
                    report.removals += 1;
                    state.commanders.removal.remove(current);
                }
                Err(error) => {
                    // Edits the rule queued before failing go with it
                    state.commanders.rollback(checkpoint);
                    warn!(rule = rule.name(), node = %current, %error, "rule failed, node left unchanged");
                    stats.errors += 1;
                    report.failures.push(failure(rule.name(), current, kind, &error));
                }
            }

            // Children of a node on its way out are not visited
            if state.commanders.removal.is_queued(current) {
                return;
            }
        }

        // A rule does not revisit the subtree it just produced
        for &index in &producers {
            suppressed[index] += 1;
        }
        for child in state.tree.children(current) {
            self.visit(state, rules, child, suppressed, report);
        }
        for &index in &producers {
            suppressed[index] -= 1;
        }
    }

    /// Put `new` into `old`'s place and return the node actually placed
    fn splice(&self, state: &mut FileState, old: NodeId, new: NodeId) -> Result<NodeId, RuleError> {
        if state.attrs.ancestors(old).any(|ancestor| ancestor == new) {
            return Err(RuleError::Splice {
                node: old,
                message: "replacement is an ancestor of the replaced node".into(),
            });
        }

        // Statement positions keep statement kinds
        let placed = if state.tree.kind(old).is_statement() && state.tree.kind(new).is_expression() {
            state.tree.alloc(Node::ExprStmt { expr: new })
        } else {
            new
        };

        let parent = state.attrs.parent(old);
        match parent {
            Some(parent) => {
                if !state.tree.node_mut(parent).replace_child(old, placed) {
                    return Err(RuleError::Splice {
                        node: old,
                        message: format!("{} no longer holds it", parent),
                    });
                }
            }
            None if old == state.tree.root() => state.tree.set_root(placed),
            None => {
                return Err(RuleError::Splice {
                    node: old,
                    message: "node has no parent".into(),
                })
            }
        }

        state.attrs.adopt(&state.tree, placed, parent, old);
        state.changed.insert(placed);
        if placed != new {
            state.changed.insert(new);
        }
        Ok(placed)
    }
}

fn failure(rule: &str, node: NodeId, kind: NodeKind, error: &RuleError) -> RuleFailure {
    RuleFailure {
        rule: rule.to_string(),
        node,
        kind,
        message: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::ScopeDecorator;
    use crate::rewrite::rules::Rule;
    use crate::syntax::{QuoteStyle, ScriptParser, SourceParser};
    use crate::types::LocalTypeResolver;

    fn state(source: &str) -> FileState {
        let parsed = ScriptParser::new().parse(source).unwrap();
        let file = FileId::new("d.php");
        let decorated = ScopeDecorator::new(&LocalTypeResolver).decorate(&parsed, &file);
        FileState::new(file, parsed, decorated.attributes)
    }

    fn dispatcher() -> Dispatcher<'static> {
        Dispatcher::new(&LocalTypeResolver, LanguageVersion::new(8, 0))
    }

    /// Records visit order
    #[derive(Default)]
    struct Recorder {
        seen: Vec<NodeKind>,
    }

    impl Rule for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }
        fn description(&self) -> &'static str {
            "records visits"
        }
        fn declared_kinds(&self) -> &'static [NodeKind] {
            &[NodeKind::ExprStmt, NodeKind::Assign, NodeKind::Variable, NodeKind::Number]
        }
        fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            self.seen.push(ctx.kind(node));
            Ok(Outcome::Unchanged)
        }
    }

    /// Wraps every number in a fresh array, which contains a number again
    struct Wrap;

    impl Rule for Wrap {
        fn name(&self) -> &'static str {
            "wrap"
        }
        fn description(&self) -> &'static str {
            "wraps numbers"
        }
        fn declared_kinds(&self) -> &'static [NodeKind] {
            &[NodeKind::Number]
        }
        fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            let copy = ctx.deep_clone(node);
            Ok(Outcome::Replace(ctx.alloc(Node::Array { items: vec![copy] })))
        }
    }

    /// Turns arrays into strings, chained after `Wrap`
    struct Stringify;

    impl Rule for Stringify {
        fn name(&self) -> &'static str {
            "stringify"
        }
        fn description(&self) -> &'static str {
            "arrays become strings"
        }
        fn declared_kinds(&self) -> &'static [NodeKind] {
            &[NodeKind::Array]
        }
        fn apply(&mut self, _node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            Ok(Outcome::Replace(ctx.alloc(Node::string("x", QuoteStyle::Single))))
        }
    }

    struct Failing;

    impl Rule for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn description(&self) -> &'static str {
            "always fails"
        }
        fn declared_kinds(&self) -> &'static [NodeKind] {
            &[NodeKind::Number]
        }
        fn apply(&mut self, node: NodeId, _ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            Err(RuleError::shape(node, "boom"))
        }
    }

    struct RemoveCalls;

    impl Rule for RemoveCalls {
        fn name(&self) -> &'static str {
            "remove-calls"
        }
        fn description(&self) -> &'static str {
            "removes call statements"
        }
        fn declared_kinds(&self) -> &'static [NodeKind] {
            &[NodeKind::ExprStmt, NodeKind::Number]
        }
        fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            match ctx.node(node) {
                Node::ExprStmt { expr } if ctx.kind(*expr) == NodeKind::Call => Ok(Outcome::Remove),
                Node::Number { .. } => Err(RuleError::shape(node, "children of removed nodes are skipped")),
                _ => Ok(Outcome::Unchanged),
            }
        }
    }

    /// Queues an insertion and a removal, then fails
    struct QueueThenFail;

    impl Rule for QueueThenFail {
        fn name(&self) -> &'static str {
            "queue-then-fail"
        }
        fn description(&self) -> &'static str {
            "fails after queueing edits"
        }
        fn declared_kinds(&self) -> &'static [NodeKind] {
            &[NodeKind::ExprStmt]
        }
        fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            let call = ctx.alloc(Node::call("x", Vec::new()));
            ctx.insert_after(node, call);
            ctx.remove(node);
            Err(RuleError::shape(node, "gave up"))
        }
    }

    /// Inserts a call after `a();` and replaces `a();` itself in the same step
    struct InsertAndReplace;

    impl Rule for InsertAndReplace {
        fn name(&self) -> &'static str {
            "insert-and-replace"
        }
        fn description(&self) -> &'static str {
            "inserts after a node it also replaces"
        }
        fn declared_kinds(&self) -> &'static [NodeKind] {
            &[NodeKind::ExprStmt]
        }
        fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            let Node::ExprStmt { expr } = ctx.node(node) else {
                return Ok(Outcome::Unchanged);
            };
            if !matches!(ctx.node(*expr), Node::Call { name, .. } if name == "a") {
                return Ok(Outcome::Unchanged);
            }
            let inserted = ctx.alloc(Node::call("x", Vec::new()));
            ctx.insert_after(node, inserted);
            Ok(Outcome::Replace(ctx.alloc(Node::call("b", Vec::new()))))
        }
    }

    #[test]
    fn test_failed_rule_edits_are_discarded() {
        let mut state = state("a();\nb();");
        let before = state.tree.children(state.tree.root());
        let mut rules = RuleSet::new().with_rule(QueueThenFail);
        let report = dispatcher().run_pass(&mut state, &mut rules);

        assert_eq!(report.failures.len(), 2);
        assert!(!report.made_changes());
        assert!(state.commanders.is_empty());
        state.commanders.apply(&mut state.tree, &mut state.attrs).unwrap();
        assert_eq!(state.tree.children(state.tree.root()), before);
    }

    #[test]
    fn test_insertion_follows_replaced_anchor() {
        let mut state = state("a();\nc();");
        let mut rules = RuleSet::new().with_rule(InsertAndReplace);
        let report = dispatcher().run_pass(&mut state, &mut rules);
        assert_eq!(report.replacements, 1);

        state.commanders.apply(&mut state.tree, &mut state.attrs).unwrap();
        let stmts = state.tree.children(state.tree.root());
        assert_eq!(stmts.len(), 3);
        let names: Vec<_> = stmts
            .iter()
            .map(|&stmt| match state.tree.node(state.tree.children(stmt)[0]) {
                Node::Call { name, .. } => name.clone(),
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(names, ["b", "x", "c"]);
    }

    #[test]
    fn test_pre_order_visit() {
        let mut state = state("a = 1;");
        let mut rules = RuleSet::new().with_rule(Recorder::default());
        let report = dispatcher().run_pass(&mut state, &mut rules);
        assert!(!report.made_changes());
        assert_eq!(rules.stats()[0].applications, 4);
        assert!(state.changed.is_empty());
    }

    #[test]
    fn test_replacement_is_not_revisited_by_its_producer() {
        let mut state = state("a = 1;");
        let mut rules = RuleSet::new().with_rule(Wrap);
        let report = dispatcher().run_pass(&mut state, &mut rules);

        assert_eq!(report.replacements, 1);
        assert_eq!(rules.stats()[0].applications, 1);
        let stmt = state.tree.children(state.tree.root())[0];
        let assign = state.tree.children(stmt)[0];
        let value = state.tree.children(assign)[1];
        assert_eq!(state.tree.kind(value), NodeKind::Array);
        assert!(state.changed.contains(value));
        assert_eq!(state.attrs.parent(value), Some(assign));
        assert_eq!(state.attrs.original_span(value), None);
    }

    #[test]
    fn test_rules_chain_on_the_same_node() {
        let mut state = state("a = 1;");
        let mut rules = RuleSet::new().with_rule(Wrap).with_rule(Stringify);
        let report = dispatcher().run_pass(&mut state, &mut rules);

        assert_eq!(report.replacements, 2);
        let stmt = state.tree.children(state.tree.root())[0];
        let assign = state.tree.children(stmt)[0];
        let value = state.tree.children(assign)[1];
        assert_eq!(state.tree.kind(value), NodeKind::String);
    }

    #[test]
    fn test_rule_error_leaves_node_unchanged() {
        let mut state = state("a = 1;");
        let mut rules = RuleSet::new().with_rule(Failing);
        let report = dispatcher().run_pass(&mut state, &mut rules);

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].rule, "failing");
        assert_eq!(report.failures[0].kind, NodeKind::Number);
        assert_eq!(rules.stats()[0].errors, 1);
        assert!(!report.made_changes());
    }

    #[test]
    fn test_removal_is_deferred_and_skips_children() {
        let mut state = state("f(1);\na = 2;");
        let mut rules = RuleSet::new().with_rule(RemoveCalls);
        let report = dispatcher().run_pass(&mut state, &mut rules);

        // Only the number under the assignment is visited
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.removals, 1);
        assert_eq!(state.tree.children(state.tree.root()).len(), 2);

        state.commanders.apply(&mut state.tree, &mut state.attrs).unwrap();
        assert_eq!(state.tree.children(state.tree.root()).len(), 1);
    }
}
