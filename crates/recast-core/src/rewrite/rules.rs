/*!
# Rewrite Rules

Core trait for rewrite rules and the ordered set the dispatcher drives.
*/

use std::cmp::Reverse;
use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use super::context::RuleContext;
use crate::syntax::{NodeId, NodeKind};

/// What a rule did with the node it was given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Leave the node as it is
    Unchanged,
    /// Put this node in the visited node's place. Returning the visited
    /// node's own id is the same as `Unchanged`.
    Replace(NodeId),
    /// Detach the node once the pass is over
    Remove,
}

/// A rule failed while looking at a node. The dispatcher reports it and
/// carries on as if the rule had returned [`Outcome::Unchanged`].
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("unexpected shape at {node}: {message}")]
    UnexpectedShape { node: NodeId, message: String },

    #[error("replacement for {node} could not be attached: {message}")]
    Splice { node: NodeId, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RuleError {
    pub fn shape(node: NodeId, message: impl Into<String>) -> Self {
        RuleError::UnexpectedShape {
            node,
            message: message.into(),
        }
    }
}

/// Core trait for rewrite rules
///
/// A rule declares the node kinds it wants to see and is handed every node of
/// those kinds in pre-order. Rules are reset between files and may keep
/// bounded per-file state collected in [`Rule::before_traverse`].
pub trait Rule: Send {
    /// Stable identifier, used in configuration and reports
    fn name(&self) -> &'static str;

    /// One-line description of the rewrite
    fn description(&self) -> &'static str;

    /// Ordering weight when a set is built by priority (higher runs first)
    fn priority(&self) -> u32 {
        100
    }

    /// Node kinds this rule wants to be called for
    fn declared_kinds(&self) -> &'static [NodeKind];

    /// Forget per-file state
    fn reset(&mut self) {}

    /// Look at the whole tree before the pass starts
    fn before_traverse(&mut self, ctx: &RuleContext<'_>) -> Result<(), RuleError> {
        let _ = ctx;
        Ok(())
    }

    /// Inspect `node` and say what should happen to it
    fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError>;
}

/// Rule execution statistics
#[derive(Debug, Default, Clone, Serialize)]
pub struct RuleStats {
    pub rule_name: String,
    pub applications: u64,
    pub transformations: u64,
    pub errors: u64,
    pub total_time_us: u64,
}

impl RuleStats {
    pub fn new(rule_name: String) -> Self {
        Self {
            rule_name,
            ..Default::default()
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.transformations as f64) / (self.applications as f64)
        }
    }

    pub fn average_time_us(&self) -> f64 {
        if self.applications == 0 {
            0.0
        } else {
            (self.total_time_us as f64) / (self.applications as f64)
        }
    }
}

/// Rules in a fixed total order plus a kind registry resolved up front
#[derive(Default)]
pub struct RuleSet {
    rules: Vec<Box<dyn Rule>>,
    stats: Vec<RuleStats>,
    registry: HashMap<NodeKind, Vec<usize>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule after the ones already registered
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) {
        self.stats.push(RuleStats::new(rule.name().to_string()));
        self.rules.push(rule);
        self.rebuild_registry();
    }

    pub fn with_rule(mut self, rule: impl Rule + 'static) -> Self {
        self.add_rule(Box::new(rule));
        self
    }

    /// Stable sort by descending priority; ties keep registration order
    pub fn sort_by_priority(&mut self) {
        let mut entries: Vec<_> = self.rules.drain(..).zip(self.stats.drain(..)).collect();
        entries.sort_by_key(|(rule, _)| Reverse(rule.priority()));
        for (rule, stats) in entries {
            self.rules.push(rule);
            self.stats.push(stats);
        }
        self.rebuild_registry();
    }

    fn rebuild_registry(&mut self) {
        self.registry.clear();
        for (index, rule) in self.rules.iter().enumerate() {
            for &kind in rule.declared_kinds() {
                let slots = self.registry.entry(kind).or_default();
                if !slots.contains(&index) {
                    slots.push(index);
                }
            }
        }
    }

    /// Indices of rules interested in `kind`, in rule order
    pub fn rules_for(&self, kind: NodeKind) -> &[usize] {
        self.registry.get(&kind).map_or(&[], Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub fn stats(&self) -> &[RuleStats] {
        &self.stats
    }

    pub(crate) fn rule_mut(&mut self, index: usize) -> (&mut dyn Rule, &mut RuleStats) {
        (self.rules[index].as_mut(), &mut self.stats[index])
    }

    pub fn reset(&mut self) {
        for rule in &mut self.rules {
            rule.reset();
        }
    }
}

impl std::fmt::Debug for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleSet")
            .field("rules", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        name: &'static str,
        priority: u32,
        kinds: &'static [NodeKind],
    }

    impl Rule for Fixed {
        fn name(&self) -> &'static str {
            self.name
        }

        fn description(&self) -> &'static str {
            "test rule"
        }

        fn priority(&self) -> u32 {
            self.priority
        }

        fn declared_kinds(&self) -> &'static [NodeKind] {
            self.kinds
        }

        fn apply(&mut self, _node: NodeId, _ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            Ok(Outcome::Unchanged)
        }
    }

    fn fixed(name: &'static str, priority: u32, kinds: &'static [NodeKind]) -> Fixed {
        Fixed {
            name,
            priority,
            kinds,
        }
    }

    #[test]
    fn test_registry_follows_rule_order() {
        let set = RuleSet::new()
            .with_rule(fixed("a", 100, &[NodeKind::Call]))
            .with_rule(fixed("b", 100, &[NodeKind::String, NodeKind::Call]));
        assert_eq!(set.rules_for(NodeKind::Call), &[0, 1]);
        assert_eq!(set.rules_for(NodeKind::String), &[1]);
        assert!(set.rules_for(NodeKind::Echo).is_empty());
    }

    #[test]
    fn test_priority_sort_is_stable() {
        let mut set = RuleSet::new()
            .with_rule(fixed("low", 50, &[NodeKind::Call]))
            .with_rule(fixed("high-1", 200, &[NodeKind::Call]))
            .with_rule(fixed("mid", 100, &[NodeKind::Call]))
            .with_rule(fixed("high-2", 200, &[NodeKind::Call]));
        set.sort_by_priority();
        assert_eq!(set.names(), vec!["high-1", "high-2", "mid", "low"]);
        assert_eq!(set.stats()[0].rule_name, "high-1");
        assert_eq!(set.rules_for(NodeKind::Call), &[0, 1, 2, 3]);
    }

    #[test]
    fn test_stats_rates() {
        let stats = RuleStats {
            rule_name: "r".into(),
            applications: 4,
            transformations: 1,
            errors: 0,
            total_time_us: 8,
        };
        assert_eq!(stats.success_rate(), 0.25);
        assert_eq!(stats.average_time_us(), 2.0);
        assert_eq!(RuleStats::new("x".into()).success_rate(), 0.0);
    }
}
