/*!
# Rewrite Engine

Rules, whole-file rules, the context they work through, the dispatcher that feeds them nodes,
the pattern helpers they match with and the catalog of built-in rules.
*/

pub mod catalog;
pub mod context;
pub mod dispatcher;
pub mod file_rules;
pub mod patterns;
pub mod rules;

pub use catalog::{FileRuleFactory, RuleCatalog, RuleFactory, RuleInfo};
pub use context::RuleContext;
pub use dispatcher::{ChangedSet, Dispatcher, FileState, PassReport, RuleFailure};
pub use file_rules::{EmittedFile, FileEffects, FileRule, FileView};
pub use patterns::{NodePattern, PatternMatcher, TreeWalker};
pub use rules::{Outcome, Rule, RuleError, RuleSet, RuleStats};
