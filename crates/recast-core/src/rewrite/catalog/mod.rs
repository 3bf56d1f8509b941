/*!
# Rule Catalog

Built-in rewrite rules and the name → constructor registry used to build a
[`RuleSet`], plus the opt-in file rules, from configuration. Every worker builds its own set, so rules
never share per-file state across threads.
*/

pub mod array_key_first_last;
pub mod empty_string_to_array;
pub mod process_string_to_array;
pub mod rename_function;
pub mod response_status_code;
pub mod split_classes;

use indexmap::IndexMap;

pub use array_key_first_last::ArrayKeyFirstLast;
pub use empty_string_to_array::EmptyStringToArray;
pub use process_string_to_array::ProcessStringToArray;
pub use rename_function::RenameFunction;
pub use response_status_code::ResponseStatusCode;
pub use split_classes::SplitClassesPerFile;

use super::file_rules::FileRule;
use super::rules::{Rule, RuleSet};
use crate::config::{ConfigError, RecastConfig};

/// Builds one rule instance from the run configuration
pub type RuleFactory = fn(&RecastConfig) -> Box<dyn Rule>;

/// Builds one file rule instance from the run configuration
pub type FileRuleFactory = fn(&RecastConfig) -> Box<dyn FileRule>;

/// Name, description and default priority of a catalog rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub priority: u32,
}

#[derive(Clone, Default)]
pub struct RuleCatalog {
    factories: IndexMap<&'static str, RuleFactory>,
    file_factories: IndexMap<&'static str, FileRuleFactory>,
}

impl RuleCatalog {
    /// An empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding every rule shipped with the crate
    pub fn builtin() -> Self {
        let mut catalog = Self::new();
        catalog.register("empty-string-to-array", empty_string_to_array);
        catalog.register("array-key-first-last", array_key_first_last);
        catalog.register("response-status-code", response_status_code);
        catalog.register("process-string-to-array", process_string_to_array);
        catalog.register("rename-function", rename_function);
        catalog.register_file_rule("split-classes", split_classes);
        catalog
    }

    /// Add or replace a rule constructor
    pub fn register(&mut self, name: &'static str, factory: RuleFactory) {
        self.factories.insert(name, factory);
    }

    /// Add or replace a file rule constructor
    pub fn register_file_rule(&mut self, name: &'static str, factory: FileRuleFactory) {
        self.file_factories.insert(name, factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Listing of every rule, in registration order
    pub fn describe(&self) -> Vec<RuleInfo> {
        let config = RecastConfig::default();
        self.factories
            .iter()
            .map(|(name, factory)| {
                let rule = factory(&config);
                RuleInfo {
                    name: *name,
                    description: rule.description(),
                    priority: rule.priority(),
                }
            })
            .collect()
    }

    /// Listing of every file rule, in registration order
    pub fn describe_file_rules(&self) -> Vec<RuleInfo> {
        let config = RecastConfig::default();
        self.file_factories
            .iter()
            .map(|(name, factory)| RuleInfo {
                name: *name,
                description: factory(&config).description(),
                priority: 0,
            })
            .collect()
    }

    /// File rules named in `config.file_rules`, in that order. File rules
    /// never run unless listed.
    pub fn build_file_rules(&self, config: &RecastConfig) -> Result<Vec<Box<dyn FileRule>>, ConfigError> {
        config
            .file_rules
            .iter()
            .map(|name| {
                self.file_factories
                    .get(name.as_str())
                    .map(|factory| factory(config))
                    .ok_or_else(|| ConfigError::UnknownRule(name.clone()))
            })
            .collect()
    }

    pub fn create(&self, name: &str, config: &RecastConfig) -> Result<Box<dyn Rule>, ConfigError> {
        self.factories
            .get(name)
            .map(|factory| factory(config))
            .ok_or_else(|| ConfigError::UnknownRule(name.to_string()))
    }

    /// Rule set for `config`: the configured rules in the configured order,
    /// or every catalog rule by descending priority when none are listed
    pub fn build(&self, config: &RecastConfig) -> Result<RuleSet, ConfigError> {
        let mut set = RuleSet::new();
        if config.rules.is_empty() {
            for factory in self.factories.values() {
                set.add_rule(factory(config));
            }
            set.sort_by_priority();
        } else {
            for name in &config.rules {
                set.add_rule(self.create(name, config)?);
            }
        }
        Ok(set)
    }
}

fn empty_string_to_array(_: &RecastConfig) -> Box<dyn Rule> {
    Box::new(EmptyStringToArray::new())
}

fn array_key_first_last(_: &RecastConfig) -> Box<dyn Rule> {
    Box::new(ArrayKeyFirstLast::new())
}

fn response_status_code(_: &RecastConfig) -> Box<dyn Rule> {
    Box::new(ResponseStatusCode::new())
}

fn process_string_to_array(_: &RecastConfig) -> Box<dyn Rule> {
    Box::new(ProcessStringToArray::new())
}

fn rename_function(config: &RecastConfig) -> Box<dyn Rule> {
    Box::new(RenameFunction::new(config.rename_functions.clone()))
}

fn split_classes(_: &RecastConfig) -> Box<dyn FileRule> {
    Box::new(SplitClassesPerFile::new())
}

impl std::fmt::Debug for RuleCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleCatalog")
            .field("rules", &self.names())
            .field("file_rules", &self.file_factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
