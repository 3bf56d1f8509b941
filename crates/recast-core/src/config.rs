/*!
# Configuration

Run configuration, loaded from a JSON file and overridden by command-line
flags. Every field has a default so an empty file (`{}`) is valid.
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::pipeline::PassPolicy;

/// Subject-language version rules can gate on, e.g. `7.3`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LanguageVersion {
    pub major: u16,
    pub minor: u16,
}

impl LanguageVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        Self { major, minor }
    }
}

impl Default for LanguageVersion {
    fn default() -> Self {
        Self::new(8, 0)
    }
}

impl fmt::Display for LanguageVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for LanguageVersion {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidVersion(s.to_string());
        let (major, minor) = s.trim().split_once('.').unwrap_or((s.trim(), "0"));
        let major = major.parse().map_err(|_| invalid())?;
        let minor = minor.parse().map_err(|_| invalid())?;
        Ok(Self::new(major, minor))
    }
}

impl TryFrom<String> for LanguageVersion {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LanguageVersion> for String {
    fn from(version: LanguageVersion) -> Self {
        version.to_string()
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Format {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown rule `{0}`")]
    UnknownRule(String),

    #[error("rule `{0}` listed more than once")]
    DuplicateRule(String),

    #[error("invalid language version `{0}`")]
    InvalidVersion(String),

    #[error("{0}")]
    Invalid(String),
}

/// Recast run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecastConfig {
    /// Rules to run, in order. Empty means every catalog rule by priority.
    pub rules: Vec<String>,
    /// Whole-file rules to run after the node rules, in order
    pub file_rules: Vec<String>,
    /// Upper bound on dispatch passes per file
    pub max_passes: usize,
    /// Re-run dispatch until no rule reports a change
    pub multi_pass: bool,
    /// Worker threads for batch runs
    pub jobs: usize,
    /// File extensions picked up when walking directories
    pub extensions: Vec<String>,
    pub target_version: LanguageVersion,
    /// `old -> new` function renames
    pub rename_functions: IndexMap<String, String>,
    /// Print results instead of writing files
    pub dry_run: bool,
    /// Write rewritten files here instead of in place
    pub output_dir: Option<PathBuf>,
}

impl Default for RecastConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            file_rules: Vec::new(),
            max_passes: 10,
            multi_pass: true,
            jobs: std::thread::available_parallelism().map_or(1, |n| n.get()),
            extensions: vec!["php".to_string(), "script".to_string()],
            target_version: LanguageVersion::default(),
            rename_functions: IndexMap::new(),
            dry_run: false,
            output_dir: None,
        }
    }
}

impl RecastConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Format {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_passes == 0 {
            return Err(ConfigError::Invalid("max_passes must be at least 1".into()));
        }
        if self.jobs == 0 {
            return Err(ConfigError::Invalid("jobs must be at least 1".into()));
        }
        if self.extensions.is_empty() {
            return Err(ConfigError::Invalid("at least one extension is required".into()));
        }
        for list in [&self.rules, &self.file_rules] {
            let mut seen = std::collections::HashSet::new();
            for rule in list {
                if !seen.insert(rule.as_str()) {
                    return Err(ConfigError::DuplicateRule(rule.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn pass_policy(&self) -> PassPolicy {
        if self.multi_pass {
            PassPolicy::UntilStable {
                max_passes: self.max_passes,
            }
        } else {
            PassPolicy::Single
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_version_parsing_and_order() {
        let v73: LanguageVersion = "7.3".parse().unwrap();
        assert_eq!(v73, LanguageVersion::new(7, 3));
        assert!(LanguageVersion::new(8, 0) > v73);
        assert!(LanguageVersion::new(7, 2) < v73);
        assert_eq!("8".parse::<LanguageVersion>().unwrap(), LanguageVersion::new(8, 0));
        assert!("seven".parse::<LanguageVersion>().is_err());
        assert_eq!(v73.to_string(), "7.3");
    }

    #[test]
    fn test_defaults_from_empty_object() {
        let config: RecastConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.max_passes, 10);
        assert!(config.multi_pass);
        assert_eq!(config.extensions, vec!["php", "script"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"rules": ["rename-function"], "target_version": "7.2", "rename_functions": {{"sizeof": "count"}}}}"#
        )
        .unwrap();
        let config = RecastConfig::from_file(file.path()).unwrap();
        assert_eq!(config.rules, vec!["rename-function"]);
        assert_eq!(config.target_version, LanguageVersion::new(7, 2));
        assert_eq!(config.rename_functions.get("sizeof").map(String::as_str), Some("count"));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = RecastConfig {
            max_passes: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RecastConfig {
            rules: vec!["a".into(), "a".into()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateRule(_))));

        let config = RecastConfig {
            file_rules: vec!["split-classes".into(), "split-classes".into()],
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::DuplicateRule(_))));
    }

    #[test]
    fn test_pass_policy() {
        let config = RecastConfig {
            multi_pass: false,
            ..Default::default()
        };
        assert_eq!(config.pass_policy(), PassPolicy::Single);
    }
}
