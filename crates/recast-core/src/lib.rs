//! # Recast Core
//!
//! Format-preserving source-to-source rewriting, including:
//! - A lossless token stream and arena syntax tree for a PHP-like dialect
//! - Per-node attribute bags filled in by the scope decorator
//! - Rewrite rules, dispatched by node kind in a fixed rule order
//! - Deferred structural edits (insertion, class members, removal)
//! - A printer that reuses original text for everything left untouched
//! - A pipeline per file and a parallel batch runner over many files
//!
//! The CLI in `recast-cli` is a thin shell over [`BatchRunner`].

#![warn(clippy::all)]

pub mod attributes;
pub mod commander;
pub mod config;
pub mod decorator;
pub mod deprecations;
pub mod pipeline;
pub mod printer;
pub mod rewrite;
pub mod runner;
pub mod syntax;
pub mod types;
pub mod writer;

// Re-export commonly used types
pub use attributes::{AttributeBag, Attributes, FileId, Scope, TypeHandle};
pub use commander::{CommandError, Commanders, CommitReport, MutationCommand};
pub use config::{ConfigError, LanguageVersion, RecastConfig};
pub use decorator::{Decorated, ScopeDecorator};
pub use deprecations::{Deprecation, DeprecationCollector, DeprecationScanner};
pub use pipeline::{
    CancellationToken, Diagnostic, FailureKind, FileOutcome, PassPolicy, Pipeline, PipelineError,
    PipelineState,
};
pub use printer::Printer;
pub use rewrite::{
    EmittedFile, FileEffects, FileRule, FileView, Outcome, Rule, RuleCatalog, RuleContext, RuleError, RuleSet,
    RuleStats,
};
pub use runner::{BatchRunner, FailedFile, FileWarning, RunSummary};
pub use syntax::{Node, NodeId, NodeKind, ParseError, ParsedFile, ScriptParser, SourceParser, SyntaxTree};
pub use types::{LocalTypeResolver, TypeResolver};
pub use writer::{FsWriter, MemoryWriter, Writer};

/// Recast version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for recast components
///
/// Honours `RUST_LOG`; defaults to `recast_core=info`. Calling it twice is
/// harmless.
pub fn init_tracing() {
    init_tracing_with("recast_core=info");
}

/// Like [`init_tracing`], with `directive` used when `RUST_LOG` is unset
pub fn init_tracing_with(directive: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(directive));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Error types for recast operations
#[derive(thiserror::Error, Debug)]
pub enum RecastError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Per-file pipeline failure
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Filesystem error outside a single file's pipeline
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for recast operations
pub type Result<T> = std::result::Result<T, RecastError>;
