/*!
# Pipeline Orchestrator

Runs one file through the stages

```text
Parsed -> Decorated -> Dispatched -> Committed -> Printed
```

Dispatch and commit may repeat while rules keep changing the tree, bounded by
the pass policy. Any fatal condition moves the file to `Failed`; nothing is
handed to a writer in that case. Cancellation is checked at every stage
boundary.
*/

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, debug_span, info_span, warn};

use crate::attributes::FileId;
use crate::commander::CommandError;
use crate::config::LanguageVersion;
use crate::decorator::ScopeDecorator;
use crate::printer::Printer;
use crate::rewrite::dispatcher::{ChangedSet, Dispatcher, FileState};
use crate::rewrite::file_rules::{EmittedFile, FileEffects, FileRule, FileView};
use crate::rewrite::rules::RuleSet;
use crate::syntax::{NodeId, NodeKind, ParseError, ScriptParser, SourceParser};
use crate::types::{LocalTypeResolver, TypeResolver};

/// Per-file pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Parsed,
    Decorated,
    Dispatched,
    Committed,
    Printed,
    Failed,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Fatal, per-file pipeline errors
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("parse failure: {0}")]
    Parse(#[from] ParseError),

    #[error("structural invariant violation: {0}")]
    StructuralInvariantViolation(CommandError),

    #[error("queued edit could not be applied: {0}")]
    InvalidEdit(CommandError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cancelled before {stage}")]
    Cancelled { stage: PipelineState },
}

impl From<CommandError> for PipelineError {
    fn from(error: CommandError) -> Self {
        if error.is_structural() {
            PipelineError::StructuralInvariantViolation(error)
        } else {
            PipelineError::InvalidEdit(error)
        }
    }
}

/// Failure category reported in run summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ParseFailure,
    StructuralInvariantViolation,
    InvalidEdit,
    Io,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::ParseFailure => "parse_failure",
            FailureKind::StructuralInvariantViolation => "structural_invariant_violation",
            FailureKind::InvalidEdit => "invalid_edit",
            FailureKind::Io => "io",
            FailureKind::Cancelled => "cancelled",
        })
    }
}

impl PipelineError {
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::Parse(_) => FailureKind::ParseFailure,
            PipelineError::StructuralInvariantViolation(_) => FailureKind::StructuralInvariantViolation,
            PipelineError::InvalidEdit(_) => FailureKind::InvalidEdit,
            PipelineError::Read { .. } | PipelineError::Write { .. } => FailureKind::Io,
            PipelineError::Cancelled { .. } => FailureKind::Cancelled,
        }
    }
}

/// Non-fatal finding attached to a processed file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Diagnostic {
    /// Nodes whose scope the resolver could not determine
    ScopeUnknown { count: usize },
    /// A rule failed on a node, which was left unchanged
    RuleException {
        rule: String,
        node: NodeId,
        kind: NodeKind,
        message: String,
    },
    /// Dispatch was still changing the tree when the pass bound was hit
    ConvergenceBound { passes: usize },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::ScopeUnknown { count } => write!(f, "{} node(s) with unknown scope", count),
            Diagnostic::RuleException {
                rule,
                node,
                kind,
                message,
            } => write!(f, "rule {} failed on {:?} {}: {}", rule, kind, node, message),
            Diagnostic::ConvergenceBound { passes } => {
                write!(f, "did not converge within {} passes", passes)
            }
        }
    }
}

/// How many dispatch passes a file gets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPolicy {
    Single,
    /// Repeat until a pass changes nothing, at most `max_passes` times
    UntilStable { max_passes: usize },
}

impl PassPolicy {
    pub fn max_passes(self) -> usize {
        match self {
            PassPolicy::Single => 1,
            PassPolicy::UntilStable { max_passes } => max_passes.max(1),
        }
    }
}

impl Default for PassPolicy {
    fn default() -> Self {
        PassPolicy::UntilStable { max_passes: 10 }
    }
}

/// Shared flag that abandons in-flight files at the next stage boundary
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn check(&self, stage: PipelineState) -> Result<(), PipelineError> {
        if self.is_cancelled() {
            Err(PipelineError::Cancelled { stage })
        } else {
            Ok(())
        }
    }
}

/// Result of running one file through the pipeline
#[derive(Debug, Clone)]
pub struct FileOutcome {
    pub file: FileId,
    pub output: String,
    /// Whether `output` differs from the input
    pub rewritten: bool,
    /// Rewritten, or file rules had effects
    pub changed: bool,
    pub passes: usize,
    pub diagnostics: Vec<Diagnostic>,
    /// Extra files requested by file rules
    pub emitted: Vec<EmittedFile>,
    /// A file rule asked for the source file to be deleted
    pub remove_source: bool,
}

pub struct Pipeline {
    parser: Box<dyn SourceParser>,
    resolver: Box<dyn TypeResolver>,
    rules: RuleSet,
    file_rules: Vec<Box<dyn FileRule>>,
    policy: PassPolicy,
    version: LanguageVersion,
}

impl Pipeline {
    /// Pipeline with the bundled parser and resolver
    pub fn new(rules: RuleSet) -> Self {
        Self {
            parser: Box::new(ScriptParser::new()),
            resolver: Box::new(LocalTypeResolver::new()),
            rules,
            file_rules: Vec::new(),
            policy: PassPolicy::default(),
            version: LanguageVersion::default(),
        }
    }

    pub fn with_parser(mut self, parser: Box<dyn SourceParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_resolver(mut self, resolver: Box<dyn TypeResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_file_rule(mut self, rule: impl FileRule + 'static) -> Self {
        self.file_rules.push(Box::new(rule));
        self
    }

    pub fn with_file_rules(mut self, rules: Vec<Box<dyn FileRule>>) -> Self {
        self.file_rules.extend(rules);
        self
    }

    pub fn with_policy(mut self, policy: PassPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_version(mut self, version: LanguageVersion) -> Self {
        self.version = version;
        self
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Read and process a file from disk
    pub fn process_file(&mut self, path: &Path, cancel: &CancellationToken) -> Result<FileOutcome, PipelineError> {
        let source = std::fs::read_to_string(path).map_err(|source| PipelineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        self.process_source_with(&FileId::new(path.to_string_lossy()), &source, cancel)
    }

    pub fn process_source(&mut self, file: &FileId, source: &str) -> Result<FileOutcome, PipelineError> {
        self.process_source_with(file, source, &CancellationToken::new())
    }

    pub fn process_source_with(
        &mut self,
        file: &FileId,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, PipelineError> {
        let span = file_span(file);
        let _enter = span.enter();

        let result = self.run_stages(file, source, cancel);
        match &result {
            Ok(outcome) => debug!(
                state = %PipelineState::Printed,
                changed = outcome.changed,
                passes = outcome.passes,
                "file done"
            ),
            Err(error) => warn!(state = %PipelineState::Failed, %error, "file failed"),
        }
        result
    }

    fn run_stages(
        &mut self,
        file: &FileId,
        source: &str,
        cancel: &CancellationToken,
    ) -> Result<FileOutcome, PipelineError> {
        self.rules.reset();
        let mut diagnostics = Vec::new();

        cancel.check(PipelineState::Parsed)?;
        let parsed = self.parser.parse(source)?;
        debug!(state = %PipelineState::Parsed, nodes = parsed.tree.len());

        cancel.check(PipelineState::Decorated)?;
        let decorated = ScopeDecorator::new(self.resolver.as_ref()).decorate(&parsed, file);
        if !decorated.unknown_scopes.is_empty() {
            warn!(count = decorated.unknown_scopes.len(), "unknown scope, dependent rules will skip");
            diagnostics.push(Diagnostic::ScopeUnknown {
                count: decorated.unknown_scopes.len(),
            });
        }
        debug!(state = %PipelineState::Decorated);

        let mut state = FileState::new(file.clone(), parsed, decorated.attributes);
        let dispatcher = Dispatcher::new(self.resolver.as_ref(), self.version);
        let mut changed = ChangedSet::new();
        let max_passes = self.policy.max_passes();
        let mut passes = 0;
        let mut stable = false;

        while passes < max_passes {
            passes += 1;
            let _pass = debug_span!("pass", number = passes).entered();

            cancel.check(PipelineState::Dispatched)?;
            let report = dispatcher.run_pass(&mut state, &mut self.rules);
            diagnostics.extend(report.failures.iter().map(|failure| Diagnostic::RuleException {
                rule: failure.rule.clone(),
                node: failure.node,
                kind: failure.kind,
                message: failure.message.clone(),
            }));
            changed.extend(&state.changed);
            debug!(state = %PipelineState::Dispatched, replaced = report.replacements);

            cancel.check(PipelineState::Committed)?;
            let commit = state.commanders.apply(&mut state.tree, &mut state.attrs)?;
            debug!(state = %PipelineState::Committed, edits = commit.total());

            if !report.made_changes() && commit.total() == 0 {
                stable = true;
                break;
            }
            if self.policy == PassPolicy::Single {
                stable = true;
            }
        }

        if !stable {
            warn!(passes, "pass bound reached before the tree stabilised");
            diagnostics.push(Diagnostic::ConvergenceBound { passes });
        }

        let effects = self.run_file_rules(file, &state, &changed, &mut diagnostics);
        let (emitted, dropped, remove_source) = effects.into_parts();
        if !dropped.is_empty() {
            cancel.check(PipelineState::Committed)?;
            for statement in dropped {
                state.commanders.removal.remove(statement);
            }
            state.commanders.apply(&mut state.tree, &mut state.attrs)?;
        }

        cancel.check(PipelineState::Printed)?;
        let output = Printer::new(&state.tree, &state.original, &state.attrs, &state.tokens, &changed).print();

        let rewritten = output != source;
        Ok(FileOutcome {
            file: file.clone(),
            rewritten,
            changed: rewritten || remove_source || !emitted.is_empty(),
            output,
            passes,
            diagnostics,
            emitted,
            remove_source,
        })
    }

    /// Give every file rule one look at the settled tree. A failing rule's
    /// effects are dropped and reported like a node rule failure.
    fn run_file_rules(
        &mut self,
        file: &FileId,
        state: &FileState,
        changed: &ChangedSet,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> FileEffects {
        let mut effects = FileEffects::new();
        if self.file_rules.is_empty() {
            return effects;
        }
        let printer = Printer::new(&state.tree, &state.original, &state.attrs, &state.tokens, changed);
        let view = FileView::new(Path::new(file.as_str()), &state.tree, &state.attrs, &printer);
        let root = state.tree.root();
        for rule in &mut self.file_rules {
            let checkpoint = effects.checkpoint();
            if let Err(error) = rule.apply(&view, &mut effects) {
                effects.rollback(checkpoint);
                warn!(rule = rule.name(), %error, "file rule failed");
                diagnostics.push(Diagnostic::RuleException {
                    rule: rule.name().to_string(),
                    node: root,
                    kind: NodeKind::Program,
                    message: error.to_string(),
                });
            }
        }
        debug!(
            emitted = effects.emitted().len(),
            dropped = effects.dropped().len(),
            remove_source = effects.removes_source(),
            "file rules done"
        );
        effects
    }
}

fn file_span(file: &FileId) -> tracing::Span {
    info_span!("file", file = %file)
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("rules", &self.rules)
            .field(
                "file_rules",
                &self.file_rules.iter().map(|rule| rule.name()).collect::<Vec<_>>(),
            )
            .field("policy", &self.policy)
            .field("version", &self.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::context::RuleContext;
    use crate::rewrite::rules::{Outcome, Rule, RuleError};
    use crate::syntax::Node;
    use pretty_assertions::assert_eq;

    /// Flips every boolean literal, forever
    struct Toggle;

    impl Rule for Toggle {
        fn name(&self) -> &'static str {
            "toggle"
        }
        fn description(&self) -> &'static str {
            "flips booleans"
        }
        fn declared_kinds(&self) -> &'static [NodeKind] {
            &[NodeKind::Bool]
        }
        fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
            let Node::Bool { value } = ctx.node(node) else {
                return Ok(Outcome::Unchanged);
            };
            let flipped = Node::Bool { value: !*value };
            Ok(Outcome::Replace(ctx.alloc(flipped)))
        }
    }

    fn file() -> FileId {
        FileId::new("t.php")
    }

    #[test]
    fn test_no_rules_is_identity() {
        let source = "<?php\n$a = 1;   // one\n\nif ($a) {\n\techo 'x';\n}\n";
        let outcome = Pipeline::new(RuleSet::new()).process_source(&file(), source).unwrap();
        assert_eq!(outcome.output, source);
        assert!(!outcome.changed);
        assert_eq!(outcome.passes, 1);
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_convergence_bound_is_reported() {
        let mut pipeline = Pipeline::new(RuleSet::new().with_rule(Toggle))
            .with_policy(PassPolicy::UntilStable { max_passes: 3 });
        let outcome = pipeline.process_source(&file(), "x = true;").unwrap();
        assert_eq!(outcome.passes, 3);
        assert_eq!(outcome.output, "x = false;");
        assert!(outcome
            .diagnostics
            .contains(&Diagnostic::ConvergenceBound { passes: 3 }));
    }

    #[test]
    fn test_single_pass_policy_is_not_a_bound() {
        let mut pipeline = Pipeline::new(RuleSet::new().with_rule(Toggle)).with_policy(PassPolicy::Single);
        let outcome = pipeline.process_source(&file(), "x = true;").unwrap();
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.output, "x = false;");
        assert!(outcome.diagnostics.is_empty());
    }

    #[test]
    fn test_file_span_enabled_by_default_filter() {
        use tracing_subscriber::layer::SubscriberExt;

        let subscriber = tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::new("recast_core=info"));
        tracing::subscriber::with_default(subscriber, || {
            let span = file_span(&file());
            assert!(!span.is_disabled());
        });
    }

    #[test]
    fn test_unplaceable_edit_is_not_a_structural_violation() {
        let node = NodeId::new(3);
        let placement = PipelineError::from(CommandError::NoSequence { anchor: node, node });
        assert_eq!(placement.kind(), FailureKind::InvalidEdit);
        let removal = PipelineError::from(CommandError::RequiredChild { target: node, parent: node });
        assert_eq!(removal.kind(), FailureKind::StructuralInvariantViolation);
    }

    /// Emits a file, then fails
    struct EmitThenFail;

    impl FileRule for EmitThenFail {
        fn name(&self) -> &'static str {
            "emit-then-fail"
        }
        fn description(&self) -> &'static str {
            "fails after emitting"
        }
        fn apply(&mut self, _file: &FileView<'_>, effects: &mut FileEffects) -> Result<(), RuleError> {
            effects.emit("extra.php", "<?php\n");
            effects.remove_source();
            Err(RuleError::Other(anyhow::anyhow!("no room")))
        }
    }

    #[test]
    fn test_failed_file_rule_has_no_effects() {
        let source = "x = 1;\n";
        let outcome = Pipeline::new(RuleSet::new())
            .with_file_rule(EmitThenFail)
            .process_source(&file(), source)
            .unwrap();
        assert_eq!(outcome.output, source);
        assert!(!outcome.changed);
        assert!(outcome.emitted.is_empty());
        assert!(!outcome.remove_source);
        assert!(matches!(
            &outcome.diagnostics[..],
            [Diagnostic::RuleException { rule, kind: NodeKind::Program, .. }] if rule == "emit-then-fail"
        ));
    }

    #[test]
    fn test_parse_failure() {
        let error = Pipeline::new(RuleSet::new())
            .process_source(&file(), "x = 'open")
            .unwrap_err();
        assert_eq!(error.kind(), FailureKind::ParseFailure);
    }

    #[test]
    fn test_cancelled_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let error = Pipeline::new(RuleSet::new())
            .process_source_with(&file(), "x = 1;", &cancel)
            .unwrap_err();
        assert!(matches!(
            error,
            PipelineError::Cancelled {
                stage: PipelineState::Parsed
            }
        ));
    }
}
