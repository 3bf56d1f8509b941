/*!
# Batch Runner

Fans files out to a fixed pool of worker threads. Every worker owns a
[`Pipeline`] with its own [`RuleSet`], so rules never see another worker's
state and nothing on the per-file path takes a lock. Results travel back over
a channel and are sorted by path before they are reported.
*/

use std::path::{Path, PathBuf};
use std::time::Instant;

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, RecastConfig};
use crate::pipeline::{CancellationToken, Diagnostic, FailureKind, FileOutcome, Pipeline, PipelineError};
use crate::rewrite::catalog::RuleCatalog;
use crate::rewrite::file_rules::FileRule;
use crate::rewrite::rules::RuleSet;
use crate::writer::Writer;

/// A file that ended in the `Failed` state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub kind: FailureKind,
    pub message: String,
}

/// A non-fatal diagnostic, tagged with its file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileWarning {
    pub path: PathBuf,
    #[serde(flatten)]
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub changed: Vec<PathBuf>,
    pub unchanged: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
    pub warnings: Vec<FileWarning>,
    /// Extra files written for file rules
    pub emitted: Vec<PathBuf>,
    /// Source files deleted for file rules
    pub removed: Vec<PathBuf>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.changed.len() + self.unchanged.len() + self.failed.len()
    }

    /// No file failed
    pub fn success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.changed.extend(other.changed);
        self.unchanged.extend(other.unchanged);
        self.failed.extend(other.failed);
        self.warnings.extend(other.warnings);
        self.emitted.extend(other.emitted);
        self.removed.extend(other.removed);
        self.sort();
    }

    fn record(&mut self, result: FileResult) {
        match result {
            FileResult::Done {
                path,
                changed,
                diagnostics,
                emitted,
                removed,
            } => {
                self.emitted.extend(emitted);
                if removed {
                    self.removed.push(path.clone());
                }
                self.warnings.extend(diagnostics.into_iter().map(|diagnostic| FileWarning {
                    path: path.clone(),
                    diagnostic,
                }));
                if changed {
                    self.changed.push(path);
                } else {
                    self.unchanged.push(path);
                }
            }
            FileResult::Failed { path, error } => self.failed.push(FailedFile {
                path,
                kind: error.kind(),
                message: error.to_string(),
            }),
        }
    }

    fn sort(&mut self) {
        self.changed.sort();
        self.unchanged.sort();
        self.failed.sort_by(|a, b| a.path.cmp(&b.path));
        // stable: diagnostics of one file keep their order
        self.warnings.sort_by(|a, b| a.path.cmp(&b.path));
        self.emitted.sort();
        self.removed.sort();
    }
}

enum FileResult {
    Done {
        path: PathBuf,
        changed: bool,
        diagnostics: Vec<Diagnostic>,
        emitted: Vec<PathBuf>,
        removed: bool,
    },
    Failed {
        path: PathBuf,
        error: PipelineError,
    },
}

#[derive(Debug)]
pub struct BatchRunner {
    config: RecastConfig,
    catalog: RuleCatalog,
    cancel: CancellationToken,
}

impl BatchRunner {
    /// Runner over the built-in rule catalog
    pub fn new(config: RecastConfig) -> Self {
        Self {
            config,
            catalog: RuleCatalog::builtin(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: RuleCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &RecastConfig {
        &self.config
    }

    /// Token that abandons remaining files at their next stage boundary
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Expand `paths` into the files to process. Directories are walked and
    /// filtered by extension; files named directly are always taken.
    pub fn collect_files(&self, paths: &[PathBuf]) -> std::io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for path in paths {
            if path.is_dir() {
                self.walk(path, &mut files)?;
            } else if path.is_file() {
                files.push(path.clone());
            } else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no such file or directory: {}", path.display()),
                ));
            }
        }
        files.sort();
        files.dedup();
        Ok(files)
    }

    fn walk(&self, dir: &Path, files: &mut Vec<PathBuf>) -> std::io::Result<()> {
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.walk(&path, files)?;
            } else if self.has_wanted_extension(&path) {
                files.push(path);
            }
        }
        Ok(())
    }

    fn has_wanted_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.config.extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
    }

    fn pipeline(&self, rules: RuleSet, file_rules: Vec<Box<dyn FileRule>>) -> Pipeline {
        Pipeline::new(rules)
            .with_file_rules(file_rules)
            .with_policy(self.config.pass_policy())
            .with_version(self.config.target_version)
    }

    /// Process every file under `paths`, handing changed output to `writer`
    pub fn run(&self, paths: &[PathBuf], writer: &dyn Writer) -> crate::Result<RunSummary> {
        self.config.validate()?;
        let files = self.collect_files(paths)?;
        let jobs = self.config.jobs.clamp(1, files.len().max(1));
        let rule_sets = (0..jobs)
            .map(|_| Ok((self.catalog.build(&self.config)?, self.catalog.build_file_rules(&self.config)?)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        info!(files = files.len(), jobs, "starting run");
        let started = Instant::now();

        let (job_tx, job_rx) = crossbeam_channel::unbounded::<PathBuf>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<FileResult>();
        for file in files {
            if job_tx.send(file).is_err() {
                break;
            }
        }
        drop(job_tx);

        std::thread::scope(|scope| {
            for (worker, (rules, file_rules)) in rule_sets.into_iter().enumerate() {
                let jobs = job_rx.clone();
                let results = result_tx.clone();
                let pipeline = self.pipeline(rules, file_rules);
                scope.spawn(move || self.work(worker, pipeline, jobs, results, writer));
            }
        });
        drop(result_tx);

        let mut summary = RunSummary::default();
        for result in result_rx.iter() {
            summary.record(result);
        }
        summary.sort();

        info!(
            changed = summary.changed.len(),
            unchanged = summary.unchanged.len(),
            failed = summary.failed.len(),
            warnings = summary.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(summary)
    }

    fn work(
        &self,
        worker: usize,
        mut pipeline: Pipeline,
        jobs: Receiver<PathBuf>,
        results: Sender<FileResult>,
        writer: &dyn Writer,
    ) {
        for path in jobs.iter() {
            debug!(worker, file = %path.display(), "picked up");
            let result = self.process(&mut pipeline, path, writer);
            if results.send(result).is_err() {
                break;
            }
        }
    }

    fn process(&self, pipeline: &mut Pipeline, path: PathBuf, writer: &dyn Writer) -> FileResult {
        let outcome = match pipeline.process_file(&path, &self.cancel) {
            Ok(outcome) => outcome,
            Err(error) => return FileResult::Failed { path, error },
        };
        match Self::commit(&path, &outcome, writer) {
            Ok(()) => FileResult::Done {
                changed: outcome.changed,
                diagnostics: outcome.diagnostics,
                emitted: outcome.emitted.into_iter().map(|file| file.path).collect(),
                removed: outcome.remove_source,
                path,
            },
            Err(error) => FileResult::Failed { path, error },
        }
    }

    /// Hand a finished file to the writer: emitted files first, then either
    /// the rewritten text or the removal of the source
    fn commit(path: &Path, outcome: &FileOutcome, writer: &dyn Writer) -> Result<(), PipelineError> {
        let write_error = |target: &Path, source: std::io::Error| {
            warn!(file = %target.display(), %source, "write failed");
            PipelineError::Write {
                path: target.to_path_buf(),
                source,
            }
        };
        for file in &outcome.emitted {
            writer
                .write(&file.path, &file.content)
                .map_err(|source| write_error(&file.path, source))?;
        }
        if outcome.remove_source {
            writer.remove(path).map_err(|source| write_error(path, source))?;
        } else if outcome.rewritten {
            writer
                .write(path, &outcome.output)
                .map_err(|source| write_error(path, source))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::MemoryWriter;
    use tempfile::TempDir;

    fn tree(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, text) in files {
            let path = dir.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, text).unwrap();
        }
        dir
    }

    #[test]
    fn test_collect_files_filters_and_sorts() {
        let dir = tree(&[("b.php", ""), ("a.script", ""), ("notes.txt", ""), ("sub/c.php", "")]);
        let runner = BatchRunner::new(RecastConfig::default());
        let files = runner.collect_files(&[dir.path().to_path_buf()]).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|f| f.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(names, vec!["a.script", "b.php", "sub/c.php"]);
    }

    #[test]
    fn test_missing_path_is_an_error() {
        let runner = BatchRunner::new(RecastConfig::default());
        assert!(runner.collect_files(&[PathBuf::from("/definitely/not/here")]).is_err());
    }

    #[test]
    fn test_run_classifies_files() {
        let dir = tree(&[
            ("changed.php", "n = sizeof($a);\n"),
            ("same.php", "n = count($a);\n"),
            ("broken.php", "n = 'open\n"),
        ]);
        let config = RecastConfig {
            rules: vec!["rename-function".into()],
            rename_functions: [("sizeof".to_string(), "count".to_string())].into_iter().collect(),
            jobs: 2,
            ..Default::default()
        };
        let writer = MemoryWriter::new();
        let summary = BatchRunner::new(config)
            .run(&[dir.path().to_path_buf()], &writer)
            .unwrap();

        assert_eq!(summary.total(), 3);
        assert_eq!(summary.changed, vec![dir.path().join("changed.php")]);
        assert_eq!(summary.unchanged, vec![dir.path().join("same.php")]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].kind, FailureKind::ParseFailure);
        assert!(!summary.success());
        assert_eq!(writer.files(), vec![dir.path().join("changed.php")]);
        assert_eq!(
            writer.get(&dir.path().join("changed.php")).as_deref(),
            Some("n = count($a);\n")
        );
    }

    #[test]
    fn test_file_rule_emits_and_removes() {
        let dir = tree(&[
            ("models.php", "<?php\nclass User {\n}\nclass Group {\n}\n"),
            ("main.php", "<?php\nclass Main {\n}\nclass Helper {\n}\nrun();\n"),
        ]);
        let config = RecastConfig {
            rules: vec!["rename-function".into()],
            file_rules: vec!["split-classes".into()],
            jobs: 1,
            ..Default::default()
        };
        let writer = MemoryWriter::new();
        let summary = BatchRunner::new(config)
            .run(&[dir.path().to_path_buf()], &writer)
            .unwrap();

        assert!(summary.success());
        assert_eq!(summary.removed, vec![dir.path().join("models.php")]);
        assert_eq!(
            summary.emitted,
            vec![
                dir.path().join("Group.php"),
                dir.path().join("Helper.php"),
                dir.path().join("Main.php"),
                dir.path().join("User.php"),
            ]
        );
        assert_eq!(writer.removed(), vec![dir.path().join("models.php")]);
        assert_eq!(
            writer.get(&dir.path().join("User.php")).as_deref(),
            Some("<?php\n\nclass User {\n}\n")
        );
        assert_eq!(
            writer.get(&dir.path().join("main.php")).as_deref(),
            Some("<?php\nrun();\n")
        );
        assert!(summary.changed.contains(&dir.path().join("main.php")));
    }

    #[test]
    fn test_cancelled_run_writes_nothing() {
        let dir = tree(&[("a.php", "n = sizeof($a);\n")]);
        let config = RecastConfig {
            rename_functions: [("sizeof".to_string(), "count".to_string())].into_iter().collect(),
            ..Default::default()
        };
        let runner = BatchRunner::new(config);
        runner.cancel_token().cancel();
        let writer = MemoryWriter::new();
        let summary = runner.run(&[dir.path().to_path_buf()], &writer).unwrap();
        assert_eq!(summary.failed[0].kind, FailureKind::Cancelled);
        assert!(writer.is_empty());
    }

    #[test]
    fn test_unknown_rule_fails_the_run() {
        let dir = tree(&[("a.php", "x = 1;\n")]);
        let config = RecastConfig {
            rules: vec!["nope".into()],
            ..Default::default()
        };
        let result = BatchRunner::new(config).run(&[dir.path().to_path_buf()], &MemoryWriter::new());
        assert!(matches!(result, Err(crate::RecastError::Config(_))));
    }
}
