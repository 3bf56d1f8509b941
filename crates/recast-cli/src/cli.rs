//! Argument parsing and the command behind the `recast` binary.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use recast_core::rewrite::RuleInfo;
use recast_core::{
    BatchRunner, DeprecationCollector, DeprecationScanner, FsWriter, LanguageVersion, MemoryWriter,
    RecastConfig, RuleCatalog, RunSummary, Writer,
};
use tracing::info;

pub fn command() -> Command {
    Command::new("recast")
        .version(recast_core::VERSION)
        .about("Format-preserving source rewriting")
        .arg(
            Arg::new("paths")
                .value_name("PATH")
                .help("Files or directories to process")
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("JSON configuration file")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("rule")
                .long("rule")
                .short('r')
                .value_name("NAME")
                .help("Rule to run, repeatable; order is kept")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("file-rule")
                .long("file-rule")
                .value_name("NAME")
                .help("Whole-file rule to run after the node rules, repeatable")
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new("max-passes")
                .long("max-passes")
                .value_name("N")
                .help("Upper bound on dispatch passes per file")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("single-pass")
                .long("single-pass")
                .help("Run dispatch once per file")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("jobs")
                .long("jobs")
                .short('j')
                .value_name("N")
                .help("Worker threads")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("target-version")
                .long("target-version")
                .value_name("MAJOR.MINOR")
                .help("Language version rewritten code must run on")
                .value_parser(value_parser!(LanguageVersion)),
        )
        .arg(
            Arg::new("dry-run")
                .long("dry-run")
                .help("Report what would change without writing")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("output-dir")
                .long("output-dir")
                .short('o')
                .value_name("DIR")
                .help("Write rewritten files below DIR instead of in place")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("json")
                .long("json")
                .help("Print the summary as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("list-rules")
                .long("list-rules")
                .help("List available rules and exit")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("scan-deprecations")
                .long("scan-deprecations")
                .help("Collect deprecation notices instead of rewriting")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("verbose")
                .long("verbose")
                .short('v')
                .help("Debug logging")
                .action(ArgAction::SetTrue),
        )
}

/// What the command line asked for
#[derive(Debug, Clone, Default)]
pub struct CliOptions {
    pub paths: Vec<PathBuf>,
    pub config: Option<PathBuf>,
    pub rules: Vec<String>,
    pub file_rules: Vec<String>,
    pub max_passes: Option<usize>,
    pub single_pass: bool,
    pub jobs: Option<usize>,
    pub target_version: Option<LanguageVersion>,
    pub dry_run: bool,
    pub output_dir: Option<PathBuf>,
    pub json: bool,
    pub list_rules: bool,
    pub scan_deprecations: bool,
    pub verbose: bool,
}

impl CliOptions {
    pub fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            paths: matches
                .get_many::<PathBuf>("paths")
                .map(|paths| paths.cloned().collect())
                .unwrap_or_default(),
            config: matches.get_one::<PathBuf>("config").cloned(),
            rules: matches
                .get_many::<String>("rule")
                .map(|rules| rules.cloned().collect())
                .unwrap_or_default(),
            file_rules: matches
                .get_many::<String>("file-rule")
                .map(|rules| rules.cloned().collect())
                .unwrap_or_default(),
            max_passes: matches.get_one::<usize>("max-passes").copied(),
            single_pass: matches.get_flag("single-pass"),
            jobs: matches.get_one::<usize>("jobs").copied(),
            target_version: matches.get_one::<LanguageVersion>("target-version").copied(),
            dry_run: matches.get_flag("dry-run"),
            output_dir: matches.get_one::<PathBuf>("output-dir").cloned(),
            json: matches.get_flag("json"),
            list_rules: matches.get_flag("list-rules"),
            scan_deprecations: matches.get_flag("scan-deprecations"),
            verbose: matches.get_flag("verbose"),
        }
    }

    pub fn parse_from<I, T>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let matches = command().try_get_matches_from(args)?;
        Ok(Self::from_matches(&matches))
    }

    /// Configuration file (or defaults) with command-line overrides applied
    pub fn resolve_config(&self) -> Result<RecastConfig> {
        let mut config = match &self.config {
            Some(path) => RecastConfig::from_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => RecastConfig::default(),
        };
        if !self.rules.is_empty() {
            config.rules = self.rules.clone();
        }
        if !self.file_rules.is_empty() {
            config.file_rules = self.file_rules.clone();
        }
        if let Some(max_passes) = self.max_passes {
            config.max_passes = max_passes;
        }
        if self.single_pass {
            config.multi_pass = false;
        }
        if let Some(jobs) = self.jobs {
            config.jobs = jobs;
        }
        if let Some(version) = self.target_version {
            config.target_version = version;
        }
        if self.dry_run {
            config.dry_run = true;
        }
        if self.output_dir.is_some() {
            config.output_dir = self.output_dir.clone();
        }
        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

/// Execute the command, writing the report to `out`. Returns whether every
/// file was processed without failure.
pub fn run(options: &CliOptions, out: &mut dyn Write) -> Result<bool> {
    if options.list_rules {
        list_rules(options, out)?;
        return Ok(true);
    }
    if options.paths.is_empty() {
        bail!("no input paths given");
    }
    if options.scan_deprecations {
        scan_deprecations(options, out)?;
        return Ok(true);
    }

    let config = options.resolve_config()?;
    info!(rules = ?config.rules, dry_run = config.dry_run, "configuration loaded");
    let runner = BatchRunner::new(config.clone());

    let memory = MemoryWriter::new();
    let filesystem = match &config.output_dir {
        Some(dir) => FsWriter::to_directory(dir),
        None => FsWriter::in_place(),
    };
    let writer: &dyn Writer = if config.dry_run { &memory } else { &filesystem };

    let summary = runner.run(&options.paths, writer).context("batch run failed")?;

    if options.json {
        serde_json::to_writer_pretty(&mut *out, &summary)?;
        writeln!(out)?;
    } else {
        print_summary(&summary, config.dry_run, out)?;
    }
    Ok(summary.success())
}

fn list_rules(options: &CliOptions, out: &mut dyn Write) -> Result<()> {
    let catalog = RuleCatalog::builtin();
    let rules = catalog.describe();
    let file_rules = catalog.describe_file_rules();
    if options.json {
        let entry = |rule: &RuleInfo, kind: &str| {
            serde_json::json!({
                "name": rule.name,
                "kind": kind,
                "priority": rule.priority,
                "description": rule.description,
            })
        };
        let listing: Vec<_> = rules
            .iter()
            .map(|rule| entry(rule, "node"))
            .chain(file_rules.iter().map(|rule| entry(rule, "file")))
            .collect();
        serde_json::to_writer_pretty(&mut *out, &listing)?;
        writeln!(out)?;
        return Ok(());
    }
    let width = rules
        .iter()
        .chain(&file_rules)
        .map(|rule| rule.name.len())
        .max()
        .unwrap_or(0);
    for rule in rules {
        writeln!(out, "{:width$}  {:>4}  {}", rule.name, rule.priority, rule.description, width = width)?;
    }
    for rule in file_rules {
        writeln!(out, "{:width$}  file  {}", rule.name, rule.description, width = width)?;
    }
    Ok(())
}

fn scan_deprecations(options: &CliOptions, out: &mut dyn Write) -> Result<()> {
    let scanner = DeprecationScanner::new()?;
    let collector = DeprecationCollector::new();
    let (dirs, files): (Vec<_>, Vec<_>) = options.paths.iter().cloned().partition(|path| path.is_dir());
    scanner.scan_directories(&dirs, &collector)?;
    for file in files {
        let found = scanner
            .scan_file(&file)
            .with_context(|| format!("scanning {}", file.display()))?;
        collector.extend(found);
    }

    let deprecations = collector.deprecations();
    if options.json {
        serde_json::to_writer_pretty(&mut *out, &deprecations)?;
        writeln!(out)?;
    } else {
        for deprecation in &deprecations {
            writeln!(
                out,
                "{}:{}: {}",
                deprecation.file.display(),
                deprecation.line,
                deprecation.message
            )?;
        }
    }
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool, out: &mut dyn Write) -> Result<()> {
    let verb = if dry_run { "would change" } else { "changed" };
    for path in &summary.changed {
        writeln!(out, "{}: {}", verb, path.display())?;
    }
    for path in &summary.emitted {
        writeln!(out, "{}: {}", if dry_run { "would create" } else { "created" }, path.display())?;
    }
    for path in &summary.removed {
        writeln!(out, "{}: {}", if dry_run { "would remove" } else { "removed" }, path.display())?;
    }
    for failure in &summary.failed {
        writeln!(
            out,
            "failed: {} ({}): {}",
            failure.path.display(),
            failure.kind,
            failure.message
        )?;
    }
    for warning in &summary.warnings {
        writeln!(out, "warning: {}: {}", warning.path.display(), warning.diagnostic)?;
    }
    writeln!(
        out,
        "{} file(s): {} {}, {} unchanged, {} failed",
        summary.total(),
        summary.changed.len(),
        verb,
        summary.unchanged.len(),
        summary.failed.len()
    )?;
    Ok(())
}
