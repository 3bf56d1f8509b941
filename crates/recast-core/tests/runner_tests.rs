/*!
# Batch Runner Integration Tests

Runs over real directories with the filesystem writer and the deprecation
scanner.
*/

use std::path::PathBuf;

use recast_core::{
    BatchRunner, DeprecationCollector, DeprecationScanner, FailureKind, FsWriter, RecastConfig,
};
use tempfile::TempDir;

use pretty_assertions::assert_eq;

fn project() -> anyhow::Result<TempDir> {
    let dir = TempDir::new()?;
    std::fs::create_dir_all(dir.path().join("src/http"))?;
    std::fs::write(
        dir.path().join("src/list.php"),
        "<?php\n$names = '';\nforeach_name($names);\n$names[] = 'x';\n",
    )?;
    std::fs::write(
        dir.path().join("src/http/status.php"),
        "<?php\n$r = new Response();\n$r->setStatusCode(404);\n",
    )?;
    std::fs::write(
        dir.path().join("src/legacy.php"),
        "<?php\n/** @deprecated use names() */\nfunction legacy() {\n    trigger_error('legacy() is gone', E_USER_DEPRECATED);\n}\n",
    )?;
    std::fs::write(dir.path().join("src/broken.php"), "<?php\nx = (1;\n")?;
    std::fs::write(dir.path().join("README.md"), "not code")?;
    Ok(dir)
}

#[test]
fn test_run_into_output_directory() -> anyhow::Result<()> {
    let dir = project()?;
    let out = dir.path().join("out");
    let config = RecastConfig {
        jobs: 3,
        output_dir: Some(out.clone()),
        ..Default::default()
    };
    let src = dir.path().join("src");
    let summary = BatchRunner::new(config).run(&[src.clone()], &FsWriter::to_directory(&out))?;

    assert_eq!(summary.total(), 4);
    assert_eq!(
        summary.changed,
        vec![src.join("http/status.php"), src.join("list.php")]
    );
    assert_eq!(summary.unchanged, vec![src.join("legacy.php")]);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].path, src.join("broken.php"));
    assert_eq!(summary.failed[0].kind, FailureKind::ParseFailure);

    let mirrored = FsWriter::to_directory(&out).target(&src.join("list.php"));
    assert_eq!(
        std::fs::read_to_string(mirrored)?,
        "<?php\n$names = [];\nforeach_name($names);\n$names[] = 'x';\n"
    );
    let status = FsWriter::to_directory(&out).target(&src.join("http/status.php"));
    assert_eq!(
        std::fs::read_to_string(status)?,
        "<?php\n$r = new Response();\n$r->setStatusCode(\\Symfony\\Component\\HttpFoundation\\Response::HTTP_NOT_FOUND);\n"
    );

    // Sources are left alone
    assert_eq!(
        std::fs::read_to_string(src.join("list.php"))?,
        "<?php\n$names = '';\nforeach_name($names);\n$names[] = 'x';\n"
    );
    Ok(())
}

#[test]
fn test_summary_serialises_to_json() -> anyhow::Result<()> {
    let dir = project()?;
    let summary = BatchRunner::new(RecastConfig::default())
        .run(&[dir.path().join("src/broken.php")], &recast_core::MemoryWriter::new())?;
    let json = serde_json::to_value(&summary)?;
    assert_eq!(json["failed"][0]["kind"], "parse_failure");
    Ok(())
}

#[test]
fn test_scan_directories() -> anyhow::Result<()> {
    let dir = project()?;
    let scanner = DeprecationScanner::new()?;
    let collector = DeprecationCollector::new();
    let scanned = scanner.scan_directories(&[dir.path().join("src")], &collector)?;
    assert_eq!(scanned, 4);

    let messages: Vec<_> = collector.deprecations().into_iter().map(|d| d.message).collect();
    assert_eq!(messages, vec!["use names()", "legacy() is gone"]);

    let paths: Vec<PathBuf> = collector.deprecations().into_iter().map(|d| d.file).collect();
    assert!(paths.iter().all(|p| p.ends_with("legacy.php")));
    Ok(())
}
