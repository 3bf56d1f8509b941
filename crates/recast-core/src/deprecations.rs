/*!
# Deprecation Scanner

Collects deprecation notices from source text:

```text
/** @deprecated use bar() instead */
trigger_error('foo() is deprecated, use bar()', E_USER_DEPRECATED);
```

The scanner works on raw text and needs no parse, so it also runs over files
the bundled parser rejects. Results go into a [`DeprecationCollector`], an
append-only set that several scanning threads may share; its contents do not
depend on the order in which files were scanned.
*/

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tracing::debug;

/// One deprecation notice
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Deprecation {
    pub file: PathBuf,
    /// 1-based line of the tag or call
    pub line: usize,
    /// Message with runs of whitespace collapsed to single spaces
    pub message: String,
}

const STRING_LITERAL: &str = r#"'(?:[^'\\]|\\.)*'|"(?:[^"\\]|\\.)*""#;

#[derive(Debug, Clone)]
pub struct DeprecationScanner {
    doc_tag: Regex,
    trigger: Regex,
    literal: Regex,
    extensions: Vec<String>,
}

impl DeprecationScanner {
    pub fn new() -> Result<Self, regex::Error> {
        let doc_tag = Regex::new(r"(?s)@deprecated\b(.*?)(?:\*/|\n[ \t]*\*?[ \t]*@|\n[ \t]*\*?[ \t]*\n)")?;
        let trigger = Regex::new(&format!(
            r"trigger_error\s*\(\s*((?:{lit})(?:\s*\.\s*(?:{lit}))*)\s*,\s*E_USER_DEPRECATED\s*\)",
            lit = STRING_LITERAL
        ))?;
        let literal = Regex::new(STRING_LITERAL)?;
        Ok(Self {
            doc_tag,
            trigger,
            literal,
            extensions: vec!["php".to_string(), "script".to_string()],
        })
    }

    pub fn with_extensions(mut self, extensions: Vec<String>) -> Self {
        self.extensions = extensions;
        self
    }

    /// Every notice in `source`, in source order
    pub fn scan_source(&self, file: &Path, source: &str) -> Vec<Deprecation> {
        let mut found = Vec::new();

        for captures in self.doc_tag.captures_iter(source) {
            let (Some(whole), Some(body)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let message = normalize(&strip_comment_stars(body.as_str()));
            if !message.is_empty() {
                found.push(Deprecation {
                    file: file.to_path_buf(),
                    line: line_of(source, whole.start()),
                    message,
                });
            }
        }

        for captures in self.trigger.captures_iter(source) {
            let (Some(whole), Some(args)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            let joined: String = self
                .literal
                .find_iter(args.as_str())
                .map(|piece| unquote(piece.as_str()))
                .collect();
            let message = normalize(&joined);
            if !message.is_empty() {
                found.push(Deprecation {
                    file: file.to_path_buf(),
                    line: line_of(source, whole.start()),
                    message,
                });
            }
        }

        found.sort();
        found
    }

    pub fn scan_file(&self, path: &Path) -> io::Result<Vec<Deprecation>> {
        let source = std::fs::read_to_string(path)?;
        Ok(self.scan_source(path, &source))
    }

    /// Scan every matching file below `dirs`, one thread per directory.
    /// Returns the number of files scanned.
    pub fn scan_directories(&self, dirs: &[PathBuf], collector: &DeprecationCollector) -> io::Result<usize> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = dirs
                .iter()
                .map(|dir| scope.spawn(move || self.scan_tree(dir, collector)))
                .collect();
            let mut scanned = 0;
            for handle in handles {
                scanned += handle
                    .join()
                    .map_err(|_| io::Error::new(io::ErrorKind::Other, "scanner thread panicked"))??;
            }
            Ok(scanned)
        })
    }

    fn scan_tree(&self, dir: &Path, collector: &DeprecationCollector) -> io::Result<usize> {
        let mut scanned = 0;
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                scanned += self.scan_tree(&path, collector)?;
            } else if self.wants(&path) {
                let found = self.scan_file(&path)?;
                debug!(file = %path.display(), found = found.len(), "scanned for deprecations");
                collector.extend(found);
                scanned += 1;
            }
        }
        Ok(scanned)
    }

    fn wants(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|wanted| wanted.eq_ignore_ascii_case(ext)))
    }
}

fn line_of(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|&b| b == b'\n').count() + 1
}

fn strip_comment_stars(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_start().trim_start_matches('*'))
        .collect::<Vec<_>>()
        .join(" ")
}

fn normalize(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn unquote(literal: &str) -> String {
    let inner = &literal[1..literal.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next @ ('\\' | '\'' | '"')) => out.push(next),
                Some(next) => {
                    out.push('\\');
                    out.push(next);
                }
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Append-only, sorted and deduplicated set of notices
#[derive(Debug, Default)]
pub struct DeprecationCollector {
    items: Mutex<BTreeSet<Deprecation>>,
}

impl DeprecationCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, deprecation: Deprecation) {
        self.items.lock().insert(deprecation);
    }

    pub fn extend(&self, deprecations: impl IntoIterator<Item = Deprecation>) {
        self.items.lock().extend(deprecations);
    }

    pub fn deprecations(&self) -> Vec<Deprecation> {
        self.items.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn messages(source: &str) -> Vec<String> {
        DeprecationScanner::new()
            .unwrap()
            .scan_source(Path::new("a.php"), source)
            .into_iter()
            .map(|d| d.message)
            .collect()
    }

    #[test]
    fn test_doc_tag_across_lines() {
        let source = "/**\n * Does things.\n * @deprecated use   bar()\n *   instead\n * @return void\n */\nfunction foo() {}\n";
        assert_eq!(messages(source), vec!["use bar() instead"]);
    }

    #[test]
    fn test_single_line_doc_tag() {
        assert_eq!(messages("/** @deprecated since 2.0 */"), vec!["since 2.0"]);
    }

    #[test]
    fn test_trigger_error_with_concatenation() {
        let source = "trigger_error('Definition::setInject() is deprecated, '\n    . 'use addTag(\\'inject\\')', E_USER_DEPRECATED);\n";
        assert_eq!(
            messages(source),
            vec!["Definition::setInject() is deprecated, use addTag('inject')"]
        );
    }

    #[test]
    fn test_other_error_levels_are_ignored() {
        assert!(messages("trigger_error('careful', E_USER_WARNING);").is_empty());
    }

    #[test]
    fn test_line_numbers() {
        let found = DeprecationScanner::new()
            .unwrap()
            .scan_source(Path::new("a.php"), "x = 1;\n\ntrigger_error(\"old\", E_USER_DEPRECATED);\n");
        assert_eq!(found[0].line, 3);
    }

    #[test]
    fn test_collector_is_order_independent() {
        let a = Deprecation {
            file: "a.php".into(),
            line: 1,
            message: "x".into(),
        };
        let b = Deprecation {
            file: "b.php".into(),
            line: 1,
            message: "y".into(),
        };
        let first = DeprecationCollector::new();
        first.extend([a.clone(), b.clone()]);
        let second = DeprecationCollector::new();
        second.extend([b.clone(), a.clone(), b]);
        assert_eq!(first.deprecations(), second.deprecations());
        assert_eq!(second.len(), 2);
    }
}
