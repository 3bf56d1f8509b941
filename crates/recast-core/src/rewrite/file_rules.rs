/*!
# File Rules

Rules that work on a whole file rather than on single nodes. A file rule runs
once per file, after the node rules have settled, and sees the decorated tree
together with a printer for it. Instead of returning a replacement it records
file-level effects:

- extra files to write, printed from nodes of this file
- top-level statements to drop from this file
- removal of the source file itself

Effects are only acted on if the file finishes without a fatal error.
*/

use std::path::{Path, PathBuf};

use serde::Serialize;

use super::rules::RuleError;
use crate::attributes::Attributes;
use crate::printer::Printer;
use crate::syntax::{NodeId, SyntaxTree};

/// Whole-file rule
pub trait FileRule: Send {
    /// Stable identifier, used in configuration and reports
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    /// Look at the file and record what should happen to it
    fn apply(&mut self, file: &FileView<'_>, effects: &mut FileEffects) -> Result<(), RuleError>;
}

/// Read-only view of a processed file handed to [`FileRule::apply`]
pub struct FileView<'a> {
    path: &'a Path,
    tree: &'a SyntaxTree,
    attrs: &'a Attributes,
    printer: &'a Printer<'a>,
}

impl<'a> FileView<'a> {
    pub fn new(path: &'a Path, tree: &'a SyntaxTree, attrs: &'a Attributes, printer: &'a Printer<'a>) -> Self {
        Self {
            path,
            tree,
            attrs,
            printer,
        }
    }

    pub fn path(&self) -> &Path {
        self.path
    }

    pub fn tree(&self) -> &SyntaxTree {
        self.tree
    }

    pub fn attrs(&self) -> &Attributes {
        self.attrs
    }

    /// Top-level statements, in order
    pub fn statements(&self) -> Vec<NodeId> {
        self.tree.children(self.tree.root())
    }

    /// Text of one subtree, original formatting kept where it is untouched
    pub fn print_node(&self, id: NodeId) -> String {
        self.printer.print_node(id)
    }
}

/// An extra output file produced by a file rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmittedFile {
    pub path: PathBuf,
    pub content: String,
}

/// Position in a [`FileEffects`] record, used to drop a failed rule's effects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EffectsCheckpoint {
    emitted: usize,
    dropped: usize,
    remove_source: bool,
}

/// Effects recorded by file rules for one file
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FileEffects {
    emitted: Vec<EmittedFile>,
    dropped: Vec<NodeId>,
    remove_source: bool,
}

impl FileEffects {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write `content` to `path` alongside the rewritten file. A later
    /// emission to the same path wins.
    pub fn emit(&mut self, path: impl Into<PathBuf>, content: impl Into<String>) {
        let path = path.into();
        self.emitted.retain(|file| file.path != path);
        self.emitted.push(EmittedFile {
            path,
            content: content.into(),
        });
    }

    /// Drop a top-level statement from the rewritten file
    pub fn drop_statement(&mut self, id: NodeId) {
        if !self.dropped.contains(&id) {
            self.dropped.push(id);
        }
    }

    /// Delete the source file instead of rewriting it
    pub fn remove_source(&mut self) {
        self.remove_source = true;
    }

    pub fn emitted(&self) -> &[EmittedFile] {
        &self.emitted
    }

    pub fn dropped(&self) -> &[NodeId] {
        &self.dropped
    }

    pub fn removes_source(&self) -> bool {
        self.remove_source
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty() && self.dropped.is_empty() && !self.remove_source
    }

    pub fn checkpoint(&self) -> EffectsCheckpoint {
        EffectsCheckpoint {
            emitted: self.emitted.len(),
            dropped: self.dropped.len(),
            remove_source: self.remove_source,
        }
    }

    pub fn rollback(&mut self, checkpoint: EffectsCheckpoint) {
        self.emitted.truncate(checkpoint.emitted);
        self.dropped.truncate(checkpoint.dropped);
        self.remove_source = checkpoint.remove_source;
    }

    pub(crate) fn into_parts(self) -> (Vec<EmittedFile>, Vec<NodeId>, bool) {
        (self.emitted, self.dropped, self.remove_source)
    }
}
