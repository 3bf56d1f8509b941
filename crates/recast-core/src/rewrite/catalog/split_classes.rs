//! One class per file: every top-level class of a file declaring more than
//! one moves to `<ClassName>.<ext>` next to it. A class named like the file
//! itself stays put. When nothing is left behind, the source file is removed.

use std::path::PathBuf;

use crate::rewrite::file_rules::{FileEffects, FileRule, FileView};
use crate::rewrite::rules::RuleError;
use crate::syntax::Node;

#[derive(Debug, Default)]
pub struct SplitClassesPerFile;

impl SplitClassesPerFile {
    pub fn new() -> Self {
        SplitClassesPerFile
    }
}

impl FileRule for SplitClassesPerFile {
    fn name(&self) -> &'static str {
        "split-classes"
    }

    fn description(&self) -> &'static str {
        "Moves each class of a multi-class file into its own file"
    }

    fn apply(&mut self, file: &FileView<'_>, effects: &mut FileEffects) -> Result<(), RuleError> {
        let statements = file.statements();
        let classes: Vec<_> = statements
            .iter()
            .filter_map(|&id| match file.tree().node(id) {
                Node::ClassDecl { name, .. } => Some((id, name.as_str())),
                _ => None,
            })
            .collect();
        if classes.len() < 2 {
            return Ok(());
        }

        let path = file.path();
        let stem = path.file_stem().and_then(|stem| stem.to_str()).unwrap_or_default();
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("php");
        let directory = path.parent().map(PathBuf::from).unwrap_or_default();

        let mut moved = 0;
        for (id, name) in classes {
            if name == stem {
                continue;
            }
            let target = directory.join(format!("{}.{}", name, extension));
            effects.emit(target, format!("<?php\n\n{}\n", file.print_node(id)));
            effects.drop_statement(id);
            moved += 1;
        }
        if moved == statements.len() {
            effects.remove_source();
        }
        Ok(())
    }
}
