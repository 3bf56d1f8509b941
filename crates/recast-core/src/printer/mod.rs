/*!
# Format-Preserving Printer

Turns the final tree back into text, reusing the original source wherever it
can.

A node is *clean* when it is an original node (it has an original span), it
is not in the changed set, its child slots still hold exactly the children
they held after parsing, and every child is clean. A clean node is emitted as
the exact source text of its span, comments and whitespace included.

A dirty original node is rebuilt from the text around its original children:
the bytes before the first child, between children and after the last child
are copied, and only the children themselves are rendered again. Sequences
(statement lists, argument lists, class bodies) that gained or lost elements
reuse the surrounding gaps so that neighbours keep their separators. Nodes
without an original span get a canonical fresh rendering (see [`fresh`]),
indented like the nearest preserved sibling.

With an empty changed set and no structural edits the output is the input,
byte for byte.
*/

mod fresh;

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use crate::attributes::Attributes;
use crate::rewrite::dispatcher::ChangedSet;
use crate::syntax::{Node, NodeId, NodeKind, SyntaxTree, TokenStream};

const DEFAULT_INDENT: &str = "    ";

pub struct Printer<'a> {
    tree: &'a SyntaxTree,
    original: &'a SyntaxTree,
    attrs: &'a Attributes,
    tokens: &'a TokenStream,
    changed: &'a ChangedSet,
    indent_unit: String,
    dirty: HashSet<NodeId>,
}

impl<'a> Printer<'a> {
    pub fn new(
        tree: &'a SyntaxTree,
        original: &'a SyntaxTree,
        attrs: &'a Attributes,
        tokens: &'a TokenStream,
        changed: &'a ChangedSet,
    ) -> Self {
        let mut printer = Self {
            tree,
            original,
            attrs,
            tokens,
            changed,
            indent_unit: detect_indent_unit(tokens.source()),
            dirty: HashSet::new(),
        };
        if !tree.is_empty() {
            printer.mark_dirty(tree.root());
        }
        printer
    }

    /// Render the whole tree
    pub fn print(&self) -> String {
        if self.tree.is_empty() {
            return self.tokens.source().to_string();
        }
        self.render(self.tree.root(), "")
    }

    /// Render one subtree on its own
    pub fn print_node(&self, id: NodeId) -> String {
        self.render(id, "")
    }

    pub fn is_dirty(&self, id: NodeId) -> bool {
        self.dirty.contains(&id)
    }

    /// Indentation step used for fresh nested blocks
    pub fn indent_unit(&self) -> &str {
        &self.indent_unit
    }

    fn mark_dirty(&mut self, root: NodeId) {
        // Post-order without recursion: children are settled before parents
        let mut stack = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if !expanded {
                stack.push((id, true));
                stack.extend(self.tree.children(id).into_iter().map(|child| (child, false)));
                continue;
            }
            let children = self.tree.children(id);
            let dirty = !self.is_original(id)
                || self.changed.contains(id)
                || children != self.original.children(id)
                || children.iter().any(|child| self.dirty.contains(child));
            if dirty {
                self.dirty.insert(id);
            }
        }
    }

    /// Parsed node with a known source span
    fn is_original(&self, id: NodeId) -> bool {
        id.index() < self.original.len() && self.attrs.original_span(id).is_some()
    }

    fn range(&self, id: NodeId) -> Option<Range<usize>> {
        self.attrs
            .original_span(id)
            .map(|span| self.tokens.byte_range(span))
    }

    fn render(&self, id: NodeId, indent: &str) -> String {
        if !self.is_original(id) {
            return self.fresh(id, indent);
        }
        let Some(range) = self.range(id) else {
            return self.fresh(id, indent);
        };
        if !self.dirty.contains(&id) {
            return self.tokens.slice(range).to_string();
        }

        let kind = self.tree.kind(id);
        let indent = self.tokens.line_indent(range.start);
        if kind.is_sequence() {
            self.render_sequence(id, range, indent)
        } else if slot_lengths(self.tree.node(id)) == slot_lengths(self.original.node(id)) {
            self.render_paired(id, range)
        } else {
            self.fresh(id, indent)
        }
    }

    /// Render `child` in its slot under `parent`, adding parentheses where
    /// precedence demands and the text does not already carry them
    fn render_child(&self, parent: NodeId, child: NodeId, indent: &str) -> String {
        let text = self.render(child, indent);
        if fresh::needs_parens(self.tree, parent, child) && !is_wrapped(&text) {
            format!("({})", text)
        } else {
            text
        }
    }

    /// Same slot occupancy as after parsing: children pair up by position
    fn render_paired(&self, id: NodeId, range: Range<usize>) -> String {
        let mut out = String::new();
        let mut cursor = range.start;
        for (child, original) in self.tree.children(id).into_iter().zip(self.original.children(id)) {
            let Some(slot) = self.range(original) else {
                continue;
            };
            out.push_str(self.tokens.slice(cursor..slot.start));
            out.push_str(&self.render_child(id, child, self.tokens.line_indent(slot.start)));
            cursor = slot.end;
        }
        out.push_str(self.tokens.slice(cursor..range.end));
        out
    }

    fn render_sequence(&self, id: NodeId, range: Range<usize>, indent: &str) -> String {
        let kind = self.tree.kind(id);
        let current = self.tree.children(id);
        let originals: Vec<(NodeId, Range<usize>)> = self
            .original
            .children(id)
            .into_iter()
            .filter_map(|child| self.range(child).map(|r| (child, r)))
            .collect();

        let (Some(first), Some(last)) = (originals.first(), originals.last()) else {
            return self.fresh(id, indent);
        };
        let leading = self.tokens.slice(range.start..first.1.start);
        let trailing = self.tokens.slice(last.1.end..range.end);

        if current.is_empty() {
            return format!("{}{}", leading.trim_end(), trailing);
        }

        let child_indent = self.tokens.line_indent(first.1.start);
        let gap = |index: usize| self.tokens.slice(originals[index - 1].1.end..originals[index].1.start);
        let position: HashMap<NodeId, usize> = originals
            .iter()
            .enumerate()
            .map(|(index, (child, _))| (*child, index))
            .collect();

        let mut out = String::from(leading);
        let mut previous: Option<Option<usize>> = None;
        let mut last_separator: Option<&str> = None;
        for &child in &current {
            let here = position.get(&child).copied();
            if let Some(before) = previous {
                let separator = match (before, here) {
                    (Some(a), _) if a + 1 < originals.len() => Some(gap(a + 1)),
                    (_, Some(b)) if b > 0 => Some(gap(b)),
                    _ => last_separator,
                };
                match separator {
                    Some(separator) => {
                        out.push_str(separator);
                        last_separator = Some(separator);
                    }
                    None => out.push_str(&default_separator(kind, child_indent)),
                }
            }
            out.push_str(&self.render_child(id, child, child_indent));
            previous = Some(here);
        }
        out.push_str(trailing);
        out
    }
}

/// Number of children in each slot of a node
fn slot_lengths(node: &Node) -> Vec<usize> {
    node.slots().iter().map(|slot| slot.ids.len()).collect()
}

fn default_separator(kind: NodeKind, indent: &str) -> String {
    if fresh::is_line_separated(kind) {
        format!("\n{}", indent)
    } else {
        ", ".to_string()
    }
}

/// Whether `text` is entirely enclosed by one pair of parentheses
fn is_wrapped(text: &str) -> bool {
    if !text.starts_with('(') || !text.ends_with(')') {
        return false;
    }
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;
    for (index, c) in text.char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == q {
                quote = None;
            }
            continue;
        }
        match c {
            '\'' | '"' => quote = Some(c),
            '(' => depth += 1,
            ')' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return index == text.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

/// Indentation step of a source file: a tab if lines are tab-indented,
/// otherwise the smallest space indentation found
fn detect_indent_unit(source: &str) -> String {
    let mut smallest: Option<usize> = None;
    for line in source.lines() {
        if line.trim().is_empty() {
            continue;
        }
        if line.starts_with('\t') {
            return "\t".to_string();
        }
        let spaces = line.len() - line.trim_start_matches(' ').len();
        if spaces > 0 {
            smallest = Some(smallest.map_or(spaces, |s| s.min(spaces)));
        }
    }
    smallest.map_or_else(|| DEFAULT_INDENT.to_string(), |n| " ".repeat(n))
}
