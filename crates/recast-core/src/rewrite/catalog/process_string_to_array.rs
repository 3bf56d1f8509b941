//! Process commands given as one string become argument arrays:
//! `new Process('ls -l')` turns into `new Process(['ls', '-l'])`. The second
//! argument of `ProcessHelper::run()` is handled the same way.

use crate::rewrite::context::RuleContext;
use crate::rewrite::rules::{Outcome, Rule, RuleError};
use crate::syntax::{BinaryOp, Node, NodeId, NodeKind, QuoteStyle};

const PROCESS_CLASS: &str = "Symfony\\Component\\Process\\Process";
const PROCESS_HELPER_CLASS: &str = "Symfony\\Component\\Console\\Helper\\ProcessHelper";

#[derive(Debug, Default)]
pub struct ProcessStringToArray;

impl ProcessStringToArray {
    pub fn new() -> Self {
        ProcessStringToArray
    }
}

/// Split a shell command into words. Quotes group words and are dropped;
/// backslash escapes are kept verbatim. `None` on an unbalanced quote.
pub fn split_command(command: &str) -> Option<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quote: Option<char> = None;
    let mut chars = command.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (_, '\\') => {
                current.push(c);
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                in_word = true;
            }
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '\'' | '"') => {
                quote = Some(c);
                in_word = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if quote.is_some() {
        return None;
    }
    if in_word {
        words.push(current);
    }
    Some(words)
}

fn same_class(written: &str, class: &str) -> bool {
    let written = written.trim_start_matches('\\');
    written.eq_ignore_ascii_case(class)
        || class
            .rsplit('\\')
            .next()
            .is_some_and(|short| written.eq_ignore_ascii_case(short))
}

/// Whether `node` is the command argument of a process call
fn is_command_argument(ctx: &RuleContext<'_>, node: NodeId) -> bool {
    let Some(parent) = ctx.parent(node) else {
        return false;
    };
    match ctx.node(parent) {
        Node::New { class, args } => same_class(class, PROCESS_CLASS) && args.first() == Some(&node),
        Node::MethodCall {
            object,
            method,
            args,
        } => {
            method.eq_ignore_ascii_case("run")
                && args.get(1) == Some(&node)
                && ctx
                    .static_type(*object)
                    .is_some_and(|ty| ty.is_object_of(PROCESS_HELPER_CLASS))
        }
        _ => false,
    }
}

/// Operands of a left-nested concatenation chain, in source order
fn concat_operands(ctx: &RuleContext<'_>, node: NodeId) -> Vec<NodeId> {
    match ctx.node(node) {
        Node::Binary {
            op: BinaryOp::Concat,
            left,
            right,
        } => {
            let mut operands = concat_operands(ctx, *left);
            operands.extend(concat_operands(ctx, *right));
            operands
        }
        _ => vec![node],
    }
}

enum Item {
    Word(String, QuoteStyle),
    Reused(NodeId),
}

/// Array items for `'cmd ' . $arg . ' --flag'`. Adjacent string pieces are
/// joined first. Every joined piece must break at whitespace where it meets a
/// non-string operand, otherwise the word boundary is unknown and `None` is
/// returned.
fn concat_items(ctx: &RuleContext<'_>, operands: &[NodeId]) -> Option<Vec<Item>> {
    let mut items = Vec::new();
    let mut index = 0;
    while index < operands.len() {
        let Node::String { quote, .. } = ctx.node(operands[index]) else {
            items.push(Item::Reused(operands[index]));
            index += 1;
            continue;
        };
        let quote = *quote;
        let mut text = String::new();
        let first = index;
        while let Some(Node::String { value, .. }) = operands.get(index).map(|&id| ctx.node(id)) {
            text.push_str(value);
            index += 1;
        }

        let touches_before = first > 0 && !text.starts_with(char::is_whitespace);
        let touches_after = index < operands.len() && !text.ends_with(char::is_whitespace);
        if touches_before || touches_after {
            return None;
        }
        let words = split_command(&text)?;
        items.extend(words.into_iter().map(|word| Item::Word(word, quote)));
    }
    Some(items)
}

impl Rule for ProcessStringToArray {
    fn name(&self) -> &'static str {
        "process-string-to-array"
    }

    fn description(&self) -> &'static str {
        "Changes Process string argument to an array"
    }

    fn declared_kinds(&self) -> &'static [NodeKind] {
        &[NodeKind::String, NodeKind::Binary]
    }

    fn apply(&mut self, node: NodeId, ctx: &mut RuleContext<'_>) -> Result<Outcome, RuleError> {
        let items = match ctx.node(node) {
            Node::String { value, quote } => {
                if !is_command_argument(ctx, node) {
                    return Ok(Outcome::Unchanged);
                }
                match split_command(value) {
                    Some(words) if !words.is_empty() => {
                        words.into_iter().map(|word| Item::Word(word, *quote)).collect()
                    }
                    _ => return Ok(Outcome::Unchanged),
                }
            }
            Node::Binary {
                op: BinaryOp::Concat,
                ..
            } => {
                if !is_command_argument(ctx, node) {
                    return Ok(Outcome::Unchanged);
                }
                let operands = concat_operands(ctx, node);
                match concat_items(ctx, &operands) {
                    Some(items) => items,
                    None => return Ok(Outcome::Unchanged),
                }
            }
            _ => return Ok(Outcome::Unchanged),
        };

        let items = items
            .into_iter()
            .map(|item| match item {
                Item::Word(word, quote) => ctx.alloc(Node::string(word, quote)),
                Item::Reused(id) => id,
            })
            .collect();
        Ok(Outcome::Replace(ctx.alloc(Node::Array { items })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::catalog::testing::rewrite;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_split_command() {
        assert_eq!(split_command("ls -l").unwrap(), vec!["ls", "-l"]);
        assert_eq!(
            split_command("git commit -m \"first  commit\"").unwrap(),
            vec!["git", "commit", "-m", "first  commit"]
        );
        assert_eq!(split_command("  a   b  ").unwrap(), vec!["a", "b"]);
        assert_eq!(split_command("echo \\'x").unwrap(), vec!["echo", "\\'x"]);
        assert!(split_command("echo 'open").is_none());
    }

    #[test]
    fn test_new_process() {
        let source = "$process = new Process('ls -l');\n";
        let expected = "$process = new Process(['ls', '-l']);\n";
        assert_eq!(rewrite(ProcessStringToArray::new(), source), expected);
    }

    #[test]
    fn test_already_an_array() {
        let source = "$process = new \\Symfony\\Component\\Process\\Process(['ls']);\n";
        assert_eq!(rewrite(ProcessStringToArray::new(), source), source);
    }

    #[test]
    fn test_process_helper_second_argument() {
        let source = "$helper = new ProcessHelper();\n$helper->run($output, \"php bin/console\");\n";
        let expected = "$helper = new ProcessHelper();\n$helper->run($output, [\"php\", \"bin/console\"]);\n";
        assert_eq!(rewrite(ProcessStringToArray::new(), source), expected);
    }

    #[test]
    fn test_concatenation() {
        let source = "$p = new Process('rm -rf ' . $dir);\n";
        let expected = "$p = new Process(['rm', '-rf', $dir]);\n";
        assert_eq!(rewrite(ProcessStringToArray::new(), source), expected);
    }

    #[test]
    fn test_adjacent_string_pieces_are_joined() {
        let source = "$p = new Process('git ' . 'log -' . 'n 1 ' . $ref);\n";
        let expected = "$p = new Process(['git', 'log', '-n', '1', $ref]);\n";
        assert_eq!(rewrite(ProcessStringToArray::new(), source), expected);
    }

    #[test]
    fn test_ambiguous_concatenation_is_kept() {
        let source = "$p = new Process('ls --dir=' . $dir);\n";
        assert_eq!(rewrite(ProcessStringToArray::new(), source), source);
    }
}
