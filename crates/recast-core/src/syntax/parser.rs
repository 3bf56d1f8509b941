//! Recursive-descent parser producing an arena tree plus token spans
//!
//! # Grammar
//!
//! ```ebnf
//! program     = {statement};
//! statement   = class_decl | function_decl | if_stmt | return_stmt
//!             | echo_stmt | block | expr, ";";
//! class_decl  = "class", name, "{", {member}, "}";
//! member      = {modifier}, (function_decl | property);
//! modifier    = "var" | "public" | "protected" | "private" | "static";
//! property    = (variable | name), ["=", expr], ";";
//! function_decl = "function", name, "(", [param, {",", param}], ")", block;
//! if_stmt     = "if", "(", expr, ")", statement, ["else", statement];
//! return_stmt = "return", [expr], ";";
//! echo_stmt   = "echo", expr, {",", expr}, ";";
//! block       = "{", {statement}, "}";
//!
//! expr        = assignable, "=", expr | binary(1);
//! binary(p)   = unary, {op(p' >= p), binary(p' + 1)};
//! unary       = ("!" | "-"), unary | "(", cast_type, ")", unary | postfix;
//! postfix     = primary, {"[", [expr], "]" | "->", name, [args]};
//! primary     = number | string | variable | "true" | "false" | "null"
//!             | "new", name, [args] | name, args | name, "::", name
//!             | name | "[", [expr, {",", expr}, [","]], "]" | "(", expr, ")";
//! args        = "(", [expr, {",", expr}], ")";
//! ```
//!
//! A bare name that is neither called nor qualified is read as a variable,
//! so `a = ''` and `$a = ''` parse to the same shape.

use std::sync::Arc;

use thiserror::Error;

use super::lexer::tokenize;
use super::token::{TokenKind, TokenSpan, TokenStream};
use super::{BinaryOp, CastType, Node, NodeId, NodeKind, QuoteStyle, SyntaxTree, UnaryOp};

const MODIFIERS: &[&str] = &["var", "public", "protected", "private", "static"];
const RESERVED: &[&str] = &[
    "class", "function", "if", "else", "return", "echo", "new", "var", "public", "protected",
    "private", "static",
];

/// Failure to turn source text into a tree
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message} (line {line}, column {column})")]
pub struct ParseError {
    pub message: String,
    /// Byte offset into the source
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn new(message: impl Into<String>, offset: usize) -> Self {
        Self {
            message: message.into(),
            offset,
            line: 1,
            column: 1,
        }
    }

    /// Fill in line and column from the offset
    pub fn located(mut self, source: &str) -> Self {
        let offset = self.offset.min(source.len());
        let before = &source[..offset];
        self.line = before.matches('\n').count() + 1;
        self.column = before.rfind('\n').map_or(offset, |i| offset - i - 1) + 1;
        self
    }
}

/// Output of a successful parse
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub tree: SyntaxTree,
    pub tokens: TokenStream,
    /// Token span of every parsed node, indexed by `NodeId`
    pub spans: Vec<TokenSpan>,
}

impl ParsedFile {
    pub fn span(&self, id: NodeId) -> Option<TokenSpan> {
        self.spans.get(id.index()).copied()
    }

    /// Exact source text of a parsed node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        self.span(id).map(|span| self.tokens.span_text(span))
    }
}

/// Source text to tree plus token stream
pub trait SourceParser: Send + Sync {
    fn parse(&self, source: &str) -> Result<ParsedFile, ParseError>;
}

/// Parser for the bundled scripting dialect
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptParser;

impl ScriptParser {
    pub fn new() -> Self {
        ScriptParser
    }
}

impl SourceParser for ScriptParser {
    fn parse(&self, source: &str) -> Result<ParsedFile, ParseError> {
        let tokens = TokenStream::new(Arc::<str>::from(source), tokenize(source)?);
        let significant = tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| !token.kind.is_trivia())
            .map(|(index, _)| index)
            .collect();

        let mut parser = Parser {
            tokens: &tokens,
            significant,
            pos: 0,
            tree: SyntaxTree::new(),
            spans: Vec::new(),
        };
        let root = parser.program().map_err(|e| e.located(source))?;
        parser.tree.set_root(root);

        let Parser { tree, spans, .. } = parser;
        Ok(ParsedFile {
            tree,
            tokens,
            spans,
        })
    }
}

type PResult<T> = Result<T, ParseError>;

struct Parser<'a> {
    tokens: &'a TokenStream,
    /// Indices of non-trivia tokens
    significant: Vec<usize>,
    pos: usize,
    tree: SyntaxTree,
    spans: Vec<TokenSpan>,
}

impl<'a> Parser<'a> {
    // ---- cursor ----

    fn peek_n(&self, n: usize) -> Option<(TokenKind, &'a str)> {
        let index = *self.significant.get(self.pos + n)?;
        let token = self.tokens.get(index)?;
        let tokens: &'a TokenStream = self.tokens;
        Some((token.kind, tokens.lexeme(token)))
    }

    fn peek(&self) -> Option<(TokenKind, &'a str)> {
        self.peek_n(0)
    }

    fn peek_text(&self) -> Option<&'a str> {
        self.peek().map(|(_, text)| text)
    }

    fn at(&self, text: &str) -> bool {
        self.peek_text() == Some(text)
    }

    fn at_punct(&self, text: &str) -> bool {
        matches!(self.peek(), Some((TokenKind::Punct, t)) if t == text)
    }

    fn bump(&mut self) -> Option<(TokenKind, &'a str)> {
        let current = self.peek();
        if current.is_some() {
            self.pos += 1;
        }
        current
    }

    fn eat_punct(&mut self, text: &str) -> bool {
        if self.at_punct(text) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, text: &str) -> PResult<()> {
        if self.eat_punct(text) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", text)))
        }
    }

    fn expect_name(&mut self) -> PResult<&'a str> {
        match self.peek() {
            Some((TokenKind::Ident, text)) => {
                self.pos += 1;
                Ok(text)
            }
            _ => Err(self.error("expected a name")),
        }
    }

    /// Token index where the next node starts
    fn start(&self) -> usize {
        self.significant
            .get(self.pos)
            .copied()
            .unwrap_or(self.tokens.len())
    }

    /// Token index just past the last consumed token
    fn end(&self) -> usize {
        match self.pos {
            0 => 0,
            pos => self.significant[pos - 1] + 1,
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let offset = self
            .significant
            .get(self.pos)
            .and_then(|&index| self.tokens.get(index))
            .map_or(self.tokens.source().len(), |token| token.start);
        let message = message.into();
        let message = match self.peek_text() {
            Some(found) => format!("{}, found '{}'", message, found),
            None => format!("{}, found end of input", message),
        };
        ParseError::new(message, offset)
    }

    fn finish(&mut self, node: Node, start: usize) -> NodeId {
        let id = self.tree.alloc(node);
        self.spans.push(TokenSpan::from_indices(start, self.end()));
        id
    }

    fn span_start(&self, id: NodeId) -> usize {
        self.spans[id.index()].start as usize
    }

    // ---- statements ----

    fn program(&mut self) -> PResult<NodeId> {
        let mut stmts = Vec::new();
        while self.peek().is_some() {
            stmts.push(self.statement()?);
        }
        let id = self.tree.alloc(Node::Program { stmts });
        self.spans
            .push(TokenSpan::from_indices(0, self.tokens.len()));
        Ok(id)
    }

    fn statement(&mut self) -> PResult<NodeId> {
        let start = self.start();
        match self.peek() {
            Some((TokenKind::Ident, "class")) => self.class_decl(),
            Some((TokenKind::Ident, "function")) => self.function_decl(Vec::new(), start),
            Some((TokenKind::Ident, "if")) => self.if_stmt(),
            Some((TokenKind::Ident, "return")) => {
                self.bump();
                let value = if self.at_punct(";") {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect_punct(";")?;
                Ok(self.finish(Node::Return { value }, start))
            }
            Some((TokenKind::Ident, "echo")) => {
                self.bump();
                let mut values = vec![self.expr()?];
                while self.eat_punct(",") {
                    values.push(self.expr()?);
                }
                self.expect_punct(";")?;
                Ok(self.finish(Node::Echo { values }, start))
            }
            Some((TokenKind::Punct, "{")) => self.block(),
            Some(_) => {
                let expr = self.expr()?;
                self.expect_punct(";")?;
                Ok(self.finish(Node::ExprStmt { expr }, start))
            }
            None => Err(self.error("expected a statement")),
        }
    }

    fn block(&mut self) -> PResult<NodeId> {
        let start = self.start();
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        while !self.at_punct("}") {
            if self.peek().is_none() {
                return Err(self.error("unclosed block"));
            }
            stmts.push(self.statement()?);
        }
        self.bump();
        Ok(self.finish(Node::Block { stmts }, start))
    }

    fn class_decl(&mut self) -> PResult<NodeId> {
        let start = self.start();
        self.bump();
        let name = self.expect_name()?.to_string();
        self.expect_punct("{")?;
        let mut members = Vec::new();
        while !self.at_punct("}") {
            if self.peek().is_none() {
                return Err(self.error("unclosed class body"));
            }
            members.push(self.member()?);
        }
        self.bump();
        Ok(self.finish(Node::ClassDecl { name, members }, start))
    }

    fn member(&mut self) -> PResult<NodeId> {
        let start = self.start();
        let mut modifiers = Vec::new();
        while let Some(text) = self.peek_text().filter(|t| MODIFIERS.contains(t)) {
            modifiers.push(text.to_string());
            self.bump();
        }
        if self.at("function") {
            return self.function_decl(modifiers, start);
        }
        let name = match self.peek() {
            Some((TokenKind::Variable | TokenKind::Ident, text)) => {
                self.bump();
                text.to_string()
            }
            _ => return Err(self.error("expected a property or method")),
        };
        let default = if self.eat_punct("=") {
            Some(self.expr()?)
        } else {
            None
        };
        self.expect_punct(";")?;
        Ok(self.finish(
            Node::PropertyDecl {
                modifiers,
                name,
                default,
            },
            start,
        ))
    }

    fn function_decl(&mut self, modifiers: Vec<String>, start: usize) -> PResult<NodeId> {
        self.bump();
        let name = self.expect_name()?.to_string();
        self.expect_punct("(")?;
        let mut params = Vec::new();
        if !self.at_punct(")") {
            loop {
                let param_start = self.start();
                let param = match self.peek() {
                    Some((TokenKind::Variable | TokenKind::Ident, text)) => {
                        self.bump();
                        text.to_string()
                    }
                    _ => return Err(self.error("expected a parameter")),
                };
                params.push(self.finish(Node::Param { name: param }, param_start));
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;
        let body = self.block()?;
        Ok(self.finish(
            Node::FunctionDecl {
                modifiers,
                name,
                params,
                body,
            },
            start,
        ))
    }

    fn if_stmt(&mut self) -> PResult<NodeId> {
        let start = self.start();
        self.bump();
        self.expect_punct("(")?;
        let condition = self.expr()?;
        self.expect_punct(")")?;
        let then_branch = self.statement()?;
        let else_branch = if self.at("else") {
            self.bump();
            Some(self.statement()?)
        } else {
            None
        };
        Ok(self.finish(
            Node::If {
                condition,
                then_branch,
                else_branch,
            },
            start,
        ))
    }

    // ---- expressions ----

    fn expr(&mut self) -> PResult<NodeId> {
        let target = self.binary(1)?;
        if !self.at_punct("=") {
            return Ok(target);
        }
        if !matches!(
            self.tree.kind(target),
            NodeKind::Variable | NodeKind::PropertyFetch | NodeKind::ArrayDimFetch
        ) {
            return Err(self.error("left side of assignment is not assignable"));
        }
        self.bump();
        let value = self.expr()?;
        let start = self.span_start(target);
        Ok(self.finish(Node::Assign { target, value }, start))
    }

    fn binary(&mut self, min_precedence: u8) -> PResult<NodeId> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Some((TokenKind::Punct, text)) => match BinaryOp::from_symbol(text) {
                    Some(op) if op.precedence() >= min_precedence => op,
                    _ => break,
                },
                _ => break,
            };
            self.bump();
            let right = self.binary(op.precedence() + 1)?;
            let start = self.span_start(left);
            left = self.finish(Node::Binary { op, left, right }, start);
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<NodeId> {
        let start = self.start();
        if self.eat_punct("!") {
            let operand = self.unary()?;
            return Ok(self.finish(
                Node::Unary {
                    op: UnaryOp::Not,
                    operand,
                },
                start,
            ));
        }
        if self.eat_punct("-") {
            let operand = self.unary()?;
            return Ok(self.finish(
                Node::Unary {
                    op: UnaryOp::Negate,
                    operand,
                },
                start,
            ));
        }
        if self.at_punct("(") {
            let cast = match (self.peek_n(1), self.peek_n(2)) {
                (Some((TokenKind::Ident, keyword)), Some((TokenKind::Punct, ")"))) => {
                    CastType::from_keyword(keyword)
                }
                _ => None,
            };
            if let Some(ty) = cast {
                self.pos += 3;
                let expr = self.unary()?;
                return Ok(self.finish(Node::Cast { ty, expr }, start));
            }
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<NodeId> {
        let mut base = self.primary()?;
        loop {
            let start = self.span_start(base);
            if self.eat_punct("[") {
                let index = if self.at_punct("]") {
                    None
                } else {
                    Some(self.expr()?)
                };
                self.expect_punct("]")?;
                base = self.finish(Node::ArrayDimFetch { array: base, index }, start);
            } else if self.eat_punct("->") {
                let member = self.expect_name()?.to_string();
                base = if self.at_punct("(") {
                    let args = self.args()?;
                    self.finish(
                        Node::MethodCall {
                            object: base,
                            method: member,
                            args,
                        },
                        start,
                    )
                } else {
                    self.finish(
                        Node::PropertyFetch {
                            object: base,
                            property: member,
                        },
                        start,
                    )
                };
            } else {
                return Ok(base);
            }
        }
    }

    fn args(&mut self) -> PResult<Vec<NodeId>> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        if !self.at_punct(")") {
            loop {
                args.push(self.expr()?);
                if !self.eat_punct(",") {
                    break;
                }
            }
        }
        self.expect_punct(")")?;
        Ok(args)
    }

    fn primary(&mut self) -> PResult<NodeId> {
        let start = self.start();
        let (kind, text) = match self.peek() {
            Some(token) => token,
            None => return Err(self.error("expected an expression")),
        };
        match kind {
            TokenKind::Number => {
                let value = text
                    .parse::<i64>()
                    .map_err(|_| self.error("integer literal out of range"))?;
                self.bump();
                Ok(self.finish(Node::Number { value }, start))
            }
            TokenKind::String => {
                let quote = if text.starts_with('"') {
                    QuoteStyle::Double
                } else {
                    QuoteStyle::Single
                };
                let value = text[1..text.len() - 1].to_string();
                self.bump();
                Ok(self.finish(Node::String { value, quote }, start))
            }
            TokenKind::Variable => {
                self.bump();
                Ok(self.finish(Node::variable(text), start))
            }
            TokenKind::Ident => self.name_expr(text, start),
            TokenKind::Punct if text == "[" => {
                self.bump();
                let mut items = Vec::new();
                while !self.at_punct("]") {
                    items.push(self.expr()?);
                    if !self.eat_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                Ok(self.finish(Node::Array { items }, start))
            }
            TokenKind::Punct if text == "(" => {
                self.bump();
                let inner = self.expr()?;
                self.expect_punct(")")?;
                // The parentheses belong to the inner node's text
                self.spans[inner.index()] = TokenSpan::from_indices(start, self.end());
                Ok(inner)
            }
            _ => Err(self.error("expected an expression")),
        }
    }

    fn name_expr(&mut self, text: &'a str, start: usize) -> PResult<NodeId> {
        match text.to_ascii_lowercase().as_str() {
            "true" | "false" => {
                self.bump();
                let value = text.eq_ignore_ascii_case("true");
                return Ok(self.finish(Node::Bool { value }, start));
            }
            "null" => {
                self.bump();
                return Ok(self.finish(Node::Null, start));
            }
            "new" => {
                self.bump();
                let class = self.expect_name()?.to_string();
                let args = if self.at_punct("(") {
                    self.args()?
                } else {
                    Vec::new()
                };
                return Ok(self.finish(Node::New { class, args }, start));
            }
            _ => {}
        }
        if RESERVED.contains(&text) {
            return Err(self.error("unexpected keyword"));
        }
        self.bump();
        if self.at_punct("(") {
            let args = self.args()?;
            return Ok(self.finish(Node::call(text, args), start));
        }
        if self.eat_punct("::") {
            let constant = self.expect_name()?.to_string();
            return Ok(self.finish(
                Node::ClassConstFetch {
                    class: text.to_string(),
                    constant,
                },
                start,
            ));
        }
        Ok(self.finish(Node::variable(text), start))
    }
}
