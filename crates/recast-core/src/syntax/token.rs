/*!
# Tokens

Token stream produced by the lexer. Trivia (whitespace, comments, the open
tag) is kept so that the stream covers every byte of the source.
*/

use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Lexical category of a token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TokenKind {
    Whitespace,
    Comment,
    /// `<?php`
    OpenTag,
    /// Bare or namespace-qualified name: `reset`, `\Foo\Bar`
    Ident,
    /// `$name`
    Variable,
    Number,
    String,
    Punct,
}

impl TokenKind {
    /// Trivia never carries syntax; the parser skips it
    pub fn is_trivia(self) -> bool {
        matches!(self, TokenKind::Whitespace | TokenKind::Comment | TokenKind::OpenTag)
    }
}

/// A single lexeme, addressed by byte offsets into the owning stream's source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Half-open range of token indices `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TokenSpan {
    pub start: u32,
    pub end: u32,
}

impl TokenSpan {
    pub const fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    pub fn from_indices(start: usize, end: usize) -> Self {
        // Token counts are bounded by the source length, which the lexer
        // caps at u32::MAX bytes.
        Self {
            start: start as u32,
            end: end as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        (self.end.saturating_sub(self.start)) as usize
    }
}

impl fmt::Display for TokenSpan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Ordered tokens of one file together with the text they were cut from.
///
/// Never mutated after lexing; cloning is cheap because the source is shared.
#[derive(Debug, Clone)]
pub struct TokenStream {
    source: Arc<str>,
    tokens: Vec<Token>,
}

impl TokenStream {
    pub fn new(source: impl Into<Arc<str>>, tokens: Vec<Token>) -> Self {
        Self {
            source: source.into(),
            tokens,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Token> {
        self.tokens.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Token> {
        self.tokens.iter()
    }

    /// Raw text of a token
    pub fn lexeme(&self, token: &Token) -> &str {
        &self.source[token.range()]
    }

    /// Byte range covered by a token span.
    ///
    /// An empty span collapses to the start offset of the token at
    /// `span.start`, or to the end of the source past the last token.
    pub fn byte_range(&self, span: TokenSpan) -> Range<usize> {
        let start = span.start as usize;
        let end = span.end as usize;
        if start >= end {
            let at = self
                .tokens
                .get(start)
                .map_or(self.source.len(), |token| token.start);
            return at..at;
        }
        let first = self.tokens.get(start).map_or(self.source.len(), |t| t.start);
        let last = self
            .tokens
            .get(end - 1)
            .map_or(self.source.len(), |t| t.end);
        first..last.max(first)
    }

    /// Exact original text of a span, including interior trivia
    pub fn span_text(&self, span: TokenSpan) -> &str {
        &self.source[self.byte_range(span)]
    }

    /// Text between two byte offsets of the source
    pub fn slice(&self, range: Range<usize>) -> &str {
        let end = range.end.min(self.source.len());
        let start = range.start.min(end);
        &self.source[start..end]
    }

    /// Leading whitespace of the line containing `offset`, up to the first
    /// non-blank character of that line
    pub fn line_indent(&self, offset: usize) -> &str {
        let offset = offset.min(self.source.len());
        let line_start = self.source[..offset].rfind('\n').map_or(0, |i| i + 1);
        let line = &self.source[line_start..];
        let width = line
            .find(|c: char| c != ' ' && c != '\t')
            .unwrap_or(line.len());
        &line[..width]
    }
}
