//! Lexer for the scripting dialect, built on nom
//!
//! Every byte of the input ends up in exactly one token, trivia included, so
//! the token stream can reproduce the source text verbatim.
//!
//! # Token Grammar
//!
//! ```ebnf
//! token        = whitespace | block_comment | line_comment | string
//!              | open_tag | variable | number | name | punct;
//!
//! whitespace   = ws, {ws};
//! block_comment = "/*", {any}, "*/";
//! line_comment = ("//" | "#"), {any - newline};
//! string       = "'", {char | "\\", any}, "'"
//!              | '"', {char | "\\", any}, '"';
//! open_tag     = "<?php";
//! variable     = "$", identifier;
//! number       = digit, {digit};
//! name         = ["\\"], identifier, {"\\", identifier};
//! identifier   = (letter | "_"), {letter | digit | "_"};
//! punct        = "===" | "!==" | "==" | "!=" | "<=" | ">=" | "&&" | "||"
//!              | "->" | "::" | "=>" | single_punct;
//! ```

use nom::{
    branch::alt,
    bytes::complete::{tag, take_until},
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace1, not_line_ending, one_of},
    combinator::{cut, map, opt, recognize},
    error::{Error, ErrorKind},
    multi::{many0, separated_list1},
    sequence::{pair, tuple},
    IResult,
};

use super::parser::ParseError;
use super::token::{Token, TokenKind};

const SINGLE_PUNCT: &str = "=+-*/%.<>!(){}[];,:?&|@";

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn name(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('\\')), separated_list1(char('\\'), identifier)))(input)
}

fn variable(input: &str) -> IResult<&str, &str> {
    recognize(pair(char('$'), identifier))(input)
}

fn block_comment(input: &str) -> IResult<&str, &str> {
    recognize(tuple((tag("/*"), cut(take_until("*/")), tag("*/"))))(input)
}

fn line_comment(input: &str) -> IResult<&str, &str> {
    recognize(pair(alt((tag("//"), tag("#"))), not_line_ending))(input)
}

/// Quoted string with backslash escapes. An opening quote without a closing
/// one is a hard failure rather than a fallback to punctuation.
fn string_literal(input: &str) -> IResult<&str, &str> {
    let quote = match input.chars().next() {
        Some(q @ ('\'' | '"')) => q,
        _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
    };
    let mut escaped = false;
    for (index, c) in input.char_indices().skip(1) {
        if escaped {
            escaped = false;
            continue;
        }
        if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[index + 1..], &input[..index + 1]));
        }
    }
    Err(nom::Err::Failure(Error::new(input, ErrorKind::Eof)))
}

fn punct(input: &str) -> IResult<&str, &str> {
    alt((
        tag("==="),
        tag("!=="),
        tag("=="),
        tag("!="),
        tag("<="),
        tag(">="),
        tag("&&"),
        tag("||"),
        tag("->"),
        tag("::"),
        tag("=>"),
        recognize(one_of(SINGLE_PUNCT)),
    ))(input)
}

fn token(input: &str) -> IResult<&str, TokenKind> {
    alt((
        map(multispace1, |_| TokenKind::Whitespace),
        map(block_comment, |_| TokenKind::Comment),
        map(line_comment, |_| TokenKind::Comment),
        map(string_literal, |_| TokenKind::String),
        map(tag("<?php"), |_| TokenKind::OpenTag),
        map(variable, |_| TokenKind::Variable),
        map(digit1, |_| TokenKind::Number),
        map(name, |_| TokenKind::Ident),
        map(punct, |_| TokenKind::Punct),
    ))(input)
}

/// Split `source` into tokens covering every byte
pub fn tokenize(source: &str) -> Result<Vec<Token>, ParseError> {
    if source.len() > u32::MAX as usize {
        return Err(ParseError::new("source exceeds the addressable size", 0));
    }

    let mut tokens = Vec::new();
    let mut rest = source;
    while !rest.is_empty() {
        let start = source.len() - rest.len();
        match token(rest) {
            Ok((remaining, kind)) => {
                let end = source.len() - remaining.len();
                tokens.push(Token { kind, start, end });
                rest = remaining;
            }
            Err(nom::Err::Failure(_)) => {
                let message = if rest.starts_with("/*") {
                    "unterminated comment"
                } else {
                    "unterminated string literal"
                };
                return Err(ParseError::new(message, start).located(source));
            }
            Err(_) => {
                let found = rest.chars().next().unwrap_or_default();
                return Err(
                    ParseError::new(format!("unexpected character '{}'", found), start)
                        .located(source),
                );
            }
        }
    }
    Ok(tokens)
}
