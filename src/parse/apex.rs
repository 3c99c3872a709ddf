//! Minimal Apex front end.
//!
//! Produces just enough of a syntax tree for reference extraction: terminal
//! tokens (including embedded SOQL fragments as single `[...]` tokens),
//! type-reference nodes for declaration-position and generic-argument types,
//! and structural nodes for `{ }` blocks. It is not a validating parser;
//! anything it cannot classify stays a plain token.

use crate::errors::{CrawlError, Result};
use crate::parse::{SourceParser, SyntaxNode};

/// Bundled programming-dialect parser for Apex trigger bodies.
pub struct ApexParser;

/// Reserved words that can never name a type and never act as a declared
/// variable name. Apex keywords are case-insensitive.
const KEYWORDS: &[&str] = &[
    "trigger", "on", "class", "interface", "enum", "extends", "implements", "public", "private",
    "protected", "global", "static", "final", "virtual", "abstract", "override", "transient",
    "testmethod", "webservice", "with", "without", "inherited", "sharing", "void", "new",
    "return", "if", "else", "for", "while", "do", "break", "continue", "try", "catch", "finally",
    "throw", "insert", "update", "upsert", "delete", "undelete", "merge", "before", "after",
    "this", "super", "null", "true", "false", "instanceof", "get", "set", "and", "or", "not",
];

fn is_keyword(ident: &str) -> bool {
    let lower = ident.to_lowercase();
    KEYWORDS.contains(&lower.as_str())
}

/// Lexed token kinds. Punctuation is kept as single symbols; string literals
/// and comments are dropped during lexing.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Sym(char),
    /// A full embedded SOQL fragment, delimiters included.
    Query(String),
}

impl SourceParser for ApexParser {
    fn parse(&self, source: &str) -> Result<SyntaxNode> {
        let tokens = lex(source)?;
        let mut pos = 0;
        let children = parse_nodes(&tokens, &mut pos, 0);
        Ok(SyntaxNode::Structural(children))
    }
}

/// Lexes source text into tokens, skipping whitespace, comments, and string
/// literals. Returns a parse error for unterminated comments, strings, or
/// query fragments.
fn lex(source: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c == '/' && chars.get(i + 1) == Some(&'/') {
            while i < chars.len() && chars[i] != '\n' {
                i += 1;
            }
        } else if c == '/' && chars.get(i + 1) == Some(&'*') {
            let start = i;
            i += 2;
            loop {
                if i + 1 >= chars.len() {
                    return Err(lex_error("unterminated block comment", start));
                }
                if chars[i] == '*' && chars[i + 1] == '/' {
                    i += 2;
                    break;
                }
                i += 1;
            }
        } else if c == '\'' {
            let start = i;
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(lex_error("unterminated string literal", start)),
                    Some('\\') => i += 2,
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(_) => i += 1,
                }
            }
        } else if c == '[' {
            let start = i;
            let mut text = String::from('[');
            let mut in_string = false;
            i += 1;
            loop {
                match chars.get(i) {
                    None => return Err(lex_error("unterminated query fragment", start)),
                    Some('\'') => {
                        in_string = !in_string;
                        text.push('\'');
                        i += 1;
                    }
                    Some(']') if !in_string => {
                        text.push(']');
                        i += 1;
                        break;
                    }
                    Some(&ch) => {
                        text.push(ch);
                        i += 1;
                    }
                }
            }
            tokens.push(Token::Query(text));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                ident.push(chars[i]);
                i += 1;
            }
            tokens.push(Token::Ident(ident));
        } else {
            tokens.push(Token::Sym(c));
            i += 1;
        }
    }

    Ok(tokens)
}

fn lex_error(message: &str, offset: usize) -> CrawlError {
    CrawlError::Parse {
        message: format!("{message} at offset {offset}"),
        artifact: String::new(),
    }
}

/// Parses a token run into syntax nodes until end of input or, when nested
/// inside a block, the closing `}`.
fn parse_nodes(tokens: &[Token], pos: &mut usize, depth: usize) -> Vec<SyntaxNode> {
    let mut nodes = Vec::new();

    while *pos < tokens.len() {
        match &tokens[*pos] {
            Token::Query(text) => {
                nodes.push(SyntaxNode::Token(text.clone()));
                *pos += 1;
            }
            Token::Sym('{') => {
                *pos += 1;
                let children = parse_nodes(tokens, pos, depth + 1);
                nodes.push(SyntaxNode::Structural(children));
            }
            Token::Sym('}') => {
                *pos += 1;
                if depth > 0 {
                    return nodes;
                }
                // Stray closing brace at top level: ignore and continue.
            }
            Token::Sym(_) => {
                *pos += 1;
            }
            Token::Ident(_) => {
                nodes.push(parse_ident(tokens, pos));
            }
        }
    }

    nodes
}

/// Parses an identifier chain, classifying it as a type reference when it is
/// followed by generic type arguments or by another identifier (a
/// declaration), and as a plain token otherwise.
fn parse_ident(tokens: &[Token], pos: &mut usize) -> SyntaxNode {
    let leading = match &tokens[*pos] {
        Token::Ident(name) => name.clone(),
        _ => unreachable!("parse_ident called on non-identifier"),
    };
    *pos += 1;

    if is_keyword(&leading) {
        return SyntaxNode::Token(leading);
    }

    // Consume a dotted chain; the leading identifier names the type.
    while tokens.get(*pos) == Some(&Token::Sym('.')) {
        if let Some(Token::Ident(_)) = tokens.get(*pos + 1) {
            *pos += 2;
        } else {
            break;
        }
    }

    if tokens.get(*pos) == Some(&Token::Sym('<')) {
        let mut lookahead = *pos + 1;
        if let Some(args) = parse_type_args(tokens, &mut lookahead) {
            *pos = lookahead;
            return SyntaxNode::TypeRef {
                name: leading,
                children: args,
            };
        }
        // Not a generic after all (e.g. a comparison); leave `<` in place.
        return SyntaxNode::Token(leading);
    }

    if let Some(Token::Ident(next)) = tokens.get(*pos) {
        // Declaration position: `Account acc`. The following identifier is
        // the variable name and is consumed on the next iteration. A keyword
        // after the identifier (`T on ...`) rules out a declaration.
        if !is_keyword(next) {
            return SyntaxNode::TypeRef {
                name: leading,
                children: Vec::new(),
            };
        }
    }

    SyntaxNode::Token(leading)
}

/// Attempts to parse a `<T, U<V>, ...>` generic argument list starting just
/// after the opening `<`. Returns `None` if the token run is not a valid
/// argument list, in which case the `<` was an ordinary comparison.
fn parse_type_args(tokens: &[Token], pos: &mut usize) -> Option<Vec<SyntaxNode>> {
    let mut args = Vec::new();

    loop {
        let name = match tokens.get(*pos) {
            Some(Token::Ident(name)) => name.clone(),
            _ => return None,
        };
        *pos += 1;

        while tokens.get(*pos) == Some(&Token::Sym('.')) {
            if let Some(Token::Ident(_)) = tokens.get(*pos + 1) {
                *pos += 2;
            } else {
                return None;
            }
        }

        let children = if tokens.get(*pos) == Some(&Token::Sym('<')) {
            *pos += 1;
            parse_type_args(tokens, pos)?
        } else {
            Vec::new()
        };
        args.push(SyntaxNode::TypeRef { name, children });

        match tokens.get(*pos) {
            Some(Token::Sym(',')) => *pos += 1,
            Some(Token::Sym('>')) => {
                *pos += 1;
                return Some(args);
            }
            _ => return None,
        }
    }
}
