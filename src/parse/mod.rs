//! Programming-dialect front end.
//!
//! The extraction pass consumes the parser as a black box that yields a
//! traversable syntax tree. The tree is a closed tagged variant over the
//! node kinds the walk dispatches on, so downstream code pattern-matches
//! instead of inspecting runtime type names.

mod apex;

pub use apex::ApexParser;

use crate::errors::Result;

/// One node of a parsed syntax tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxNode {
    /// A terminal token carrying its literal source text. Embedded SOQL
    /// fragments surface as single tokens starting with `[`.
    Token(String),
    /// A class-or-interface type reference. `name` is the leading identifier
    /// of the referenced type; `children` holds nested type references such
    /// as generic type arguments.
    TypeRef {
        name: String,
        children: Vec<SyntaxNode>,
    },
    /// Any other structural node; only its children matter to the walk.
    Structural(Vec<SyntaxNode>),
}

/// Trait for programming-dialect parsers that turn raw source text into a
/// syntax tree.
pub trait SourceParser: Send + Sync {
    /// Parses `source` into a syntax tree rooted at a structural node.
    ///
    /// A syntax error is reported as `CrawlError::Parse`; callers decide
    /// whether that is fatal (the extraction pass treats it as soft).
    fn parse(&self, source: &str) -> Result<SyntaxNode>;
}
