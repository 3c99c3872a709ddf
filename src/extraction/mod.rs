//! Reference extraction.
//!
//! Walks a parsed syntax tree depth-first, left to right, collecting the
//! distinct referenced type names and every embedded SOQL statement in
//! source order.

use tracing::{debug, warn};

use crate::parse::{SourceParser, SyntaxNode};
use crate::soql::QueryParser;
use crate::types::{is_builtin_type, ExtractionResult, TriggerArtifact, QUERY_OPEN_DELIMITER};

/// Extracts type references and SOQL statements from artifact bodies.
pub struct ReferenceExtractor<'a> {
    parser: &'a dyn SourceParser,
    queries: &'a dyn QueryParser,
}

impl<'a> ReferenceExtractor<'a> {
    pub fn new(parser: &'a dyn SourceParser, queries: &'a dyn QueryParser) -> Self {
        Self { parser, queries }
    }

    /// Extracts references from one artifact's body.
    ///
    /// A syntax error in the body is logged and yields empty results; a
    /// malformed artifact still gets its graph node, just with no edges
    /// from this pass.
    pub fn extract(&self, artifact: &TriggerArtifact) -> ExtractionResult {
        let mut result = ExtractionResult::default();

        match self.parser.parse(&artifact.body) {
            Ok(root) => self.visit(artifact, &root, &mut result),
            Err(error) => {
                warn!(artifact = %artifact.id, %error, "could not parse trigger body");
            }
        }

        result
    }

    fn visit(&self, artifact: &TriggerArtifact, node: &SyntaxNode, result: &mut ExtractionResult) {
        match node {
            SyntaxNode::Token(text) => {
                if text.starts_with(QUERY_OPEN_DELIMITER) {
                    debug!(artifact = %artifact.id, fragment = %text, "SOQL query found");
                    // A fragment without a resolvable target is dropped, not
                    // an error.
                    if let Some(statement) = self.queries.parse_query(text) {
                        result.statements.push(statement);
                    }
                }
            }
            SyntaxNode::TypeRef { name, children } => {
                // Membership in the built-in list is checked at insertion
                // time, case-insensitively; an ignored name is never stored.
                if !is_builtin_type(name) {
                    result.type_refs.insert(name.clone());
                }
                // Type-reference nodes can nest (generic arguments).
                for child in children {
                    self.visit(artifact, child, result);
                }
            }
            SyntaxNode::Structural(children) => {
                for child in children {
                    self.visit(artifact, child, result);
                }
            }
        }
    }
}
