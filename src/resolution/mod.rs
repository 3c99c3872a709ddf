//! Relationship-path resolution.
//!
//! A SOQL target ending in the reserved `__r` suffix addresses a related
//! entity through a declared relationship rather than by its own name. The
//! resolver consults existing graph state to find the concrete object the
//! relationship refers to.

use tracing::debug;

use crate::errors::Result;
use crate::graph::GraphStore;
use crate::types::RELATIONSHIP_SUFFIX;

/// Resolves relationship-style SOQL targets against the graph.
pub struct RelationshipResolver<'a> {
    store: &'a dyn GraphStore,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(store: &'a dyn GraphStore) -> Self {
        Self { store }
    }

    /// Resolves `target` against `parent_object` when it carries the
    /// relationship suffix.
    ///
    /// Returns `None` when the target is not a relationship path, when there
    /// is no parent to resolve against, or when the graph has no matching
    /// field. Callers fall back to the unresolved target in those cases;
    /// a miss is degraded-but-non-fatal.
    pub async fn resolve(
        &self,
        parent_object: Option<&str>,
        target: &str,
    ) -> Result<Option<String>> {
        let Some(relationship_name) = target.strip_suffix(RELATIONSHIP_SUFFIX) else {
            return Ok(None);
        };
        let Some(parent) = parent_object else {
            debug!(target, "relationship path with no parent object; leaving unresolved");
            return Ok(None);
        };

        let resolved = self
            .store
            .relationship_target(parent, relationship_name)
            .await?;
        match &resolved {
            Some(object) => {
                debug!(target, parent, object = %object, "resolved relationship target")
            }
            None => debug!(target, parent, "no matching relationship field in graph"),
        }
        Ok(resolved)
    }
}
