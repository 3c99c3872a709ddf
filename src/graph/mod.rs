//! Graph store interface and the bundled SQLite-backed implementation.

mod sqlite;

pub use sqlite::{GraphStoreStats, SqliteGraphStore};

use async_trait::async_trait;
use serde_json::Value;

use crate::errors::Result;
use crate::types::{EdgeSpec, MutationSummary, NodeRef};

/// Idempotent upsert/query interface to the persistent property graph.
///
/// All mutations are keyed: re-running the same upsert resolves to the same
/// node or edge instead of duplicating it.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Creates or updates a node of `node_type` keyed by the `key_field`
    /// property of `record`.
    async fn upsert(&self, node_type: &str, key_field: &str, record: &Value)
        -> Result<MutationSummary>;

    /// Creates or updates a typed, uniquely named edge between two node
    /// specs, creating missing endpoint nodes as needed.
    async fn upsert_relationship(
        &self,
        from: &NodeRef,
        to: &NodeRef,
        edge: &EdgeSpec,
    ) -> Result<MutationSummary>;

    /// Looks up the identifier of the field named `field_name` on the object
    /// `object_name`, if the graph models it.
    async fn find_field_in_object(
        &self,
        object_name: &str,
        field_name: &str,
    ) -> Result<Option<String>>;

    /// Resolves a relationship name declared on `object_name` to the object
    /// it references, if the graph models it.
    async fn relationship_target(
        &self,
        object_name: &str,
        relationship_name: &str,
    ) -> Result<Option<String>>;
}
