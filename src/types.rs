use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Built-in Apex type names that are never recorded as entity references.
/// Matching is case-insensitive against the uppercased candidate name.
pub const BUILTIN_TYPES: &[&str] = &[
    "LIST", "MAP", "SET", "DOUBLE", "STRING", "LONG", "DECIMAL", "BOOLEAN", "DATE", "DATETIME",
    "TIME", "OBJECT", "ID", "SOBJECT", "INTEGER",
];

/// Reserved suffix marking a SOQL target as a relationship path rather than
/// a concrete object name.
pub const RELATIONSHIP_SUFFIX: &str = "__r";

/// Opening delimiter of an embedded SOQL fragment inside Apex source.
pub const QUERY_OPEN_DELIMITER: char = '[';

/// Returns `true` if `name` is one of the built-in Apex types.
pub fn is_builtin_type(name: &str) -> bool {
    let upper = name.to_uppercase();
    BUILTIN_TYPES.contains(&upper.as_str())
}

/// Kinds of reference edges emitted for one analyzed artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReferenceKind {
    TypeRef,
    QueryObject,
    QuerySelectField,
    QueryWhereField,
    QueryLiteralValue,
}

impl ReferenceKind {
    /// Category tag used inside edge name keys. Select and where field
    /// references share the `SOQLWhere`/`SOQLSelect` wording of the original
    /// graph so re-crawls upsert the same edges.
    pub fn category(&self) -> &'static str {
        match self {
            ReferenceKind::TypeRef => "TypeRef",
            ReferenceKind::QueryObject => "Trigger",
            ReferenceKind::QuerySelectField => "TriggerSOQLSelect",
            ReferenceKind::QueryWhereField => "TriggerSOQLWhere",
            ReferenceKind::QueryLiteralValue => "TriggerSOQLWhere",
        }
    }

    /// Builds the deterministic edge name key for a reference to `ident`
    /// made by the artifact with fully qualified name `full_name`.
    ///
    /// The key is the idempotence contract: re-running the crawl produces
    /// the same key and therefore upserts rather than duplicates the edge.
    pub fn edge_name(&self, full_name: &str, ident: &str) -> String {
        format!("{}.{}.{}", full_name, self.category(), ident)
    }
}

/// Structured form of one embedded SOQL statement.
///
/// Produced by the query-dialect parser; a fragment that cannot be resolved
/// to a target object yields no statement at all, so `object_name` is always
/// present here.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoqlStatement {
    /// Target object, or a relationship path ending in `__r` for sub-selects
    /// that address a related entity indirectly.
    pub object_name: String,
    /// Field names in the SELECT list, in source order.
    pub fields: Vec<String>,
    /// Field names appearing in WHERE predicates, in source order.
    pub where_fields: Vec<String>,
    /// Literal values compared in WHERE predicates, in source order.
    pub literals: Vec<String>,
    /// Nested sub-selects. Each is resolved against *this* statement's
    /// object, not the root.
    pub sub_queries: Vec<SoqlStatement>,
}

/// Summary row returned by the artifact list fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactSummary {
    pub id: String,
    pub name: String,
}

/// Full record of one source artifact (an Apex trigger) under analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerArtifact {
    /// Stable identifier, used as the upsert key for the trigger node.
    pub id: String,
    /// Fully qualified name, used as the prefix of every edge name key.
    pub full_name: String,
    /// Raw source body. Stripped before the record is persisted.
    pub body: String,
    /// Remaining platform metadata fields, carried through to the graph
    /// minus the fields stripped by `graph_record`.
    #[serde(default)]
    pub extra: Map<String, Value>,
}

/// Metadata fields removed from the persisted trigger record.
const STRIPPED_FIELDS: &[&str] = &["Body", "SymbolTable", "Metadata", "attributes"];

impl TriggerArtifact {
    /// Returns the JSON record persisted for this artifact: `Id`, `name`
    /// (from the fully qualified name), and all extra metadata minus the
    /// stripped fields.
    pub fn graph_record(&self) -> Value {
        let mut record = Map::new();
        record.insert("Id".to_string(), Value::String(self.id.clone()));
        record.insert("name".to_string(), Value::String(self.full_name.clone()));
        for (key, value) in &self.extra {
            if !STRIPPED_FIELDS.contains(&key.as_str()) {
                record.insert(key.clone(), value.clone());
            }
        }
        Value::Object(record)
    }
}

/// Result of one extraction pass over an artifact body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractionResult {
    /// Distinct referenced type names, keyed by exact name as written.
    pub type_refs: BTreeSet<String>,
    /// Embedded SOQL statements in depth-first source order.
    pub statements: Vec<SoqlStatement>,
}

/// Identifies one node endpoint of a relationship upsert by node type plus
/// a lookup field and value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRef {
    pub node_type: String,
    pub find_by: String,
    pub find_by_val: String,
}

impl NodeRef {
    pub fn new(node_type: &str, find_by: &str, find_by_val: &str) -> Self {
        Self {
            node_type: node_type.to_string(),
            find_by: find_by.to_string(),
            find_by_val: find_by_val.to_string(),
        }
    }
}

/// Specification of a typed, uniquely named edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Relationship type in the graph, e.g. `RefersTo`.
    pub edge_type: String,
    /// Unique name key; the idempotence contract for upserts.
    pub name: String,
    /// Category tag recorded on the edge.
    pub category: String,
}

impl EdgeSpec {
    /// Builds the `RefersTo` edge spec for a reference of `kind` from the
    /// artifact named `full_name` to `ident`.
    pub fn refers_to(kind: ReferenceKind, full_name: &str, ident: &str) -> Self {
        Self {
            edge_type: "RefersTo".to_string(),
            name: kind.edge_name(full_name, ident),
            category: kind.category().to_string(),
        }
    }
}

/// Counters returned by a single graph mutation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationSummary {
    pub nodes_created: u64,
    pub relationships_created: u64,
}

/// Aggregated counters for one artifact's full mutation build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReport {
    pub nodes_upserted: u64,
    pub edges_upserted: u64,
    pub nodes_created: u64,
    pub edges_created: u64,
    /// Select/where fields that had no matching field node in the graph.
    pub field_misses: u64,
}

impl MutationReport {
    pub(crate) fn absorb_node(&mut self, summary: MutationSummary) {
        self.nodes_upserted += 1;
        self.nodes_created += summary.nodes_created;
    }

    pub(crate) fn absorb_edge(&mut self, summary: MutationSummary) {
        self.edges_upserted += 1;
        self.edges_created += summary.relationships_created;
    }
}
