use std::collections::BTreeSet;

use serde_json::json;
use tempfile::TempDir;

use orggraph::config::LiteralPairing;
use orggraph::graph::{GraphStore, SqliteGraphStore};
use orggraph::mutation::MutationBuilder;
use orggraph::types::{ExtractionResult, SoqlStatement, TriggerArtifact};

/// Helper: create a temp graph store and return (store, db path holder).
fn setup_store() -> (SqliteGraphStore, TempDir) {
    let dir = TempDir::new().expect("failed to create temp dir");
    let db_path = dir.path().join("graph.db");
    let store = SqliteGraphStore::initialize(&db_path).expect("failed to initialize store");
    (store, dir)
}

/// Helper: seed an object and its fields into the store.
async fn seed_object(store: &SqliteGraphStore, object: &str, fields: &[(&str, &str)]) {
    store
        .upsert("CustomObject", "name", &json!({ "name": object }))
        .await
        .expect("failed to seed object");
    for (field_id, field_name) in fields {
        store
            .upsert(
                "CustomField",
                "Id",
                &json!({
                    "Id": field_id,
                    "name": field_name,
                    "object_name": object,
                }),
            )
            .await
            .expect("failed to seed field");
    }
}

/// Helper: seed a relationship field declared on `object`.
async fn seed_relationship(
    store: &SqliteGraphStore,
    object: &str,
    relationship_name: &str,
    reference_to: &str,
) {
    store
        .upsert(
            "CustomField",
            "Id",
            &json!({
                "Id": format!("00N-{relationship_name}"),
                "name": format!("{relationship_name}Id"),
                "object_name": object,
                "relationship_name": relationship_name,
                "reference_to": reference_to,
            }),
        )
        .await
        .expect("failed to seed relationship field");
}

fn make_artifact() -> TriggerArtifact {
    let mut extra = serde_json::Map::new();
    extra.insert("Body".to_string(), json!("trigger source"));
    extra.insert("SymbolTable".to_string(), json!({"vars": []}));
    extra.insert("ApiVersion".to_string(), json!(60));
    TriggerArtifact {
        id: "trig:audit".to_string(),
        full_name: "AccountAudit".to_string(),
        body: "trigger source".to_string(),
        extra,
    }
}

fn statement(object: &str) -> SoqlStatement {
    SoqlStatement {
        object_name: object.to_string(),
        ..SoqlStatement::default()
    }
}

/// Helper: all edge names currently in the store, sorted.
fn edge_names(dir: &TempDir) -> BTreeSet<String> {
    let conn = rusqlite::Connection::open(dir.path().join("graph.db")).expect("open db");
    let mut stmt = conn.prepare("SELECT name FROM edges").expect("prepare");
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .expect("query")
        .collect::<Result<BTreeSet<_>, _>>()
        .expect("rows");
    names
}

/// Helper: the stored properties of the trigger node.
fn trigger_properties(dir: &TempDir) -> serde_json::Value {
    let conn = rusqlite::Connection::open(dir.path().join("graph.db")).expect("open db");
    let properties: String = conn
        .query_row(
            "SELECT properties FROM nodes WHERE node_type = 'ApexTrigger'",
            [],
            |row| row.get(0),
        )
        .expect("trigger node missing");
    serde_json::from_str(&properties).expect("invalid json")
}

#[tokio::test]
async fn test_artifact_node_is_stripped_before_persisting() {
    let (store, dir) = setup_store();
    let builder = MutationBuilder::new(&store, LiteralPairing::default());

    let report = builder
        .build(&make_artifact(), &ExtractionResult::default())
        .await
        .expect("build failed");

    assert_eq!(report.nodes_upserted, 1);
    assert_eq!(report.edges_upserted, 0);

    let properties = trigger_properties(&dir);
    assert_eq!(properties["Id"], "trig:audit");
    assert_eq!(properties["name"], "AccountAudit");
    assert_eq!(properties["ApiVersion"], 60);
    assert!(properties.get("Body").is_none());
    assert!(properties.get("SymbolTable").is_none());
}

#[tokio::test]
async fn test_end_to_end_scenario_edges() {
    let (store, dir) = setup_store();
    seed_object(&store, "MyObj__c", &[("00N-status", "Status__c")]).await;

    let mut extraction = ExtractionResult::default();
    extraction.type_refs.insert("MyObj__c".to_string());
    let mut stmt = statement("MyObj__c");
    stmt.fields = vec!["Id".to_string()];
    stmt.where_fields = vec!["Status__c".to_string()];
    stmt.literals = vec!["Active".to_string()];
    extraction.statements.push(stmt);

    let builder = MutationBuilder::new(&store, LiteralPairing::default());
    builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("build failed");

    let names = edge_names(&dir);
    assert!(names.contains("AccountAudit.TypeRef.MyObj__c"));
    assert!(names.contains("AccountAudit.Trigger.MyObj__c"));
    assert!(names.contains("AccountAudit.TriggerSOQLWhere.00N-status"));
    // The literal pairs with the select list and gets a value-node edge.
    assert!(names.contains("AccountAudit.TriggerSOQLWhere.Active"));
}

#[tokio::test]
async fn test_field_lookup_miss_creates_no_edge() {
    let (store, dir) = setup_store();
    seed_object(&store, "Account", &[("00N-name", "Name")]).await;

    let mut extraction = ExtractionResult::default();
    let mut stmt = statement("Account");
    stmt.fields = vec!["Name".to_string(), "Amount".to_string()];
    extraction.statements.push(stmt);

    let builder = MutationBuilder::new(&store, LiteralPairing::default());
    let report = builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("build failed");

    assert_eq!(report.field_misses, 1);
    let names = edge_names(&dir);
    assert!(names.contains("AccountAudit.TriggerSOQLSelect.00N-name"));
    assert!(!names.iter().any(|n| n.contains("Amount")));
}

#[tokio::test]
async fn test_dotted_field_path_uses_final_segment() {
    let (store, dir) = setup_store();
    seed_object(&store, "Contact", &[("00N-last", "LastName")]).await;

    let mut extraction = ExtractionResult::default();
    let mut stmt = statement("Contact");
    stmt.fields = vec!["Account.Owner.LastName".to_string()];
    extraction.statements.push(stmt);

    let builder = MutationBuilder::new(&store, LiteralPairing::default());
    builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("build failed");

    assert!(edge_names(&dir).contains("AccountAudit.TriggerSOQLSelect.00N-last"));
}

#[tokio::test]
async fn test_relationship_target_resolution_in_sub_query() {
    let (store, dir) = setup_store();
    seed_object(&store, "Account", &[]).await;
    seed_relationship(&store, "Account", "Contacts", "Contact").await;

    let mut extraction = ExtractionResult::default();
    let mut stmt = statement("Account");
    stmt.sub_queries.push(statement("Contacts__r"));
    extraction.statements.push(stmt);

    let builder = MutationBuilder::new(&store, LiteralPairing::default());
    builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("build failed");

    let names = edge_names(&dir);
    // The sub-query edge targets the resolved object, not the literal path.
    assert!(names.contains("AccountAudit.Trigger.Contact"));
    assert!(!names.contains("AccountAudit.Trigger.Contacts__r"));
}

#[tokio::test]
async fn test_unresolved_relationship_falls_back_to_path() {
    let (store, dir) = setup_store();
    seed_object(&store, "Account", &[]).await;

    let mut extraction = ExtractionResult::default();
    let mut stmt = statement("Account");
    stmt.sub_queries.push(statement("Mystery__r"));
    extraction.statements.push(stmt);

    let builder = MutationBuilder::new(&store, LiteralPairing::default());
    builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("build failed");

    assert!(edge_names(&dir).contains("AccountAudit.Trigger.Mystery__r"));
}

#[tokio::test]
async fn test_literal_pairing_gate_follows_configuration() {
    // Literals with no select fields: the legacy pairing emits nothing,
    // the where-fields pairing emits the value edges.
    let mut extraction = ExtractionResult::default();
    let mut stmt = statement("Case");
    stmt.where_fields = vec!["Status".to_string()];
    stmt.literals = vec!["Open".to_string()];
    extraction.statements.push(stmt);

    let (store, dir) = setup_store();
    let builder = MutationBuilder::new(&store, LiteralPairing::SelectFields);
    builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("build failed");
    assert!(!edge_names(&dir).contains("AccountAudit.TriggerSOQLWhere.Open"));

    let (store, dir) = setup_store();
    let builder = MutationBuilder::new(&store, LiteralPairing::WhereFields);
    builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("build failed");
    assert!(edge_names(&dir).contains("AccountAudit.TriggerSOQLWhere.Open"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (store, dir) = setup_store();
    seed_object(&store, "MyObj__c", &[("00N-status", "Status__c")]).await;

    let mut extraction = ExtractionResult::default();
    extraction.type_refs.insert("MyObj__c".to_string());
    let mut stmt = statement("MyObj__c");
    stmt.where_fields = vec!["Status__c".to_string()];
    extraction.statements.push(stmt);

    let builder = MutationBuilder::new(&store, LiteralPairing::default());
    let first = builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("first build failed");
    let names_before = edge_names(&dir);

    let second = builder
        .build(&make_artifact(), &extraction)
        .await
        .expect("second build failed");
    let names_after = edge_names(&dir);

    assert!(first.edges_created > 0);
    assert_eq!(second.edges_created, 0);
    assert_eq!(second.nodes_created, 0);
    assert_eq!(names_before, names_after);
}
