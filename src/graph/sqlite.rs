use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::Value;

use crate::errors::{CrawlError, Result};
use crate::graph::GraphStore;
use crate::types::{EdgeSpec, MutationSummary, NodeRef};

/// The embedded SQL schema applied when initializing a new database.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// SQLite database backing the org graph.
///
/// The connection is guarded by a mutex; the crawler issues one logical
/// operation at a time, so there is no contention beyond that guard.
pub struct SqliteGraphStore {
    conn: Mutex<Connection>,
}

/// Aggregate counts over the stored graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStoreStats {
    pub node_count: u64,
    pub edge_count: u64,
    pub nodes_by_type: HashMap<String, u64>,
    pub edges_by_category: HashMap<String, u64>,
}

impl SqliteGraphStore {
    /// Creates a new database at `db_path`, creating parent directories if
    /// needed, and applies the schema.
    pub fn initialize(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CrawlError::Store {
                message: format!("failed to create database directory: {e}"),
                operation: "initialize".to_string(),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| CrawlError::Store {
            message: format!("failed to open database: {e}"),
            operation: "initialize".to_string(),
        })?;

        Self::apply_pragmas(&conn)?;

        conn.execute_batch(SCHEMA_SQL).map_err(|e| CrawlError::Store {
            message: format!("failed to apply schema: {e}"),
            operation: "initialize".to_string(),
        })?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an existing database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(|e| CrawlError::Store {
            message: format!("failed to open database: {e}"),
            operation: "open".to_string(),
        })?;

        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Applies performance-oriented SQLite pragmas.
    fn apply_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 120000;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )
        .map_err(|e| CrawlError::Store {
            message: format!("failed to apply pragmas: {e}"),
            operation: "apply_pragmas".to_string(),
        })
    }

    fn lock(&self, operation: &str) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| CrawlError::Store {
            message: "connection mutex poisoned".to_string(),
            operation: operation.to_string(),
        })
    }

    fn store_err(operation: &str) -> impl Fn(rusqlite::Error) -> CrawlError + '_ {
        move |e| CrawlError::Store {
            message: e.to_string(),
            operation: operation.to_string(),
        }
    }

    /// Inserts or updates a node keyed by (node_type, key_field, key_value);
    /// returns whether a new node row was created.
    fn upsert_node(
        conn: &Connection,
        node_type: &str,
        key_field: &str,
        key_value: &str,
        properties: &str,
    ) -> rusqlite::Result<bool> {
        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM nodes WHERE node_type = ?1 AND key_field = ?2 AND key_value = ?3",
                params![node_type, key_field, key_value],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE nodes SET properties = ?1, updated_at = strftime('%s', 'now')
                     WHERE id = ?2",
                    params![properties, id],
                )?;
                Ok(false)
            }
            None => {
                conn.execute(
                    "INSERT INTO nodes (node_type, key_field, key_value, properties)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![node_type, key_field, key_value, properties],
                )?;
                Ok(true)
            }
        }
    }

    /// Ensures an endpoint node exists, creating a stub carrying only its
    /// lookup property when missing. Mirrors MERGE semantics: referencing an
    /// object the crawl has not modeled yet still yields a resolvable node.
    fn ensure_endpoint(conn: &Connection, node: &NodeRef) -> rusqlite::Result<bool> {
        let exists: Option<i64> = conn
            .query_row(
                "SELECT id FROM nodes WHERE node_type = ?1 AND key_field = ?2 AND key_value = ?3",
                params![node.node_type, node.find_by, node.find_by_val],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Ok(false);
        }
        let properties =
            serde_json::json!({ node.find_by.clone(): node.find_by_val.clone() }).to_string();
        conn.execute(
            "INSERT INTO nodes (node_type, key_field, key_value, properties)
             VALUES (?1, ?2, ?3, ?4)",
            params![node.node_type, node.find_by, node.find_by_val, properties],
        )?;
        Ok(true)
    }

    /// Returns aggregate node and edge counts.
    pub fn stats(&self) -> Result<GraphStoreStats> {
        let conn = self.lock("stats")?;
        let mut stats = GraphStoreStats::default();

        let mut stmt = conn
            .prepare("SELECT node_type, COUNT(*) FROM nodes GROUP BY node_type")
            .map_err(Self::store_err("stats"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(Self::store_err("stats"))?;
        for row in rows {
            let (node_type, count) = row.map_err(Self::store_err("stats"))?;
            stats.node_count += count as u64;
            stats.nodes_by_type.insert(node_type, count as u64);
        }

        let mut stmt = conn
            .prepare("SELECT category, COUNT(*) FROM edges GROUP BY category")
            .map_err(Self::store_err("stats"))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(Self::store_err("stats"))?;
        for row in rows {
            let (category, count) = row.map_err(Self::store_err("stats"))?;
            stats.edge_count += count as u64;
            stats.edges_by_category.insert(category, count as u64);
        }

        Ok(stats)
    }
}

/// Extracts the key property from a record as a string.
fn key_value_of(record: &Value, key_field: &str) -> Result<String> {
    match record.get(key_field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Ok(other.to_string()),
        None => Err(CrawlError::Store {
            message: format!("record is missing key field '{key_field}'"),
            operation: "upsert".to_string(),
        }),
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert(
        &self,
        node_type: &str,
        key_field: &str,
        record: &Value,
    ) -> Result<MutationSummary> {
        let key_value = key_value_of(record, key_field)?;
        let properties = record.to_string();
        let conn = self.lock("upsert")?;

        let created = Self::upsert_node(&conn, node_type, key_field, &key_value, &properties)
            .map_err(Self::store_err("upsert"))?;

        Ok(MutationSummary {
            nodes_created: created as u64,
            relationships_created: 0,
        })
    }

    async fn upsert_relationship(
        &self,
        from: &NodeRef,
        to: &NodeRef,
        edge: &EdgeSpec,
    ) -> Result<MutationSummary> {
        let conn = self.lock("upsert_relationship")?;

        let mut nodes_created = 0u64;
        nodes_created += Self::ensure_endpoint(&conn, from)
            .map_err(Self::store_err("upsert_relationship"))? as u64;
        nodes_created += Self::ensure_endpoint(&conn, to)
            .map_err(Self::store_err("upsert_relationship"))? as u64;

        let existing: Option<i64> = conn
            .query_row(
                "SELECT id FROM edges WHERE name = ?1",
                params![edge.name],
                |row| row.get(0),
            )
            .optional()
            .map_err(Self::store_err("upsert_relationship"))?;

        let relationships_created = match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE edges SET edge_type = ?1, category = ?2,
                        from_type = ?3, from_field = ?4, from_value = ?5,
                        to_type = ?6, to_field = ?7, to_value = ?8,
                        updated_at = strftime('%s', 'now')
                     WHERE id = ?9",
                    params![
                        edge.edge_type,
                        edge.category,
                        from.node_type,
                        from.find_by,
                        from.find_by_val,
                        to.node_type,
                        to.find_by,
                        to.find_by_val,
                        id,
                    ],
                )
                .map_err(Self::store_err("upsert_relationship"))?;
                0
            }
            None => {
                conn.execute(
                    "INSERT INTO edges
                        (name, edge_type, category,
                         from_type, from_field, from_value,
                         to_type, to_field, to_value)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        edge.name,
                        edge.edge_type,
                        edge.category,
                        from.node_type,
                        from.find_by,
                        from.find_by_val,
                        to.node_type,
                        to.find_by,
                        to.find_by_val,
                    ],
                )
                .map_err(Self::store_err("upsert_relationship"))?;
                1
            }
        };

        Ok(MutationSummary {
            nodes_created,
            relationships_created,
        })
    }

    async fn find_field_in_object(
        &self,
        object_name: &str,
        field_name: &str,
    ) -> Result<Option<String>> {
        let conn = self.lock("find_field_in_object")?;
        conn.query_row(
            "SELECT key_value FROM nodes
             WHERE node_type = 'CustomField'
               AND json_extract(properties, '$.object_name') = ?1
               AND json_extract(properties, '$.name') = ?2
             LIMIT 1",
            params![object_name, field_name],
            |row| row.get(0),
        )
        .optional()
        .map_err(Self::store_err("find_field_in_object"))
    }

    async fn relationship_target(
        &self,
        object_name: &str,
        relationship_name: &str,
    ) -> Result<Option<String>> {
        let conn = self.lock("relationship_target")?;
        conn.query_row(
            "SELECT json_extract(properties, '$.reference_to') FROM nodes
             WHERE node_type = 'CustomField'
               AND json_extract(properties, '$.object_name') = ?1
               AND json_extract(properties, '$.relationship_name') = ?2
             LIMIT 1",
            params![object_name, relationship_name],
            |row| row.get::<_, Option<String>>(0),
        )
        .optional()
        .map(|found| found.flatten())
        .map_err(Self::store_err("relationship_target"))
    }
}
