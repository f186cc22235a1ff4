use super::types::{CatalogError, Node, NodeId, NodeKind};
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions, SqliteRow},
    ConnectOptions, Row, Sqlite, Transaction,
};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for catalog storage
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Path to SQLite database
    pub db_path: PathBuf,

    /// Maximum pooled connections
    pub max_connections: u32,

    /// How long SQLite waits on a locked database before reporting busy
    pub busy_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("megamarket.db"),
            max_connections: 8,
            busy_timeout: Duration::from_secs(5),
        }
    }
}

/// SQLite-backed node store.
///
/// Nodes reference their parent by id only; the `idx_nodes_parent` index is the
/// by-parent index used for child lookups, aggregation and cascading delete.
///
/// Row-level helpers below take a `&mut SqliteConnection` so the orchestrator
/// can run several of them inside one transaction:
///
/// ```ignore
/// let mut tx = storage.begin().await?;
/// let node = storage::fetch_node(&mut tx, &id).await?;
/// tx.commit().await?;
/// ```
pub struct CatalogStorage {
    pool: SqlitePool,
    #[allow(dead_code)]
    config: CatalogConfig,
}

impl CatalogStorage {
    /// Create a new storage instance and run migrations
    pub async fn new(config: CatalogConfig) -> Result<Self, CatalogError> {
        let mut connect_options = SqliteConnectOptions::new()
            .filename(&config.db_path)
            .create_if_missing(true)
            .busy_timeout(config.busy_timeout);
        connect_options.disable_statement_logging();

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await
            .map_err(|e| format!("Failed to connect to catalog database: {}", e))?;

        let storage = Self { pool, config };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<(), CatalogError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS nodes (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                price INTEGER,
                last_modified INTEGER NOT NULL,
                parent_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_nodes_parent ON nodes(parent_id);
            CREATE INDEX IF NOT EXISTS idx_nodes_kind_modified ON nodes(kind, last_modified);
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| format!("Failed to run catalog migrations: {}", e))?;

        Ok(())
    }

    /// Start a transaction; all writes of one operation go through it
    pub async fn begin(&self) -> Result<Transaction<'static, Sqlite>, CatalogError> {
        Ok(self.pool.begin().await?)
    }

    /// Point lookup outside of any explicit transaction
    pub async fn node_get(&self, id: &NodeId) -> Result<Option<Node>, CatalogError> {
        let mut conn = self.pool.acquire().await?;
        fetch_node(&mut conn, id).await
    }

    /// Offers whose `last_modified` lies in `[from, to]`, both ends inclusive
    pub async fn offers_modified_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Node>, CatalogError> {
        let rows = sqlx::query(
            "SELECT id, name, kind, price, last_modified, parent_id
             FROM nodes
             WHERE kind = ? AND last_modified BETWEEN ? AND ?
             ORDER BY last_modified, id",
        )
        .bind(NodeKind::Offer.as_str())
        .bind(millis_ceil(&from))
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(node_from_row).collect()
    }

    /// Number of stored nodes
    pub async fn node_count(&self) -> Result<i64, CatalogError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM nodes")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.get("n"))
    }
}

// ============================================================================
// Row helpers (usable on a pooled connection or inside a transaction)
// ============================================================================

/// Get a node by id
pub async fn fetch_node(
    conn: &mut SqliteConnection,
    id: &NodeId,
) -> Result<Option<Node>, CatalogError> {
    let row = sqlx::query(
        "SELECT id, name, kind, price, last_modified, parent_id FROM nodes WHERE id = ?",
    )
    .bind(id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(node_from_row).transpose()
}

/// Direct children of a node, via the by-parent index
pub async fn fetch_children(
    conn: &mut SqliteConnection,
    parent_id: &NodeId,
) -> Result<Vec<Node>, CatalogError> {
    let rows = sqlx::query(
        "SELECT id, name, kind, price, last_modified, parent_id
         FROM nodes WHERE parent_id = ? ORDER BY id",
    )
    .bind(parent_id.to_string())
    .fetch_all(&mut *conn)
    .await?;

    rows.iter().map(node_from_row).collect()
}

/// Ids of the direct children of a node
pub async fn fetch_child_ids(
    conn: &mut SqliteConnection,
    parent_id: &NodeId,
) -> Result<Vec<NodeId>, CatalogError> {
    let rows = sqlx::query("SELECT id FROM nodes WHERE parent_id = ?")
        .bind(parent_id.to_string())
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| {
            let id_str: String = row.get("id");
            NodeId::parse_str(&id_str).map_err(CatalogError::from)
        })
        .collect()
}

/// Insert a node, or overwrite every mutable column of an existing one
pub async fn upsert_node(conn: &mut SqliteConnection, node: &Node) -> Result<(), CatalogError> {
    sqlx::query(
        "INSERT INTO nodes (id, name, kind, price, last_modified, parent_id)
         VALUES (?, ?, ?, ?, ?, ?)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            kind = excluded.kind,
            price = excluded.price,
            last_modified = excluded.last_modified,
            parent_id = excluded.parent_id",
    )
    .bind(node.id.to_string())
    .bind(&node.name)
    .bind(node.kind.as_str())
    .bind(node.price)
    .bind(node.last_modified.timestamp_millis())
    .bind(node.parent_id.map(|p| p.to_string()))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Overwrite a node's `last_modified`
pub async fn set_last_modified(
    conn: &mut SqliteConnection,
    id: &NodeId,
    last_modified: DateTime<Utc>,
) -> Result<(), CatalogError> {
    sqlx::query("UPDATE nodes SET last_modified = ? WHERE id = ?")
        .bind(last_modified.timestamp_millis())
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(())
}

/// Delete a single row; returns whether it existed
pub async fn delete_node_row(conn: &mut SqliteConnection, id: &NodeId) -> Result<bool, CatalogError> {
    let result = sqlx::query("DELETE FROM nodes WHERE id = ?")
        .bind(id.to_string())
        .execute(&mut *conn)
        .await?;

    Ok(result.rows_affected() > 0)
}

fn node_from_row(row: &SqliteRow) -> Result<Node, CatalogError> {
    let id_str: String = row.get("id");
    let id = NodeId::parse_str(&id_str).map_err(|e| format!("Invalid node ID: {}", e))?;

    let kind_str: String = row.get("kind");
    let kind = NodeKind::from_str(&kind_str)
        .ok_or_else(|| format!("Unknown node kind: {}", kind_str))?;

    let millis: i64 = row.get("last_modified");
    let last_modified = DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| format!("Invalid timestamp for node {}: {}", id, millis))?;

    let parent_str: Option<String> = row.get("parent_id");
    let parent_id = parent_str
        .map(|s| NodeId::parse_str(&s).map_err(|e| format!("Invalid parent ID: {}", e)))
        .transpose()?;

    Ok(Node {
        id,
        name: row.get("name"),
        kind,
        price: row.get("price"),
        last_modified,
        parent_id,
    })
}

/// Truncate a timestamp to the millisecond resolution the store keeps
pub fn to_store_precision(ts: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp_millis(ts.timestamp_millis()).unwrap_or(ts)
}

/// First stored millisecond at or after `ts`
fn millis_ceil(ts: &DateTime<Utc>) -> i64 {
    let partial = ts.timestamp_subsec_nanos() % 1_000_000 != 0;
    ts.timestamp_millis() + i64::from(partial)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::{tempdir, TempDir};

    async fn create_test_storage() -> (CatalogStorage, TempDir) {
        let dir = tempdir().unwrap();
        let config = CatalogConfig {
            db_path: dir.path().join("test_catalog.db"),
            ..Default::default()
        };
        (CatalogStorage::new(config).await.unwrap(), dir)
    }

    fn offer(name: &str, price: i64, at: DateTime<Utc>, parent: Option<NodeId>) -> Node {
        Node {
            id: NodeId::new(),
            name: name.to_string(),
            kind: NodeKind::Offer,
            price: Some(price),
            last_modified: at,
            parent_id: parent,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_fetch_round_trip() {
        let (storage, _dir) = create_test_storage().await;
        let at = Utc.with_ymd_and_hms(2022, 2, 1, 12, 0, 0).unwrap();
        let node = offer("jPhone 13", 79999, at, None);

        let mut tx = storage.begin().await.unwrap();
        upsert_node(&mut tx, &node).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(storage.node_get(&node.id).await.unwrap(), Some(node.clone()));

        let mut renamed = node.clone();
        renamed.name = "jPhone 13 Pro".to_string();
        renamed.price = Some(89999);
        let mut tx = storage.begin().await.unwrap();
        upsert_node(&mut tx, &renamed).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(storage.node_get(&node.id).await.unwrap(), Some(renamed));
        assert_eq!(storage.node_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_children_use_parent_index() {
        let (storage, _dir) = create_test_storage().await;
        let at = Utc.with_ymd_and_hms(2022, 2, 1, 12, 0, 0).unwrap();
        let root = Node {
            id: NodeId::new(),
            name: "Goods".to_string(),
            kind: NodeKind::Category,
            price: None,
            last_modified: at,
            parent_id: None,
        };
        let a = offer("a", 10, at, Some(root.id));
        let b = offer("b", 20, at, Some(root.id));
        let stray = offer("stray", 30, at, None);

        let mut tx = storage.begin().await.unwrap();
        for node in [&root, &a, &b, &stray] {
            upsert_node(&mut tx, node).await.unwrap();
        }
        let mut ids = fetch_child_ids(&mut tx, &root.id).await.unwrap();
        ids.sort();
        let mut expected = vec![a.id, b.id];
        expected.sort();
        assert_eq!(ids, expected);
        assert_eq!(fetch_children(&mut tx, &root.id).await.unwrap().len(), 2);
        assert!(fetch_children(&mut tx, &a.id).await.unwrap().is_empty());
        tx.commit().await.unwrap();
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let (storage, _dir) = create_test_storage().await;
        let node = offer("ghost", 5, Utc::now(), None);

        let mut tx = storage.begin().await.unwrap();
        upsert_node(&mut tx, &node).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(storage.node_get(&node.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_offers_modified_between_is_inclusive() {
        let (storage, _dir) = create_test_storage().await;
        let from = Utc.with_ymd_and_hms(2022, 2, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2022, 2, 2, 0, 0, 0).unwrap();
        let at_from = offer("from", 1, from, None);
        let at_to = offer("to", 1, to, None);
        let after = offer("after", 1, to + chrono::Duration::milliseconds(1), None);
        let category = Node {
            id: NodeId::new(),
            name: "cat".to_string(),
            kind: NodeKind::Category,
            price: None,
            last_modified: from,
            parent_id: None,
        };

        let mut tx = storage.begin().await.unwrap();
        for node in [&at_from, &at_to, &after, &category] {
            upsert_node(&mut tx, node).await.unwrap();
        }
        tx.commit().await.unwrap();

        let found: Vec<NodeId> = storage
            .offers_modified_between(from, to)
            .await
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        assert_eq!(found, vec![at_from.id, at_to.id]);
    }

    #[tokio::test]
    async fn test_delete_row_reports_existence() {
        let (storage, _dir) = create_test_storage().await;
        let node = offer("gone", 3, Utc::now(), None);

        let mut tx = storage.begin().await.unwrap();
        upsert_node(&mut tx, &node).await.unwrap();
        assert!(delete_node_row(&mut tx, &node.id).await.unwrap());
        assert!(!delete_node_row(&mut tx, &node.id).await.unwrap());
        tx.commit().await.unwrap();
    }

    #[test]
    fn test_store_precision_drops_sub_millis() {
        let ts = Utc.with_ymd_and_hms(2022, 2, 1, 0, 0, 0).unwrap()
            + chrono::Duration::nanoseconds(1_234_567);
        let stored = to_store_precision(ts);
        assert_eq!(stored.timestamp_subsec_nanos(), 1_000_000);
    }
}
