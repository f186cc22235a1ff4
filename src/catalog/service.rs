use super::aggregation::Subtree;
use super::propagation::{propagate_timestamp, would_create_cycle};
use super::storage::{self, CatalogStorage};
use super::types::{CatalogError, Node, NodeId, NodeInput, NodeKind, NodeView};
use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::SqliteConnection;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Width of the "recently updated" window for sales queries
pub const SALES_WINDOW_HOURS: i64 = 24;

/// Mutation orchestrator for the catalog tree.
///
/// Every mutation holds `write_lock` and runs in a single SQLite transaction, so
/// overlapping ancestor walks cannot interleave their read-modify-writes and a
/// failed batch leaves nothing behind. Reads run in their own transaction and
/// see a consistent snapshot.
pub struct CatalogService {
    storage: Arc<CatalogStorage>,
    write_lock: Mutex<()>,
}

impl CatalogService {
    pub fn new(storage: Arc<CatalogStorage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn storage(&self) -> &Arc<CatalogStorage> {
        &self.storage
    }

    /// Create or update every item of a batch, all-or-nothing.
    ///
    /// Items may reference parents that appear later in the same batch; they
    /// are applied parents-first.
    pub async fn import_batch(
        &self,
        items: Vec<NodeInput>,
        update_date: DateTime<Utc>,
    ) -> Result<(), CatalogError> {
        let update_date = storage::to_store_precision(update_date);
        let items = order_parents_first(items)?;
        let count = items.len();

        let _guard = self.write_lock.lock().await;
        let mut tx = self.storage.begin().await?;

        for item in items {
            apply_item(&mut tx, item, update_date).await?;
        }

        tx.commit().await?;
        tracing::info!(items = count, update_date = %update_date, "Imported batch");
        Ok(())
    }

    /// Fetch a node with its derived price and nested children
    pub async fn get_by_id(&self, id: &NodeId) -> Result<NodeView, CatalogError> {
        let mut tx = self.storage.begin().await?;
        let node = storage::fetch_node(&mut tx, id)
            .await?
            .ok_or(CatalogError::NotFound(*id))?;
        let subtree = Subtree::load(&mut tx, node).await?;
        tx.commit().await?;

        tracing::debug!(id = %id, "Loaded subtree");
        Ok(subtree.into_view())
    }

    /// Remove a node and its whole subtree. Ancestors are left untouched.
    ///
    /// Returns the number of removed nodes.
    pub async fn delete_by_id(&self, id: &NodeId) -> Result<usize, CatalogError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.storage.begin().await?;

        if storage::fetch_node(&mut tx, id).await?.is_none() {
            return Err(CatalogError::NotFound(*id));
        }

        // Pre-order collection, then delete leaves first
        let mut doomed = Vec::new();
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            stack.extend(storage::fetch_child_ids(&mut tx, &current).await?);
            doomed.push(current);
        }
        for node_id in doomed.iter().rev() {
            storage::delete_node_row(&mut tx, node_id).await?;
        }

        tx.commit().await?;
        tracing::info!(id = %id, removed = doomed.len(), "Deleted subtree");
        Ok(doomed.len())
    }

    /// Offers last modified within the 24 hours up to and including `as_of`
    pub async fn updated_offers(&self, as_of: DateTime<Utc>) -> Result<Vec<Node>, CatalogError> {
        let from = as_of - Duration::hours(SALES_WINDOW_HOURS);
        self.storage.offers_modified_between(from, as_of).await
    }
}

/// Validate a batch on its own and sort it so in-batch parents come first
fn order_parents_first(items: Vec<NodeInput>) -> Result<Vec<NodeInput>, CatalogError> {
    let mut seen = HashSet::with_capacity(items.len());
    for item in &items {
        item.validate()?;
        if !seen.insert(item.id) {
            return Err(CatalogError::Validation(format!(
                "Node {} appears more than once in the batch",
                item.id
            )));
        }
    }

    let mut pending: HashMap<NodeId, NodeInput> = items.into_iter().map(|i| (i.id, i)).collect();
    let mut ordered = Vec::with_capacity(pending.len());

    while !pending.is_empty() {
        let mut ready: Vec<NodeId> = pending
            .values()
            .filter(|item| match item.parent_id {
                Some(parent) => !pending.contains_key(&parent),
                None => true,
            })
            .map(|item| item.id)
            .collect();

        if ready.is_empty() {
            return Err(CatalogError::Validation(
                "Batch parent references form a cycle".to_string(),
            ));
        }

        ready.sort();
        for id in ready {
            if let Some(item) = pending.remove(&id) {
                ordered.push(item);
            }
        }
    }

    Ok(ordered)
}

/// Upsert one item and propagate its timestamp, inside the caller's transaction
async fn apply_item(
    conn: &mut SqliteConnection,
    item: NodeInput,
    update_date: DateTime<Utc>,
) -> Result<(), CatalogError> {
    if let Some(parent_id) = item.parent_id {
        let parent = storage::fetch_node(&mut *conn, &parent_id)
            .await?
            .ok_or_else(|| {
                CatalogError::Validation(format!(
                    "Parent {} of node {} does not exist",
                    parent_id, item.id
                ))
            })?;
        if parent.kind != NodeKind::Category {
            return Err(CatalogError::Validation(format!(
                "Parent {} of node {} is an offer",
                parent_id, item.id
            )));
        }
    }

    match storage::fetch_node(&mut *conn, &item.id).await? {
        Some(existing) => {
            if existing.kind != item.kind {
                return Err(CatalogError::Validation(format!(
                    "Node {} cannot change kind from {} to {}",
                    item.id, existing.kind, item.kind
                )));
            }
            if let Some(parent_id) = item.parent_id {
                if existing.parent_id != Some(parent_id)
                    && would_create_cycle(&mut *conn, &item.id, &parent_id).await?
                {
                    return Err(CatalogError::Validation(format!(
                        "Moving node {} under {} would create a cycle",
                        item.id, parent_id
                    )));
                }
            }
            tracing::debug!(id = %item.id, kind = %item.kind, "Updating node");
        }
        None => {
            tracing::debug!(id = %item.id, kind = %item.kind, "Creating node");
        }
    }

    let node = item.into_node(update_date);
    storage::upsert_node(&mut *conn, &node).await?;

    let touched = propagate_timestamp(&mut *conn, node.parent_id, update_date).await?;
    if !touched.is_empty() {
        tracing::debug!(id = %node.id, ancestors = touched.len(), "Propagated update date");
    }

    Ok(())
}
