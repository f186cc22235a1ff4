//! Ancestor timestamp propagation.

use super::storage;
use super::types::{CatalogError, NodeId};
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnection;

/// Walk from `start` up to the root, raising each ancestor's `last_modified`
/// to `incoming` where `incoming` is strictly newer.
///
/// The walk never stops early: an ancestor that is already newer is left as is
/// and its own parent is still visited. Returns the ids whose timestamp changed.
pub async fn propagate_timestamp(
    conn: &mut SqliteConnection,
    start: Option<NodeId>,
    incoming: DateTime<Utc>,
) -> Result<Vec<NodeId>, CatalogError> {
    let mut touched = Vec::new();
    let mut current = start;

    while let Some(id) = current {
        let ancestor = storage::fetch_node(&mut *conn, &id)
            .await?
            .ok_or_else(|| {
                CatalogError::Conflict(format!("Ancestor {} vanished during propagation", id))
            })?;

        if incoming > ancestor.last_modified {
            storage::set_last_modified(&mut *conn, &id, incoming).await?;
            touched.push(id);
        } else {
            tracing::trace!(
                ancestor = %id,
                current = %ancestor.last_modified,
                incoming = %incoming,
                "Ancestor already newer, continuing upward"
            );
        }

        current = ancestor.parent_id;
    }

    Ok(touched)
}

/// Whether making `candidate` the parent of `node` would close a cycle, i.e.
/// `candidate` is `node` itself or one of its descendants.
pub async fn would_create_cycle(
    conn: &mut SqliteConnection,
    node: &NodeId,
    candidate: &NodeId,
) -> Result<bool, CatalogError> {
    let mut current = Some(*candidate);

    while let Some(id) = current {
        if id == *node {
            return Ok(true);
        }
        current = match storage::fetch_node(&mut *conn, &id).await? {
            Some(ancestor) => ancestor.parent_id,
            None => None,
        };
    }

    Ok(false)
}
