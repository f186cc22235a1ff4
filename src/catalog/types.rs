use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Core Types
// ============================================================================

/// Wrapper around UUID identifying a catalog node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(Uuid);

impl NodeId {
    /// Create a new random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from string
    pub fn parse_str(s: &str) -> Result<Self, String> {
        Uuid::from_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid UUID: {}", e))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for NodeId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<NodeId> for Uuid {
    fn from(id: NodeId) -> Self {
        id.0
    }
}

impl Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Node kind discriminator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// Leaf carrying a stored price
    Offer,
    /// Internal node whose price is derived from its subtree
    Category,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Offer => "OFFER",
            NodeKind::Category => "CATEGORY",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "OFFER" => Some(NodeKind::Offer),
            "CATEGORY" => Some(NodeKind::Category),
            _ => None,
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A catalog node as persisted in the node store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Stored price; `Some` for offers only
    pub price: Option<i64>,
    pub last_modified: DateTime<Utc>,
    pub parent_id: Option<NodeId>,
}

/// One item of an import batch, already parsed by the boundary layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeInput {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    pub price: Option<i64>,
    pub parent_id: Option<NodeId>,
}

impl NodeInput {
    pub fn offer(id: NodeId, name: impl Into<String>, price: i64, parent_id: Option<NodeId>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: NodeKind::Offer,
            price: Some(price),
            parent_id,
        }
    }

    pub fn category(id: NodeId, name: impl Into<String>, parent_id: Option<NodeId>) -> Self {
        Self {
            id,
            name: name.into(),
            kind: NodeKind::Category,
            price: None,
            parent_id,
        }
    }

    /// Check the field-level rules that do not need the store
    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.name.trim().is_empty() {
            return Err(CatalogError::Validation(format!(
                "Node {} has an empty name",
                self.id
            )));
        }
        if self.parent_id == Some(self.id) {
            return Err(CatalogError::Validation(format!(
                "Node {} cannot be its own parent",
                self.id
            )));
        }
        match (self.kind, self.price) {
            (NodeKind::Offer, None) => Err(CatalogError::Validation(format!(
                "Offer {} requires a price",
                self.id
            ))),
            (NodeKind::Offer, Some(price)) if price < 1 => Err(CatalogError::Validation(format!(
                "Offer {} has price {}, expected at least 1",
                self.id, price
            ))),
            (NodeKind::Category, Some(_)) => Err(CatalogError::Validation(format!(
                "Category {} cannot carry a price",
                self.id
            ))),
            _ => Ok(()),
        }
    }

    /// Materialize the stored form of this input at `update_date`
    pub fn into_node(self, update_date: DateTime<Utc>) -> Node {
        Node {
            id: self.id,
            name: self.name,
            kind: self.kind,
            price: self.price,
            last_modified: update_date,
            parent_id: self.parent_id,
        }
    }
}

/// A node as returned by `get_by_id`, with derived prices filled in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeView {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// Effective price: stored price for offers, floored average for categories
    /// (0 when the category has no offers)
    pub price: i64,
    /// Number of offers in this node's subtree (1 for an offer)
    pub offer_count: u64,
    pub last_modified: DateTime<Utc>,
    pub parent_id: Option<NodeId>,
    /// Direct children; `None` for offers
    pub children: Option<Vec<NodeView>>,
}

// ============================================================================
// Errors
// ============================================================================

/// Error type for catalog operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CatalogError {
    #[error("Node not found: {0}")]
    NotFound(NodeId),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for CatalogError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &e {
            // SQLITE_BUSY (5) and SQLITE_LOCKED (6), including extended codes
            if let Some(code) = db.code().and_then(|c| c.parse::<i32>().ok()) {
                if matches!(code & 0xff, 5 | 6) {
                    return CatalogError::Conflict(db.message().to_string());
                }
            }
        }
        CatalogError::Storage(e.to_string())
    }
}

impl From<String> for CatalogError {
    fn from(s: String) -> Self {
        CatalogError::Storage(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offer_requires_positive_price() {
        let id = NodeId::new();
        let mut input = NodeInput::offer(id, "phone", 0, None);
        assert!(matches!(input.validate(), Err(CatalogError::Validation(_))));

        input.price = None;
        assert!(matches!(input.validate(), Err(CatalogError::Validation(_))));

        input.price = Some(1);
        assert_eq!(input.validate(), Ok(()));
    }

    #[test]
    fn category_rejects_price_and_empty_name() {
        let mut input = NodeInput::category(NodeId::new(), "phones", None);
        assert_eq!(input.validate(), Ok(()));

        input.price = Some(10);
        assert!(matches!(input.validate(), Err(CatalogError::Validation(_))));

        input.price = None;
        input.name = "  ".to_string();
        assert!(matches!(input.validate(), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn self_parent_is_rejected() {
        let id = NodeId::new();
        let input = NodeInput::category(id, "loop", Some(id));
        assert!(matches!(input.validate(), Err(CatalogError::Validation(_))));
    }

    #[test]
    fn node_id_serde_uses_plain_string() {
        let id = NodeId::parse_str("3fa85f64-5717-4562-b3fc-2c963f66a111").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"3fa85f64-5717-4562-b3fc-2c963f66a111\"");
        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
        assert!(serde_json::from_str::<NodeId>("\"not-a-uuid\"").is_err());
    }

    #[test]
    fn kind_names_match_wire_format() {
        assert_eq!(serde_json::to_string(&NodeKind::Offer).unwrap(), "\"OFFER\"");
        assert_eq!(NodeKind::from_str("CATEGORY"), Some(NodeKind::Category));
        assert_eq!(NodeKind::from_str("category"), None);
    }
}
