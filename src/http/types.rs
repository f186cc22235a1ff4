//! Wire types for the HTTP interface

use crate::catalog::{CatalogError, Node, NodeId, NodeInput, NodeKind, NodeView};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamps in the `yyyy-MM-ddTHH:mm:ss[.SSS]±HH:MM` profile.
///
/// Any RFC 3339 offset is accepted on input; output is always UTC with
/// milliseconds and a `Z` suffix.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn parse(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
        DateTime::parse_from_rfc3339(s).map(|ts| ts.with_timezone(&Utc))
    }

    pub fn serialize<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        parse(&s).map_err(serde::de::Error::custom)
    }
}

/// One item of `POST /imports`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopUnitImport {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub price: Option<i64>,
}

impl From<ShopUnitImport> for NodeInput {
    fn from(item: ShopUnitImport) -> Self {
        NodeInput {
            id: item.id,
            name: item.name,
            kind: item.kind,
            price: item.price,
            parent_id: item.parent_id,
        }
    }
}

/// Body of `POST /imports`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopUnitImportRequest {
    #[serde(default)]
    pub items: Option<Vec<ShopUnitImport>>,
    #[serde(with = "timestamp")]
    pub update_date: DateTime<Utc>,
}

/// Node as returned by `GET /nodes/{id}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShopUnit {
    pub id: NodeId,
    pub name: String,
    #[serde(with = "timestamp")]
    pub date: DateTime<Utc>,
    pub parent_id: Option<NodeId>,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    /// `null` for a category without offers
    pub price: Option<i64>,
    /// `null` for offers
    pub children: Option<Vec<ShopUnit>>,
}

impl From<NodeView> for ShopUnit {
    fn from(view: NodeView) -> Self {
        let price = match view.kind {
            NodeKind::Category if view.offer_count == 0 => None,
            _ => Some(view.price),
        };
        ShopUnit {
            id: view.id,
            name: view.name,
            date: view.last_modified,
            parent_id: view.parent_id,
            kind: view.kind,
            price,
            children: view
                .children
                .map(|children| children.into_iter().map(ShopUnit::from).collect()),
        }
    }
}

/// Stored node without derived fields, as listed by `GET /sales`
impl From<Node> for ShopUnit {
    fn from(node: Node) -> Self {
        ShopUnit {
            id: node.id,
            name: node.name,
            date: node.last_modified,
            parent_id: node.parent_id,
            kind: node.kind,
            price: node.price,
            children: None,
        }
    }
}

/// Query of `GET /sales`; the date is parsed by the handler so a bad value
/// maps to the standard validation error
#[derive(Debug, Clone, Deserialize)]
pub struct SalesQuery {
    pub date: String,
}

/// Error body shared by every failing response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// Boundary-level failure, mapped onto a status code and [`ErrorBody`]
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Item not found")]
    NotFound,

    #[error("Validation Failed")]
    Validation(String),

    #[error("Conflict")]
    Conflict(String),

    #[error("Internal error")]
    Internal(String),
}

impl From<CatalogError> for ApiError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::NotFound(_) => ApiError::NotFound,
            CatalogError::Validation(msg) => ApiError::Validation(msg),
            CatalogError::Conflict(msg) => ApiError::Conflict(msg),
            CatalogError::Storage(msg) => ApiError::Internal(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_normalizes_to_utc_millis() {
        let ts = timestamp::parse("2022-02-01T15:00:00+03:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2022, 2, 1, 12, 0, 0).unwrap());
        assert_eq!(timestamp::format(&ts), "2022-02-01T12:00:00.000Z");

        let with_millis = timestamp::parse("2022-02-02T12:00:00.123Z").unwrap();
        assert_eq!(timestamp::format(&with_millis), "2022-02-02T12:00:00.123Z");

        assert!(timestamp::parse("2022-02-01 12:00:00").is_err());
        assert!(timestamp::parse("2022-02-01T12:00:00").is_err());
    }

    #[test]
    fn test_import_request_field_names() {
        let body = r#"{
            "items": [
                {"id": "069cb8d7-bbdd-47d3-ad8f-82ef4c269df1", "name": "Goods", "type": "CATEGORY", "parentId": null},
                {"id": "863e1a7a-1304-42ae-943b-179184c077e3", "name": "jPhone 13", "type": "OFFER",
                 "parentId": "069cb8d7-bbdd-47d3-ad8f-82ef4c269df1", "price": 79999}
            ],
            "updateDate": "2022-02-01T12:00:00.000Z"
        }"#;
        let request: ShopUnitImportRequest = serde_json::from_str(body).unwrap();
        let items = request.items.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].kind, NodeKind::Category);
        assert_eq!(items[1].price, Some(79999));
        assert_eq!(items[1].parent_id, Some(items[0].id));
    }

    #[test]
    fn test_category_without_offers_renders_null_price() {
        let view = NodeView {
            id: NodeId::new(),
            name: "empty".to_string(),
            kind: NodeKind::Category,
            price: 0,
            offer_count: 0,
            last_modified: Utc.with_ymd_and_hms(2022, 2, 1, 12, 0, 0).unwrap(),
            parent_id: None,
            children: Some(vec![]),
        };
        let json = serde_json::to_value(ShopUnit::from(view)).unwrap();
        assert!(json["price"].is_null());
        assert_eq!(json["type"], "CATEGORY");
        assert_eq!(json["date"], "2022-02-01T12:00:00.000Z");
        assert_eq!(json["children"], serde_json::json!([]));
    }
}
