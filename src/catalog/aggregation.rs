//! Effective price computation.
//!
//! A category's price is the floored mean of every offer below it, at any depth.
//! Subcategories are weighted by the number of offers they contain, so the
//! result is a mean over offers rather than over immediate children. Sums stay
//! exact (integer total and count) until the final division.

use super::storage;
use super::types::{CatalogError, Node, NodeId, NodeKind, NodeView};
use sqlx::sqlite::SqliteConnection;
use std::collections::HashMap;

/// Running total of offer prices within a subtree
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceAggregate {
    pub total: i128,
    pub offers: u64,
}

impl PriceAggregate {
    pub fn of_offer(price: i64) -> Self {
        Self {
            total: price as i128,
            offers: 1,
        }
    }

    /// Fold a child subtree in: its mean weighted by its offer count
    pub fn absorb(&mut self, child: PriceAggregate) {
        self.total += child.total;
        self.offers += child.offers;
    }

    /// Floored mean; 0 when there are no offers
    pub fn price(&self) -> i64 {
        if self.offers == 0 {
            return 0;
        }
        (self.total / self.offers as i128) as i64
    }
}

/// A node together with every descendant, indexed by parent
#[derive(Debug, Clone)]
pub struct Subtree {
    root: NodeId,
    nodes: HashMap<NodeId, Node>,
    children: HashMap<NodeId, Vec<NodeId>>,
    /// Discovery order; every parent precedes its children
    order: Vec<NodeId>,
}

impl Subtree {
    /// Build from an already loaded set of nodes rooted at `root`.
    ///
    /// Nodes not reachable from `root` are ignored.
    pub fn from_nodes(root: Node, descendants: Vec<Node>) -> Self {
        let mut by_parent: HashMap<NodeId, Vec<Node>> = HashMap::new();
        for node in descendants {
            if let Some(parent) = node.parent_id {
                by_parent.entry(parent).or_default().push(node);
            }
        }

        let root_id = root.id;
        let mut nodes = HashMap::new();
        let mut children: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
        let mut order = Vec::new();
        let mut stack = vec![root];

        while let Some(node) = stack.pop() {
            let id = node.id;
            if nodes.contains_key(&id) {
                continue;
            }
            let kids = by_parent.remove(&id).unwrap_or_default();
            let mut kid_ids: Vec<NodeId> = kids.iter().map(|k| k.id).collect();
            kid_ids.sort();
            children.insert(id, kid_ids);
            stack.extend(kids);
            order.push(id);
            nodes.insert(id, node);
        }

        Self {
            root: root_id,
            nodes,
            children,
            order,
        }
    }

    /// Load `root` and all its descendants through the by-parent index
    pub async fn load(conn: &mut SqliteConnection, root: Node) -> Result<Self, CatalogError> {
        let mut descendants = Vec::new();
        let mut pending = vec![root.id];

        if root.kind == NodeKind::Category {
            while let Some(parent) = pending.pop() {
                for child in storage::fetch_children(&mut *conn, &parent).await? {
                    if child.kind == NodeKind::Category {
                        pending.push(child.id);
                    }
                    descendants.push(child);
                }
            }
        }

        Ok(Self::from_nodes(root, descendants))
    }

    pub fn children_of(&self, id: &NodeId) -> &[NodeId] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Aggregate for every node in the subtree, computed bottom-up
    pub fn aggregates(&self) -> HashMap<NodeId, PriceAggregate> {
        let mut out: HashMap<NodeId, PriceAggregate> = HashMap::with_capacity(self.order.len());

        for id in self.order.iter().rev() {
            let node = &self.nodes[id];
            let agg = match node.kind {
                NodeKind::Offer => node.price.map(PriceAggregate::of_offer).unwrap_or_default(),
                NodeKind::Category => {
                    let mut agg = PriceAggregate::default();
                    for child in self.children_of(id) {
                        if let Some(child_agg) = out.get(child) {
                            agg.absorb(*child_agg);
                        }
                    }
                    agg
                }
            };
            out.insert(*id, agg);
        }

        out
    }

    /// Effective price of any node in the subtree
    pub fn effective_price(&self, id: &NodeId) -> Option<i64> {
        let node = self.nodes.get(id)?;
        match node.kind {
            NodeKind::Offer => node.price,
            NodeKind::Category => self.aggregates().get(id).map(PriceAggregate::price),
        }
    }

    /// Nested view of the whole subtree with derived prices filled in
    pub fn into_view(self) -> NodeView {
        let aggregates = self.aggregates();
        let mut views: HashMap<NodeId, NodeView> = HashMap::with_capacity(self.order.len());

        // order[0] is the root; everything after it is built children-first
        for id in self.order.iter().skip(1).rev() {
            let view = self.view_of(id, &aggregates, &mut views);
            views.insert(*id, view);
        }

        self.view_of(&self.root, &aggregates, &mut views)
    }

    fn view_of(
        &self,
        id: &NodeId,
        aggregates: &HashMap<NodeId, PriceAggregate>,
        views: &mut HashMap<NodeId, NodeView>,
    ) -> NodeView {
        let node = &self.nodes[id];
        let agg = aggregates.get(id).copied().unwrap_or_default();
        let (price, children) = match node.kind {
            NodeKind::Offer => (node.price.unwrap_or_default(), None),
            NodeKind::Category => (
                agg.price(),
                Some(
                    self.children_of(id)
                        .iter()
                        .filter_map(|child| views.remove(child))
                        .collect(),
                ),
            ),
        };

        NodeView {
            id: *id,
            name: node.name.clone(),
            kind: node.kind,
            price,
            offer_count: agg.offers,
            last_modified: node.last_modified,
            parent_id: node.parent_id,
            children,
        }
    }
}
