//! Arena-backed result tree for query executions.
//!
//! One concrete generic type replaces the `TreeNode`/`SearchResultTreeNode`
//! split: nodes live in a `Vec` and refer to each other by index, so a
//! parent is a non-owning identifier rather than a shared pointer. Index 0
//! is always a synthetic, data-less root; query provenance (`source_query`,
//! `as_of`) and the id → node map live on the tree itself since only the
//! root ever carried them.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::ado::QueryDefinition;

/// Index of a node within its owning [`ResultTree`].
pub type NodeId = usize;

/// The synthetic root every tree is created with.
pub const ROOT: NodeId = 0;

#[derive(Debug)]
struct TreeNode<T> {
    data: Option<T>,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A populated query result: the node arena plus root-level provenance.
///
/// The node map is populated while the tree is being built (every
/// data-bearing node is registered under its work-item id before any
/// relationship lookups run) and is read-only once the tree is returned
/// to a consumer.
#[derive(Debug)]
pub struct ResultTree<T> {
    nodes: Vec<TreeNode<T>>,
    node_map: HashMap<u32, NodeId>,
    /// The query whose execution produced this tree.
    pub source_query: Option<QueryDefinition>,
    /// Point in time the results reflect.
    pub as_of: Option<DateTime<Utc>>,
}

impl<T> Default for ResultTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ResultTree<T> {
    /// Create a tree holding only the synthetic root.
    pub fn new() -> Self {
        Self {
            nodes: vec![TreeNode {
                data: None,
                parent: None,
                children: Vec::new(),
            }],
            node_map: HashMap::new(),
            source_query: None,
            as_of: None,
        }
    }

    /// Append a new node under `parent` and return its id.
    ///
    /// The parent back-reference is set here and never again; a node has
    /// exactly one parent for its whole life.
    pub fn add_child(&mut self, parent: NodeId, data: T) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            data: Some(data),
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    /// Register a node in the id → node map. Builder-side only.
    pub(crate) fn register(&mut self, work_item_id: u32, node: NodeId) {
        self.node_map.insert(work_item_id, node);
    }

    /// True when the root has no children at all.
    pub fn is_empty(&self) -> bool {
        self.nodes[ROOT].children.is_empty()
    }

    /// Look up a node by work-item id.
    pub fn node_by_id(&self, work_item_id: u32) -> Option<NodeId> {
        self.node_map.get(&work_item_id).copied()
    }

    /// The full id → node map.
    pub fn node_map(&self) -> &HashMap<u32, NodeId> {
        &self.node_map
    }

    pub fn data(&self, node: NodeId) -> Option<&T> {
        self.nodes[node].data.as_ref()
    }

    pub fn data_mut(&mut self, node: NodeId) -> Option<&mut T> {
        self.nodes[node].data.as_mut()
    }

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes[node].parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.nodes[node].children
    }

    /// All data-bearing nodes, parent before descendants, children in
    /// insertion order. The synthetic root is skipped.
    pub fn walk_pre_order(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.walk_from(ROOT, &mut out);
        out
    }

    fn walk_from(&self, node: NodeId, out: &mut Vec<NodeId>) {
        if self.nodes[node].data.is_some() {
            out.push(node);
        }
        for &child in &self.nodes[node].children {
            self.walk_from(child, out);
        }
    }
}
