//! Grouping engine: populated result tree → ordered group label → members.
//!
//! Three strategies, selected by configuration:
//! 1. `field:<name>` — group by the literal field value, applied to the
//!    root's children for flat queries or one level deeper for linked ones.
//! 2. `query` — each top-level node of a linked query becomes a group.
//! 3. Anything else — group flat-style by area path.
//!
//! Groups keep first-seen order; any sorting is a presentation concern.

use indexmap::IndexMap;
use serde_json::Value;

use crate::record::{FieldMap, WorkItemRecord};
use crate::tree::{self, NodeId, ResultTree};

/// How the report groups its entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupingPolicy {
    /// Group by the literal value of a field.
    ByField(String),
    /// One group per top-level node of the source query.
    ByTopNodes,
    /// Area-path bucketing over the root's direct children.
    Default,
}

impl GroupingPolicy {
    /// Parse a configuration string: `field:<name>`, the literal `query`,
    /// or anything else for the default.
    pub fn parse(s: &str) -> Self {
        if let Some(field) = s.strip_prefix("field:") {
            Self::ByField(field.to_string())
        } else if s == "query" {
            Self::ByTopNodes
        } else {
            Self::Default
        }
    }
}

/// Group a populated tree according to the policy.
///
/// Falls back to the default strategy whenever the policy does not fit the
/// source query's shape (e.g. top-node grouping over a flat query).
pub fn group<T: WorkItemRecord>(
    tree: &ResultTree<T>,
    policy: &GroupingPolicy,
    fields: &FieldMap,
) -> IndexMap<String, Vec<NodeId>> {
    let linked = tree
        .source_query
        .as_ref()
        .and_then(|q| q.query_type)
        .map(|t| t.is_linked())
        .unwrap_or(false);

    match policy {
        GroupingPolicy::ByField(name) if linked => by_field_when_tree(tree, name, fields),
        GroupingPolicy::ByField(name) => by_field_when_flat(tree, name, fields),
        GroupingPolicy::ByTopNodes if linked => by_top_nodes(tree),
        _ => by_field_when_flat(tree, &fields.area_path, fields),
    }
}

/// Get the top-level segment of a backslash-delimited path: strip through
/// the first backslash, truncate at the next. A value with no backslash is
/// returned as-is.
pub fn top_level_area_path(area_path: &str) -> String {
    let mut path = area_path;

    if let Some(idx) = path.find('\\') {
        path = &path[idx + 1..];
        if let Some(idx) = path.find('\\') {
            path = &path[..idx];
        }
    }

    path.to_string()
}

/// Convert a raw field value into a group key. Absent, empty and
/// non-scalar values exclude the node from all groups.
fn group_key(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn by_field_helper<T: WorkItemRecord>(
    tree: &ResultTree<T>,
    children: &[NodeId],
    grouping: &mut IndexMap<String, Vec<NodeId>>,
    field_name: &str,
    fields: &FieldMap,
) {
    for &child in children {
        let Some(data) = tree.data(child) else {
            continue;
        };
        let Some(mut key) = data.field(field_name).and_then(group_key) else {
            continue;
        };

        if field_name == fields.area_path {
            key = top_level_area_path(&key);
        }

        grouping.entry(key).or_default().push(child);
    }
}

fn by_field_when_flat<T: WorkItemRecord>(
    tree: &ResultTree<T>,
    field_name: &str,
    fields: &FieldMap,
) -> IndexMap<String, Vec<NodeId>> {
    let mut grouping = IndexMap::new();
    by_field_helper(tree, tree.children(tree::ROOT), &mut grouping, field_name, fields);
    grouping
}

/// Same field grouping, one level deeper: the root's children are treated
/// as containers and all their children accumulate into one shared map.
fn by_field_when_tree<T: WorkItemRecord>(
    tree: &ResultTree<T>,
    field_name: &str,
    fields: &FieldMap,
) -> IndexMap<String, Vec<NodeId>> {
    let mut grouping = IndexMap::new();

    for &node in tree.children(tree::ROOT) {
        if tree.data(node).is_some() {
            by_field_helper(tree, tree.children(node), &mut grouping, field_name, fields);
        }
    }

    grouping
}

/// Each top-level node becomes a group keyed by its title; members are its
/// direct children. No field inspection at all.
fn by_top_nodes<T: WorkItemRecord>(tree: &ResultTree<T>) -> IndexMap<String, Vec<NodeId>> {
    let mut grouping = IndexMap::new();

    for &node in tree.children(tree::ROOT) {
        if let Some(data) = tree.data(node) {
            grouping.insert(data.title().to_string(), tree.children(node).to_vec());
        }
    }

    grouping
}
