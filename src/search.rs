//! Query execution engine: saved query → populated result tree.
//!
//! Executes a saved work-item query, reassembles parent/child structure
//! from whichever shape the backend reports (flat item list or relation
//! links), then hydrates every node's record from a single batch field
//! fetch. The batch call is deliberate — request count stays O(1) no
//! matter how many rows the query returns.

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, warn};

use crate::ado::{
    QueryResultType, WorkItemBackend, WorkItemLink, WorkItemReference, REL_CHILD, REL_RELATED,
};
use crate::error::HubError;
use crate::record::{FieldMap, WorkItemRecord};
use crate::tree::{self, ResultTree};

/// Execute a saved query and return the populated result tree.
///
/// When `as_of` is given, both the WIQL evaluation and the field fetch are
/// pinned to that point in time, so the tree reflects historical state.
/// An empty result is not an error: the returned root is valid with no
/// children and an empty node map.
pub async fn execute_query<T: WorkItemRecord>(
    backend: &dyn WorkItemBackend,
    query_name: &str,
    as_of: Option<DateTime<Utc>>,
    fields: &FieldMap,
) -> Result<ResultTree<T>, HubError> {
    let query = backend.get_query(query_name).await?;

    if query.is_folder {
        return Err(HubError::Configuration(format!(
            "'{query_name}' is a folder, not an executable query"
        )));
    }

    let mut wiql = query.wiql.clone().ok_or_else(|| {
        HubError::Configuration(format!("query '{query_name}' has no WIQL body"))
    })?;

    if let Some(ts) = as_of {
        wiql.push_str(&format!(
            " ASOF '{}'",
            ts.to_rfc3339_opts(SecondsFormat::Millis, true)
        ));
    }

    let results = backend.query_by_wiql(&wiql).await?;

    let mut root: ResultTree<T> = ResultTree::new();
    root.as_of = results.as_of;

    match results.query_result_type {
        QueryResultType::WorkItem => process_work_items(&mut root, &results.work_items),
        QueryResultType::WorkItemLink => process_relations(&mut root, &results.work_item_relations),
    }

    if !root.node_map().is_empty() {
        // Request exactly the columns the query declared as output.
        let field_names: Vec<String> = results
            .columns
            .iter()
            .map(|c| c.reference_name.clone())
            .collect();
        let ids: Vec<u32> = root.node_map().keys().copied().collect();

        debug!(
            "Hydrating {} work items from '{}' in one batch",
            ids.len(),
            query_name
        );
        let items = backend
            .get_work_items_batch(&ids, &field_names, results.as_of)
            .await?;

        for item in items {
            if let Some(node) = root.node_by_id(item.id) {
                if let Some(data) = root.data_mut(node) {
                    data.hydrate(&item, fields);
                }
            }
        }
    }

    root.source_query = Some(query);
    Ok(root)
}

/// Flat shape: every reference becomes a direct child of the root. No
/// parent/child inference is possible.
fn process_work_items<T: WorkItemRecord>(
    root: &mut ResultTree<T>,
    references: &[WorkItemReference],
) {
    for reference in references {
        let node = root.add_child(tree::ROOT, T::new(reference.id));
        root.register(reference.id, node);
    }
}

/// Linked shape: a null relation marks a root-level item, a child/related
/// relation attaches the target under the already-registered source. The
/// backend emits parent links before child links; a link whose source has
/// not been seen is dropped loudly rather than silently.
fn process_relations<T: WorkItemRecord>(root: &mut ResultTree<T>, relations: &[WorkItemLink]) {
    for link in relations {
        let id = link.target.id;

        match link.rel.as_deref() {
            None => {
                let node = root.add_child(tree::ROOT, T::new(id));
                root.register(id, node);
            }
            Some(rel) if rel == REL_CHILD || rel == REL_RELATED => {
                let Some(source) = &link.source else {
                    warn!("Dropping work item {}: {} link has no source", id, rel);
                    continue;
                };
                match root.node_by_id(source.id) {
                    Some(parent) => {
                        let node = root.add_child(parent, T::new(id));
                        root.register(id, node);
                    }
                    None => warn!(
                        "Dropping work item {}: parent {} not seen yet in link stream",
                        id, source.id
                    ),
                }
            }
            Some(rel) => debug!("Ignoring unsupported relation '{}' to work item {}", rel, id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::StatusEntry;
    use crate::testutil::{column, flat_result, link, linked_result, work_item, MockBackend};
    use serde_json::json;

    #[tokio::test]
    async fn test_flat_shape_children_match_input_one_to_one() {
        let backend = MockBackend::new().with_query(
            "Flat Query",
            crate::ado::QueryType::Flat,
            flat_result(&[4, 5, 6], vec![column("System.Title")]),
        );
        backend.put_item(work_item(4, &[("System.Title", json!("Four"))]));
        backend.put_item(work_item(5, &[("System.Title", json!("Five"))]));
        backend.put_item(work_item(6, &[("System.Title", json!("Six"))]));

        let root = execute_query::<StatusEntry>(&backend, "Flat Query", None, &FieldMap::default())
            .await
            .unwrap();

        let children = root.children(tree::ROOT);
        assert_eq!(children.len(), 3);
        for &child in children {
            assert!(root.children(child).is_empty());
        }
        assert_eq!(root.data(children[0]).unwrap().title, "Four");
        assert_eq!(root.data(children[1]).unwrap().id, 5);
    }

    #[tokio::test]
    async fn test_linked_shape_builds_one_parent_with_two_children() {
        let backend = MockBackend::new().with_query(
            "Tree Query",
            crate::ado::QueryType::OneHop,
            linked_result(
                vec![
                    link(None, None, 1),
                    link(Some(REL_CHILD), Some(1), 2),
                    link(Some(REL_CHILD), Some(1), 3),
                ],
                vec![column("System.Title")],
            ),
        );
        for id in [1, 2, 3] {
            backend.put_item(work_item(id, &[("System.Title", json!(format!("#{id}")))]));
        }

        let root = execute_query::<StatusEntry>(&backend, "Tree Query", None, &FieldMap::default())
            .await
            .unwrap();

        let top = root.children(tree::ROOT);
        assert_eq!(top.len(), 1);
        assert_eq!(root.children(top[0]).len(), 2);
        assert_eq!(root.data(top[0]).unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_folder_query_is_configuration_error() {
        let backend = MockBackend::new().with_folder("Some Folder");

        let err = execute_query::<StatusEntry>(&backend, "Some Folder", None, &FieldMap::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HubError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_empty_result_returns_valid_root_without_batch_call() {
        let backend = MockBackend::new().with_query(
            "Empty",
            crate::ado::QueryType::Flat,
            flat_result(&[], vec![column("System.Title")]),
        );

        let root = execute_query::<StatusEntry>(&backend, "Empty", None, &FieldMap::default())
            .await
            .unwrap();

        assert!(root.is_empty());
        assert!(root.node_map().is_empty());
        assert_eq!(backend.batch_calls(), 0);
    }

    #[tokio::test]
    async fn test_hydration_issues_exactly_one_batch_call() {
        let backend = MockBackend::new().with_query(
            "Flat Query",
            crate::ado::QueryType::Flat,
            flat_result(&[1, 2, 3, 4, 5], vec![column("System.Title")]),
        );
        for id in 1..=5 {
            backend.put_item(work_item(id, &[("System.Title", json!("t"))]));
        }

        execute_query::<StatusEntry>(&backend, "Flat Query", None, &FieldMap::default())
            .await
            .unwrap();

        assert_eq!(backend.batch_calls(), 1);
    }

    #[tokio::test]
    async fn test_as_of_appends_asof_clause() {
        let backend = MockBackend::new().with_query(
            "Flat Query",
            crate::ado::QueryType::Flat,
            flat_result(&[], vec![]),
        );

        let as_of = chrono::DateTime::parse_from_rfc3339("2024-02-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        execute_query::<StatusEntry>(&backend, "Flat Query", Some(as_of), &FieldMap::default())
            .await
            .unwrap();

        let executed = backend.executed_wiql();
        assert_eq!(executed.len(), 1);
        assert!(executed[0].ends_with("ASOF '2024-02-01T12:00:00.000Z'"));
    }

    #[tokio::test]
    async fn test_link_with_unseen_parent_is_dropped() {
        let backend = MockBackend::new().with_query(
            "Tree Query",
            crate::ado::QueryType::OneHop,
            linked_result(
                vec![
                    link(None, None, 1),
                    // Parent 99 never appears in the stream.
                    link(Some(REL_CHILD), Some(99), 2),
                ],
                vec![column("System.Title")],
            ),
        );
        backend.put_item(work_item(1, &[("System.Title", json!("root"))]));

        let root = execute_query::<StatusEntry>(&backend, "Tree Query", None, &FieldMap::default())
            .await
            .unwrap();

        assert_eq!(root.children(tree::ROOT).len(), 1);
        assert!(root.node_by_id(2).is_none());
        // Node map stays consistent with reachable nodes.
        assert_eq!(root.node_map().len(), root.walk_pre_order().len());
    }
}
