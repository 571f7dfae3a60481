//! Status report assembly: primary query, impediment cross-linking, and
//! the grouped view handed to consumers.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, info};

use crate::ado::WorkItemBackend;
use crate::config::HubConfig;
use crate::error::HubError;
use crate::record::{Impediment, StatusEntry, WIT_TYPE_EPIC, WIT_TYPE_FEATURE};
use crate::search;
use crate::tree::{self, NodeId, ResultTree};

/// Build the status report tree: execute the configured status query and,
/// when it returned anything, cross-link the impediments onto it.
pub async fn project_status(
    backend: &dyn WorkItemBackend,
    config: &HubConfig,
    as_of: Option<DateTime<Utc>>,
) -> Result<ResultTree<StatusEntry>, HubError> {
    let mut status = search::execute_query::<StatusEntry>(
        backend,
        &config.status_query_fqn(),
        as_of,
        &config.fields,
    )
    .await?;

    if !status.is_empty() {
        populate_impediments(backend, config, &mut status).await?;
    }

    Ok(status)
}

/// Attach impediments from the impediments query onto the primary tree.
///
/// Each top-level row of the impediments query is an Epic or Feature
/// carrying the actual impediment one level down. Epics map to their own
/// id; Features map to their parent's id. Rows of any other type, rows
/// with no child impediment, and rows whose target id is outside the
/// primary tree are skipped — an impediment on a project outside today's
/// status scope is intentionally not shown.
async fn populate_impediments(
    backend: &dyn WorkItemBackend,
    config: &HubConfig,
    status: &mut ResultTree<StatusEntry>,
) -> Result<(), HubError> {
    if status.node_map().is_empty() {
        return Err(HubError::IllegalState(
            "node map is empty on a populated status tree".to_string(),
        ));
    }

    let impediments = search::execute_query::<Impediment>(
        backend,
        &config.impediments_query_fqn(),
        None,
        &config.fields,
    )
    .await?;

    let mut linked = 0usize;
    for &node in impediments.children(tree::ROOT) {
        let Some(data) = impediments.data(node) else {
            continue;
        };

        // The row is either a feature or epic; the child is the impediment.
        let related_id = match data.work_item_type.as_str() {
            WIT_TYPE_EPIC => data.id,
            WIT_TYPE_FEATURE => match data.parent {
                Some(parent) => parent,
                None => continue,
            },
            _ => continue,
        };

        let Some(&first_child) = impediments.children(node).first() else {
            debug!("Impediment carrier {} has no child item", data.id);
            continue;
        };
        let Some(impediment) = impediments.data(first_child) else {
            continue;
        };

        if let Some(target) = status.node_by_id(related_id) {
            if let Some(entry) = status.data_mut(target) {
                entry.add_impediment(impediment.title.clone());
                linked += 1;
            }
        }
    }

    info!("Linked {} impediments onto the status tree", linked);
    Ok(())
}

/// A grouped status report, ready to serialize for the UI.
#[derive(Debug, Serialize)]
pub struct GroupedReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryLink>,
    pub groups: IndexMap<String, Vec<StatusEntry>>,
}

/// Pointer back to the saved query that produced the report.
#[derive(Debug, Serialize)]
pub struct QueryLink {
    pub name: String,
    pub url: String,
}

/// Flatten a grouped tree into the serializable report view.
pub fn render(
    backend: &dyn WorkItemBackend,
    status: &ResultTree<StatusEntry>,
    groups: &IndexMap<String, Vec<NodeId>>,
) -> GroupedReport {
    let query = status.source_query.as_ref().map(|q| QueryLink {
        name: q.name.clone(),
        url: backend.query_url(q),
    });

    let groups = groups
        .iter()
        .map(|(label, members)| {
            let entries = members
                .iter()
                .filter_map(|&node| status.data(node).cloned())
                .collect();
            (label.clone(), entries)
        })
        .collect();

    GroupedReport {
        as_of: status.as_of,
        query,
        groups,
    }
}
