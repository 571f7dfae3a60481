//! Parent schedule roll-up for state changes.
//!
//! When a work item moves to In Progress or Done, the transition date may
//! need to flow up the parent chain: a parent cannot have started after
//! its first started child, nor finished before its last finished child.
//! This walks the chain one parent at a time and reports the adjustments
//! implied, leaving the actual write to the caller.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::ado::WorkItemBackend;
use crate::error::HubError;
use crate::record::{date_field, id_field, FieldMap, STATE_DONE, STATE_IN_PROGRESS};

/// A work-item update event, as delivered by the tracking backend.
#[derive(Debug, Clone, Deserialize)]
pub struct StateChange {
    pub id: u32,
    #[serde(default)]
    pub parent: Option<u32>,
    pub state: String,
    pub changed_date: DateTime<Utc>,
    pub state_changed_date: DateTime<Utc>,
}

/// A schedule adjustment implied by a state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProposedUpdate {
    pub id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_date: Option<DateTime<Utc>>,
}

/// Check whether an update was a state change and, if so, compute the
/// parent-chain schedule adjustments it implies.
///
/// Only In Progress and Done transitions matter, and only for items that
/// have a parent; everything else yields no proposals. Each ancestor is
/// fetched individually — the chain is short and unknown up front, so
/// this is the one place a per-item fetch loop is acceptable.
pub async fn validate_and_update_parents(
    backend: &dyn WorkItemBackend,
    fields: &FieldMap,
    change: &StateChange,
) -> Result<Vec<ProposedUpdate>, HubError> {
    let mut proposals = Vec::new();

    // The update touched something other than the state.
    if change.state_changed_date != change.changed_date {
        return Ok(proposals);
    }

    let (start_date, finish_date) = match change.state.as_str() {
        STATE_IN_PROGRESS => (Some(change.state_changed_date), None),
        STATE_DONE => (None, Some(change.state_changed_date)),
        _ => return Ok(proposals),
    };

    let Some(mut parent) = change.parent else {
        return Ok(proposals);
    };

    let wanted = [
        fields.state.as_str(),
        fields.start_date.as_str(),
        fields.finish_date.as_str(),
        fields.parent.as_str(),
    ];

    loop {
        let item = backend.get_work_item(parent, &wanted).await?;
        let parent_start = date_field(&item, &fields.start_date);
        let parent_finish = date_field(&item, &fields.finish_date);

        let mut proposal = ProposedUpdate {
            id: parent,
            start_date: None,
            finish_date: None,
        };

        if let Some(start) = start_date {
            if parent_start.map_or(true, |existing| existing > start) {
                info!("Update {} start date to {}", parent, start);
                proposal.start_date = Some(start);
            }
        }

        if let Some(finish) = finish_date {
            if parent_finish.is_some_and(|existing| existing < finish) {
                info!("Update {} finish date to {}", parent, finish);
                proposal.finish_date = Some(finish);
            }
        }

        if proposal.start_date.is_some() || proposal.finish_date.is_some() {
            proposals.push(proposal);
        }

        match id_field(&item, &fields.parent) {
            Some(grand_parent) => parent = grand_parent,
            None => break,
        }
    }

    Ok(proposals)
}
