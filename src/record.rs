//! Typed work-item records and their hydration from raw field bags.
//!
//! A work item arrives as an id plus a field-name → JSON value bag. The
//! [`WorkItemRecord`] trait maps that bag onto a strongly-typed record
//! through the configured [`FieldMap`], so a missing or wrongly-typed
//! field is an explicit `None` rather than a silent undefined. Records are
//! built empty with only an id during tree construction, hydrated once by
//! the batch fetch, and read-only afterwards.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Work-item type carrying impediments directly.
pub const WIT_TYPE_EPIC: &str = "Epic";
/// Work-item type whose parent carries the impediments.
pub const WIT_TYPE_FEATURE: &str = "Feature";

/// State meaning work has begun.
pub const STATE_IN_PROGRESS: &str = "In Progress";
/// State meaning work completed on the transition date.
pub const STATE_DONE: &str = "Done";

/// A raw work item as returned by the tracking backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u32,
    #[serde(default)]
    pub fields: HashMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// Logical field role → backend reference name.
///
/// Defaults match the stock Azure DevOps process fields; any entry can be
/// overridden through the hub configuration without touching code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldMap {
    pub title: String,
    pub state: String,
    pub risk: String,
    pub objective: String,
    pub action: String,
    pub target_date: String,
    pub start_date: String,
    pub finish_date: String,
    pub area_path: String,
    pub iteration_path: String,
    pub parent: String,
    pub work_item_type: String,
}

impl Default for FieldMap {
    fn default() -> Self {
        Self {
            title: "System.Title".to_string(),
            state: "System.State".to_string(),
            risk: "Microsoft.VSTS.Common.Risk".to_string(),
            objective: "System.Description".to_string(),
            action: "Custom.Action".to_string(),
            target_date: "Microsoft.VSTS.Scheduling.TargetDate".to_string(),
            start_date: "Microsoft.VSTS.Scheduling.StartDate".to_string(),
            finish_date: "Microsoft.VSTS.Scheduling.FinishDate".to_string(),
            area_path: "System.AreaPath".to_string(),
            iteration_path: "System.IterationPath".to_string(),
            parent: "System.Parent".to_string(),
            work_item_type: "System.WorkItemType".to_string(),
        }
    }
}

/// Read a string field from a work item's bag.
pub fn string_field<'a>(item: &'a WorkItem, reference_name: &str) -> Option<&'a str> {
    item.fields.get(reference_name).and_then(Value::as_str)
}

/// Read an ISO-8601 date field from a work item's bag.
pub fn date_field(item: &WorkItem, reference_name: &str) -> Option<DateTime<Utc>> {
    string_field(item, reference_name)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
}

/// Read a numeric id field (e.g. the parent id) from a work item's bag.
pub fn id_field(item: &WorkItem, reference_name: &str) -> Option<u32> {
    item.fields
        .get(reference_name)
        .and_then(Value::as_u64)
        .map(|n| n as u32)
}

/// A typed record built from a query result row.
///
/// `new` replaces the original's reflective `new T()` — the record type is
/// chosen per query-execution call, no runtime reflection involved.
pub trait WorkItemRecord: Send + Sync + 'static {
    /// Construct an empty record knowing only its id.
    fn new(id: u32) -> Self
    where
        Self: Sized;

    fn id(&self) -> u32;

    /// Display title, used for top-node grouping and impediment labels.
    fn title(&self) -> &str;

    /// Raw field access by reference name, for field-based grouping.
    fn field(&self, reference_name: &str) -> Option<&Value>;

    /// Populate typed attributes from the fetched field bag. Called exactly
    /// once per record, by the batch hydration step.
    fn hydrate(&mut self, item: &WorkItem, fields: &FieldMap);
}

/// One entry on the status report page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusEntry {
    pub id: u32,
    pub title: String,
    pub status: String,
    pub risk_level: String,
    pub objective: String,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_date: Option<DateTime<Utc>>,
    pub key_issues: Vec<String>,
    #[serde(skip)]
    source: WorkItem,
}

impl StatusEntry {
    /// Add an impediment to the key-issues list.
    pub fn add_impediment(&mut self, title: impl Into<String>) {
        self.key_issues.push(title.into());
    }
}

impl WorkItemRecord for StatusEntry {
    fn new(id: u32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn field(&self, reference_name: &str) -> Option<&Value> {
        self.source.fields.get(reference_name)
    }

    fn hydrate(&mut self, item: &WorkItem, fields: &FieldMap) {
        self.id = item.id;
        self.title = string_field(item, &fields.title).unwrap_or_default().to_string();
        self.status = string_field(item, &fields.state).unwrap_or_default().to_string();
        self.risk_level = string_field(item, &fields.risk).unwrap_or_default().to_string();
        self.objective = string_field(item, &fields.objective)
            .unwrap_or_default()
            .to_string();
        self.action = string_field(item, &fields.action).unwrap_or_default().to_string();
        self.target_date = date_field(item, &fields.target_date);
        self.source = item.clone();
    }
}

/// A row from the impediments query: either the Epic/Feature carrier at the
/// top level, or the impediment item itself one level down.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Impediment {
    pub id: u32,
    pub title: String,
    pub work_item_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<u32>,
    #[serde(skip)]
    source: WorkItem,
}

impl WorkItemRecord for Impediment {
    fn new(id: u32) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    fn id(&self) -> u32 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn field(&self, reference_name: &str) -> Option<&Value> {
        self.source.fields.get(reference_name)
    }

    fn hydrate(&mut self, item: &WorkItem, fields: &FieldMap) {
        self.id = item.id;
        self.title = string_field(item, &fields.title).unwrap_or_default().to_string();
        self.work_item_type = string_field(item, &fields.work_item_type)
            .unwrap_or_default()
            .to_string();
        self.parent = id_field(item, &fields.parent);
        self.source = item.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn work_item(id: u32, fields: &[(&str, Value)]) -> WorkItem {
        WorkItem {
            id,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            url: None,
        }
    }

    #[test]
    fn test_status_entry_round_trip() {
        let fields = FieldMap::default();
        let item = work_item(
            7,
            &[
                ("System.Title", json!("X")),
                ("System.State", json!("Y")),
                ("Microsoft.VSTS.Common.Risk", json!("2 - Medium")),
                ("System.Description", json!("Ship the thing")),
                ("Custom.Action", json!("Keep going")),
                (
                    "Microsoft.VSTS.Scheduling.TargetDate",
                    json!("2024-03-01T00:00:00Z"),
                ),
            ],
        );

        let mut entry = StatusEntry::new(0);
        entry.hydrate(&item, &fields);

        assert_eq!(entry.id, 7);
        assert_eq!(entry.title, "X");
        assert_eq!(entry.status, "Y");
        assert_eq!(entry.risk_level, "2 - Medium");
        assert_eq!(entry.objective, "Ship the thing");
        assert_eq!(entry.action, "Keep going");
        assert_eq!(
            entry.target_date.unwrap().to_rfc3339(),
            "2024-03-01T00:00:00+00:00"
        );
    }

    #[test]
    fn test_missing_fields_leave_defaults() {
        let fields = FieldMap::default();
        let item = work_item(3, &[("System.Title", json!("Only title"))]);

        let mut entry = StatusEntry::new(3);
        entry.hydrate(&item, &fields);

        assert_eq!(entry.title, "Only title");
        assert_eq!(entry.status, "");
        assert!(entry.target_date.is_none());
        assert!(entry.key_issues.is_empty());
    }

    #[test]
    fn test_impediment_hydration_reads_type_and_parent() {
        let fields = FieldMap::default();
        let item = work_item(
            12,
            &[
                ("System.Title", json!("Feature A")),
                ("System.WorkItemType", json!("Feature")),
                ("System.Parent", json!(5)),
            ],
        );

        let mut imp = Impediment::new(12);
        imp.hydrate(&item, &fields);

        assert_eq!(imp.work_item_type, WIT_TYPE_FEATURE);
        assert_eq!(imp.parent, Some(5));
    }

    #[test]
    fn test_raw_field_access_after_hydration() {
        let fields = FieldMap::default();
        let item = work_item(1, &[("System.AreaPath", json!("Proj\\TeamA"))]);

        let mut entry = StatusEntry::new(1);
        entry.hydrate(&item, &fields);

        assert_eq!(
            entry.field("System.AreaPath").and_then(Value::as_str),
            Some("Proj\\TeamA")
        );
        assert!(entry.field("System.NoSuchField").is_none());
    }
}
