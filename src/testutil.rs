//! Scripted work-item backend for engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::ado::{
    ColumnReference, QueryDefinition, QueryResult, QueryResultType, QueryType, WorkItemBackend,
    WorkItemLink, WorkItemReference,
};
use crate::error::HubError;
use crate::record::WorkItem;

/// In-memory backend: saved queries map to canned results, work items are
/// served from a scripted store, and every call is counted so tests can
/// assert on request shape.
#[derive(Default)]
pub struct MockBackend {
    queries: HashMap<String, QueryDefinition>,
    results: HashMap<String, QueryResult>,
    items: Mutex<HashMap<u32, WorkItem>>,
    wiql_log: Mutex<Vec<String>>,
    batch_calls: AtomicUsize,
    single_fetches: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script a saved query. Its WIQL body is the query path itself, which
    /// lets `query_by_wiql` route back to the canned result.
    pub fn with_query(mut self, path: &str, query_type: QueryType, result: QueryResult) -> Self {
        self.queries.insert(
            path.to_string(),
            QueryDefinition {
                id: format!("query-{}", self.queries.len() + 1),
                name: path.rsplit('/').next().unwrap_or(path).to_string(),
                path: Some(path.to_string()),
                is_folder: false,
                wiql: Some(path.to_string()),
                query_type: Some(query_type),
            },
        );
        self.results.insert(path.to_string(), result);
        self
    }

    /// Script a folder at the given path.
    pub fn with_folder(mut self, path: &str) -> Self {
        self.queries.insert(
            path.to_string(),
            QueryDefinition {
                id: format!("folder-{}", self.queries.len() + 1),
                name: path.to_string(),
                path: Some(path.to_string()),
                is_folder: true,
                wiql: None,
                query_type: None,
            },
        );
        self
    }

    pub fn put_item(&self, item: WorkItem) {
        self.items.lock().unwrap().insert(item.id, item);
    }

    pub fn executed_wiql(&self) -> Vec<String> {
        self.wiql_log.lock().unwrap().clone()
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    pub fn single_fetches(&self) -> usize {
        self.single_fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WorkItemBackend for MockBackend {
    async fn get_query(&self, path: &str) -> Result<QueryDefinition, HubError> {
        self.queries
            .get(path)
            .cloned()
            .ok_or_else(|| HubError::Configuration(format!("no scripted query at '{path}'")))
    }

    async fn query_by_wiql(&self, wiql: &str) -> Result<QueryResult, HubError> {
        self.wiql_log.lock().unwrap().push(wiql.to_string());
        // The WIQL body is the query path, possibly with an ASOF suffix.
        self.results
            .iter()
            .find(|(key, _)| wiql.starts_with(key.as_str()))
            .map(|(_, result)| result.clone())
            .ok_or_else(|| HubError::Configuration(format!("no scripted result for '{wiql}'")))
    }

    async fn get_work_items_batch(
        &self,
        ids: &[u32],
        _fields: &[String],
        _as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItem>, HubError> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let items = self.items.lock().unwrap();
        Ok(ids.iter().filter_map(|id| items.get(id).cloned()).collect())
    }

    async fn get_work_item(&self, id: u32, _fields: &[&str]) -> Result<WorkItem, HubError> {
        self.single_fetches.fetch_add(1, Ordering::SeqCst);
        self.items
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| HubError::Configuration(format!("no scripted work item {id}")))
    }

    fn query_url(&self, query: &QueryDefinition) -> String {
        format!("https://ado.test/_queries/query/{}", query.id)
    }
}

pub fn work_item(id: u32, fields: &[(&str, Value)]) -> WorkItem {
    WorkItem {
        id,
        fields: fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
        url: None,
    }
}

pub fn column(reference_name: &str) -> ColumnReference {
    ColumnReference {
        reference_name: reference_name.to_string(),
        name: None,
    }
}

pub fn flat_result(ids: &[u32], columns: Vec<ColumnReference>) -> QueryResult {
    QueryResult {
        query_result_type: QueryResultType::WorkItem,
        as_of: None,
        columns,
        work_items: ids.iter().map(|&id| WorkItemReference { id, url: None }).collect(),
        work_item_relations: Vec::new(),
    }
}

pub fn linked_result(relations: Vec<WorkItemLink>, columns: Vec<ColumnReference>) -> QueryResult {
    QueryResult {
        query_result_type: QueryResultType::WorkItemLink,
        as_of: None,
        columns,
        work_items: Vec::new(),
        work_item_relations: relations,
    }
}

pub fn link(rel: Option<&str>, source: Option<u32>, target: u32) -> WorkItemLink {
    WorkItemLink {
        rel: rel.map(str::to_string),
        source: source.map(|id| WorkItemReference { id, url: None }),
        target: WorkItemReference {
            id: target,
            url: None,
        },
    }
}
