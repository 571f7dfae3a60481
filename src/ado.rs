//! Work-item tracking backend abstraction and its Azure DevOps REST client.
//!
//! The engine only ever talks to [`WorkItemBackend`], so tests swap in a
//! scripted fake and the REST specifics stay in [`AdoClient`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::env;
use tracing::debug;

use crate::error::HubError;
use crate::record::WorkItem;

const API_VERSION: &str = "7.0";

/// Link relation meaning `target` is a child of `source`.
pub const REL_CHILD: &str = "System.LinkTypes.Hierarchy-Forward";
/// Link relation meaning `target` is related to `source`; treated as a
/// child for tree-building purposes.
pub const REL_RELATED: &str = "System.LinkTypes.Related";

/// Shape of a saved query's definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryType {
    Flat,
    Tree,
    OneHop,
}

impl QueryType {
    /// True for query shapes whose results carry relation links.
    pub fn is_linked(self) -> bool {
        matches!(self, Self::Tree | Self::OneHop)
    }
}

/// A resolved saved query.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryDefinition {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(default)]
    pub wiql: Option<String>,
    #[serde(default)]
    pub query_type: Option<QueryType>,
}

/// Shape of an execution's result rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QueryResultType {
    /// Flat list of item references, no relation information.
    WorkItem,
    /// (source, target, relation) triples.
    WorkItemLink,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemReference {
    pub id: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One relation triple from a linked-shape result. A null `rel` marks a
/// root-level item, in which case `source` is null too.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItemLink {
    #[serde(default)]
    pub rel: Option<String>,
    #[serde(default)]
    pub source: Option<WorkItemReference>,
    pub target: WorkItemReference,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnReference {
    pub reference_name: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Raw execution result, before any tree assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub query_result_type: QueryResultType,
    #[serde(default)]
    pub as_of: Option<DateTime<Utc>>,
    #[serde(default)]
    pub columns: Vec<ColumnReference>,
    #[serde(default)]
    pub work_items: Vec<WorkItemReference>,
    #[serde(default)]
    pub work_item_relations: Vec<WorkItemLink>,
}

/// Async trait implemented by the real REST client and by test fakes.
#[async_trait]
pub trait WorkItemBackend: Send + Sync {
    /// Resolve a saved query by its path.
    async fn get_query(&self, path: &str) -> Result<QueryDefinition, HubError>;

    /// Execute WIQL text and return the raw result rows.
    async fn query_by_wiql(&self, wiql: &str) -> Result<QueryResult, HubError>;

    /// Fetch field bags for a set of ids in one call. Per-id fetches are
    /// not an acceptable substitute; request count must stay O(1) in the
    /// result size.
    async fn get_work_items_batch(
        &self,
        ids: &[u32],
        fields: &[String],
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItem>, HubError>;

    /// Fetch a single work item with a restricted field set.
    async fn get_work_item(&self, id: u32, fields: &[&str]) -> Result<WorkItem, HubError>;

    /// Human-facing URL for a resolved query.
    fn query_url(&self, query: &QueryDefinition) -> String;
}

/// Azure DevOps REST client, authenticated with a personal access token.
#[derive(Clone)]
pub struct AdoClient {
    client: Client,
    base_url: String,
    project: String,
    pat: String,
}

impl AdoClient {
    /// Create a client from `ADO_ORG_URL`, `ADO_PROJECT` and `ADO_PAT`.
    pub fn from_env() -> anyhow::Result<Self> {
        use anyhow::Context;

        let base_url = env::var("ADO_ORG_URL")
            .context("ADO_ORG_URL environment variable not set")?
            .trim_end_matches('/')
            .to_string();
        let project = env::var("ADO_PROJECT").context("ADO_PROJECT environment variable not set")?;
        let pat = env::var("ADO_PAT").context("ADO_PAT environment variable not set")?;

        Ok(Self {
            client: Client::new(),
            base_url,
            project,
            pat,
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, HubError> {
        debug!("GET {}", url);
        let resp = self
            .client
            .get(url)
            .basic_auth("", Some(&self.pat))
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn post_json<T: DeserializeOwned>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<T, HubError> {
        debug!("POST {}", url);
        let resp = self
            .client
            .post(url)
            .basic_auth("", Some(&self.pat))
            .json(body)
            .send()
            .await?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, HubError> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(HubError::BackendStatus { status, body });
        }
        Ok(resp.json().await?)
    }
}

/// Envelope around batch responses: `{ count, value: [...] }`.
#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    value: Vec<WorkItem>,
}

#[async_trait]
impl WorkItemBackend for AdoClient {
    async fn get_query(&self, path: &str) -> Result<QueryDefinition, HubError> {
        let url = format!(
            "{}/{}/_apis/wit/queries/{}?$expand=wiql&api-version={}",
            self.base_url, self.project, path, API_VERSION
        );
        self.get_json(&url).await
    }

    async fn query_by_wiql(&self, wiql: &str) -> Result<QueryResult, HubError> {
        let url = format!(
            "{}/{}/_apis/wit/wiql?api-version={}",
            self.base_url, self.project, API_VERSION
        );
        self.post_json(&url, &json!({ "query": wiql })).await
    }

    async fn get_work_items_batch(
        &self,
        ids: &[u32],
        fields: &[String],
        as_of: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkItem>, HubError> {
        let url = format!(
            "{}/{}/_apis/wit/workitemsbatch?api-version={}",
            self.base_url, self.project, API_VERSION
        );

        let mut body = json!({
            "ids": ids,
            "fields": fields,
            "errorPolicy": "fail",
        });
        if let Some(ts) = as_of {
            body["asOf"] = json!(ts);
        }

        let resp: BatchResponse = self.post_json(&url, &body).await?;
        Ok(resp.value)
    }

    async fn get_work_item(&self, id: u32, fields: &[&str]) -> Result<WorkItem, HubError> {
        let url = format!(
            "{}/{}/_apis/wit/workitems/{}?fields={}&api-version={}",
            self.base_url,
            self.project,
            id,
            fields.join(","),
            API_VERSION
        );
        self.get_json(&url).await
    }

    fn query_url(&self, query: &QueryDefinition) -> String {
        format!("{}/{}/_queries/query/{}", self.base_url, self.project, query.id)
    }
}
