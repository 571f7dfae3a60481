//! Hub configuration: query locations, grouping policy, field mappings.
//!
//! Loaded from a JSON file when one is present, otherwise built from
//! defaults; the file path comes from `HUB_CONFIG` or falls back to
//! `hub.json`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::grouping::GroupingPolicy;
use crate::record::FieldMap;

/// Separator used when composing saved-query paths.
const QUERY_SEPARATOR: &str = "/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Root folder for shared saved queries.
    pub shared_folder: String,
    /// Folder the hub's queries live under.
    pub extension_folder: String,
    /// Folder holding the report queries.
    pub report_folder: String,
    /// Name of the query producing the status entries.
    pub status_query: String,
    /// Name of the query producing the impediments.
    pub impediments_query: String,
    /// Grouping policy string: `field:<name>`, `query`, or anything else
    /// for the default.
    pub grouping: String,
    pub fields: FieldMap,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            shared_folder: "Shared Queries".to_string(),
            extension_folder: "Status Hub".to_string(),
            report_folder: "Status Report".to_string(),
            status_query: "Latest Status Report".to_string(),
            impediments_query: "Impediments".to_string(),
            grouping: "field:System.AreaPath".to_string(),
            fields: FieldMap::default(),
        }
    }
}

impl HubConfig {
    /// Load a config file, or defaults when no file exists.
    pub fn from_env() -> Result<Self> {
        let path = std::env::var("HUB_CONFIG").unwrap_or_else(|_| "hub.json".to_string());
        let path = Path::new(&path);

        if path.exists() {
            Self::load(path)
        } else {
            info!("No config file at {:?}, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Load the config from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {:?}", path))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;

        info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Build the fully-qualified path of a report query.
    pub fn query_fqn(&self, name: &str) -> String {
        [
            self.shared_folder.as_str(),
            self.extension_folder.as_str(),
            self.report_folder.as_str(),
            name,
        ]
        .join(QUERY_SEPARATOR)
    }

    pub fn status_query_fqn(&self) -> String {
        self.query_fqn(&self.status_query)
    }

    pub fn impediments_query_fqn(&self) -> String {
        self.query_fqn(&self.impediments_query)
    }

    /// Parse the configured grouping string into a policy.
    pub fn grouping_policy(&self) -> GroupingPolicy {
        GroupingPolicy::parse(&self.grouping)
    }
}
