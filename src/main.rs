//! DevOps Status Hub - query-driven project status aggregation server.

mod ado;
mod config;
mod error;
mod grouping;
mod record;
mod report;
mod rollup;
mod search;
mod tree;

#[cfg(test)]
mod testutil;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ado::{AdoClient, WorkItemBackend};
use config::HubConfig;
use error::HubError;
use grouping::GroupingPolicy;
use report::GroupedReport;
use rollup::{ProposedUpdate, StateChange};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    backend: Arc<dyn WorkItemBackend>,
    config: Arc<HubConfig>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "devops_status_hub=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = HubConfig::from_env()?;
    info!("Status query: {}", config.status_query_fqn());

    let backend = AdoClient::from_env()?;
    info!("Azure DevOps client initialized");

    let state = AppState {
        backend: Arc::new(backend),
        config: Arc::new(config),
    };

    // Build router
    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status_report))
        .route("/rollup", post(rollup_proposals))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    // Run server
    let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
    info!("Server listening on http://0.0.0.0:3000");
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

#[derive(serde::Deserialize)]
struct StatusQuery {
    /// Point in time the report should reflect (RFC 3339).
    as_of: Option<String>,
    /// Grouping override: `field:<name>`, `query`, or omitted for the
    /// configured policy.
    group: Option<String>,
}

/// Build the grouped status report.
async fn status_report(
    State(state): State<AppState>,
    Query(query): Query<StatusQuery>,
) -> Result<Json<GroupedReport>, (StatusCode, String)> {
    let as_of = query
        .as_of
        .as_deref()
        .map(parse_timestamp)
        .transpose()
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid as_of: {e}")))?;

    let status = report::project_status(state.backend.as_ref(), &state.config, as_of)
        .await
        .map_err(hub_error)?;

    let policy = query
        .group
        .as_deref()
        .map(GroupingPolicy::parse)
        .unwrap_or_else(|| state.config.grouping_policy());
    let groups = grouping::group(&status, &policy, &state.config.fields);

    Ok(Json(report::render(state.backend.as_ref(), &status, &groups)))
}

/// Compute the parent schedule adjustments implied by a state change.
async fn rollup_proposals(
    State(state): State<AppState>,
    Json(change): Json<StateChange>,
) -> Result<Json<Vec<ProposedUpdate>>, (StatusCode, String)> {
    let proposals =
        rollup::validate_and_update_parents(state.backend.as_ref(), &state.config.fields, &change)
            .await
            .map_err(hub_error)?;

    Ok(Json(proposals))
}

// ============================================================================
// Helper functions
// ============================================================================

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(raw).map(|d| d.with_timezone(&Utc))
}

/// Map engine errors onto HTTP statuses.
fn hub_error(err: HubError) -> (StatusCode, String) {
    error!("Request failed: {}", err);
    let status = match &err {
        HubError::Configuration(_) => StatusCode::BAD_REQUEST,
        HubError::IllegalState(_) => StatusCode::INTERNAL_SERVER_ERROR,
        HubError::Backend(_) | HubError::BackendStatus { .. } => StatusCode::BAD_GATEWAY,
    };
    (status, err.to_string())
}
