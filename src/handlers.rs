use crate::errors::AppError;
use crate::models::{
    BuyingSignal, LeadInsightsResponse, LeadScoreResponse, PrioritizeQuery, PrioritizeResponse,
    RescoreSummary, ScoreLeadRequest, WorkspaceScope,
};
use crate::service::{LeadIntentService, ScoreOptions};
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::CorsLayer, limit::RequestBodyLimitLayer, timeout::TimeoutLayer, trace::TraceLayer,
};
use uuid::Uuid;

/// Header carrying the caller identity, set by the upstream auth proxy.
pub const USER_ID_HEADER: &str = "x-user-id";

/// 1MB max payload
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: LeadIntentService,
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "lead-intent-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

fn require_workspace(workspace_id: Option<Uuid>) -> Result<Uuid, AppError> {
    workspace_id.ok_or_else(|| AppError::BadRequest("workspace_id is required".to_string()))
}

/// Resolves the caller and checks workspace membership.
async fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    workspace_id: Option<Uuid>,
) -> Result<Uuid, AppError> {
    let user_id = headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Missing x-user-id header".to_string()))?;

    let workspace_id = require_workspace(workspace_id)?;

    if !state
        .service
        .store()
        .is_workspace_member(workspace_id, user_id)
        .await?
    {
        return Err(AppError::Forbidden(format!(
            "user {} is not a member of workspace {}",
            user_id, workspace_id
        )));
    }

    Ok(workspace_id)
}

/// POST /api/v1/leads/:id/score
pub async fn score_lead(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
    headers: HeaderMap,
    Json(req): Json<ScoreLeadRequest>,
) -> Result<Json<LeadScoreResponse>, AppError> {
    tracing::info!("POST /leads/{}/score - workspace: {:?}", lead_id, req.workspace_id);

    let workspace_id = authorize(&state, &headers, req.workspace_id).await?;
    let response = state
        .service
        .score_lead(workspace_id, lead_id, ScoreOptions::from(&req))
        .await?;

    Ok(Json(response))
}

/// POST /api/v1/leads/:id/buying-signals
pub async fn detect_buying_signals(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
    headers: HeaderMap,
    Json(scope): Json<WorkspaceScope>,
) -> Result<Json<Vec<BuyingSignal>>, AppError> {
    tracing::info!(
        "POST /leads/{}/buying-signals - workspace: {:?}",
        lead_id,
        scope.workspace_id
    );

    let workspace_id = authorize(&state, &headers, scope.workspace_id).await?;
    let signals = state
        .service
        .detect_buying_signals(workspace_id, lead_id)
        .await?;

    Ok(Json(signals))
}

/// GET /api/v1/leads/:id/insights?workspace_id=
pub async fn lead_insights(
    State(state): State<Arc<AppState>>,
    Path(lead_id): Path<Uuid>,
    headers: HeaderMap,
    Query(scope): Query<WorkspaceScope>,
) -> Result<Json<LeadInsightsResponse>, AppError> {
    tracing::info!("GET /leads/{}/insights - workspace: {:?}", lead_id, scope.workspace_id);

    let workspace_id = authorize(&state, &headers, scope.workspace_id).await?;
    let response = state.service.lead_insights(workspace_id, lead_id).await?;

    Ok(Json(response))
}

/// GET /api/v1/leads/prioritize
pub async fn prioritize_leads(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<PrioritizeQuery>,
) -> Result<Json<PrioritizeResponse>, AppError> {
    tracing::info!("GET /leads/prioritize - params: {:?}", query);

    let workspace_id = authorize(&state, &headers, query.workspace_id).await?;
    let response = state.service.prioritize(workspace_id, &query).await?;

    tracing::info!(
        "Prioritized {} leads for workspace {}",
        response.total,
        workspace_id
    );
    Ok(Json(response))
}

/// POST /api/v1/workspaces/:id/rescore
pub async fn rescore_workspace(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<RescoreSummary>, AppError> {
    tracing::info!("POST /workspaces/{}/rescore", workspace_id);

    let workspace_id = authorize(&state, &headers, Some(workspace_id)).await?;
    let summary = state.service.rescore_workspace(workspace_id).await?;

    Ok(Json(summary))
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/v1/leads/prioritize", get(prioritize_leads))
        .route("/api/v1/leads/:id/score", post(score_lead))
        .route("/api/v1/leads/:id/buying-signals", post(detect_buying_signals))
        .route("/api/v1/leads/:id/insights", get(lead_insights))
        .route("/api/v1/workspaces/:id/rescore", post(rescore_workspace))
}

/// Full application router. `protect` wraps the API routes only, so the
/// health check bypasses whatever it adds (rate limiting in the binary).
pub fn app_router(
    state: Arc<AppState>,
    request_timeout: Duration,
    protect: impl FnOnce(Router<Arc<AppState>>) -> Router<Arc<AppState>>,
) -> Router {
    let api = protect(api_routes()).layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    Router::new()
        .route("/health", get(health))
        .merge(api)
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
