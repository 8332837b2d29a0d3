// Copyright (c) 2026 Bloemium
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::application::site_queries::SiteQueryService;
use crate::application::template_cache::{TemplateCacheError, TemplateCacheManager};
use crate::domain::job::{CreateSiteJob, UpdateSiteRequest};
use crate::domain::messaging::{labels, Message, MessagePublisher, Topic};
use crate::domain::site::Tenant;

pub struct AppState {
    pub tenant: Tenant,
    pub publisher: Arc<dyn MessagePublisher>,
    pub site_queries: Arc<SiteQueryService>,
    pub template_cache: Arc<TemplateCacheManager>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/site-operations/new", post(submit_new_site))
        .route("/api/site-operations", post(add_site_update_request))
        .route("/api/sites/exists", get(site_exists))
        .route("/api/templates/validate", post(validate_template))
        .with_state(Arc::new(state))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn submit_new_site(
    State(state): State<Arc<AppState>>,
    Json(job): Json<CreateSiteJob>,
) -> impl IntoResponse {
    let message = match Message::new(Topic::SiteOperations, labels::NEW_SITE, &job) {
        Ok(message) => message,
        Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
    };
    let message_id = message.id;
    match state.publisher.publish(message).await {
        Ok(()) => {
            info!(list_item_id = %job.list_item_id, message_id = %message_id, "New site request queued");
            (StatusCode::ACCEPTED, Json(json!({ "message_id": message_id })))
        }
        Err(e) => error(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

async fn add_site_update_request(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let is_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);
    if !is_json {
        return error(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected application/json".to_string());
    }

    let request: UpdateSiteRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => return error(StatusCode::BAD_REQUEST, format!("Invalid update request: {}", e)),
    };
    if request.request_type != labels::UPDATE_SITE_METADATA {
        return error(
            StatusCode::BAD_REQUEST,
            format!("Unsupported request type '{}'", request.request_type),
        );
    }

    let mut queued = 0usize;
    for site in &request.sites {
        let message = match Message::new(Topic::SiteOperations, request.request_type.clone(), site) {
            Ok(message) => message,
            Err(e) => return error(StatusCode::BAD_REQUEST, e.to_string()),
        };
        if let Err(e) = state.publisher.publish(message).await {
            warn!(url = %site.url, "Failed to queue site update: {}", e);
            return error(StatusCode::SERVICE_UNAVAILABLE, e.to_string());
        }
        queued += 1;
    }

    info!(request_type = %request.request_type, queued, "Site update request queued");
    (StatusCode::ACCEPTED, Json(json!({ "queued": queued })))
}

#[derive(Debug, Deserialize)]
struct SiteExistsQuery {
    #[serde(rename = "relativeUrl")]
    relative_url: Option<String>,
}

async fn site_exists(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SiteExistsQuery>,
) -> impl IntoResponse {
    let relative_url = match query.relative_url.filter(|url| !url.trim().is_empty()) {
        Some(url) => url,
        None => {
            return error(StatusCode::BAD_REQUEST, "Missing relativeUrl parameter".to_string())
        }
    };
    let result = state.site_queries.site_exists(&relative_url).await;
    (StatusCode::OK, Json(json!(result)))
}

#[derive(Debug, Deserialize)]
struct ValidateQuery {
    update: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ValidateTemplateRequest {
    #[serde(rename = "TemplateUrl")]
    template_url: String,
}

async fn validate_template(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ValidateQuery>,
    Json(request): Json<ValidateTemplateRequest>,
) -> impl IntoResponse {
    // `?update` and `?update=true` force a refresh
    let force = query
        .update
        .map(|v| !v.eq_ignore_ascii_case("false"))
        .unwrap_or(false);

    match state
        .template_cache
        .ensure_fresh(&state.tenant, &request.template_url, force)
        .await
    {
        Ok(outcome) => (StatusCode::OK, outcome.describe(&request.template_url)),
        Err(e @ TemplateCacheError::InvalidTemplateUrl(_)) => (StatusCode::BAD_REQUEST, e.to_string()),
        Err(e @ TemplateCacheError::Fetch { .. }) => (StatusCode::BAD_GATEWAY, e.to_string()),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

fn error(status: StatusCode, message: String) -> (StatusCode, Json<serde_json::Value>) {
    (status, Json(json!({ "error": message })))
}
