// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::application::query::{QueryError, RegistryQueryService};
use crate::domain::agent::{AgentId, Specialization};

pub struct AppState {
    pub query_service: Arc<RegistryQueryService>,
}

pub fn app(query_service: Arc<RegistryQueryService>) -> Router {
    let state = Arc::new(AppState { query_service });

    Router::new()
        .route("/health", get(health))
        .route("/agents", get(list_agents))
        .route("/agents/{id}", get(get_agent))
        .route("/stats", get(stats))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ListAgentsQuery {
    pub specialization: Option<String>,
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn list_agents(State(state): State<Arc<AppState>>, Query(query): Query<ListAgentsQuery>) -> Response {
    let specialization = match query.specialization.as_deref().map(str::parse::<Specialization>) {
        Some(Ok(s)) => Some(s),
        Some(Err(e)) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        None => None,
    };

    match state.query_service.list_active(specialization.as_ref()).await {
        Ok(agents) => Json(json!({ "count": agents.len(), "agents": agents })).into_response(),
        Err(e) => query_error(e),
    }
}

async fn get_agent(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.query_service.get_record(&AgentId::new(id)).await {
        Ok(record) => Json(record).into_response(),
        Err(e) => query_error(e),
    }
}

async fn stats(State(state): State<Arc<AppState>>) -> Response {
    match state.query_service.stats().await {
        Ok(stats) => Json(stats).into_response(),
        Err(e) => query_error(e),
    }
}

fn query_error(error: QueryError) -> Response {
    match error {
        QueryError::NotFound(_) => error_response(StatusCode::NOT_FOUND, error.to_string()),
        QueryError::Store(e) => {
            warn!(error = %e, "Registry read failed");
            error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

fn error_response(status: StatusCode, message: String) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}
