//! HTTP route definitions

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::game::catalog::CardDefinition;
use crate::game::MatchStatus;
use crate::util::time::uptime_secs;
use crate::ws::handler::ws_handler;

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/catalog", get(catalog_handler))
        .route("/matches", get(matches_handler))
        .route("/matches/:match_id", get(match_handler))
        .route("/ws", get(ws_handler))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.client_origin))
        .with_state(state)
}

/// CORS from a comma-separated origin list; "*" allows any origin
fn cors_layer(client_origin: &str) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    if client_origin.trim() == "*" {
        return cors.allow_origin(Any);
    }

    let allowed_origins: Vec<HeaderValue> = client_origin
        .split(',')
        .filter_map(|s| s.trim().parse::<HeaderValue>().ok())
        .collect();
    cors.allow_origin(allowed_origins)
}

// ============================================================================
// Health endpoint
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    uptime_secs: u64,
    active_matches: usize,
    active_players: usize,
    waiting_players: usize,
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let waiting_players = state.lobby.waiting_count().await;

    Json(HealthResponse {
        status: "ok",
        uptime_secs: uptime_secs(),
        active_matches: state.match_registry.active_matches(),
        active_players: state.match_registry.total_players(),
        waiting_players,
    })
}

// ============================================================================
// Catalog and match endpoints
// ============================================================================

#[derive(Serialize)]
struct CatalogEntry<'a> {
    index: usize,
    #[serde(flatten)]
    card: &'a CardDefinition,
}

async fn catalog_handler(State(state): State<AppState>) -> impl IntoResponse {
    let entries: Vec<CatalogEntry<'_>> = state
        .catalog
        .cards()
        .iter()
        .enumerate()
        .map(|(index, card)| CatalogEntry { index, card })
        .collect();

    Json(serde_json::json!({ "cards": entries }))
}

async fn matches_handler(State(state): State<AppState>) -> Json<Vec<MatchStatus>> {
    Json(state.match_registry.statuses())
}

async fn match_handler(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> Result<Json<MatchStatus>, AppError> {
    state
        .match_registry
        .get(&match_id)
        .map(|handle| Json(handle.status()))
        .ok_or_else(|| AppError::NotFound(format!("match {match_id}")))
}

// ============================================================================
// Error handling
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let body = serde_json::json!({
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::{Config, LogFormat, MatchRules};
    use crate::game::GameMatch;
    use crate::game::StaticCatalog;

    fn test_state() -> AppState {
        let config = Config {
            server_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "debug".to_string(),
            log_format: LogFormat::Pretty,
            client_origin: "*".to_string(),
            card_catalog_path: None,
            input_rate_limit: 30,
            rules: MatchRules::default(),
        };
        AppState::new(config).unwrap()
    }

    async fn get_json(router: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn health_reports_counts() {
        let (status, body) = get_json(build_router(test_state()), "/health").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["active_matches"], 0);
        assert_eq!(body["waiting_players"], 0);
    }

    #[tokio::test]
    async fn catalog_lists_indexed_cards() {
        let (status, body) = get_json(build_router(test_state()), "/catalog").await;

        assert_eq!(status, StatusCode::OK);
        let cards = body["cards"].as_array().unwrap();
        assert_eq!(cards.len(), StaticCatalog::default().cards().len());
        assert_eq!(cards[0]["index"], 0);
        assert_eq!(cards[0]["name"], "Shoot");
        assert_eq!(cards[0]["effect"], "damage_enemy");
    }

    #[tokio::test]
    async fn match_status_lookup() {
        let state = test_state();
        let (_game, handle) = GameMatch::new(
            Uuid::new_v4(),
            MatchRules::default(),
            Arc::new(StaticCatalog::default()),
        );
        state.match_registry.insert(handle.clone());

        let (status, body) = get_json(build_router(state.clone()), "/matches").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let uri = format!("/matches/{}", handle.id);
        let (status, body) = get_json(build_router(state.clone()), &uri).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["phase"], "start");
        assert_eq!(body["health"], serde_json::json!([7, 7]));

        let uri = format!("/matches/{}", Uuid::new_v4());
        let (status, body) = get_json(build_router(state), &uri).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["error"].as_str().unwrap().starts_with("Not found"));
    }
}
