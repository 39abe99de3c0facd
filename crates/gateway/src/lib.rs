//! HTTP API gateway for Toolwright.
//!
//! Exposes a health check and the v1 session API over one shared
//! [`AgentLoop`]. Built on Axum.

pub mod api_v1;

use axum::extract::DefaultBodyLimit;
use axum::{Router, response::Json, routing::get};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use toolwright_agent::AgentLoop;
use toolwright_config::GatewayConfig;

/// Request bodies above this size are rejected.
const BODY_LIMIT: usize = 1024 * 1024;

/// Build the full router: `/health` plus the v1 API under `/v1`.
///
/// CORS allows no foreign origins; browsers may only call the API
/// same-origin.
pub fn build_router(agent: Arc<AgentLoop>) -> Router {
    let api_state = Arc::new(api_v1::ApiV1State { agent });

    let cors = CorsLayer::new()
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::PUT,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
        .max_age(std::time::Duration::from_secs(3600));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/v1", api_v1::v1_router(api_state))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server and serve until the process ends.
pub async fn start(config: &GatewayConfig, agent: Arc<AgentLoop>) -> std::io::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let tools = agent.tools().len();
    let app = build_router(agent);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, tools, "Gateway listening");
    axum::serve(listener, app).await
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}


#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn health_endpoint() {
        let app = build_router(Arc::new(test_support::agent_with(vec![], false)));

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn v1_is_nested() {
        let app = build_router(Arc::new(test_support::agent_with(vec![], false)));
        let req = Request::builder()
            .uri("/v1/tools")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected() {
        let app = build_router(Arc::new(test_support::agent_with(vec![], false)));
        let message = "x".repeat(BODY_LIMIT + 1);
        let req = Request::builder()
            .method("POST")
            .uri("/v1/sessions/big/turns")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::json!({ "message": message }).to_string()))
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
