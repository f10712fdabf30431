//! HTTP API for the menu service.
//!
//! Two routes: `POST /menu` runs a batch scrape, `GET /health` reports
//! liveness. Request validation happens here, before any browser work —
//! a malformed batch is rejected with a 400 and zero pages opened. Every
//! structurally valid batch answers 200 with one entry per requested
//! code; only an unavailable cache store produces a 500.

use crate::model::Coordinates;
use crate::service::MenuService;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

/// Shared state handed to every handler.
pub struct AppState {
    pub service: MenuService,
    pub started_at: Instant,
}

/// Build the axum Router with all endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/menu", post(handle_menu))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server on the given port, shutting down on `shutdown`.
pub async fn start(
    port: u16,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!("menu API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.started_at.elapsed().as_secs_f64(),
        "active_pages": state.service.renderer().active_contexts(),
    }))
}

/// Validated batch request.
#[derive(Debug)]
struct BatchRequest {
    codes: Vec<String>,
    coords: Coordinates,
}

/// Check the `{ code: [...], longitude, latitude }` shape.
///
/// Returns a human-readable message for any violation; the caller maps it
/// to a 400. Duplicate codes are allowed and processed independently.
fn validate(body: &Value) -> Result<BatchRequest, String> {
    let codes = body
        .get("code")
        .and_then(Value::as_array)
        .ok_or("'code' must be an array of vendor codes")?;
    if codes.is_empty() {
        return Err("'code' must be a non-empty array".into());
    }

    let codes: Vec<String> = codes
        .iter()
        .map(|c| match c.as_str() {
            Some(s) if !s.trim().is_empty() => Ok(s.to_string()),
            _ => Err("'code' entries must be non-empty strings".to_string()),
        })
        .collect::<Result<_, _>>()?;

    let longitude = body
        .get("longitude")
        .and_then(Value::as_f64)
        .ok_or("'longitude' must be a number")?;
    let latitude = body
        .get("latitude")
        .and_then(Value::as_f64)
        .ok_or("'latitude' must be a number")?;

    Ok(BatchRequest {
        codes,
        coords: Coordinates {
            latitude,
            longitude,
        },
    })
}

async fn handle_menu(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let request = match validate(&body) {
        Ok(r) => r,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": message })));
        }
    };

    info!(codes = request.codes.len(), "batch request received");

    match state
        .service
        .run_batch(&request.codes, request.coords)
        .await
    {
        Ok(results) => (
            StatusCode::OK,
            Json(json!({ "success": true, "results": results })),
        ),
        Err(e) => {
            error!(kind = e.kind(), error = %e, "batch failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}
