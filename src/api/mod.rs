pub mod auth;
pub mod error;
pub mod grafana;
pub mod rest;

use crate::config::AuthConfig;
use crate::core::{InfluxService, PriceService};
use axum::{middleware, routing::get, Json, Router};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Services shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub influx: Arc<InfluxService>,
    pub price: Arc<PriceService>,
}

/// Builds the full application: `/api` and `/grafana` behind basic auth,
/// `/healthz` open.
pub fn router(state: AppState, credentials: AuthConfig) -> Router {
    let protected = Router::new()
        .nest("/api", rest::routes())
        .merge(grafana::routes())
        .route_layer(middleware::from_fn_with_state(
            Arc::new(credentials),
            auth::require_basic_auth,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
