use axum::routing::get;
use axum::Router;

use crate::state::AppState;

mod health;
mod metrics;
mod openapi;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(health::root))
        .route("/metrics", get(metrics::metrics))
        .route("/openapi", get(openapi::list_versions))
        .route("/openapi/:version", get(openapi::get_version))
}
