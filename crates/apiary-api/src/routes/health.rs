use axum::extract::State;
use axum::Json;
use serde::Serialize;

use apiary_store::layout::sanitize_host;

use crate::state::AppState;

#[derive(Serialize)]
pub struct Health {
    pub msg: &'static str,
    pub services: Vec<String>,
}

pub async fn root(State(state): State<AppState>) -> Json<Health> {
    let services = state
        .cfg
        .services
        .iter()
        .map(|s| sanitize_host(&s.url))
        .collect();
    Json(Health {
        msg: "success",
        services,
    })
}
