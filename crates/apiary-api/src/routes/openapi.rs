use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use apiary_core::version::today_utc;
use apiary_core::{Stability, Version, VersionSet};
use apiary_store::StoreError;

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

static VERSION_REQUESTED: HeaderName = HeaderName::from_static("x-snyk-version-requested");
static VERSION_SERVED: HeaderName = HeaderName::from_static("x-snyk-version-served");

pub async fn list_versions(State(state): State<AppState>) -> ApiResult<Json<Vec<String>>> {
    let versions = state
        .storage
        .versions()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(Json(versions))
}

/// Serve the collated document for a requested version. The raw request is
/// echoed back even on errors; the served header reflects the stability the
/// client asked for.
pub async fn get_version(
    Path(raw): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&raw) {
        headers.insert(VERSION_REQUESTED.clone(), value);
    }

    match serve_version(&state, &raw).await {
        Ok((served, body)) => {
            if let Ok(value) = HeaderValue::from_str(&served.to_string()) {
                headers.insert(VERSION_SERVED.clone(), value);
            }
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            (StatusCode::OK, headers, body).into_response()
        }
        Err(err) => (err.status(), headers, err.to_string()).into_response(),
    }
}

/// A request is either a full version or a bare stability label, which gets
/// today's UTC date substituted.
fn parse_query(raw: &str) -> Result<Version, ApiError> {
    if let Ok(version) = Version::parse(raw) {
        return Ok(version);
    }
    raw.parse::<Stability>()
        .map(|stability| Version::new(today_utc(), stability))
        .map_err(|_| ApiError::BadRequest(format!("invalid version {raw:?}")))
}

async fn serve_version(state: &AppState, raw: &str) -> Result<(Version, Vec<u8>), ApiError> {
    let query = parse_query(raw)?;

    let available = state
        .storage
        .versions()
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    let set = available
        .iter()
        .map(|s| Version::parse(s))
        .collect::<Result<VersionSet, _>>()
        .map_err(|e| ApiError::Internal(format!("corrupt version list: {e}")))?;

    let resolved = set.resolve(query).map_err(|_| ApiError::NotFound)?;

    let body = state
        .storage
        .version(&resolved.canonical().to_string())
        .await
        .map_err(|e| match e {
            StoreError::NoMatchingVersion => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        })?;

    Ok((resolved.with_stability(query.stability), body))
}
