//! Metadata probe route.

use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};

use crate::api::error::ApiResult;
use crate::api::models::ProbeQuery;
use crate::api::server::AppState;
use crate::downloader::ProbeResponse;

pub fn router() -> Router<AppState> {
    Router::new().route("/probe", get(probe))
}

/// Fetch title, duration and the selectable video formats for a URL.
async fn probe(
    State(state): State<AppState>,
    Query(query): Query<ProbeQuery>,
) -> ApiResult<Json<ProbeResponse>> {
    Ok(Json(state.download_manager.probe(&query.url).await?))
}
