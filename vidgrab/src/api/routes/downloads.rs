//! Download job control routes.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};

use crate::api::error::ApiResult;
use crate::api::models::{
    JobControlRequest, JobSummary, OkResponse, StartDownloadRequest, StartDownloadResponse,
};
use crate::api::server::AppState;
use crate::downloader::ProgressSnapshot;

/// Create the downloads router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/start_download", post(start_download))
        .route("/pause", post(pause_download))
        .route("/resume", post(resume_download))
        .route("/cancel", post(cancel_download))
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job))
}

/// Probe the URL, pick the audio track and start the job.
async fn start_download(
    State(state): State<AppState>,
    Json(request): Json<StartDownloadRequest>,
) -> ApiResult<Json<StartDownloadResponse>> {
    let job_id = state
        .download_manager
        .start(&request.url, &request.format_id, &request.dest_path)
        .await?;

    Ok(Json(StartDownloadResponse {
        job_id: job_id.to_string(),
    }))
}

async fn pause_download(
    State(state): State<AppState>,
    Json(request): Json<JobControlRequest>,
) -> ApiResult<Json<OkResponse>> {
    state.download_manager.pause(&request.job_id)?;
    Ok(Json(OkResponse::ok()))
}

async fn resume_download(
    State(state): State<AppState>,
    Json(request): Json<JobControlRequest>,
) -> ApiResult<Json<OkResponse>> {
    state.download_manager.resume(&request.job_id).await?;
    Ok(Json(OkResponse::ok()))
}

async fn cancel_download(
    State(state): State<AppState>,
    Json(request): Json<JobControlRequest>,
) -> ApiResult<Json<OkResponse>> {
    state.download_manager.cancel(&request.job_id).await?;
    Ok(Json(OkResponse::ok()))
}

/// All known jobs, most recently updated first.
async fn list_jobs(State(state): State<AppState>) -> Json<Vec<JobSummary>> {
    let jobs = state
        .download_manager
        .list()
        .into_iter()
        .map(|(job_id, snapshot)| JobSummary { job_id, snapshot })
        .collect();
    Json(jobs)
}

async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<ProgressSnapshot>> {
    Ok(Json(state.download_manager.snapshot(&job_id)?))
}
