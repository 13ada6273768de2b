//! WebSocket live progress channel.
//!
//! `GET /ws/{job_id}` upgrades to a WebSocket that receives the job's
//! snapshot as a JSON text message every progress interval, or
//! `{"error":"job_id not found"}` while the job is unknown.

use axum::{
    Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use futures::{SinkExt, StreamExt, future};
use tracing::debug;

use crate::api::server::AppState;
use crate::downloader::{ProgressFrame, distributor};

pub fn router() -> Router<AppState> {
    Router::new().route("/{job_id}", get(progress_ws))
}

async fn progress_ws(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, job_id, state))
}

async fn handle_socket(socket: WebSocket, job_id: String, state: AppState) {
    let (sender, mut receiver) = socket.split();
    let cancel = state.shutdown.child_token();

    let sink = sender.with(|frame: ProgressFrame| {
        future::ready(
            serde_json::to_string(&frame)
                .map(|text| Message::Text(text.into()))
                .map_err(axum::Error::new),
        )
    });

    // Client messages are ignored; a close frame ends the push loop.
    let reader_cancel = cancel.clone();
    let reader = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            if matches!(msg, Ok(Message::Close(_)) | Err(_)) {
                break;
            }
        }
        reader_cancel.cancel();
    });

    debug!(job_id = %job_id, "Progress observer connected");
    distributor::run(
        state.download_manager.clone(),
        job_id.clone(),
        state.progress_interval,
        sink,
        cancel.clone(),
    )
    .await;

    cancel.cancel();
    reader.abort();
    debug!(job_id = %job_id, "Progress observer disconnected");
}
