//! HTTP surface tests against the full router, including the WebSocket
//! progress channel on a real listener.

mod common;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures::StreamExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use common::{Fixture, wait_for_status};
use vidgrab::api::{ApiServer, ApiServerConfig, AppState};
use vidgrab::downloader::JobStatus;

fn router(fx: &Fixture) -> Router {
    let state = AppState::new(Arc::clone(&fx.manager));
    ApiServer::new(ApiServerConfig::default(), state).build_router()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn post(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

mod control_tests {
    use super::*;

    #[tokio::test]
    async fn test_start_download_validation() {
        let fx = Fixture::new();
        let app = router(&fx);

        let (status, body) = send(
            &app,
            post("/api/start_download", json!({ "url": "https://example.com/ok" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(fx.manager.job_count(), 0);
    }

    #[tokio::test]
    async fn test_start_download_with_failing_probe() {
        let fx = Fixture::new();
        let app = router(&fx);

        let (status, body) = send(
            &app,
            post(
                "/api/start_download",
                json!({ "url": "https://example.com/bad", "format_id": "137", "dest_path": fx.dest_str() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "PROBE_FAILED");
        assert!(body["message"].as_str().unwrap().contains("Unsupported URL"));
    }

    #[tokio::test]
    async fn test_start_then_inspect_job() {
        let fx = Fixture::new();
        let app = router(&fx);

        let (status, body) = send(
            &app,
            post(
                "/api/start_download",
                json!({ "url": "https://example.com/ok", "format_id": "137", "dest_path": fx.dest_str() }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let job_id = body["job_id"].as_str().unwrap().to_string();

        wait_for_status(&fx.manager, &job_id, JobStatus::Done).await;

        let (status, body) = send(&app, get(&format!("/api/jobs/{}", job_id))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "done");
        assert_eq!(body["selected_format"], "137+140");
        assert_eq!(body["progress"], 100.0);

        let (status, body) = send(&app, get("/api/jobs")).await;
        assert_eq!(status, StatusCode::OK);
        let jobs = body.as_array().unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0]["job_id"], job_id.as_str());
        assert_eq!(jobs[0]["status"], "done");

        let (status, body) = send(&app, post("/api/resume", json!({ "job_id": job_id }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "INVALID_STATE");

        let (status, body) = send(&app, post("/api/pause", json!({ "job_id": job_id }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "ok": true }));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let fx = Fixture::new();
        let app = router(&fx);

        for action in ["pause", "resume", "cancel"] {
            let (status, body) = send(
                &app,
                post(&format!("/api/{}", action), json!({ "job_id": "missing" })),
            )
            .await;
            assert_eq!(status, StatusCode::NOT_FOUND, "{}", action);
            assert_eq!(body["code"], "NOT_FOUND");
        }

        let (status, _) = send(&app, get("/api/jobs/missing")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_cancel_running_job_over_http() {
        let fx = Fixture::new();
        let app = router(&fx);

        let job_id = fx
            .manager
            .start("https://example.com/slow", "137", &fx.dest_str())
            .await
            .unwrap()
            .to_string();
        wait_for_status(&fx.manager, &job_id, JobStatus::Downloading).await;

        let (status, _) = send(&app, post("/api/cancel", json!({ "job_id": job_id }))).await;
        assert_eq!(status, StatusCode::OK);
        fx.manager.wait(&job_id).await.unwrap();

        let (_, body) = send(&app, get(&format!("/api/jobs/{}", job_id))).await;
        assert_eq!(body["status"], "error");
        assert_eq!(body["message"], "Download cancelled.");
    }
}

mod probe_tests {
    use super::*;

    #[tokio::test]
    async fn test_probe_returns_video_table() {
        let fx = Fixture::new();
        let app = router(&fx);

        let (status, body) = send(&app, get("/api/probe?url=https://example.com/ok")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["title"], "Test Clip");
        assert_eq!(body["duration"], "00:01:15");
        assert_eq!(body["all_formats_raw"].as_array().unwrap().len(), 6);

        let ids: Vec<&str> = body["table_formats"]
            .as_array()
            .unwrap()
            .iter()
            .map(|f| f["format_id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 3);
        assert!(ids[..2].contains(&"137") && ids[..2].contains(&"248"));
        assert_eq!(ids[2], "136");
    }

    #[tokio::test]
    async fn test_probe_requires_url() {
        let fx = Fixture::new();
        let app = router(&fx);

        let (status, body) = send(&app, get("/api/probe")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_ERROR");
    }
}

mod service_tests {
    use super::*;

    #[tokio::test]
    async fn test_health_reports_engine() {
        let fx = Fixture::new();
        let app = router(&fx);

        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["engine"]["name"], "scripted");
        assert_eq!(body["engine"]["version"], "scripted-1.0");
        assert_eq!(body["jobs"], 0);

        let (status, body) = send(&app, get("/health/live")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "alive");
    }

    #[tokio::test]
    async fn test_logging_filter_unavailable_without_config() {
        let fx = Fixture::new();
        let app = router(&fx);

        let (status, body) = send(&app, get("/api/logging/filter")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");
    }
}

mod progress_ws_tests {
    use super::*;

    async fn serve(fx: &Fixture) -> (String, Arc<ApiServer>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState::new(Arc::clone(&fx.manager))
            .with_progress_interval(Duration::from_millis(20));
        let server = Arc::new(ApiServer::new(ApiServerConfig::default(), state));

        let running = Arc::clone(&server);
        tokio::spawn(async move {
            running.serve(listener).await.unwrap();
        });
        (format!("ws://{}", addr), server)
    }

    async fn next_frame<S>(socket: &mut S) -> Value
    where
        S: futures::Stream<
                Item = Result<
                    tokio_tungstenite::tungstenite::Message,
                    tokio_tungstenite::tungstenite::Error,
                >,
            > + Unpin,
    {
        loop {
            let msg = tokio::time::timeout(Duration::from_secs(5), socket.next())
                .await
                .expect("frame in time")
                .expect("socket open")
                .unwrap();
            if msg.is_text() {
                return serde_json::from_str(msg.to_text().unwrap()).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_unknown_job_gets_not_found_frames() {
        let fx = Fixture::new();
        let (base, server) = serve(&fx).await;

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("{}/ws/missing", base))
            .await
            .unwrap();
        for _ in 0..2 {
            assert_eq!(next_frame(&mut socket).await, json!({ "error": "job_id not found" }));
        }
        server.shutdown();
    }

    #[tokio::test]
    async fn test_observer_sees_job_finish() {
        let fx = Fixture::new();
        let (base, server) = serve(&fx).await;
        let job_id = fx
            .manager
            .start("https://example.com/ok", "137", &fx.dest_str())
            .await
            .unwrap()
            .to_string();

        let (mut socket, _) = tokio_tungstenite::connect_async(format!("{}/ws/{}", base, job_id))
            .await
            .unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        let last = loop {
            let frame = next_frame(&mut socket).await;
            if frame["status"] == "done" || std::time::Instant::now() > deadline {
                break frame;
            }
        };
        assert_eq!(last["status"], "done");
        assert_eq!(last["video_title"], "Test Clip");
        server.shutdown();
    }
}
