//! HTTP gateway: four webhook-style routes driving the player session.
//!
//! Every route answers 200 with a fixed-shape status body. The callers
//! are physical buttons with no way to act on failure detail, so player
//! errors are logged server-side and never surfaced.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use crate::session::PlayerSession;

/// Body of a /changeVideo request, as sent by the Flic button hub.
/// Tolerant by design: absent or malformed fields make the request a
/// no-op, not an error.
#[derive(Debug, Default, Deserialize)]
pub struct ChangeVideoRequest {
  #[serde(rename = "video-id")]
  pub video_id: Option<u32>,
  /// Opaque passthrough (single/double/hold); logged only.
  #[serde(rename = "click-type")]
  pub click_type: Option<serde_json::Value>,
}

pub fn build_router(session: Arc<PlayerSession>) -> Router {
  Router::new()
    .route("/changeVideo", post(change_video))
    .route("/close", post(close))
    .route("/pause", post(pause))
    .route("/health", get(health))
    .with_state(session)
}

async fn change_video(
  State(session): State<Arc<PlayerSession>>,
  body: Bytes,
) -> Json<serde_json::Value> {
  let request: ChangeVideoRequest = match serde_json::from_slice(&body) {
    Ok(r) => r,
    Err(e) => {
      log::warn!("Unparseable changeVideo body: {}", e);
      ChangeVideoRequest::default()
    }
  };

  log::info!(
    "changeVideo request: video-id={:?}, click-type={:?}",
    request.video_id,
    request.click_type
  );

  if let Some(id) = request.video_id {
    session.play_action(id).await;
  }

  Json(json!({ "status": "success", "video-id": request.video_id }))
}

async fn close(State(session): State<Arc<PlayerSession>>) -> Json<serde_json::Value> {
  log::info!("close request: returning to idle video");
  session.return_to_idle().await;
  Json(json!({ "status": "success" }))
}

async fn pause(State(session): State<Arc<PlayerSession>>) -> Json<serde_json::Value> {
  log::info!("pause request");
  session.toggle_pause().await;
  Json(json!({ "status": "success" }))
}

async fn health(State(session): State<Arc<PlayerSession>>) -> Json<serde_json::Value> {
  let snapshot = session.health().await;
  Json(json!({
    "status": if snapshot.degraded { "degraded" } else { "ok" },
    "mode": snapshot.mode,
    "playerAlive": snapshot.player_alive,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::catalog::VideoCatalog;
  use crate::config::Config;
  use crate::mpv::MpvClient;
  use axum::body::Body;
  use axum::http::{Request, StatusCode};
  use std::collections::BTreeMap;
  use std::fs::File;
  use tempfile::TempDir;
  use tower::ServiceExt;

  /// Session backed by a real catalog but a never-started player; every
  /// IPC call fails and gets swallowed, which is exactly the error path
  /// the gateway contract promises to hide.
  fn test_session(dir: &TempDir) -> Arc<PlayerSession> {
    let idle = dir.path().join("idle.mp4");
    File::create(&idle).unwrap();
    let one = dir.path().join("one.mp4");
    File::create(&one).unwrap();

    let mut videos = BTreeMap::new();
    videos.insert(1, one);
    let catalog = VideoCatalog::new(idle, videos).unwrap();

    let config = Config::default();
    let mpv = MpvClient::new(None, "/tmp/flicvid-test.sock".to_string(), Vec::new());
    PlayerSession::new(mpv, catalog, &config)
  }

  fn test_router(dir: &TempDir) -> Router {
    build_router(test_session(dir))
  }

  async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    serde_json::from_slice(&bytes).unwrap()
  }

  #[tokio::test]
  async fn test_change_video_unknown_id_still_succeeds() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let response = app
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/changeVideo")
          .header("content-type", "application/json")
          .body(Body::from(r#"{"video-id": 42, "click-type": "click"}"#))
          .unwrap(),
      )
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
    assert_eq!(json["video-id"], 42);
  }

  #[tokio::test]
  async fn test_change_video_garbage_body_still_succeeds() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let response = app
      .oneshot(
        Request::builder()
          .method("POST")
          .uri("/changeVideo")
          .body(Body::from("not json at all"))
          .unwrap(),
      )
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "success");
  }

  #[tokio::test]
  async fn test_close_is_idempotent_and_succeeds() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    for _ in 0..2 {
      let response = app
        .clone()
        .oneshot(Request::builder().method("POST").uri("/close").body(Body::empty()).unwrap())
        .await
        .unwrap();
      assert_eq!(response.status(), StatusCode::OK);
      let json = body_json(response).await;
      assert_eq!(json["status"], "success");
    }
  }

  #[tokio::test]
  async fn test_pause_succeeds_with_dead_player() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let response = app
      .oneshot(Request::builder().method("POST").uri("/pause").body(Body::empty()).unwrap())
      .await
      .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn test_health_reports_mode_and_liveness() {
    let dir = TempDir::new().unwrap();
    let app = test_router(&dir);

    let response = app
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["mode"], "idle");
    assert_eq!(json["playerAlive"], false);
  }

  #[tokio::test]
  async fn test_health_reports_degraded() {
    let dir = TempDir::new().unwrap();
    let session = test_session(&dir);
    session.force_degraded().await;
    let app = build_router(session);

    let response = app
      .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
      .await
      .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["mode"], "idle");
  }
}
