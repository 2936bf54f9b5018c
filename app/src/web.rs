use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use error_stack::ResultExt;
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;
use tracing::info;

use crate::config::Config;
use crate::sequence::Sequencer;
use crate::state::{AngleSet, AngleStore, StatusSnapshot};
use crate::stream::Streamer;
use crate::{Rig, RigError};

pub struct AppState {
    pub config: Config,
    pub angles: AngleStore,
    pub rig: Mutex<Rig>,
    pub stream: Mutex<Option<Streamer>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(config: Config, rig: Rig) -> SharedState {
        Arc::new(Self {
            config,
            angles: AngleStore::new(),
            rig: Mutex::new(rig),
            stream: Mutex::new(None),
        })
    }
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/receive_angles", post(receive_angles))
        .route("/api/get_status", get(get_status))
        .route("/start_rotation", post(start_rotation))
        .route("/clear_angles", post(clear_angles))
        .route("/send_angles", post(send_angles))
        .route("/api/video_feed", get(video_feed))
        .route("/api/start_stream", post(start_stream))
        .route("/api/stop_stream", post(stop_stream))
        .route("/api/stream_status", get(stream_status))
        .route("/api/camera_status", get(camera_status))
        .with_state(state)
}

pub async fn serve(state: SharedState) -> error_stack::Result<(), RigError> {
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .change_context(RigError::ServerError)
        .attach_printable_lazy(|| format!("couldn't bind {addr}"))?;

    info!("listening on http://{addr}");
    axum::serve(listener, router(state))
        .await
        .change_context(RigError::ServerError)
}

#[derive(Serialize, Debug)]
pub struct ApiResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ApiResponse {
    fn ok(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: true,
            message: Some(message.into()),
            error: None,
        })
    }

    fn err(error: impl Into<String>) -> Json<Self> {
        Json(Self {
            success: false,
            message: None,
            error: Some(error.into()),
        })
    }
}

#[derive(Deserialize, Debug)]
pub struct ReceiveAngles {
    pub angles: Vec<f64>,
}

async fn index(State(state): State<SharedState>) -> Html<String> {
    let snapshot = state.angles.snapshot();
    let angles = snapshot
        .angles
        .map(|set| format!("{set:?}"))
        .unwrap_or_else(|| "none".into());

    Html(format!(
        "<!DOCTYPE html><html><head><title>Camera rig</title></head><body>\
         <h1>Rotating camera rig</h1>\
         <p>Angles: {angles}</p>\
         <p>Received: {}</p>\
         <p>Status: {}</p>\
         <p><a href=\"/api/video_feed\">live feed</a></p>\
         </body></html>",
        snapshot.timestamp.as_deref().unwrap_or("never"),
        snapshot.status,
    ))
}

async fn receive_angles(
    State(state): State<SharedState>,
    payload: Result<Json<ReceiveAngles>, JsonRejection>,
) -> Json<ApiResponse> {
    let Json(payload) = match payload {
        Ok(json) => json,
        Err(rejection) => return ApiResponse::err(format!("bad angle payload: {rejection}")),
    };

    match AngleSet::try_from_degrees(&payload.angles) {
        Ok(set) => {
            state.angles.set(set);
            info!("received angle targets {set}");
            ApiResponse::ok(format!("angles {set} stored"))
        }
        Err(message) => ApiResponse::err(message),
    }
}

async fn get_status(State(state): State<SharedState>) -> Json<StatusSnapshot> {
    Json(state.angles.snapshot())
}

/// Runs the whole rotation sequence while the request waits; the response
/// is the sequencer's terminal message. Expect this to block for many
/// minutes on real hardware.
async fn start_rotation(State(state): State<SharedState>) -> Response {
    if state.stream.lock().unwrap().is_some() {
        return (
            StatusCode::CONFLICT,
            "stop the video stream before starting a rotation sequence\n",
        )
            .into_response();
    }

    let result = tokio::task::spawn_blocking(move || {
        let mut rig = state.rig.lock().unwrap();
        Sequencer::new(&mut rig, &state.angles, &state.config).run_sequence()
    })
    .await;

    match result {
        Ok(Ok(message)) => (StatusCode::OK, format!("{message}\n")).into_response(),
        Ok(Err(report)) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("sequence failed: {report}\n"),
        )
            .into_response(),
        Err(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "sequence worker crashed\n".to_string(),
        )
            .into_response(),
    }
}

async fn clear_angles(State(state): State<SharedState>) -> &'static str {
    state.angles.clear();
    info!("angle store cleared");
    "angles cleared\n"
}

/// Manual direct drive: validate like `receive_angles`, then write the set
/// straight to the motor link.
async fn send_angles(
    State(state): State<SharedState>,
    payload: Result<Json<ReceiveAngles>, JsonRejection>,
) -> Json<ApiResponse> {
    let Json(payload) = match payload {
        Ok(json) => json,
        Err(rejection) => return ApiResponse::err(format!("bad angle payload: {rejection}")),
    };
    let set = match AngleSet::try_from_degrees(&payload.angles) {
        Ok(set) => set,
        Err(message) => return ApiResponse::err(message),
    };

    let worker_state = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let mut rig = worker_state.rig.lock().unwrap();
        rig.motor.send_angle_set(&set)
    })
    .await;

    match result {
        Ok(Ok(())) => {
            state.angles.set(set);
            ApiResponse::ok(format!("angles {set} sent to the motor"))
        }
        Ok(Err(report)) => ApiResponse::err(format!("motor link failed: {report}")),
        Err(_) => ApiResponse::err("motor worker crashed"),
    }
}

async fn video_feed(State(state): State<SharedState>) -> Response {
    let frames = match state.stream.lock().unwrap().as_ref() {
        Some(streamer) => streamer.frames(),
        None => {
            return (StatusCode::SERVICE_UNAVAILABLE, "stream is not running\n").into_response()
        }
    };

    let body = Body::from_stream(
        WatchStream::new(frames)
            .filter(|frame| !frame.is_empty())
            .map(|frame| Ok::<_, Infallible>(mjpeg_part(&frame))),
    );

    (
        [(
            header::CONTENT_TYPE,
            "multipart/x-mixed-replace; boundary=frame",
        )],
        body,
    )
        .into_response()
}

fn mjpeg_part(frame: &Bytes) -> Bytes {
    let mut part = Vec::with_capacity(frame.len() + 64);
    part.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n");
    part.extend_from_slice(format!("Content-Length: {}\r\n\r\n", frame.len()).as_bytes());
    part.extend_from_slice(frame);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

async fn start_stream(State(state): State<SharedState>) -> Json<ApiResponse> {
    // still capture and streaming are mutually exclusive
    if state.rig.try_lock().is_err() {
        return ApiResponse::err("a rotation sequence is running; streaming is unavailable");
    }

    let mut slot = state.stream.lock().unwrap();
    if slot.is_some() {
        return ApiResponse::ok("stream already running");
    }

    match Streamer::start(&state.config.camera) {
        Ok(streamer) => {
            *slot = Some(streamer);
            ApiResponse::ok("stream started")
        }
        Err(report) => ApiResponse::err(format!("couldn't start stream: {report}")),
    }
}

async fn stop_stream(State(state): State<SharedState>) -> Json<ApiResponse> {
    let streamer = state.stream.lock().unwrap().take();
    match streamer {
        Some(streamer) => {
            streamer.stop();
            ApiResponse::ok("stream stopped")
        }
        None => ApiResponse::ok("stream was not running"),
    }
}

#[derive(Serialize, Debug)]
struct StreamStatus {
    streaming: bool,
}

async fn stream_status(State(state): State<SharedState>) -> Json<StreamStatus> {
    Json(StreamStatus {
        streaming: state.stream.lock().unwrap().is_some(),
    })
}

#[derive(Serialize, Debug)]
struct CameraStatus {
    initialized: bool,
    streaming: bool,
    sequence_running: bool,
}

async fn camera_status(State(state): State<SharedState>) -> Json<CameraStatus> {
    let streaming = state.stream.lock().unwrap().is_some();
    match state.rig.try_lock() {
        Ok(rig) => Json(CameraStatus {
            initialized: rig.camera.is_initialized(),
            streaming,
            sequence_running: false,
        }),
        // a sequence holds the rig; its camera is in use
        Err(_) => Json(CameraStatus {
            initialized: true,
            streaming,
            sequence_running: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::camera::CameraDevice;
    use crate::motor::{MotorLink, SimulatedLink};
    use crate::notifier::HttpNotifier;
    use crate::state::IDLE_STATUS;

    /// Always-succeeding camera that never touches the disk.
    struct NullCamera {
        captures: Arc<AtomicU32>,
        releases: Arc<AtomicU32>,
    }

    impl CameraDevice for NullCamera {
        fn initialize(&mut self) -> error_stack::Result<(), RigError> {
            Ok(())
        }

        fn capture(&mut self, name: &str) -> error_stack::Result<PathBuf, RigError> {
            self.captures.fetch_add(1, Ordering::SeqCst);
            Ok(PathBuf::from(name))
        }

        fn release(&mut self) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }

        fn is_initialized(&self) -> bool {
            false
        }
    }

    struct Counters {
        captures: Arc<AtomicU32>,
        releases: Arc<AtomicU32>,
    }

    fn test_state() -> (SharedState, Counters) {
        let mut config = Config::default();
        config.sequence.poll_interval_ms = 5;
        config.sequence.angle_wait_secs = 1;

        let counters = Counters {
            captures: Arc::new(AtomicU32::new(0)),
            releases: Arc::new(AtomicU32::new(0)),
        };
        let rig = Rig {
            motor: Box::new(SimulatedLink::new(&config.motor)) as Box<dyn MotorLink>,
            camera: Box::new(NullCamera {
                captures: counters.captures.clone(),
                releases: counters.releases.clone(),
            }),
            notifier: Box::new(HttpNotifier::new(&config.notifier)),
        };
        (AppState::new(config, rig), counters)
    }

    fn angles_payload(angles: &[f64]) -> Result<Json<ReceiveAngles>, JsonRejection> {
        Ok(Json(ReceiveAngles {
            angles: angles.to_vec(),
        }))
    }

    #[tokio::test]
    async fn accepted_angles_round_trip_through_status() {
        let (state, _) = test_state();

        let reply = receive_angles(State(state.clone()), angles_payload(&[90.0, 45.0, 135.0, 60.0]))
            .await;
        assert!(reply.0.success);

        let status = get_status(State(state)).await;
        assert_eq!(status.0.angles, Some([90, 45, 135, 60]));
        assert!(status.0.timestamp.is_some());
    }

    #[tokio::test]
    async fn invalid_angles_are_rejected_without_mutation() {
        let (state, _) = test_state();

        let reply =
            receive_angles(State(state.clone()), angles_payload(&[90.0, 45.0, 181.0, 60.0])).await;
        assert!(!reply.0.success);
        assert!(reply.0.error.as_deref().unwrap().contains("angle 3"));

        let status = get_status(State(state)).await;
        assert_eq!(status.0.angles, None);
        assert_eq!(status.0.status, IDLE_STATUS);
    }

    #[tokio::test]
    async fn clear_angles_resets_to_idle() {
        let (state, _) = test_state();

        receive_angles(State(state.clone()), angles_payload(&[1.0, 2.0, 3.0, 4.0])).await;
        clear_angles(State(state.clone())).await;

        let status = get_status(State(state)).await;
        assert_eq!(status.0.angles, None);
        assert_eq!(status.0.status, IDLE_STATUS);
    }

    #[tokio::test]
    async fn end_to_end_sequence_with_simulated_devices() {
        let (state, counters) = test_state();

        let reply = receive_angles(State(state.clone()), angles_payload(&[90.0, 45.0, 135.0, 60.0]))
            .await;
        assert!(reply.0.success);

        let response = start_rotation(State(state.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);

        // 90 sweep photos plus 4 angle photos, camera released exactly once
        assert_eq!(counters.captures.load(Ordering::SeqCst), 94);
        assert_eq!(counters.releases.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn send_angles_drives_the_motor_directly() {
        let (state, _) = test_state();

        let reply = send_angles(State(state.clone()), angles_payload(&[10.0, 20.0, 30.0, 40.0])).await;
        assert!(reply.0.success);
        assert_eq!(state.angles.snapshot().angles, Some([10, 20, 30, 40]));
    }

    #[test]
    fn api_response_uses_message_or_error_exclusively() {
        let ok = serde_json::to_value(&ApiResponse::ok("stored").0).unwrap();
        assert_eq!(ok["success"], true);
        assert_eq!(ok["message"], "stored");
        assert!(ok.get("error").is_none());

        let err = serde_json::to_value(&ApiResponse::err("nope").0).unwrap();
        assert_eq!(err["success"], false);
        assert_eq!(err["error"], "nope");
        assert!(err.get("message").is_none());
    }
}
