//! Mock separation backend
//!
//! Serves the HTTP routes and the push WebSocket of the separation server on
//! a random local port. Requests are recorded so tests can assert on what the
//! client sent, and push frames are scripted from the test body.

use super::constants::*;
use axum::{
    extract::{
        ws::{Message, WebSocket},
        Multipart, Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stem_separator_client::api::SeparatorClient;
use stem_separator_client::config::AppConfig;
use stem_separator_client::job::ProcessingSettings;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

/// One multipart part received by `POST /upload`.
#[derive(Debug, Clone)]
pub struct ReceivedUpload {
    pub field: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: usize,
}

#[derive(Debug, Clone)]
enum PushCommand {
    Send(String),
    Close,
}

struct BackendState {
    fail_upload: AtomicBool,
    fail_process: AtomicBool,
    uploads: Mutex<Vec<Vec<ReceivedUpload>>>,
    process_requests: Mutex<Vec<Value>>,
    stopped: Mutex<Vec<String>>,
    client_messages: Mutex<Vec<Value>>,
    connections: AtomicUsize,
    total_connections: AtomicUsize,
    push_tx: broadcast::Sender<PushCommand>,
}

/// Mock backend instance.
///
/// When dropped, the server shuts down.
pub struct TestServer {
    /// Base URL for HTTP requests (e.g., "http://127.0.0.1:12345")
    pub base_url: String,

    /// URL of the push WebSocket
    pub ws_url: String,

    state: Arc<BackendState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestServer {
    /// Spawns a new mock backend on a random port and waits until it answers.
    pub async fn spawn() -> Self {
        let (push_tx, _) = broadcast::channel(64);
        let state = Arc::new(BackendState {
            fail_upload: AtomicBool::new(false),
            fail_process: AtomicBool::new(false),
            uploads: Mutex::new(Vec::new()),
            process_requests: Mutex::new(Vec::new()),
            stopped: Mutex::new(Vec::new()),
            client_messages: Mutex::new(Vec::new()),
            connections: AtomicUsize::new(0),
            total_connections: AtomicUsize::new(0),
            push_tx,
        });

        let app = Router::new()
            .route("/device-status", get(device_status))
            .route("/upload", post(upload))
            .route("/process", post(process))
            .route("/stop/{job_id}", post(stop))
            .route("/stems/{job_id}/{file_stem}", get(stems))
            .route("/visualize/{job_id}/{filename}/{kind}", get(visualize))
            .route("/shutdown", post(shutdown))
            .route("/download/{archive}", get(download))
            .route("/ws", get(ws_handler))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Server failed");
        });

        let server = Self {
            base_url: format!("http://127.0.0.1:{}", port),
            ws_url: format!("ws://127.0.0.1:{}/ws", port),
            state,
            _shutdown_tx: Some(shutdown_tx),
        };
        server.wait_for_ready().await;
        server
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(100))
            .build()
            .expect("Failed to build reqwest client");

        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(SERVER_READY_TIMEOUT_MS);
        while start.elapsed() < timeout {
            let url = format!("{}/device-status", self.base_url);
            if let Ok(response) = client.get(&url).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("Mock backend did not become ready");
    }

    /// HTTP client pointed at this server.
    pub fn client(&self) -> SeparatorClient {
        SeparatorClient::new(&self.base_url, Duration::from_secs(5))
            .expect("Failed to build client")
    }

    /// Client configuration with short timers.
    pub fn config(&self) -> AppConfig {
        AppConfig {
            server_url: self.base_url.clone(),
            ws_url: self.ws_url.clone(),
            request_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_millis(50),
            keepalive_interval: Duration::from_millis(100),
            handoff_delay: Duration::from_millis(20),
            notification_ttl: Duration::from_secs(5),
            processing: ProcessingSettings::default(),
        }
    }

    pub fn fail_uploads(&self) {
        self.state.fail_upload.store(true, Ordering::SeqCst);
    }

    pub fn fail_process(&self) {
        self.state.fail_process.store(true, Ordering::SeqCst);
    }

    /// Send a push frame to every connected client.
    pub fn push(&self, msg_type: &str, payload: Value) {
        let text = json!({ "type": msg_type, "payload": payload }).to_string();
        let _ = self.state.push_tx.send(PushCommand::Send(text));
    }

    /// Send raw text to every connected client.
    pub fn push_raw(&self, text: &str) {
        let _ = self.state.push_tx.send(PushCommand::Send(text.to_string()));
    }

    /// Close every push connection from the server side.
    pub fn drop_push_connections(&self) {
        let _ = self.state.push_tx.send(PushCommand::Close);
    }

    pub fn uploads(&self) -> Vec<Vec<ReceivedUpload>> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn process_requests(&self) -> Vec<Value> {
        self.state.process_requests.lock().unwrap().clone()
    }

    pub fn stopped_jobs(&self) -> Vec<String> {
        self.state.stopped.lock().unwrap().clone()
    }

    /// Client messages received on the push channel, in order.
    pub fn client_messages(&self) -> Vec<Value> {
        self.state.client_messages.lock().unwrap().clone()
    }

    pub fn count_client_messages(&self, msg_type: &str) -> usize {
        self.client_messages()
            .iter()
            .filter(|m| m["type"] == msg_type)
            .count()
    }

    /// Connections accepted since the server started.
    pub fn total_connections(&self) -> usize {
        self.state.total_connections.load(Ordering::SeqCst)
    }

    /// Waits until `count` client messages of `msg_type` have arrived.
    pub async fn wait_for_client_messages(&self, msg_type: &str, count: usize) {
        self.wait_until(|server| server.count_client_messages(msg_type) >= count)
            .await;
    }

    /// Waits until at least `count` push connections have been accepted in total
    /// and one of them is currently open.
    pub async fn wait_for_connection(&self, count: usize) {
        self.wait_until(|server| {
            server.total_connections() >= count
                && server.state.connections.load(Ordering::SeqCst) > 0
        })
        .await;
    }

    async fn wait_until(&self, condition: impl Fn(&Self) -> bool) {
        let start = std::time::Instant::now();
        let timeout = Duration::from_millis(EVENT_TIMEOUT_MS);
        while !condition(self) {
            if start.elapsed() > timeout {
                panic!("Timed out waiting on the mock backend");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

async fn device_status() -> Json<Value> {
    Json(json!({
        "cuda_available": true,
        "device_count": 1,
        "device_name": DEVICE_NAME,
    }))
}

async fn upload(State(state): State<Arc<BackendState>>, mut multipart: Multipart) -> Response {
    if state.fail_upload.load(Ordering::SeqCst) {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "Disk full");
    }

    let mut parts = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        parts.push(ReceivedUpload {
            field: name,
            file_name,
            content_type,
            size,
        });
    }
    if parts.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "No files provided");
    }

    let names: Vec<String> = parts.iter().map(|p| p.file_name.clone()).collect();
    state.uploads.lock().unwrap().push(parts);
    Json(json!({
        "job_id": JOB_ID,
        "files_count": names.len(),
        "files": names,
    }))
    .into_response()
}

async fn process(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    state.process_requests.lock().unwrap().push(body);
    if state.fail_process.load(Ordering::SeqCst) {
        return error_response(StatusCode::BAD_REQUEST, "Job not found");
    }
    Json(json!({ "status": "processing" })).into_response()
}

async fn stop(State(state): State<Arc<BackendState>>, Path(job_id): Path<String>) -> Response {
    state.stopped.lock().unwrap().push(job_id);
    Json(json!({ "status": "stopped" })).into_response()
}

async fn stems(Path((job_id, file_stem)): Path<(String, String)>) -> Json<Value> {
    if job_id != JOB_ID || file_stem != FILE_STEM {
        return Json(json!({ "stems": [] }));
    }
    Json(json!({
        "stems": [
            {
                "name": "original",
                "filename": "track.wav",
                "size": 2048,
                "url": "/download/abc/track.wav",
            },
            {
                "name": "vocals",
                "filename": "track_vocals.wav",
                "size": 1024,
                "url": "/download/abc/track_vocals.wav",
            },
            {
                "name": "drums",
                "filename": "track_drums.wav",
                "size": 1024,
                "url": "/download/abc/track_drums.wav",
            },
        ]
    }))
}

async fn visualize(Path((_job_id, _filename, kind)): Path<(String, String, String)>) -> Json<Value> {
    if kind == "analysis" {
        Json(json!({ "error": ANALYSIS_ERROR }))
    } else {
        Json(json!({ "image": PNG_DATA_URL }))
    }
}

async fn shutdown() -> Json<Value> {
    Json(json!({ "status": "shutting down" }))
}

async fn download(Path(archive): Path<String>) -> Response {
    if ARCHIVE_PATH.ends_with(&archive) {
        ARCHIVE_BYTES.into_response()
    } else {
        error_response(StatusCode::NOT_FOUND, "File not found")
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<BackendState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(mut socket: WebSocket, state: Arc<BackendState>) {
    let mut push_rx = state.push_tx.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);
    state.total_connections.fetch_add(1, Ordering::SeqCst);

    let connected = json!({ "type": "connected", "payload": { "status": "connected" } });
    if socket
        .send(Message::Text(connected.to_string().into()))
        .await
        .is_ok()
    {
        loop {
            tokio::select! {
                incoming = socket.recv() => match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(value) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        state.client_messages.lock().unwrap().push(value.clone());
                        let reply = match value["type"].as_str() {
                            Some("join_job") => Some(json!({
                                "type": "joined_job",
                                "payload": { "job_id": value["payload"]["job_id"] },
                            })),
                            Some("ping") => Some(json!({ "type": "pong", "payload": {} })),
                            _ => None,
                        };
                        if let Some(reply) = reply {
                            if socket.send(Message::Text(reply.to_string().into())).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
                command = push_rx.recv() => match command {
                    Ok(PushCommand::Send(text)) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Ok(PushCommand::Close) => {
                        let _ = socket.send(Message::Close(None)).await;
                        break;
                    }
                    Err(_) => break,
                },
            }
        }
    }

    state.connections.fetch_sub(1, Ordering::SeqCst);
}
