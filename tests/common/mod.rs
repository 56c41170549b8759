//! Loopback servers for integration tests: a scripted stand-in for the
//! conversion service and the relay itself.

use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use mp3_relay::{AppState, QueueRetryPolicy, RelayConfig, build_router};
use serde_json::Value;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    Status(StatusCode),
    Raw(&'static str),
    /// Holds the connection open before answering with the inner reply.
    Slow(Duration, Box<Reply>),
}

#[derive(Default)]
struct Script {
    replies: Vec<Reply>,
    requests: Vec<String>,
}

/// Replays `replies` in order; the last one repeats once the script runs out.
#[derive(Clone)]
pub struct MockUpstream {
    pub url: String,
    script: Arc<Mutex<Script>>,
}

impl MockUpstream {
    pub async fn start(replies: Vec<Reply>) -> Self {
        let script = Arc::new(Mutex::new(Script {
            replies,
            requests: Vec::new(),
        }));
        let app = Router::new()
            .route("/dl2025.php", post(handle))
            .with_state(Arc::clone(&script));
        let base = serve(app).await;
        Self {
            url: format!("{base}/dl2025.php"),
            script,
        }
    }

    pub fn calls(&self) -> usize {
        self.script.lock().unwrap().requests.len()
    }

    /// Raw multipart bodies received so far.
    pub fn requests(&self) -> Vec<String> {
        self.script.lock().unwrap().requests.clone()
    }
}

async fn handle(State(script): State<Arc<Mutex<Script>>>, body: String) -> Response {
    let mut reply = {
        let mut script = script.lock().unwrap();
        let index = script.requests.len().min(script.replies.len() - 1);
        script.requests.push(body);
        script.replies[index].clone()
    };
    while let Reply::Slow(delay, inner) = reply {
        tokio::time::sleep(delay).await;
        reply = *inner;
    }
    match reply {
        Reply::Json(value) => Json(value).into_response(),
        Reply::Status(status) => (status, "upstream unavailable").into_response(),
        Reply::Raw(text) => text.into_response(),
        Reply::Slow(..) => unreachable!("slow replies are unwrapped above"),
    }
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Relay configuration pointed at `upstream` with millisecond retry delays.
pub fn test_config(upstream: &MockUpstream) -> RelayConfig {
    let mut config = RelayConfig::default();
    config.upstream.url = upstream.url.clone();
    config.upstream.request_timeout = Duration::from_secs(5);
    config.queue_retry = QueueRetryPolicy {
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        ..QueueRetryPolicy::default()
    };
    config.deadline = Duration::from_secs(10);
    config
}

/// Serves the relay on a loopback port and returns its base URL.
pub async fn start_relay(config: RelayConfig) -> String {
    let state = AppState::new(&config).unwrap();
    let app = build_router(&config, state).unwrap();
    serve(app).await
}

/// `GET /download`, with the `url` query parameter when given.
pub async fn request_download(relay: &str, video_url: Option<&str>) -> reqwest::Response {
    let mut request = reqwest::Client::new().get(format!("{relay}/download"));
    if let Some(video_url) = video_url {
        request = request.query(&[("url", video_url)]);
    }
    request.send().await.unwrap()
}
