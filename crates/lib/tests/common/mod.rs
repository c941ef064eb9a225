//! Shared helpers for integration tests: a fake Slack (Web API + Socket Mode endpoint) served
//! with axum on a free local port, and a gateway runner with a shutdown trigger.

#![allow(dead_code)]

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::{get, post},
    Json, Router,
};
use pongbot::config::{Config, Settings};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

pub const BOT_USER_ID: &str = "UBOT";
pub const BOT_ID: &str = "BBOT";

/// Script entry that makes the fake close the socket instead of sending a frame.
pub const CLOSE_SOCKET: &str = "<close>";

pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind free port");
    listener.local_addr().expect("local_addr").port()
}

/// Fake Slack: records chat.postMessage calls and Socket Mode acks.
pub struct FakeSlack {
    pub addr: SocketAddr,
    auth_ok: bool,
    /// Frames for each Socket Mode connection, in connection order. Later connections get none.
    scripts: Mutex<VecDeque<Vec<String>>>,
    opens: Mutex<Vec<Instant>>,
    posted: Mutex<Vec<(String, String)>>,
    acks: Mutex<Vec<String>>,
}

impl FakeSlack {
    pub async fn start(auth_ok: bool, script: Vec<String>) -> Arc<Self> {
        Self::start_with_connections(auth_ok, vec![script]).await
    }

    /// Like [`FakeSlack::start`], with one script per Socket Mode connection.
    pub async fn start_with_connections(auth_ok: bool, scripts: Vec<Vec<String>>) -> Arc<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake slack");
        let addr = listener.local_addr().expect("local_addr");
        let fake = Arc::new(Self {
            addr,
            auth_ok,
            scripts: Mutex::new(scripts.into()),
            opens: Mutex::new(Vec::new()),
            posted: Mutex::new(Vec::new()),
            acks: Mutex::new(Vec::new()),
        });
        let app = Router::new()
            .route("/api/auth.test", post(auth_test))
            .route("/api/apps.connections.open", post(connections_open))
            .route("/api/chat.postMessage", post(post_message))
            .route("/socket", get(socket))
            .with_state(fake.clone());
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        fake
    }

    pub fn api_base(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn posted(&self) -> Vec<(String, String)> {
        self.posted.lock().unwrap().clone()
    }

    pub fn acks(&self) -> Vec<String> {
        self.acks.lock().unwrap().clone()
    }

    /// When each apps.connections.open call arrived.
    pub fn opens(&self) -> Vec<Instant> {
        self.opens.lock().unwrap().clone()
    }

    /// Poll until at least `n` messages were posted (5s max), then return them.
    pub async fn wait_for_posts(&self, n: usize) -> Vec<(String, String)> {
        for _ in 0..100 {
            let posted = self.posted();
            if posted.len() >= n {
                return posted;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("expected {} posted message(s), got {:?}", n, self.posted());
    }

    /// Poll until at least `n` envelopes were acknowledged (5s max).
    pub async fn wait_for_acks(&self, n: usize) -> Vec<String> {
        for _ in 0..100 {
            let acks = self.acks();
            if acks.len() >= n {
                return acks;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("expected {} ack(s), got {:?}", n, self.acks());
    }
}

async fn auth_test(State(fake): State<Arc<FakeSlack>>) -> Json<Value> {
    if fake.auth_ok {
        Json(json!({
            "ok": true,
            "team": "Acme",
            "user": "pongbot",
            "user_id": BOT_USER_ID,
            "bot_id": BOT_ID
        }))
    } else {
        Json(json!({ "ok": false, "error": "invalid_auth" }))
    }
}

async fn connections_open(State(fake): State<Arc<FakeSlack>>) -> Json<Value> {
    fake.opens.lock().unwrap().push(Instant::now());
    Json(json!({ "ok": true, "url": format!("ws://{}/socket", fake.addr) }))
}

async fn post_message(State(fake): State<Arc<FakeSlack>>, Json(body): Json<Value>) -> Json<Value> {
    let channel = body.get("channel").and_then(|v| v.as_str()).unwrap_or("").to_string();
    let text = body.get("text").and_then(|v| v.as_str()).unwrap_or("").to_string();
    fake.posted.lock().unwrap().push((channel.clone(), text));
    Json(json!({ "ok": true, "channel": channel, "ts": "1700000000.000100" }))
}

async fn socket(State(fake): State<Arc<FakeSlack>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| serve_socket(socket, fake))
}

async fn serve_socket(mut socket: WebSocket, fake: Arc<FakeSlack>) {
    let frames = fake.scripts.lock().unwrap().pop_front().unwrap_or_default();
    for frame in frames {
        if frame == CLOSE_SOCKET {
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        if socket.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }
    while let Some(Ok(msg)) = socket.recv().await {
        let Message::Text(text) = msg else { continue };
        let Ok(value) = serde_json::from_str::<Value>(&text) else { continue };
        if let Some(id) = value.get("envelope_id").and_then(|v| v.as_str()) {
            fake.acks.lock().unwrap().push(id.to_string());
        }
    }
}

/// Socket Mode `hello` frame.
pub fn hello_frame() -> String {
    json!({ "type": "hello", "num_connections": 1 }).to_string()
}

/// Socket Mode `disconnect` frame asking the client to reconnect.
pub fn disconnect_frame(reason: &str) -> String {
    json!({ "type": "disconnect", "reason": reason }).to_string()
}

/// Socket Mode `events_api` frame carrying a message event. Returns (envelope_id, frame).
pub fn message_frame(channel: &str, user: &str, text: &str) -> (String, String) {
    let envelope_id = uuid::Uuid::new_v4().to_string();
    let frame = json!({
        "envelope_id": envelope_id,
        "type": "events_api",
        "accepts_response_payload": false,
        "payload": event_callback(channel, user, text)
    })
    .to_string();
    (envelope_id, frame)
}

/// Events API `event_callback` body for a message event.
pub fn event_callback(channel: &str, user: &str, text: &str) -> Value {
    json!({
        "token": "unused",
        "team_id": "T1",
        "type": "event_callback",
        "event_id": format!("Ev{}", uuid::Uuid::new_v4().simple()),
        "event": {
            "type": "message",
            "channel": channel,
            "user": user,
            "text": text,
            "ts": "1700000000.000001"
        }
    })
}

/// Settings pointing at `api_base`, listening on 127.0.0.1:`port`.
pub fn test_settings(api_base: &str, port: u16, socket_mode: bool) -> Settings {
    let mut config = Config::default();
    config.gateway.port = port;
    config.gateway.bind = "127.0.0.1".to_string();
    config.slack.socket_mode = socket_mode;
    config.slack.app_token = Some("xapp-1-test".to_string());
    config.slack.bot_token = Some("xoxb-test".to_string());
    config.slack.signing_secret = Some(SIGNING_SECRET.to_string());
    config.slack.api_base_url = Some(api_base.to_string());
    Settings::resolve(&config).expect("valid test settings")
}

pub const SIGNING_SECRET: &str = "test-signing-secret";

/// Gateway running in the background; send on `shutdown` to stop it.
pub struct RunningGateway {
    pub shutdown: oneshot::Sender<()>,
    pub handle: JoinHandle<anyhow::Result<()>>,
}

impl RunningGateway {
    pub async fn stop(self) -> anyhow::Result<()> {
        let _ = self.shutdown.send(());
        tokio::time::timeout(Duration::from_secs(5), self.handle)
            .await
            .expect("gateway stops within 5s")
            .expect("gateway task not panicked")
    }
}

pub fn spawn_gateway(settings: Settings) -> RunningGateway {
    let (tx, rx) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        pongbot::gateway::run_gateway_with_shutdown(&settings, async move {
            let _ = rx.await;
        })
        .await
    });
    RunningGateway {
        shutdown: tx,
        handle,
    }
}

/// Poll GET / until the gateway answers (5s max); returns the health JSON.
pub async fn wait_for_health(port: u16) -> Value {
    let url = format!("http://127.0.0.1:{}/", port);
    let client = reqwest::Client::new();
    let mut last_err = None;
    for _ in 0..100 {
        match client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                return resp.json().await.expect("parse JSON");
            }
            Ok(_) => {}
            Err(e) => last_err = Some(e),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!(
        "GET {} did not return 200 with health JSON within 5s; last error: {:?}",
        url, last_err
    );
}
