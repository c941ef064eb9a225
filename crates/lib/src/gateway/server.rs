//! Gateway HTTP server and inbound dispatcher (single port).

use crate::channels::slack::{self, EventsApiBody, SlackChannel, SlackIdentity};
use crate::channels::{ChannelRegistry, InboundMessage};
use crate::config::Settings;
use crate::responder::{MessageEvent, Responder};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};

const INBOUND_QUEUE_CAPACITY: usize = 64;

const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
const SIGNATURE_HEADER: &str = "X-Slack-Signature";

/// Shared state for the HTTP routes.
#[derive(Clone)]
pub struct GatewayState {
    pub settings: Arc<Settings>,
    /// Sender for inbound channel messages (Events API POSTs). The dispatcher task receives.
    pub inbound_tx: mpsc::Sender<InboundMessage>,
}

/// Run the gateway until SIGINT or SIGTERM.
pub async fn run_gateway(settings: &Settings) -> Result<()> {
    run_gateway_with_shutdown(settings, shutdown_signal()).await
}

/// Run the gateway: verify the bot token with auth.test, start the Slack connector and the
/// dispatcher, bind `settings.bind:settings.port`, and print the startup line.
/// Returns after `shutdown` completes and channel tasks have finished.
pub async fn run_gateway_with_shutdown<F>(settings: &Settings, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let slack = Arc::new(SlackChannel::new(settings));
    let identity = slack
        .auth_test()
        .await
        .context("slack auth.test failed (check SLACK_BOT_TOKEN)")?;
    log::info!(
        "authenticated as {} (bot {})",
        identity.user_id,
        identity.bot_id.as_deref().unwrap_or("-")
    );

    let registry = Arc::new(ChannelRegistry::new());
    registry.register(slack.clone()).await;
    let responder = Arc::new(Responder::new(settings.match_policy));
    log::info!("responder ready (match policy {:?})", responder.policy());

    let (inbound_tx, inbound_rx) = mpsc::channel::<InboundMessage>(INBOUND_QUEUE_CAPACITY);
    let dispatcher = tokio::spawn(run_dispatcher(
        inbound_rx,
        registry.clone(),
        responder,
        identity,
    ));

    let mut channel_tasks: Vec<JoinHandle<()>> = Vec::new();
    if settings.socket_mode {
        channel_tasks.push(slack.clone().start_socket_mode(inbound_tx.clone()));
        log::info!("slack channel registered and socket mode loop started");
    } else {
        log::info!("slack channel registered (events API at POST /slack/events)");
    }

    let state = GatewayState {
        settings: Arc::new(settings.clone()),
        inbound_tx,
    };
    let app = Router::new()
        .route("/", get(health_http))
        .route("/slack/events", post(slack_events))
        .with_state(state);

    let bind_addr = format!("{}:{}", settings.bind, settings.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    log::info!("gateway listening on {}", bind_addr);
    println!("⚡️ Slack bot is running on port {}", settings.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("gateway server exited")?;

    log::info!("stopping channels: {}", registry.ids().await.join(", "));
    registry.stop_all().await;
    for h in channel_tasks {
        let _ = h.await;
    }
    // The dispatcher returns once in-flight replies have finished.
    let _ = dispatcher.await;
    log::info!("gateway stopped");
    Ok(())
}

/// Receive inbound messages and spawn one task per matching message. Ends when every sender is
/// dropped and the spawned reply tasks have finished.
async fn run_dispatcher(
    mut inbound_rx: mpsc::Receiver<InboundMessage>,
    registry: Arc<ChannelRegistry>,
    responder: Arc<Responder>,
    identity: SlackIdentity,
) {
    let mut tasks = JoinSet::new();
    while let Some(msg) = inbound_rx.recv().await {
        while tasks.try_join_next().is_some() {}
        if identity.is_own_message(&msg) {
            log::debug!("ignoring own message in {}", msg.conversation_id);
            continue;
        }
        let keywords: Vec<&str> = msg
            .text
            .as_deref()
            .map(|text| responder.matching_keywords(text).collect())
            .unwrap_or_default();
        if keywords.is_empty() {
            log::debug!("inbound: no listener matched in {}", msg.conversation_id);
            continue;
        }
        log::debug!("inbound: {} matched {:?}", msg.conversation_id, keywords);
        let Some(reply) = registry.get(&msg.channel_id).await else {
            log::warn!("inbound: no channel registered for {}", msg.channel_id);
            continue;
        };
        let responder = responder.clone();
        tasks.spawn(async move {
            let event = MessageEvent::new(msg, reply);
            let report = responder.dispatch(&event).await;
            for (keyword, e) in &report.failed {
                log::warn!(
                    "inbound: {} reply to {} failed: {}",
                    keyword,
                    event.message.conversation_id,
                    e
                );
            }
        });
    }
    while tasks.join_next().await.is_some() {}
    log::debug!("inbound dispatcher stopped");
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                log::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    log::info!("shutdown signal received, stopping channels");
}

/// GET / returns a simple health JSON (for health checks).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "port": state.settings.port,
        "mode": state.settings.mode_name(),
    }))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
}

fn unix_now() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// POST /slack/events: Events API delivery (HTTP mode only). Verifies the request signature,
/// answers url_verification, and pushes message events to the dispatcher.
async fn slack_events(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if state.settings.socket_mode {
        return StatusCode::NOT_FOUND.into_response();
    }
    let Some(secret) = state.settings.credentials.signing_secret.as_deref() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    if let Err(e) = slack::verify_request(
        secret,
        header_str(&headers, TIMESTAMP_HEADER),
        header_str(&headers, SIGNATURE_HEADER),
        &body,
        unix_now(),
    ) {
        log::debug!("slack events: rejected request: {}", e);
        return StatusCode::UNAUTHORIZED.into_response();
    }

    let parsed: EventsApiBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    let inbound = match parsed {
        EventsApiBody::UrlVerification { challenge } => {
            return Json(json!({ "challenge": challenge })).into_response();
        }
        other => other.into_inbound(),
    };
    let Some(inbound) = inbound else {
        return StatusCode::OK.into_response();
    };
    if state.inbound_tx.send(inbound).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    StatusCode::OK.into_response()
}
