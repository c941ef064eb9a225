//! Slack channel: Socket Mode for inbound events, Web API (chat.postMessage) for replies.

mod events;
mod signature;
mod socket;

pub use events::{EventsApiBody, SlackEvent, SocketEnvelope};
pub use signature::{sign_request, verify_request, SignatureError, MAX_REQUEST_AGE_SECS};

use crate::channels::inbound::InboundMessage;
use crate::channels::registry::{ChannelError, ChannelHandle};
use crate::config::Settings;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;

pub const SLACK_CHANNEL_ID: &str = "slack";

/// Who the bot is, as reported by auth.test. Used to drop the bot's own messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SlackIdentity {
    pub user_id: String,
    #[serde(default)]
    pub bot_id: Option<String>,
    #[serde(default)]
    pub team: Option<String>,
}

impl SlackIdentity {
    /// True if the message was posted by this bot (by bot id or by the bot's user id).
    pub fn is_own_message(&self, msg: &InboundMessage) -> bool {
        let same_bot = matches!((&self.bot_id, &msg.bot_id), (Some(ours), Some(theirs)) if ours == theirs);
        let same_user = msg.sender.as_deref() == Some(self.user_id.as_str());
        same_bot || same_user
    }
}

#[derive(Debug, Deserialize)]
struct ConnectionsOpenResponse {
    url: String,
}

/// Slack channel connector: Socket Mode loop for inbound events, chat.postMessage for replies.
pub struct SlackChannel {
    id: String,
    api_base: String,
    bot_token: String,
    app_token: Option<String>,
    running: AtomicBool,
    stop_signal: Notify,
    client: reqwest::Client,
}

impl SlackChannel {
    pub fn new(settings: &Settings) -> Self {
        Self {
            id: SLACK_CHANNEL_ID.to_string(),
            api_base: settings.api_base_url.clone(),
            bot_token: settings.credentials.bot_token.clone(),
            app_token: settings.credentials.app_token.clone(),
            running: AtomicBool::new(false),
            stop_signal: Notify::new(),
            client: reqwest::Client::new(),
        }
    }

    fn running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start the Socket Mode loop and forward messages to the gateway. Returns a handle to await on shutdown.
    pub fn start_socket_mode(self: Arc<Self>, inbound_tx: mpsc::Sender<InboundMessage>) -> JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);
        log::info!("slack channel: starting socket mode loop");
        tokio::spawn(async move {
            socket::run_socket_mode(self, inbound_tx).await;
        })
    }

    /// POST a Web API method with a bearer token. Maps non-2xx and `"ok": false` to [`ChannelError::Api`].
    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        token: &str,
        body: serde_json::Value,
    ) -> Result<T, ChannelError> {
        let url = format!("{}/{}", self.api_base, method);
        let res = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ChannelError::Api {
                method,
                detail: format!("{} {}", status, body),
            });
        }
        let data: serde_json::Value = res.json().await?;
        if !data.get("ok").and_then(|v| v.as_bool()).unwrap_or(false) {
            let detail = data
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("ok: false")
                .to_string();
            return Err(ChannelError::Api { method, detail });
        }
        serde_json::from_value(data).map_err(|e| ChannelError::Api {
            method,
            detail: format!("unexpected response: {}", e),
        })
    }

    /// auth.test with the bot token: verifies credentials and returns the bot's identity.
    pub async fn auth_test(&self) -> Result<SlackIdentity, ChannelError> {
        self.call("auth.test", &self.bot_token, serde_json::json!({}))
            .await
    }

    /// apps.connections.open with the app-level token: returns a fresh Socket Mode WebSocket URL.
    pub async fn open_connection(&self) -> Result<String, ChannelError> {
        let token = self.app_token.as_deref().ok_or_else(|| ChannelError::Api {
            method: "apps.connections.open",
            detail: "app-level token not configured".to_string(),
        })?;
        let res: ConnectionsOpenResponse = self
            .call("apps.connections.open", token, serde_json::json!({}))
            .await?;
        Ok(res.url)
    }

    /// Post a plain-text message to a channel via chat.postMessage.
    pub async fn post_message(&self, channel: &str, text: &str) -> Result<(), ChannelError> {
        let body = serde_json::json!({ "channel": channel, "text": text });
        let _: serde_json::Value = self.call("chat.postMessage", &self.bot_token, body).await?;
        Ok(())
    }
}

#[async_trait]
impl ChannelHandle for SlackChannel {
    fn id(&self) -> &str {
        &self.id
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.stop_signal.notify_one();
    }

    async fn send_message(&self, conversation_id: &str, text: &str) -> Result<(), ChannelError> {
        self.post_message(conversation_id, text).await
    }
}
