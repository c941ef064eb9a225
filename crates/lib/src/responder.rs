//! Message responder: keyword listeners and canned replies.
//!
//! Each listener pairs a trigger keyword with a handler. [`Responder::dispatch`] runs every
//! listener whose keyword matches the message text, so a message containing both "hello" and
//! "ping" gets both replies. Handlers are stateless; a redelivered event is answered again.

use crate::channels::{ChannelError, ChannelHandle, InboundMessage};
use crate::config::MatchPolicy;
use async_trait::async_trait;
use std::sync::Arc;

pub const HELLO_KEYWORD: &str = "hello";
pub const PING_KEYWORD: &str = "ping";
pub const PING_REPLY: &str = "Pong!!!";

/// Subtypes that do not represent newly authored text.
const IGNORED_SUBTYPES: &[&str] = &["message_changed", "message_deleted"];

/// One inbound message plus the handle used to answer it.
#[derive(Clone)]
pub struct MessageEvent {
    pub message: InboundMessage,
    pub reply: Arc<dyn ChannelHandle>,
}

impl MessageEvent {
    pub fn new(message: InboundMessage, reply: Arc<dyn ChannelHandle>) -> Self {
        Self { message, reply }
    }

    pub fn text(&self) -> Option<&str> {
        self.message.text.as_deref()
    }

    pub fn sender(&self) -> Option<&str> {
        self.message.sender.as_deref()
    }

    /// Send `text` to the conversation the message came from.
    pub async fn say(&self, text: &str) -> Result<(), ChannelError> {
        self.reply
            .send_message(&self.message.conversation_id, text)
            .await
    }
}

/// Greeting for `sender`, mentioning them with Slack's `<@USER>` syntax. The id is used verbatim.
pub fn hello_reply(sender: Option<&str>) -> String {
    match sender {
        Some(user) => format!("Hey there, <@{}>!", user),
        None => "Hey there!".to_string(),
    }
}

/// Reply to a message containing "hello".
pub async fn on_keyword_hello(event: &MessageEvent) -> Result<(), ChannelError> {
    event.say(&hello_reply(event.sender())).await
}

/// Reply to a message containing "ping".
pub async fn on_keyword_ping(event: &MessageEvent) -> Result<(), ChannelError> {
    event.say(PING_REPLY).await
}

/// True if `keyword` occurs in `text` under `policy`.
pub fn keyword_matches(policy: MatchPolicy, text: &str, keyword: &str) -> bool {
    if keyword.is_empty() {
        return false;
    }
    match policy {
        MatchPolicy::Substring => text.contains(keyword),
        MatchPolicy::IgnoreCase => text.to_lowercase().contains(&keyword.to_lowercase()),
        MatchPolicy::WholeWord => text.match_indices(keyword).any(|(start, m)| {
            let before = text[..start].chars().next_back();
            let after = text[start + m.len()..].chars().next();
            !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
        }),
    }
}

/// A keyword-triggered handler.
#[async_trait]
pub trait Listener: Send + Sync {
    fn keyword(&self) -> &str;
    async fn handle(&self, event: &MessageEvent) -> Result<(), ChannelError>;
}

struct HelloListener;

#[async_trait]
impl Listener for HelloListener {
    fn keyword(&self) -> &str {
        HELLO_KEYWORD
    }

    async fn handle(&self, event: &MessageEvent) -> Result<(), ChannelError> {
        on_keyword_hello(event).await
    }
}

struct PingListener;

#[async_trait]
impl Listener for PingListener {
    fn keyword(&self) -> &str {
        PING_KEYWORD
    }

    async fn handle(&self, event: &MessageEvent) -> Result<(), ChannelError> {
        on_keyword_ping(event).await
    }
}

/// What happened to one event.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Keywords whose reply was sent.
    pub replied: Vec<String>,
    /// Keywords whose reply failed, with the send error.
    pub failed: Vec<(String, ChannelError)>,
}

impl DispatchReport {
    pub fn matched(&self) -> usize {
        self.replied.len() + self.failed.len()
    }
}

/// Ordered listener table. Immutable once built; share it behind an `Arc`.
pub struct Responder {
    policy: MatchPolicy,
    listeners: Vec<Box<dyn Listener>>,
}

impl Responder {
    /// Responder with the "hello" and "ping" listeners.
    pub fn new(policy: MatchPolicy) -> Self {
        Self::empty(policy)
            .with_listener(HelloListener)
            .with_listener(PingListener)
    }

    /// Responder with no listeners.
    pub fn empty(policy: MatchPolicy) -> Self {
        Self {
            policy,
            listeners: Vec::new(),
        }
    }

    pub fn with_listener(mut self, listener: impl Listener + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    pub fn policy(&self) -> MatchPolicy {
        self.policy
    }

    /// False for edits, deletions, and messages without text.
    pub fn accepts(message: &InboundMessage) -> bool {
        let edited = message
            .subtype
            .as_deref()
            .is_some_and(|s| IGNORED_SUBTYPES.contains(&s));
        !edited && message.text.is_some()
    }

    /// Keywords of the listeners that would fire for `text`, in registration order.
    pub fn matching_keywords<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.listeners
            .iter()
            .map(|l| l.keyword())
            .filter(move |k| keyword_matches(self.policy, text, k))
    }

    /// Run every matching listener once. Send errors are collected, not retried.
    pub async fn dispatch(&self, event: &MessageEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        if !Self::accepts(&event.message) {
            return report;
        }
        let Some(text) = event.text() else {
            return report;
        };
        for listener in &self.listeners {
            let keyword = listener.keyword();
            if !keyword_matches(self.policy, text, keyword) {
                continue;
            }
            match listener.handle(event).await {
                Ok(()) => report.replied.push(keyword.to_string()),
                Err(e) => report.failed.push((keyword.to_string(), e)),
            }
        }
        report
    }
}
