//! Channel registry: register and lookup channels by id.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Errors from sending through a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("channel request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-success HTTP status or `"ok": false` from the platform API.
    #[error("{method} failed: {detail}")]
    Api { method: &'static str, detail: String },
    #[error("send not implemented for channel {0}")]
    Unsupported(String),
}

/// Handle to a running channel (stop, send message).
#[async_trait]
pub trait ChannelHandle: Send + Sync {
    /// Channel id (e.g. "slack").
    fn id(&self) -> &str;
    /// Stop the channel connector.
    fn stop(&self);
    /// Send a plain-text message to a conversation. Default returns an error.
    async fn send_message(&self, _conversation_id: &str, _text: &str) -> Result<(), ChannelError> {
        Err(ChannelError::Unsupported(self.id().to_string()))
    }
}

/// Registry of channel ids to handles. Shared across gateway.
pub struct ChannelRegistry {
    inner: Arc<RwLock<HashMap<String, Arc<dyn ChannelHandle>>>>,
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register a handle. A handle previously registered under the same id is stopped.
    pub async fn register(&self, handle: Arc<dyn ChannelHandle>) {
        let id = handle.id().to_string();
        let mut g = self.inner.write().await;
        if let Some(old) = g.insert(id, handle) {
            old.stop();
        }
    }

    pub async fn get(&self, id: &str) -> Option<Arc<dyn ChannelHandle>> {
        let g = self.inner.read().await;
        g.get(id).cloned()
    }

    pub async fn ids(&self) -> Vec<String> {
        let g = self.inner.read().await;
        g.keys().cloned().collect()
    }

    /// Stop every registered channel.
    pub async fn stop_all(&self) {
        let g = self.inner.read().await;
        for handle in g.values() {
            handle.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Dummy {
        id: &'static str,
        stopped: AtomicBool,
    }

    impl Dummy {
        fn new(id: &'static str) -> Arc<Self> {
            Arc::new(Self {
                id,
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ChannelHandle for Dummy {
        fn id(&self) -> &str {
            self.id
        }

        fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn replacing_a_channel_stops_the_old_handle() {
        let registry = ChannelRegistry::new();
        let first = Dummy::new("slack");
        let second = Dummy::new("slack");
        registry.register(first.clone()).await;
        registry.register(second.clone()).await;

        assert!(first.stopped.load(Ordering::SeqCst));
        assert!(!second.stopped.load(Ordering::SeqCst));
        assert_eq!(registry.ids().await, vec!["slack".to_string()]);
    }

    #[tokio::test]
    async fn default_send_is_unsupported() {
        let handle = Dummy::new("noop");
        let err = handle.send_message("C1", "hi").await.unwrap_err();
        assert!(matches!(err, ChannelError::Unsupported(ref id) if id == "noop"));
    }

    #[tokio::test]
    async fn stop_all_stops_every_channel() {
        let registry = ChannelRegistry::new();
        let a = Dummy::new("a");
        let b = Dummy::new("b");
        registry.register(a.clone()).await;
        registry.register(b.clone()).await;
        registry.stop_all().await;
        assert!(a.stopped.load(Ordering::SeqCst));
        assert!(b.stopped.load(Ordering::SeqCst));
        assert!(registry.get("a").await.is_some());
    }
}
