use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use super::events::ProgressionEvent;

/// Per-user broadcast channels for progression events
#[derive(Debug, Clone)]
pub struct EventBus {
    /// user_id -> sender
    user_channels: Arc<RwLock<HashMap<String, broadcast::Sender<ProgressionEvent>>>>,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        Self {
            user_channels: Arc::new(RwLock::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Emits an event to the subscribers of its user; dropped when nobody listens
    pub async fn emit(&self, event: ProgressionEvent) {
        let user_channels = self.user_channels.read().await;

        match user_channels.get(event.user_id()) {
            Some(sender) => {
                let event_type = event.event_type();
                match sender.send(event) {
                    Ok(receiver_count) => {
                        debug!(event_type, receivers = receiver_count, "Progression event emitted")
                    }
                    Err(_) => debug!(event_type, "Progression event emitted with no receivers"),
                }
            }
            None => debug!(
                user_id = %event.user_id(),
                event_type = event.event_type(),
                "No subscribers for user"
            ),
        }
    }

    pub async fn subscribe(&self, user_id: &str) -> broadcast::Receiver<ProgressionEvent> {
        {
            let user_channels = self.user_channels.read().await;
            if let Some(sender) = user_channels.get(user_id) {
                return sender.subscribe();
            }
        }

        debug!(user_id = %user_id, "Creating new user channel for subscription");
        let mut user_channels = self.user_channels.write().await;
        user_channels
            .entry(user_id.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }
}
