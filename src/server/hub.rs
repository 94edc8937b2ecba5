//! Change notifications for connected WebSocket clients.

use std::collections::HashMap;
use tokio::sync::{broadcast, RwLock};

/// A collection clients can observe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Channel {
    Bikes,
    /// Maintenances of the bike with this ref.
    Maintenances(String),
}

/// Tracks all connected clients for broadcasting updates.
pub struct SyncHub {
    /// Key: (user_id, channel)
    channels: RwLock<HashMap<(String, Channel), broadcast::Sender<()>>>,
}

impl SyncHub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Subscribes to change notifications for a user's collection.
    pub async fn subscribe(&self, user_id: &str, channel: &Channel) -> broadcast::Receiver<()> {
        let key = (user_id.to_string(), channel.clone());

        let mut channels = self.channels.write().await;

        if let Some(sender) = channels.get(&key) {
            sender.subscribe()
        } else {
            let (sender, receiver) = broadcast::channel(16);
            channels.insert(key, sender);
            receiver
        }
    }

    /// Notifies every subscriber of a user's collection that it changed.
    pub async fn broadcast(&self, user_id: &str, channel: &Channel) {
        let key = (user_id.to_string(), channel.clone());

        let channels = self.channels.read().await;

        if let Some(sender) = channels.get(&key) {
            // Ignore send errors (no subscribers)
            let _ = sender.send(());
        }
    }
}

impl Default for SyncHub {
    fn default() -> Self {
        Self::new()
    }
}
