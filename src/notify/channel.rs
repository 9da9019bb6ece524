use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::models::notification::Notification;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel unavailable: {0}")]
    Unavailable(String),
}

/// Push transport for persisted notifications (FCM, web push, sockets...).
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), ChannelError>;
}

/// Publishes to in-process subscribers such as the websocket endpoint.
/// Having no subscriber is not a failure: the record is still pollable.
pub struct BroadcastChannel {
    tx: broadcast::Sender<Notification>,
}

impl BroadcastChannel {
    pub fn new(tx: broadcast::Sender<Notification>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl NotificationChannel for BroadcastChannel {
    async fn deliver(&self, notification: &Notification) -> Result<(), ChannelError> {
        let _ = self.tx.send(notification.clone());
        Ok(())
    }
}
