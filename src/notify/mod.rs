//! Persisted notification fan-out.
//!
//! `send` writes one row per recipient before anything else happens, then hands
//! the batch to the delivery task through a bounded outbox. A full or closed
//! outbox only skips the push; the rows stay readable through the poll API.

pub mod channel;
pub mod delivery;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::{Notification, NotificationPayload};
use crate::observability::metrics::Metrics;

pub struct NotificationDispatcher {
    notifications: DashMap<Uuid, Notification>,
    by_recipient: DashMap<Uuid, Vec<Uuid>>,
    outbox_tx: mpsc::Sender<Vec<Notification>>,
    metrics: Metrics,
}

impl NotificationDispatcher {
    pub fn new(
        queue_size: usize,
        metrics: Metrics,
    ) -> (Self, mpsc::Receiver<Vec<Notification>>) {
        let (outbox_tx, outbox_rx) = mpsc::channel(queue_size.max(1));

        (
            Self {
                notifications: DashMap::new(),
                by_recipient: DashMap::new(),
                outbox_tx,
                metrics,
            },
            outbox_rx,
        )
    }

    /// Persists one notification per distinct recipient and queues the batch
    /// for push delivery. Never blocks.
    pub fn send(&self, recipients: &[Uuid], payload: NotificationPayload) -> Vec<Notification> {
        let mut seen = Vec::with_capacity(recipients.len());
        let mut batch = Vec::with_capacity(recipients.len());

        for recipient_id in recipients {
            if seen.contains(recipient_id) {
                continue;
            }
            seen.push(*recipient_id);

            let notification = Notification::new(*recipient_id, payload.clone());
            self.notifications
                .insert(notification.id, notification.clone());
            self.by_recipient
                .entry(*recipient_id)
                .or_default()
                .push(notification.id);
            batch.push(notification);
        }

        if batch.is_empty() {
            return batch;
        }

        debug!(
            kind = ?payload.kind(),
            order_id = %payload.order_id(),
            recipients = batch.len(),
            "notifications persisted"
        );

        match self.outbox_tx.try_send(batch.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(dropped)) | Err(TrySendError::Closed(dropped)) => {
                self.metrics
                    .notifications_total
                    .with_label_values(&["dropped"])
                    .inc_by(dropped.len() as u64);
                warn!(
                    kind = ?payload.kind(),
                    count = dropped.len(),
                    "notification outbox unavailable; push skipped, records kept"
                );
            }
        }

        batch
    }

    pub fn get(&self, id: Uuid) -> Option<Notification> {
        self.notifications.get(&id).map(|entry| entry.value().clone())
    }

    /// Newest first.
    pub fn list_for(&self, recipient_id: Uuid, unread_only: bool) -> Vec<Notification> {
        let ids = match self.by_recipient.get(&recipient_id) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };

        let mut notifications: Vec<Notification> = ids
            .iter()
            .filter_map(|id| self.get(*id))
            .filter(|notification| !unread_only || !notification.read)
            .collect();
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        notifications
    }

    pub fn mark_read(&self, id: Uuid) -> Result<Notification, AppError> {
        let mut notification = self
            .notifications
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("notification {id} not found")))?;

        notification.read = true;
        Ok(notification.clone())
    }

    /// Returns how many notifications flipped from unread to read.
    pub fn mark_all_read(&self, recipient_id: Uuid) -> usize {
        let ids = match self.by_recipient.get(&recipient_id) {
            Some(ids) => ids.value().clone(),
            None => return 0,
        };

        let mut changed = 0;
        for id in ids {
            if let Some(mut notification) = self.notifications.get_mut(&id) {
                if !notification.read {
                    notification.read = true;
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.notifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notifications.is_empty()
    }
}
