use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::models::notification::Notification;
use crate::notify::channel::NotificationChannel;
use crate::observability::metrics::Metrics;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
}

/// Drains the outbox and pushes every batch through the channel. Batches are
/// handled on their own task so one slow recipient never holds up the next
/// fan-out.
pub async fn run_notification_delivery(
    channel: Arc<dyn NotificationChannel>,
    policy: RetryPolicy,
    metrics: Metrics,
    mut outbox_rx: mpsc::Receiver<Vec<Notification>>,
) {
    info!("notification delivery started");

    while let Some(batch) = outbox_rx.recv().await {
        let channel = channel.clone();
        let metrics = metrics.clone();

        tokio::spawn(async move {
            join_all(
                batch
                    .iter()
                    .map(|notification| deliver_with_retry(channel.as_ref(), notification, policy, &metrics)),
            )
            .await;
        });
    }

    warn!("notification delivery stopped: outbox channel closed");
}

pub async fn deliver_with_retry(
    channel: &dyn NotificationChannel,
    notification: &Notification,
    policy: RetryPolicy,
    metrics: &Metrics,
) -> bool {
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 1..=max_attempts {
        match channel.deliver(notification).await {
            Ok(()) => {
                metrics
                    .notifications_total
                    .with_label_values(&["delivered"])
                    .inc();
                return true;
            }
            Err(err) if attempt < max_attempts => {
                warn!(
                    notification_id = %notification.id,
                    recipient_id = %notification.recipient_id,
                    attempt,
                    error = %err,
                    "notification delivery failed; retrying"
                );
                sleep(policy.backoff * attempt).await;
            }
            Err(err) => {
                error!(
                    notification_id = %notification.id,
                    recipient_id = %notification.recipient_id,
                    attempts = max_attempts,
                    error = %err,
                    "notification delivery gave up"
                );
            }
        }
    }

    metrics
        .notifications_total
        .with_label_values(&["failed"])
        .inc();
    false
}
