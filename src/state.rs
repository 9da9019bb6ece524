use std::sync::Arc;

use arc_swap::ArcSwap;
use dashmap::DashMap;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::config::EngineSettings;
use crate::engine::events::EngineEvent;
use crate::geo::fee::ZoneTable;
use crate::models::assignment::DeliveryAssignment;
use crate::models::notification::Notification;
use crate::models::order::Order;
use crate::models::worker::DeliveryWorker;
use crate::notify::channel::{BroadcastChannel, NotificationChannel};
use crate::notify::delivery::RetryPolicy;
use crate::notify::NotificationDispatcher;
use crate::observability::metrics::Metrics;
use crate::tracking::LiveTrackingStore;

pub struct AppState {
    pub orders: DashMap<Uuid, Order>,
    pub workers: DashMap<Uuid, DeliveryWorker>,
    pub assignments: DashMap<Uuid, DeliveryAssignment>,
    /// Order id to the assignment of its latest offer cycle.
    pub current_offers: DashMap<Uuid, Uuid>,
    /// Order id to every assignment ever created for it, oldest first.
    pub order_assignments: DashMap<Uuid, Vec<Uuid>>,
    pub zones: ArcSwap<ZoneTable>,
    pub settings: EngineSettings,
    pub notifications: NotificationDispatcher,
    pub tracking: LiveTrackingStore,
    pub events_tx: broadcast::Sender<EngineEvent>,
    pub notification_events_tx: broadcast::Sender<Notification>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(
        settings: EngineSettings,
        event_buffer_size: usize,
        notification_queue_size: usize,
    ) -> (Self, mpsc::Receiver<Vec<Notification>>) {
        let metrics = Metrics::new();
        let (events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        let (notification_events_tx, _unused_rx) = broadcast::channel(event_buffer_size.max(1));
        let (notifications, outbox_rx) =
            NotificationDispatcher::new(notification_queue_size, metrics.clone());
        let tracking = LiveTrackingStore::new(settings.stale_after, settings.average_speed_kmh);

        (
            Self {
                orders: DashMap::new(),
                workers: DashMap::new(),
                assignments: DashMap::new(),
                current_offers: DashMap::new(),
                order_assignments: DashMap::new(),
                zones: ArcSwap::from_pointee(settings.zones.clone()),
                settings,
                notifications,
                tracking,
                events_tx,
                notification_events_tx,
                metrics,
            },
            outbox_rx,
        )
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events_tx.send(event);
    }

    /// In-process push channel backing the websocket subscription.
    pub fn notification_channel(&self) -> Arc<dyn NotificationChannel> {
        Arc::new(BroadcastChannel::new(self.notification_events_tx.clone()))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.settings.notify_max_attempts,
            backoff: self.settings.notify_retry_backoff,
        }
    }

    pub fn current_assignment(&self, order_id: Uuid) -> Option<DeliveryAssignment> {
        let assignment_id = self.current_offers.get(&order_id).map(|entry| *entry.value())?;
        self.assignments
            .get(&assignment_id)
            .map(|entry| entry.value().clone())
    }

    pub fn assignments_for_order(&self, order_id: Uuid) -> Vec<DeliveryAssignment> {
        let ids = match self.order_assignments.get(&order_id) {
            Some(ids) => ids.value().clone(),
            None => return Vec::new(),
        };

        ids.iter()
            .filter_map(|id| self.assignments.get(id).map(|entry| entry.value().clone()))
            .collect()
    }
}
