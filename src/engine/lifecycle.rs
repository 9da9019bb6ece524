//! Order status state machine.
//!
//! pending -> processing -> ready_for_pickup -> assigned_for_delivery
//!   -> picked_up -> in_transit -> delivered, plus cancelled from any
//! non-terminal state. The order row lock is held only for the check and the
//! write; side effects run after it is released.

use chrono::{DateTime, Utc};
use tracing::{error, info};
use uuid::Uuid;

use crate::engine::broker;
use crate::engine::events::EngineEvent;
use crate::error::AppError;
use crate::models::notification::NotificationPayload;
use crate::models::order::{ActorRole, Order, OrderStatus, StatusChange};
use crate::state::AppState;

pub fn can_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;

    if from.is_terminal() {
        return false;
    }
    if to == Cancelled {
        return true;
    }

    matches!(
        (from, to),
        (Pending, Processing)
            | (Processing, ReadyForPickup)
            | (ReadyForPickup, AssignedForDelivery)
            | (AssignedForDelivery, PickedUp)
            | (PickedUp, InTransit)
            | (InTransit, Delivered)
    )
}

/// Role check layered on top of a valid edge. Claims are the broker's alone.
pub fn actor_may_request(actor: ActorRole, target: OrderStatus) -> bool {
    match (actor, target) {
        (ActorRole::System, _) => true,
        (_, OrderStatus::AssignedForDelivery) => false,
        (_, OrderStatus::Cancelled) => true,
        (ActorRole::Admin, _) => true,
        (ActorRole::Store, OrderStatus::Processing | OrderStatus::ReadyForPickup) => true,
        (
            ActorRole::Worker,
            OrderStatus::PickedUp | OrderStatus::InTransit | OrderStatus::Delivered,
        ) => true,
        _ => false,
    }
}

pub fn advance_status(
    state: &AppState,
    order_id: Uuid,
    target: OrderStatus,
    actor: ActorRole,
) -> Result<Order, AppError> {
    let now = Utc::now();

    let order = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        let from = order.status;
        if !can_transition(from, target) {
            return Err(AppError::InvalidTransition { from, to: target });
        }
        if !actor_may_request(actor, target) {
            return Err(AppError::Forbidden(format!(
                "{actor:?} may not move an order to {target}"
            )));
        }

        apply_status(&mut order, target, actor, now);
        order.clone()
    };

    info!(order_id = %order_id, status = %target, actor = ?actor, "order status advanced");
    state.emit(EngineEvent::OrderStatusChanged {
        order_id,
        status: target,
        actor,
    });

    on_entered(state, &order);

    Ok(order)
}

/// Writes the new status and its history entry. Callers hold the row lock and
/// have already validated the move.
pub(crate) fn apply_status(
    order: &mut Order,
    status: OrderStatus,
    actor: ActorRole,
    now: DateTime<Utc>,
) {
    order.status = status;
    order.updated_at = now;
    order.history.push(StatusChange {
        status,
        actor,
        at: now,
    });
}

fn on_entered(state: &AppState, order: &Order) {
    match order.status {
        OrderStatus::ReadyForPickup => {
            match broker::offer_delivery(state, order.id) {
                Ok(_) => {}
                Err(AppError::Conflict(reason)) => {
                    info!(order_id = %order.id, reason = %reason, "order moved on before its offer opened");
                }
                Err(err) => {
                    error!(order_id = %order.id, error = %err, "failed to open delivery offer");
                    state.notifications.send(
                        &[order.store_id],
                        NotificationPayload::OfferEscalation {
                            order_id: order.id,
                            attempts: 0,
                            radius_km: state.settings.service_radius_km,
                        },
                    );
                }
            }
        }
        OrderStatus::PickedUp => broker::mark_picked_up(state, order.id),
        OrderStatus::Delivered => broker::complete_delivery(state, order.id),
        OrderStatus::Cancelled => {
            broker::void_assignment(state, order.id);
        }
        _ => {}
    }

    if matches!(
        order.status,
        OrderStatus::AssignedForDelivery
            | OrderStatus::PickedUp
            | OrderStatus::InTransit
            | OrderStatus::Delivered
            | OrderStatus::Cancelled
    ) {
        notify_status_change(state, order);
    }
}

pub(crate) fn notify_status_change(state: &AppState, order: &Order) {
    state.notifications.send(
        &[order.customer_id, order.store_id],
        NotificationPayload::OrderStatusChanged {
            order_id: order.id,
            status: order.status,
        },
    );
}
