//! Offer broadcast and claim resolution.
//!
//! Every decision about an assignment row is a compare-and-swap under that
//! row's map lock: claim, expiry, cancellation and completion each re-check
//! the sub-state they expect before writing, so two racing callers can never
//! both succeed. Locks are never held across calls into another component.
//!
//! Lock order, where nesting happens at all: `current_offers` before
//! `orders` before `assignments`.

use std::time::Instant;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::events::EngineEvent;
use crate::engine::lifecycle;
use crate::error::AppError;
use crate::geo::fee::ZoneTable;
use crate::geo::haversine_km;
use crate::models::assignment::{AssignmentState, DeliveryAssignment, WorkerQuote};
use crate::models::notification::NotificationPayload;
use crate::models::order::{ActorRole, Order, OrderStatus};
use crate::models::worker::{DeliveryWorker, GeoPoint};
use crate::state::AppState;
use crate::tracking::{Ping, PingOutcome};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExpiryOutcome {
    NotDue,
    Reoffered { assignment: DeliveryAssignment },
    Escalated { attempts: u32 },
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelOutcome {
    pub cancelled: DeliveryAssignment,
    pub next_offer: Option<DeliveryAssignment>,
}

/// An open offer as one worker sees it.
#[derive(Debug, Clone, Serialize)]
pub struct OfferView {
    pub assignment_id: Uuid,
    pub order_id: Uuid,
    pub fee: f64,
    pub distance_km: f64,
    pub approach_km: f64,
    pub zone: String,
    pub pickup_address: String,
    pub delivery_address: String,
    pub special_instructions: Option<String>,
    pub expires_at: DateTime<Utc>,
}

pub fn offer_delivery(state: &AppState, order_id: Uuid) -> Result<DeliveryAssignment, AppError> {
    open_offer(state, order_id, 0, None, Utc::now())
}

fn open_offer(
    state: &AppState,
    order_id: Uuid,
    attempt: u32,
    exclude: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<DeliveryAssignment, AppError> {
    let order = state
        .orders
        .get(&order_id)
        .map(|entry| entry.value().clone())
        .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

    if order.status != OrderStatus::ReadyForPickup {
        return Err(AppError::Conflict(format!(
            "order {order_id} is {}, not ready_for_pickup",
            order.status
        )));
    }

    let (Some(pickup), Some(dropoff)) = (order.pickup, order.dropoff) else {
        return Err(AppError::GeoDataMissing(format!(
            "order {order_id} lacks pickup or dropoff coordinates"
        )));
    };
    let zones = state.zones.load();
    let canonical = zones.quote(Some(&pickup), Some(&dropoff))?;

    let radius_km = state.settings.radius_for_attempt(attempt);
    let quotes = eligible_quotes(state, &pickup, &dropoff, radius_km, &zones, exclude);

    let assignment = DeliveryAssignment {
        id: Uuid::new_v4(),
        order_id,
        worker_id: None,
        state: AssignmentState::Offered,
        fee: canonical.fee,
        distance_km: canonical.distance_km,
        attempt,
        radius_km,
        offered_to: quotes,
        offered_at: now,
        expires_at: now + state.settings.offer_ttl_delta(),
        claimed_at: None,
        picked_up_at: None,
        delivered_at: None,
        closed_at: None,
    };

    // The current_offers entry serializes concurrent openers for one order,
    // and cancellation voids under the same entry.
    let entry = state.current_offers.entry(order_id);
    let status = state.orders.get(&order_id).map(|current| current.status);
    if status != Some(OrderStatus::ReadyForPickup) {
        return Err(AppError::Conflict(format!(
            "order {order_id} left ready_for_pickup before the offer opened"
        )));
    }
    match entry {
        Entry::Occupied(mut entry) => {
            let live = state
                .assignments
                .get(entry.get())
                .filter(|current| {
                    matches!(
                        current.state,
                        AssignmentState::Offered | AssignmentState::Claimed
                    )
                })
                .map(|current| current.value().clone());
            if let Some(live) = live {
                return Ok(live);
            }
            state.assignments.insert(assignment.id, assignment.clone());
            entry.insert(assignment.id);
        }
        Entry::Vacant(entry) => {
            state.assignments.insert(assignment.id, assignment.clone());
            entry.insert(assignment.id);
        }
    }
    state
        .order_assignments
        .entry(order_id)
        .or_default()
        .push(assignment.id);

    state.metrics.open_offers.inc();
    state.metrics.offers_total.with_label_values(&["opened"]).inc();

    if assignment.offered_to.is_empty() {
        warn!(
            order_id = %order_id,
            attempt,
            radius_km,
            "no eligible workers; offer will expire and widen"
        );
    } else {
        info!(
            order_id = %order_id,
            assignment_id = %assignment.id,
            attempt,
            radius_km,
            workers = assignment.offered_to.len(),
            fee = assignment.fee,
            "delivery offer opened"
        );
    }

    state.emit(EngineEvent::OfferCreated {
        order_id,
        assignment_id: assignment.id,
        attempt,
        radius_km,
        workers: assignment.offered_to.len(),
        expires_at: assignment.expires_at,
    });

    for quote in &assignment.offered_to {
        state.notifications.send(
            &[quote.worker_id],
            NotificationPayload::DeliveryOffer {
                order_id,
                assignment_id: assignment.id,
                fee: quote.fee,
                distance_km: quote.distance_km,
                approach_km: quote.approach_km,
                pickup_address: order.pickup_address.clone(),
                delivery_address: order.delivery_address.clone(),
                special_instructions: order.special_instructions.clone(),
                expires_at: assignment.expires_at,
            },
        );
    }

    Ok(assignment)
}

/// Queries current worker state; nothing about eligibility is cached.
fn eligible_quotes(
    state: &AppState,
    pickup: &GeoPoint,
    dropoff: &GeoPoint,
    radius_km: f64,
    zones: &ZoneTable,
    exclude: Option<Uuid>,
) -> Vec<WorkerQuote> {
    state
        .workers
        .iter()
        .filter_map(|entry| {
            let worker = entry.value();
            if !worker.available || !worker.has_capacity() || exclude == Some(worker.id) {
                return None;
            }

            let location = worker.location.filter(GeoPoint::is_valid)?;
            let approach_km = haversine_km(&location, pickup);
            if approach_km > radius_km {
                return None;
            }

            let origin = worker.service_area.filter(GeoPoint::is_valid).unwrap_or(*pickup);
            let quote = zones.quote(Some(&origin), Some(dropoff)).ok()?;

            Some(WorkerQuote {
                worker_id: worker.id,
                fee: quote.fee,
                distance_km: quote.distance_km,
                approach_km,
                zone: quote.zone.name,
            })
        })
        .collect()
}

pub fn accept_offer(
    state: &AppState,
    order_id: Uuid,
    worker_id: Uuid,
) -> Result<DeliveryAssignment, AppError> {
    accept_offer_with(state, order_id, worker_id, &Utc::now)
}

pub fn accept_offer_at(
    state: &AppState,
    order_id: Uuid,
    worker_id: Uuid,
    now: DateTime<Utc>,
) -> Result<DeliveryAssignment, AppError> {
    accept_offer_with(state, order_id, worker_id, &move || now)
}

pub(crate) fn accept_offer_with(
    state: &AppState,
    order_id: Uuid,
    worker_id: Uuid,
    clock: &dyn Fn() -> DateTime<Utc>,
) -> Result<DeliveryAssignment, AppError> {
    let start = Instant::now();
    let result = claim(state, order_id, worker_id, clock);

    let outcome = match &result {
        Ok(_) => "won",
        Err(AppError::AlreadyClaimed(_)) => "already_claimed",
        Err(AppError::OfferExpired(_)) => "expired",
        Err(AppError::OfferWithdrawn(_)) => "withdrawn",
        Err(AppError::CapacityExceeded(_)) => "capacity",
        Err(_) => "error",
    };
    state
        .metrics
        .claim_latency_seconds
        .with_label_values(&[outcome])
        .observe(start.elapsed().as_secs_f64());
    state
        .metrics
        .claims_total
        .with_label_values(&[outcome])
        .inc();

    if let Err(err) = &result {
        if err.is_race_loss() {
            info!(order_id = %order_id, worker_id = %worker_id, outcome, "claim lost");
        } else {
            warn!(order_id = %order_id, worker_id = %worker_id, error = %err, "claim rejected");
        }
    }

    result
}

enum ClaimAttempt {
    Won(DeliveryAssignment),
    AlreadyMine(DeliveryAssignment),
    Lost(AppError),
}

/// `clock` is read again under the row lock; the deadline is judged at the
/// moment of the swap, not when the request arrived.
fn claim(
    state: &AppState,
    order_id: Uuid,
    worker_id: Uuid,
    clock: &dyn Fn() -> DateTime<Utc>,
) -> Result<DeliveryAssignment, AppError> {
    let snapshot = state
        .current_assignment(order_id)
        .ok_or_else(|| AppError::NotFound(format!("no delivery offer for order {order_id}")))?;

    if snapshot.worker_id == Some(worker_id) && snapshot.holds_order() {
        return Ok(snapshot);
    }
    if snapshot.quote_for(worker_id).is_none() {
        return Err(AppError::NotFound(format!(
            "order {order_id} was not offered to worker {worker_id}"
        )));
    }
    let now = clock();
    if !snapshot.is_open_at(now) {
        return Err(lost_claim(&snapshot, now));
    }

    if let Err(err) = reserve_capacity(state, worker_id) {
        // A concurrent accept by this same worker may have just won.
        return state
            .current_assignment(order_id)
            .filter(|a| a.worker_id == Some(worker_id) && a.holds_order())
            .ok_or(err);
    }

    let attempt = match state.assignments.get_mut(&snapshot.id) {
        Some(mut assignment) => {
            let now = clock();
            if assignment.is_open_at(now) {
                let quote = assignment.quote_for(worker_id).cloned();
                assignment.state = AssignmentState::Claimed;
                assignment.worker_id = Some(worker_id);
                assignment.claimed_at = Some(now);
                if let Some(quote) = quote {
                    assignment.fee = quote.fee;
                    assignment.distance_km = quote.distance_km;
                }
                ClaimAttempt::Won(assignment.clone())
            } else if assignment.worker_id == Some(worker_id) && assignment.holds_order() {
                ClaimAttempt::AlreadyMine(assignment.clone())
            } else {
                ClaimAttempt::Lost(lost_claim(&assignment, now))
            }
        }
        None => ClaimAttempt::Lost(AppError::Internal(format!(
            "assignment {} vanished",
            snapshot.id
        ))),
    };

    let claimed = match attempt {
        ClaimAttempt::Won(claimed) => claimed,
        ClaimAttempt::AlreadyMine(claimed) => {
            release_worker(state, worker_id);
            return Ok(claimed);
        }
        ClaimAttempt::Lost(err) => {
            release_worker(state, worker_id);
            return Err(err);
        }
    };
    state.metrics.open_offers.dec();

    let others: Vec<Uuid> = claimed
        .offered_to
        .iter()
        .map(|quote| quote.worker_id)
        .filter(|id| *id != worker_id)
        .collect();

    if let Err(err) = lifecycle::advance_status(
        state,
        order_id,
        OrderStatus::AssignedForDelivery,
        ActorRole::System,
    ) {
        // The order was cancelled between the offer and this claim.
        warn!(order_id = %order_id, worker_id = %worker_id, error = %err, "claim rolled back");
        let rolled_back = transition(
            state,
            claimed.id,
            clock(),
            |a| a.state == AssignmentState::Claimed && a.worker_id == Some(worker_id),
            AssignmentState::Cancelled,
        );
        if rolled_back.is_some() {
            release_worker(state, worker_id);
            state.notifications.send(
                &others,
                NotificationPayload::ClaimVoid {
                    order_id,
                    assignment_id: claimed.id,
                },
            );
        }
        return Err(AppError::OfferWithdrawn(order_id.to_string()));
    }

    audit_order(state, order_id);

    info!(
        order_id = %order_id,
        assignment_id = %claimed.id,
        worker_id = %worker_id,
        fee = claimed.fee,
        "offer claimed"
    );
    state.emit(EngineEvent::OfferClaimed {
        order_id,
        assignment_id: claimed.id,
        worker_id,
    });
    state.notifications.send(
        &others,
        NotificationPayload::ClaimVoid {
            order_id,
            assignment_id: claimed.id,
        },
    );

    Ok(claimed)
}

fn lost_claim(assignment: &DeliveryAssignment, now: DateTime<Utc>) -> AppError {
    let order = assignment.order_id.to_string();
    match assignment.state {
        AssignmentState::Claimed | AssignmentState::Completed => AppError::AlreadyClaimed(order),
        AssignmentState::Expired => AppError::OfferExpired(order),
        AssignmentState::Cancelled => AppError::OfferWithdrawn(order),
        AssignmentState::Offered if now >= assignment.expires_at => AppError::OfferExpired(order),
        AssignmentState::Offered => AppError::AlreadyClaimed(order),
    }
}

fn reserve_capacity(state: &AppState, worker_id: Uuid) -> Result<(), AppError> {
    let mut worker = state
        .workers
        .get_mut(&worker_id)
        .ok_or_else(|| AppError::NotFound(format!("worker {worker_id} not found")))?;

    if !worker.available {
        return Err(AppError::Conflict(format!("worker {worker_id} is not available")));
    }
    if !worker.has_capacity() {
        return Err(AppError::CapacityExceeded(worker_id.to_string()));
    }

    worker.active_assignments += 1;
    worker.updated_at = Utc::now();
    record_utilization(state, &worker);
    Ok(())
}

fn adjust_worker(state: &AppState, worker_id: Uuid, update: impl FnOnce(&mut DeliveryWorker)) {
    match state.workers.get_mut(&worker_id) {
        Some(mut worker) => {
            update(&mut *worker);
            worker.updated_at = Utc::now();
            record_utilization(state, &worker);
        }
        None => error!(worker_id = %worker_id, "worker missing while releasing assignment"),
    }
}

fn release_worker(state: &AppState, worker_id: Uuid) {
    adjust_worker(state, worker_id, |worker| {
        worker.active_assignments = worker.active_assignments.saturating_sub(1);
    });
}

fn record_utilization(state: &AppState, worker: &DeliveryWorker) {
    state
        .metrics
        .worker_utilization
        .with_label_values(&[&worker.id.to_string()])
        .set(worker.utilization());
}

/// Compare-and-swap on one assignment row. Returns the updated row when
/// `expected` held and the write happened.
fn transition(
    state: &AppState,
    assignment_id: Uuid,
    now: DateTime<Utc>,
    expected: impl FnOnce(&DeliveryAssignment) -> bool,
    next: AssignmentState,
) -> Option<DeliveryAssignment> {
    let mut assignment = state.assignments.get_mut(&assignment_id)?;
    if !expected(&assignment) {
        return None;
    }

    assignment.state = next;
    if next.is_terminal() {
        assignment.closed_at = Some(now);
    }
    if next == AssignmentState::Completed {
        assignment.delivered_at = Some(now);
    }
    Some(assignment.clone())
}

/// Counts assignments holding the order. More than one means the claim path
/// is broken; it is reported, never repaired.
pub fn audit_order(state: &AppState, order_id: Uuid) -> usize {
    let holders: Vec<DeliveryAssignment> = state
        .assignments_for_order(order_id)
        .into_iter()
        .filter(DeliveryAssignment::holds_order)
        .collect();

    if holders.len() > 1 {
        state.metrics.invariant_violations_total.inc();
        error!(
            alarm = "double_claim",
            order_id = %order_id,
            assignments = ?holders.iter().map(|a| a.id).collect::<Vec<_>>(),
            workers = ?holders.iter().map(|a| a.worker_id).collect::<Vec<_>>(),
            "multiple claimed assignments for one order; manual reconciliation required"
        );
    }

    holders.len()
}

pub fn expire_offer(state: &AppState, order_id: Uuid) -> Result<ExpiryOutcome, AppError> {
    expire_offer_at(state, order_id, Utc::now())
}

pub fn expire_offer_at(
    state: &AppState,
    order_id: Uuid,
    now: DateTime<Utc>,
) -> Result<ExpiryOutcome, AppError> {
    let assignment_id = state
        .current_offers
        .get(&order_id)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("no delivery offer for order {order_id}")))?;

    let Some(expired) = transition(
        state,
        assignment_id,
        now,
        |a| a.state == AssignmentState::Offered && a.worker_id.is_none() && now >= a.expires_at,
        AssignmentState::Expired,
    ) else {
        return Ok(ExpiryOutcome::NotDue);
    };

    state.metrics.open_offers.dec();
    state.metrics.offers_total.with_label_values(&["expired"]).inc();
    info!(
        order_id = %order_id,
        assignment_id = %expired.id,
        attempt = expired.attempt,
        "offer expired unclaimed"
    );
    state.emit(EngineEvent::OfferExpired {
        order_id,
        assignment_id: expired.id,
        attempt: expired.attempt,
    });

    let offered: Vec<Uuid> = expired.offered_to.iter().map(|q| q.worker_id).collect();
    state.notifications.send(
        &offered,
        NotificationPayload::ClaimVoid {
            order_id,
            assignment_id: expired.id,
        },
    );

    if expired.attempt < state.settings.max_offer_retries {
        let assignment = open_offer(state, order_id, expired.attempt + 1, None, now)?;
        return Ok(ExpiryOutcome::Reoffered { assignment });
    }

    let attempts = expired.attempt + 1;
    escalate(state, order_id, attempts, expired.radius_km);
    Ok(ExpiryOutcome::Escalated { attempts })
}

fn escalate(state: &AppState, order_id: Uuid, attempts: u32, radius_km: f64) {
    let store_id = state.orders.get(&order_id).map(|order| order.store_id);

    state.metrics.offers_total.with_label_values(&["escalated"]).inc();
    warn!(order_id = %order_id, attempts, radius_km, "offer retries exhausted; escalating to store");
    state.emit(EngineEvent::OfferEscalated { order_id, attempts });

    match store_id {
        Some(store_id) => {
            state.notifications.send(
                &[store_id],
                NotificationPayload::OfferEscalation {
                    order_id,
                    attempts,
                    radius_km,
                },
            );
        }
        None => error!(order_id = %order_id, "order missing while escalating offer"),
    }
}

/// Expires every offer whose deadline has passed. The assignment table is
/// only read while collecting candidates; each expiry then takes its own row
/// lock, so an in-flight claim is never blocked by the sweep.
pub fn sweep_expired_offers(state: &AppState, now: DateTime<Utc>) -> usize {
    let due: Vec<Uuid> = state
        .assignments
        .iter()
        .filter(|entry| {
            let assignment = entry.value();
            assignment.state == AssignmentState::Offered && now >= assignment.expires_at
        })
        .map(|entry| entry.value().order_id)
        .collect();

    let mut expired = 0;
    for order_id in due {
        match expire_offer_at(state, order_id, now) {
            Ok(ExpiryOutcome::NotDue) => {}
            Ok(_) => expired += 1,
            Err(err) => warn!(order_id = %order_id, error = %err, "expiry follow-up failed"),
        }
    }
    expired
}

pub fn cancel_claim(
    state: &AppState,
    worker_id: Uuid,
    order_id: Uuid,
) -> Result<CancelOutcome, AppError> {
    let now = Utc::now();
    let assignment_id = state
        .current_offers
        .get(&order_id)
        .map(|entry| *entry.value())
        .ok_or_else(|| AppError::NotFound(format!("no delivery offer for order {order_id}")))?;

    let (cancelled, order) = {
        let mut order = state
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;
        let mut assignment = state
            .assignments
            .get_mut(&assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;

        if assignment.worker_id != Some(worker_id) || !assignment.holds_order() {
            return Err(AppError::NotFound(format!(
                "order {order_id} is not claimed by worker {worker_id}"
            )));
        }
        if assignment.state != AssignmentState::Claimed
            || order.status != OrderStatus::AssignedForDelivery
        {
            return Err(AppError::Conflict(format!(
                "order {order_id} is {}; the claim can no longer be cancelled",
                order.status
            )));
        }

        assignment.state = AssignmentState::Cancelled;
        assignment.closed_at = Some(now);
        lifecycle::apply_status(&mut order, OrderStatus::ReadyForPickup, ActorRole::System, now);
        (assignment.clone(), order.clone())
    };

    adjust_worker(state, worker_id, |worker| {
        worker.active_assignments = worker.active_assignments.saturating_sub(1);
        worker.cancellations += 1;
    });
    state.tracking.clear(cancelled.id);

    info!(
        order_id = %order_id,
        assignment_id = %cancelled.id,
        worker_id = %worker_id,
        "worker cancelled claim; order back to ready_for_pickup"
    );
    state.emit(EngineEvent::AssignmentCancelled {
        order_id,
        assignment_id: cancelled.id,
        worker_id: Some(worker_id),
    });
    state.emit(EngineEvent::OrderStatusChanged {
        order_id,
        status: OrderStatus::ReadyForPickup,
        actor: ActorRole::System,
    });
    state.notifications.send(
        &[order.store_id],
        NotificationPayload::AssignmentCancelled {
            order_id,
            assignment_id: cancelled.id,
        },
    );

    let next_offer = match open_offer(state, order_id, 0, Some(worker_id), now) {
        Ok(offer) => Some(offer),
        Err(err) => {
            error!(order_id = %order_id, error = %err, "fresh offer after cancellation failed");
            None
        }
    };

    Ok(CancelOutcome {
        cancelled,
        next_offer,
    })
}

/// Starts a fresh offer cycle at the base radius, e.g. after escalation.
pub fn reoffer(state: &AppState, order_id: Uuid) -> Result<DeliveryAssignment, AppError> {
    let now = Utc::now();
    if let Some(current) = state.current_assignment(order_id) {
        if current.state == AssignmentState::Offered && now < current.expires_at {
            return Err(AppError::Conflict(format!(
                "order {order_id} already has an open offer"
            )));
        }
        if current.state == AssignmentState::Offered {
            // Past its deadline but not yet swept.
            let expired = transition(
                state,
                current.id,
                now,
                |a| a.state == AssignmentState::Offered && now >= a.expires_at,
                AssignmentState::Expired,
            );
            if expired.is_some() {
                state.metrics.open_offers.dec();
            }
        }
    }
    open_offer(state, order_id, 0, None, now)
}

/// Voids the live assignment of a cancelled order. Whichever of this and a
/// concurrent claim lands first on the row decides the outcome.
pub fn void_assignment(state: &AppState, order_id: Uuid) -> Option<DeliveryAssignment> {
    let voided = {
        let offer = state.current_offers.get_mut(&order_id)?;
        transition(
            state,
            *offer,
            Utc::now(),
            |a| matches!(a.state, AssignmentState::Offered | AssignmentState::Claimed),
            AssignmentState::Cancelled,
        )?
    };

    match voided.worker_id {
        Some(worker_id) => {
            release_worker(state, worker_id);
            state.tracking.clear(voided.id);
            state.notifications.send(
                &[worker_id],
                NotificationPayload::AssignmentCancelled {
                    order_id,
                    assignment_id: voided.id,
                },
            );
        }
        None => {
            state.metrics.open_offers.dec();
            let offered: Vec<Uuid> = voided.offered_to.iter().map(|q| q.worker_id).collect();
            state.notifications.send(
                &offered,
                NotificationPayload::ClaimVoid {
                    order_id,
                    assignment_id: voided.id,
                },
            );
        }
    }

    info!(order_id = %order_id, assignment_id = %voided.id, "assignment voided by order cancellation");
    state.emit(EngineEvent::AssignmentCancelled {
        order_id,
        assignment_id: voided.id,
        worker_id: voided.worker_id,
    });

    Some(voided)
}

/// Records a position for an in-flight assignment. The row's read lock is
/// held across the state check and the write; every transition out of
/// `claimed` takes the write lock before it clears tracking.
pub fn record_location(
    state: &AppState,
    assignment_id: Uuid,
    ping: Ping,
) -> Result<PingOutcome, AppError> {
    let (outcome, worker_id) = {
        let assignment = state
            .assignments
            .get(&assignment_id)
            .ok_or_else(|| AppError::NotFound(format!("assignment {assignment_id} not found")))?;
        if assignment.state != AssignmentState::Claimed {
            return Err(AppError::Conflict(format!(
                "assignment {assignment_id} is not in flight"
            )));
        }
        let outcome = state.tracking.record_ping(assignment_id, ping)?;
        (outcome, assignment.worker_id)
    };

    if outcome == PingOutcome::DiscardedOutOfOrder {
        debug!(assignment_id = %assignment_id, recorded_at = %ping.recorded_at, "out-of-order ping discarded");
        return Ok(outcome);
    }

    if let Some(worker_id) = worker_id {
        if let Some(mut worker) = state.workers.get_mut(&worker_id) {
            worker.location = Some(ping.location);
            worker.updated_at = Utc::now();
        }
    }
    state.emit(EngineEvent::LocationUpdated {
        assignment_id,
        location: ping.location,
        recorded_at: ping.recorded_at,
    });

    Ok(outcome)
}

pub fn mark_picked_up(state: &AppState, order_id: Uuid) {
    let Some(assignment_id) = state.current_offers.get(&order_id).map(|entry| *entry.value()) else {
        error!(order_id = %order_id, "picked up without an assignment");
        return;
    };

    match state.assignments.get_mut(&assignment_id) {
        Some(mut assignment) if assignment.state == AssignmentState::Claimed => {
            assignment.picked_up_at.get_or_insert(Utc::now());
        }
        _ => error!(order_id = %order_id, "picked up without a claimed assignment"),
    }
}

pub fn complete_delivery(state: &AppState, order_id: Uuid) {
    let Some(assignment_id) = state.current_offers.get(&order_id).map(|entry| *entry.value()) else {
        error!(order_id = %order_id, "delivered without an assignment");
        return;
    };

    let Some(completed) = transition(
        state,
        assignment_id,
        Utc::now(),
        |a| a.state == AssignmentState::Claimed,
        AssignmentState::Completed,
    ) else {
        error!(order_id = %order_id, "delivered without a claimed assignment");
        return;
    };

    let Some(worker_id) = completed.worker_id else {
        error!(order_id = %order_id, "completed assignment has no worker");
        return;
    };

    adjust_worker(state, worker_id, |worker| {
        worker.active_assignments = worker.active_assignments.saturating_sub(1);
        worker.total_deliveries += 1;
        worker.total_earnings += completed.fee;
    });
    state.tracking.clear(completed.id);

    info!(
        order_id = %order_id,
        assignment_id = %completed.id,
        worker_id = %worker_id,
        fee = completed.fee,
        "delivery completed"
    );
    state.emit(EngineEvent::DeliveryCompleted {
        order_id,
        assignment_id: completed.id,
        worker_id,
        fee: completed.fee,
    });
}

pub fn open_offers_for(state: &AppState, worker_id: Uuid) -> Vec<OfferView> {
    let now = Utc::now();
    let mut offers: Vec<(DeliveryAssignment, WorkerQuote)> = state
        .assignments
        .iter()
        .filter(|entry| entry.value().is_open_at(now))
        .filter_map(|entry| {
            let assignment = entry.value();
            let quote = assignment.quote_for(worker_id)?.clone();
            Some((assignment.clone(), quote))
        })
        .collect();
    offers.sort_by(|a, b| a.0.expires_at.cmp(&b.0.expires_at));

    offers
        .into_iter()
        .filter_map(|(assignment, quote)| {
            let order: Order = state.orders.get(&assignment.order_id)?.value().clone();
            Some(OfferView {
                assignment_id: assignment.id,
                order_id: assignment.order_id,
                fee: quote.fee,
                distance_km: quote.distance_km,
                approach_km: quote.approach_km,
                zone: quote.zone,
                pickup_address: order.pickup_address,
                delivery_address: order.delivery_address,
                special_instructions: order.special_instructions,
                expires_at: assignment.expires_at,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::sync::{Arc, Barrier};
    use std::thread;
    use std::time::Duration;

    use chrono::{Duration as ChronoDuration, Utc};
    use uuid::Uuid;

    use super::{
        accept_offer, accept_offer_at, accept_offer_with, audit_order, cancel_claim,
        expire_offer_at, open_offers_for, record_location, reoffer, ExpiryOutcome,
    };
    use crate::config::EngineSettings;
    use crate::engine::fixtures;
    use crate::engine::lifecycle::advance_status;
    use crate::error::AppError;
    use crate::models::assignment::AssignmentState;
    use crate::models::notification::{NotificationKind, NotificationPayload};
    use crate::models::order::{ActorRole, OrderStatus};
    use crate::models::worker::GeoPoint;
    use crate::tracking::Ping;

    const NEAR_PICKUP: GeoPoint = GeoPoint {
        lat: 52.5210,
        lng: 13.4060,
    };

    #[test]
    fn ready_for_pickup_broadcasts_to_nearby_workers() {
        let state = fixtures::state();
        let near = fixtures::worker(&state, 1, NEAR_PICKUP);
        // ~11 km north, outside the 5 km base radius.
        let far = fixtures::worker(&state, 2, GeoPoint::new(52.62, 13.405));

        let order_id = fixtures::ready_order(&state, 1);

        let offer = state.current_assignment(order_id).unwrap();
        assert_eq!(offer.state, AssignmentState::Offered);
        assert_eq!(offer.offered_to.len(), 1);
        assert!(offer.quote_for(near).is_some());
        assert!(offer.quote_for(far).is_none());
        assert_eq!(offer.fee, 30.0);

        let inbox = state.notifications.list_for(near, false);
        assert_eq!(inbox.len(), 1);
        match &inbox[0].payload {
            NotificationPayload::DeliveryOffer {
                fee,
                special_instructions,
                ..
            } => {
                assert_eq!(*fee, 30.0);
                assert_eq!(special_instructions.as_deref(), Some("ring twice"));
            }
            other => panic!("unexpected payload {other:?}"),
        }
        assert!(state.notifications.list_for(far, false).is_empty());

        let views = open_offers_for(&state, near);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].order_id, order_id);
    }

    #[test]
    fn concurrent_accepts_produce_exactly_one_winner() {
        let state = fixtures::state();
        let workers: Vec<Uuid> = (0..8)
            .map(|seed| fixtures::worker(&state, seed, NEAR_PICKUP))
            .collect();
        let order_id = fixtures::ready_order(&state, 101);

        let barrier = Arc::new(Barrier::new(workers.len()));
        let handles: Vec<_> = workers
            .iter()
            .map(|worker_id| {
                let state = Arc::clone(&state);
                let barrier = Arc::clone(&barrier);
                let worker_id = *worker_id;
                thread::spawn(move || {
                    barrier.wait();
                    accept_offer(&state, order_id, worker_id)
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
        assert_eq!(winners.len(), 1);
        let losers = results
            .iter()
            .filter(|r| matches!(r, Err(AppError::AlreadyClaimed(_))))
            .count();
        assert_eq!(losers, workers.len() - 1);

        let winner = winners[0].worker_id.unwrap();
        assert_eq!(state.orders.get(&order_id).unwrap().status, OrderStatus::AssignedForDelivery);
        assert_eq!(audit_order(&state, order_id), 1);
        for worker_id in &workers {
            let expected = u8::from(*worker_id == winner);
            assert_eq!(state.workers.get(worker_id).unwrap().active_assignments, expected);
        }

        let void_notices = workers
            .iter()
            .filter(|id| **id != winner)
            .filter(|id| {
                state
                    .notifications
                    .list_for(**id, false)
                    .iter()
                    .any(|n| n.kind == NotificationKind::ClaimVoid)
            })
            .count();
        assert_eq!(void_notices, workers.len() - 1);
    }

    #[test]
    fn repeat_accept_by_the_winner_is_idempotent() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);

        let first = accept_offer(&state, order_id, worker_id).unwrap();
        let second = accept_offer(&state, order_id, worker_id).unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.state, AssignmentState::Claimed);
        assert_eq!(state.workers.get(&worker_id).unwrap().active_assignments, 1);
    }

    #[test]
    fn worker_outside_the_offer_cannot_claim() {
        let state = fixtures::state();
        fixtures::worker(&state, 1, NEAR_PICKUP);
        let stranger = fixtures::worker(&state, 2, GeoPoint::new(52.62, 13.405));
        let order_id = fixtures::ready_order(&state, 1);

        let err = accept_offer(&state, order_id, stranger).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn accept_at_the_deadline_is_expired() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        let offer = state.current_assignment(order_id).unwrap();

        let err = accept_offer_at(&state, order_id, worker_id, offer.expires_at).unwrap_err();

        assert!(matches!(err, AppError::OfferExpired(_)));
        assert_eq!(state.workers.get(&worker_id).unwrap().active_assignments, 0);
        assert_eq!(state.orders.get(&order_id).unwrap().status, OrderStatus::ReadyForPickup);
    }

    #[test]
    fn expired_offer_is_reoffered_with_a_wider_radius() {
        let state = fixtures::state_with(EngineSettings {
            offer_ttl: Duration::from_secs(60),
            ..EngineSettings::default()
        });
        let near = fixtures::worker(&state, 1, NEAR_PICKUP);
        // ~6 km north: outside 5 km, inside 7.5 km.
        let edge = fixtures::worker(&state, 2, GeoPoint::new(52.574, 13.405));
        let order_id = fixtures::ready_order(&state, 1);
        let first = state.current_assignment(order_id).unwrap();
        assert!(first.quote_for(edge).is_none());

        let later = first.offered_at + ChronoDuration::seconds(61);
        assert!(matches!(
            accept_offer_at(&state, order_id, near, later),
            Err(AppError::OfferExpired(_))
        ));

        let outcome = expire_offer_at(&state, order_id, later).unwrap();

        let second = match outcome {
            ExpiryOutcome::Reoffered { assignment } => assignment,
            other => panic!("expected a re-offer, got {other:?}"),
        };
        assert_eq!(state.assignments.get(&first.id).unwrap().state, AssignmentState::Expired);
        assert_eq!(second.attempt, 1);
        assert!(second.radius_km > first.radius_km);
        assert!(second.quote_for(edge).is_some());
        assert_ne!(second.id, first.id);
        assert!(state
            .notifications
            .list_for(near, false)
            .iter()
            .any(|n| n.kind == NotificationKind::ClaimVoid));

        let claimed = accept_offer_at(&state, order_id, edge, later).unwrap();
        assert_eq!(claimed.id, second.id);
    }

    #[test]
    fn expiry_before_the_deadline_is_a_no_op() {
        let state = fixtures::state();
        fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        let offer = state.current_assignment(order_id).unwrap();

        let outcome =
            expire_offer_at(&state, order_id, offer.expires_at - ChronoDuration::seconds(1))
                .unwrap();

        assert!(matches!(outcome, ExpiryOutcome::NotDue));
        assert_eq!(state.current_assignment(order_id).unwrap().id, offer.id);
    }

    #[test]
    fn exhausted_retries_escalate_to_the_store() {
        let state = fixtures::state_with(EngineSettings {
            max_offer_retries: 1,
            ..EngineSettings::default()
        });
        let order_id = fixtures::ready_order(&state, 7);

        let first = state.current_assignment(order_id).unwrap();
        assert!(first.offered_to.is_empty());
        let outcome = expire_offer_at(&state, order_id, first.expires_at).unwrap();
        let second = match outcome {
            ExpiryOutcome::Reoffered { assignment } => assignment,
            other => panic!("expected a re-offer, got {other:?}"),
        };

        let outcome = expire_offer_at(&state, order_id, second.expires_at).unwrap();

        assert!(matches!(outcome, ExpiryOutcome::Escalated { attempts: 2 }));
        let store_inbox = state.notifications.list_for(fixtures::store_id(7), false);
        assert!(store_inbox
            .iter()
            .any(|n| n.kind == NotificationKind::OfferEscalation));
        assert_eq!(state.orders.get(&order_id).unwrap().status, OrderStatus::ReadyForPickup);
        assert_eq!(state.assignments_for_order(order_id).len(), 2);

        let fresh = reoffer(&state, order_id).unwrap();
        assert_eq!(fresh.attempt, 0);
        assert_eq!(fresh.state, AssignmentState::Offered);
        assert!(matches!(reoffer(&state, order_id), Err(AppError::Conflict(_))));
    }

    #[test]
    fn cancelled_claim_reverts_the_order_and_reoffers() {
        let state = fixtures::state();
        let quitter = fixtures::worker(&state, 1, NEAR_PICKUP);
        let backup = fixtures::worker(&state, 2, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        accept_offer(&state, order_id, quitter).unwrap();

        let outcome = cancel_claim(&state, quitter, order_id).unwrap();

        assert_eq!(outcome.cancelled.state, AssignmentState::Cancelled);
        let order = state.orders.get(&order_id).unwrap().clone();
        assert_eq!(order.status, OrderStatus::ReadyForPickup);
        assert!(order.has_passed_through(OrderStatus::AssignedForDelivery));

        let worker = state.workers.get(&quitter).unwrap().clone();
        assert_eq!(worker.cancellations, 1);
        assert_eq!(worker.active_assignments, 0);

        let next = outcome.next_offer.unwrap();
        assert_eq!(next.state, AssignmentState::Offered);
        assert!(next.quote_for(quitter).is_none());
        assert!(next.quote_for(backup).is_some());

        assert!(accept_offer(&state, order_id, backup).is_ok());
        assert_eq!(audit_order(&state, order_id), 1);
    }

    #[test]
    fn cancel_claim_by_someone_else_is_rejected() {
        let state = fixtures::state();
        let owner = fixtures::worker(&state, 1, NEAR_PICKUP);
        let other = fixtures::worker(&state, 2, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        accept_offer(&state, order_id, owner).unwrap();

        let err = cancel_claim(&state, other, order_id).unwrap_err();

        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(state.orders.get(&order_id).unwrap().status, OrderStatus::AssignedForDelivery);
    }

    #[test]
    fn order_cancellation_withdraws_the_offer() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);

        advance_status(&state, order_id, OrderStatus::Cancelled, ActorRole::Customer).unwrap();

        let err = accept_offer(&state, order_id, worker_id).unwrap_err();
        assert!(matches!(err, AppError::OfferWithdrawn(_)));
        assert_eq!(
            state.current_assignment(order_id).unwrap().state,
            AssignmentState::Cancelled
        );
        assert_eq!(state.workers.get(&worker_id).unwrap().active_assignments, 0);
        assert_eq!(state.metrics.open_offers.get(), 0);
    }

    #[test]
    fn cancelling_an_assigned_order_frees_the_worker() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        accept_offer(&state, order_id, worker_id).unwrap();

        advance_status(&state, order_id, OrderStatus::Cancelled, ActorRole::Store).unwrap();

        assert_eq!(state.workers.get(&worker_id).unwrap().active_assignments, 0);
        assert!(state
            .notifications
            .list_for(worker_id, false)
            .iter()
            .any(|n| n.kind == NotificationKind::AssignmentCancelled));
    }

    #[test]
    fn full_worker_cannot_take_a_second_order() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let first = fixtures::ready_order(&state, 1);
        let second = fixtures::ready_order(&state, 2);
        accept_offer(&state, first, worker_id).unwrap();

        let err = accept_offer(&state, second, worker_id).unwrap_err();

        assert!(matches!(err, AppError::CapacityExceeded(_)));
        assert_eq!(state.orders.get(&second).unwrap().status, OrderStatus::ReadyForPickup);
        assert!(state.current_assignment(second).unwrap().is_open_at(chrono::Utc::now()));
    }

    #[test]
    fn delivery_completion_credits_the_worker() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        let claimed = accept_offer(&state, order_id, worker_id).unwrap();

        let err = advance_status(&state, order_id, OrderStatus::Delivered, ActorRole::Worker)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));

        for status in [OrderStatus::PickedUp, OrderStatus::InTransit, OrderStatus::Delivered] {
            advance_status(&state, order_id, status, ActorRole::Worker).unwrap();
        }

        let order = state.orders.get(&order_id).unwrap().clone();
        assert!(order.has_passed_through(OrderStatus::AssignedForDelivery));
        assert!(order.has_passed_through(OrderStatus::PickedUp));

        let assignment = state.assignments.get(&claimed.id).unwrap().clone();
        assert_eq!(assignment.state, AssignmentState::Completed);
        assert!(assignment.picked_up_at.is_some());
        assert!(assignment.delivered_at.is_some());

        let worker = state.workers.get(&worker_id).unwrap().clone();
        assert_eq!(worker.total_deliveries, 1);
        assert_eq!(worker.total_earnings, claimed.fee);
        assert_eq!(worker.active_assignments, 0);
        assert_eq!(audit_order(&state, order_id), 1);
    }

    #[test]
    fn audit_reports_double_claims() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        let claimed = accept_offer(&state, order_id, worker_id).unwrap();

        let mut rogue = claimed.clone();
        rogue.id = Uuid::new_v4();
        state.assignments.insert(rogue.id, rogue.clone());
        state
            .order_assignments
            .entry(order_id)
            .or_default()
            .push(rogue.id);

        assert_eq!(audit_order(&state, order_id), 2);
        assert_eq!(state.metrics.invariant_violations_total.get(), 1);
    }

    #[test]
    fn deadline_is_judged_when_the_row_is_swapped() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        let deadline = state.current_assignment(order_id).unwrap().expires_at;

        // Open when the request arrives, at the deadline by the time the row lock is held.
        let reads = Cell::new(0);
        let clock = || {
            reads.set(reads.get() + 1);
            if reads.get() == 1 {
                deadline - ChronoDuration::seconds(1)
            } else {
                deadline
            }
        };
        let err = accept_offer_with(&state, order_id, worker_id, &clock).unwrap_err();

        assert!(matches!(err, AppError::OfferExpired(_)));
        assert!(reads.get() >= 2);
        assert_eq!(state.workers.get(&worker_id).unwrap().active_assignments, 0);
        let offer = state.current_assignment(order_id).unwrap();
        assert_eq!(offer.state, AssignmentState::Offered);
        assert!(offer.claimed_at.is_none());
    }

    #[test]
    fn accept_racing_cancellation_leaves_nothing_held() {
        for round in 0..50 {
            let state = fixtures::state();
            let worker_id = fixtures::worker(&state, round, NEAR_PICKUP);
            let order_id = fixtures::ready_order(&state, round);

            let barrier = Arc::new(Barrier::new(2));
            let rider = {
                let state = Arc::clone(&state);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    accept_offer(&state, order_id, worker_id)
                })
            };
            barrier.wait();
            advance_status(&state, order_id, OrderStatus::Cancelled, ActorRole::Customer).unwrap();
            let result = rider.join().unwrap();

            assert!(
                matches!(result, Ok(_) | Err(AppError::OfferWithdrawn(_))),
                "round {round}: {result:?}"
            );
            assert_eq!(state.workers.get(&worker_id).unwrap().active_assignments, 0);
            assert_eq!(
                state.current_assignment(order_id).unwrap().state,
                AssignmentState::Cancelled
            );
            assert_eq!(state.metrics.open_offers.get(), 0);
            assert_eq!(audit_order(&state, order_id), 0);
        }
    }

    #[test]
    fn cancelling_while_the_offer_opens_leaves_no_live_offer() {
        for round in 0..50 {
            let state = fixtures::state();
            let worker_id = fixtures::worker(&state, round, NEAR_PICKUP);
            let order_id = fixtures::order(&state, round);
            advance_status(&state, order_id, OrderStatus::Processing, ActorRole::Store).unwrap();

            let barrier = Arc::new(Barrier::new(2));
            let store = {
                let state = Arc::clone(&state);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    advance_status(&state, order_id, OrderStatus::ReadyForPickup, ActorRole::Store)
                })
            };
            barrier.wait();
            advance_status(&state, order_id, OrderStatus::Cancelled, ActorRole::Customer).unwrap();
            let _ = store.join().unwrap();

            assert_eq!(state.orders.get(&order_id).unwrap().status, OrderStatus::Cancelled);
            assert!(state
                .current_assignment(order_id)
                .map_or(true, |offer| offer.state == AssignmentState::Cancelled));
            assert!(open_offers_for(&state, worker_id).is_empty());
            assert_eq!(state.metrics.open_offers.get(), 0);
            assert!(state
                .notifications
                .list_for(fixtures::store_id(round), false)
                .iter()
                .all(|n| n.kind != NotificationKind::OfferEscalation));
        }
    }

    #[test]
    fn pings_after_delivery_are_refused() {
        let state = fixtures::state();
        let worker_id = fixtures::worker(&state, 1, NEAR_PICKUP);
        let order_id = fixtures::ready_order(&state, 1);
        let claimed = accept_offer(&state, order_id, worker_id).unwrap();

        record_location(&state, claimed.id, Ping::at(NEAR_PICKUP, Utc::now())).unwrap();
        assert_eq!(state.tracking.len(), 1);
        assert_eq!(state.workers.get(&worker_id).unwrap().location, Some(NEAR_PICKUP));

        for status in [OrderStatus::PickedUp, OrderStatus::InTransit, OrderStatus::Delivered] {
            advance_status(&state, order_id, status, ActorRole::Worker).unwrap();
        }
        assert!(state.tracking.is_empty());

        let err = record_location(&state, claimed.id, Ping::at(fixtures::DROPOFF, Utc::now()))
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(state.tracking.is_empty());
    }

    #[test]
    fn pings_racing_delivery_never_leave_tracking_behind() {
        for round in 0..50 {
            let state = fixtures::state();
            let worker_id = fixtures::worker(&state, round, NEAR_PICKUP);
            let order_id = fixtures::ready_order(&state, round);
            let claimed = accept_offer(&state, order_id, worker_id).unwrap();
            for status in [OrderStatus::PickedUp, OrderStatus::InTransit] {
                advance_status(&state, order_id, status, ActorRole::Worker).unwrap();
            }

            let barrier = Arc::new(Barrier::new(2));
            let rider = {
                let state = Arc::clone(&state);
                let barrier = Arc::clone(&barrier);
                let assignment_id = claimed.id;
                thread::spawn(move || {
                    barrier.wait();
                    loop {
                        let ping = Ping::at(NEAR_PICKUP, Utc::now());
                        if let Err(err) = record_location(&state, assignment_id, ping) {
                            break err;
                        }
                    }
                })
            };
            barrier.wait();
            advance_status(&state, order_id, OrderStatus::Delivered, ActorRole::Worker).unwrap();

            let err = rider.join().unwrap();
            assert!(matches!(err, AppError::Conflict(_)), "round {round}: {err:?}");
            assert!(state.tracking.is_empty(), "round {round}: tracking row survived delivery");
        }
    }
}
