use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::engine::broker::sweep_expired_offers;
use crate::state::AppState;

/// Periodically expires offers whose deadline passed without a claim. Expiry
/// is also decided inline by any accept that arrives late, so the sweep only
/// bounds how long an abandoned offer lingers.
pub async fn run_expiry_sweeper(state: Arc<AppState>) {
    let period = state.settings.expiry_sweep_interval;
    info!(interval_ms = period.as_millis() as u64, "offer expiry sweeper started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let expired = sweep_expired_offers(&state, Utc::now());
        if expired > 0 {
            debug!(expired, "expiry sweep finished");
        }
    }
}
