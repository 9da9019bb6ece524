use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::Json;
use axum::Router;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::models::notification::Notification;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/:id/read", put(mark_read))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxQuery {
    pub recipient_id: Uuid,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientQuery {
    pub recipient_id: Uuid,
}

#[derive(Serialize)]
pub struct ReadAllResponse {
    pub updated: usize,
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    Query(query): Query<InboxQuery>,
) -> Json<Vec<Notification>> {
    Json(
        state
            .notifications
            .list_for(query.recipient_id, query.unread_only),
    )
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, AppError> {
    let notification = state.notifications.mark_read(id)?;
    Ok(Json(notification))
}

async fn mark_all_read(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecipientQuery>,
) -> Json<ReadAllResponse> {
    let updated = state.notifications.mark_all_read(query.recipient_id);
    Json(ReadAllResponse { updated })
}
