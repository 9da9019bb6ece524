use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::order::OrderStatus;

#[derive(Debug, Error, PartialEq)]
pub enum AppError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("offer for order {0} was already claimed")]
    AlreadyClaimed(String),

    #[error("offer for order {0} has expired")]
    OfferExpired(String),

    /// The offer was cancelled (order cancelled) while the accept was in flight.
    #[error("offer for order {0} was withdrawn")]
    OfferWithdrawn(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("geo data missing: {0}")]
    GeoDataMissing(String),

    #[error("worker {0} is at assignment capacity")]
    CapacityExceeded(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Outcomes every losing worker in a race is expected to see.
    pub fn is_race_loss(&self) -> bool {
        matches!(
            self,
            AppError::AlreadyClaimed(_) | AppError::OfferExpired(_) | AppError::OfferWithdrawn(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "ValidationError",
            AppError::InvalidTransition { .. } => "InvalidTransition",
            AppError::AlreadyClaimed(_) => "AlreadyClaimed",
            AppError::OfferExpired(_) => "OfferExpired",
            AppError::OfferWithdrawn(_) => "OfferWithdrawn",
            AppError::NotFound(_) => "NotFound",
            AppError::GeoDataMissing(_) => "GeoDataMissing",
            AppError::CapacityExceeded(_) => "CapacityExceeded",
            AppError::Forbidden(_) => "Forbidden",
            AppError::Conflict(_) => "Conflict",
            AppError::Internal(_) => "InternalError",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::GeoDataMissing(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::InvalidTransition { .. }
            | AppError::AlreadyClaimed(_)
            | AppError::OfferExpired(_)
            | AppError::OfferWithdrawn(_)
            | AppError::CapacityExceeded(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));

        (self.status(), body).into_response()
    }
}
