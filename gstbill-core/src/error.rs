use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;

use crate::validation::FieldError;

/// Business-rule failures raised by the balance updater and document services.
///
/// These are returned as values, never panics, so handlers can map each case
/// to a stable HTTP status.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The document, payment or note does not exist or belongs to another team.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Malformed input such as a zero amount or a currency mismatch.
    #[error("validation failed: {0}")]
    ValidationError(String),

    /// A standard payment larger than the outstanding balance.
    #[error("payment of {requested} exceeds amount due {amount_due}")]
    OverpaymentRejected {
        requested: Decimal,
        amount_due: Decimal,
    },

    /// A note application larger than the note's unapplied amount or the
    /// document's amount due.
    #[error("amount {requested} exceeds available balance {available}")]
    ExceedsAvailableBalance {
        requested: Decimal,
        available: Decimal,
    },

    /// Line items cannot change once a document has been sent or paid.
    #[error("document is locked")]
    DocumentLocked,

    #[error("operation not allowed while document is {0}")]
    InvalidStatus(String),

    #[error("duplicate {0}")]
    Duplicate(&'static str),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors surfaced by HTTP handlers.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("validation error")]
    Validation(Vec<FieldError>),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("too many requests")]
    TooManyRequests { retry_after_seconds: u64 },

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Ledger(LedgerError::Database(err))
    }
}

impl From<Vec<FieldError>> for AppError {
    fn from(errors: Vec<FieldError>) -> Self {
        AppError::Validation(errors)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

impl AppError {
    fn status_and_code(&self) -> (StatusCode, Option<&'static str>) {
        match self {
            AppError::Ledger(err) => match err {
                LedgerError::NotFound(_) => (StatusCode::NOT_FOUND, Some("not_found")),
                LedgerError::ValidationError(_) => {
                    (StatusCode::UNPROCESSABLE_ENTITY, Some("validation_error"))
                }
                LedgerError::OverpaymentRejected { .. } => {
                    (StatusCode::CONFLICT, Some("overpayment_rejected"))
                }
                LedgerError::ExceedsAvailableBalance { .. } => {
                    (StatusCode::CONFLICT, Some("exceeds_available_balance"))
                }
                LedgerError::DocumentLocked => (StatusCode::CONFLICT, Some("document_locked")),
                LedgerError::InvalidStatus(_) => (StatusCode::CONFLICT, Some("invalid_status")),
                LedgerError::Duplicate(_) => (StatusCode::CONFLICT, Some("duplicate")),
                LedgerError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
            },
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, Some("validation_error")),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, None),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, None),
            AppError::TooManyRequests { .. } => (StatusCode::TOO_MANY_REQUESTS, None),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, None),
            AppError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, None),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();

        // Infrastructure failures are logged in full and reported generically.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {:?}", self);
            "Something went wrong. Please try again.".to_string()
        } else {
            self.to_string()
        };

        let retry_after = match &self {
            AppError::TooManyRequests {
                retry_after_seconds,
            } => Some(*retry_after_seconds),
            _ => None,
        };

        let fields = match self {
            AppError::Validation(fields) => fields,
            _ => Vec::new(),
        };

        let mut response = (
            status,
            Json(ErrorBody {
                error: message,
                code,
                fields,
            }),
        )
            .into_response();

        if let Some(seconds) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, seconds.into());
        }

        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_overpayment_maps_to_conflict() {
        let err = AppError::from(LedgerError::OverpaymentRejected {
            requested: dec!(15.00),
            amount_due: dec!(10.00),
        });
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let response = AppError::from(LedgerError::NotFound("invoice")).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_too_many_requests_sets_retry_after() {
        let response = AppError::TooManyRequests {
            retry_after_seconds: 42,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            "42"
        );
    }
}
