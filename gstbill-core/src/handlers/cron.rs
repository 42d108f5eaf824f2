use axum::{extract::State, http::HeaderMap, Json};
use hmac::Mac;
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::AppError;
use crate::worker::{ReminderScheduler, SweepReport};

/// Constant-time comparison of the bearer token with the configured secret.
fn secret_matches(expected: &str, provided: &str) -> bool {
    let Ok(mut mac) = hmac::Hmac::<sha2::Sha256>::new_from_slice(expected.as_bytes()) else {
        return false;
    };
    mac.update(b"cron");
    let expected_tag = mac.finalize().into_bytes();

    let Ok(mut mac) = hmac::Hmac::<sha2::Sha256>::new_from_slice(provided.as_bytes()) else {
        return false;
    };
    mac.update(b"cron");
    mac.verify_slice(&expected_tag).is_ok()
}

/// `POST /api/cron/reminders`, called by an external scheduler.
pub async fn run_reminders(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SweepReport>, AppError> {
    let Some(secret) = state.config.cron_secret.as_deref() else {
        warn!("Cron request rejected: CRON_SECRET is not configured");
        return Err(AppError::Unauthorized);
    };

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if !secret_matches(secret, provided.trim()) {
        return Err(AppError::Unauthorized);
    }

    info!("Reminder sweep triggered by cron");
    let scheduler = ReminderScheduler::new(
        state.db.clone(),
        state.mailer.clone(),
        state.config.reminder_batch_limit,
    );
    let report = scheduler.run_once().await?;
    Ok(Json(report))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_matches() {
        assert!(secret_matches("s3cret", "s3cret"));
        assert!(!secret_matches("s3cret", "s3cret "));
        assert!(!secret_matches("s3cret", ""));
    }
}
