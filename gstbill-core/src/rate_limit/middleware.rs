use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use super::{RateLimitDecision, RateLimitPolicy, RateLimitStore};
use crate::app::AppState;
use crate::auth::CurrentUser;
use crate::error::AppError;

const REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Counts one attempt and turns a denial into `429 Too Many Requests`.
///
/// Store failures are logged and the request is let through.
pub async fn enforce(
    store: &dyn RateLimitStore,
    key: &str,
    policy: RateLimitPolicy,
) -> Result<Option<RateLimitDecision>, AppError> {
    match store.check_policy(key, policy).await {
        Ok(decision) if decision.allowed => Ok(Some(decision)),
        Ok(decision) => {
            warn!(key = %key, retry_after = decision.retry_after_seconds, "Rate limit exceeded");
            Err(AppError::TooManyRequests {
                retry_after_seconds: decision.retry_after_seconds,
            })
        }
        Err(e) => {
            warn!(key = %key, "Rate limiter unavailable, allowing request: {}", e);
            Ok(None)
        }
    }
}

/// Throttles authenticated API calls per user.
///
/// Must run after the JWT middleware; requests without a [`CurrentUser`] are
/// passed through untouched.
pub async fn throttle_api(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(user) = request.extensions().get::<CurrentUser>().cloned() else {
        return Ok(next.run(request).await);
    };

    let key = format!("api:{}", user.user_id);
    let decision = enforce(state.rate_limiter.as_ref(), &key, state.config.api_rate_limit).await?;

    let mut response = next.run(request).await;
    if let Some(decision) = decision {
        debug!(user_id = %user.user_id, remaining = decision.remaining, "Rate limit checked");
        response
            .headers_mut()
            .insert(REMAINING_HEADER, HeaderValue::from(decision.remaining));
    }
    Ok(response)
}
