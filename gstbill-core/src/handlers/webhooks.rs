use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use tracing::{info, warn};

use crate::app::AppState;
use crate::error::AppError;
use crate::rate_limit::middleware::enforce;
use crate::webhooks::bank::{self, WebhookOutcome, SIGNATURE_HEADER};

/// `POST /api/webhooks/bank/:provider`
///
/// Responds `200` for applied, duplicate and ignored notifications so the
/// bank stops retrying; only signature and payload problems are errors.
pub async fn bank_webhook(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, AppError> {
    let provider = provider.to_ascii_lowercase();
    let secret = state.config.webhook_secret(&provider).ok_or_else(|| {
        warn!(provider = %provider, "Webhook for unconfigured provider");
        AppError::BadRequest(format!("unknown provider {}", provider))
    })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(AppError::Unauthorized)?;
    if !bank::verify_signature(secret, &body, signature) {
        warn!(provider = %provider, "Webhook signature verification failed");
        return Err(AppError::Unauthorized);
    }

    // Only signed traffic counts against the provider's budget.
    enforce(
        state.rate_limiter.as_ref(),
        &format!("webhook:{}", provider),
        state.config.webhook_rate_limit,
    )
    .await?;

    let notification = bank::normalize(&provider, &body)?;
    info!(
        provider = %provider,
        reference = %notification.reference_id,
        "Bank notification received"
    );

    let outcome = bank::process_notification(&state.db, &provider, notification).await?;
    let response = match &outcome {
        WebhookOutcome::Duplicate => serde_json::json!({ "received": true, "duplicate": true }),
        other => {
            let mut value = serde_json::to_value(other)
                .map_err(|e| AppError::Internal(anyhow::anyhow!(e)))?;
            if let Some(map) = value.as_object_mut() {
                map.insert("received".to_string(), serde_json::Value::Bool(true));
                map.insert("duplicate".to_string(), serde_json::Value::Bool(false));
            }
            value
        }
    };

    Ok(Json(response))
}
