use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use sqlx::PgPool;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entitlements;
use crate::error::{AppError, LedgerError};
use crate::ledger::kind::LedgerKind;
use crate::ledger::payments::{apply_in_tx, external_transaction_exists, NewPayment, PaymentMode};
use crate::ledger::repository;
use crate::models::PaymentMethod;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Checks a hex HMAC-SHA256 signature over the raw request body.
pub fn verify_signature(secret: &str, body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}

pub fn sign(secret: &str, body: &[u8]) -> Result<String, anyhow::Error> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| anyhow::anyhow!("Invalid key length"))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Paid,
    Pending,
    Failed,
}

/// Provider payloads reduced to the fields the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankNotification {
    pub status: NotificationStatus,
    pub paid_amount: Decimal,
    /// Invoice id or invoice number
    pub reference_id: String,
    /// Bank-side transaction id; a payment is recorded at most once per id
    pub transaction_id: String,
    pub paid_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BnbPayload {
    txn_status: String,
    txn_amount: Decimal,
    order_no: String,
    txn_id: String,
    txn_time: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct DpnbPayload {
    event: String,
    data: DpnbPayment,
}

#[derive(Debug, Deserialize)]
struct DpnbPayment {
    id: String,
    amount: Decimal,
    invoice_ref: String,
    completed_at: Option<DateTime<Utc>>,
}

/// Parses a provider payload into a [`BankNotification`].
///
/// Unknown providers are expected to post the normalized shape directly.
pub fn normalize(provider: &str, body: &[u8]) -> Result<BankNotification, AppError> {
    let invalid = |e: serde_json::Error| {
        AppError::BadRequest(format!("invalid {} payload: {}", provider, e))
    };

    match provider.to_ascii_lowercase().as_str() {
        "bnb" => {
            let payload: BnbPayload = serde_json::from_slice(body).map_err(invalid)?;
            let status = match payload.txn_status.to_ascii_uppercase().as_str() {
                "SUCCESS" | "PAID" => NotificationStatus::Paid,
                "PENDING" | "INITIATED" => NotificationStatus::Pending,
                _ => NotificationStatus::Failed,
            };
            Ok(BankNotification {
                status,
                paid_amount: payload.txn_amount,
                reference_id: payload.order_no,
                transaction_id: payload.txn_id,
                paid_at: payload.txn_time,
            })
        }
        "dpnb" => {
            let payload: DpnbPayload = serde_json::from_slice(body).map_err(invalid)?;
            let status = match payload.event.as_str() {
                "payment.completed" => NotificationStatus::Paid,
                "payment.pending" => NotificationStatus::Pending,
                _ => NotificationStatus::Failed,
            };
            Ok(BankNotification {
                status,
                paid_amount: payload.data.amount,
                reference_id: payload.data.invoice_ref,
                transaction_id: payload.data.id,
                paid_at: payload.data.completed_at.unwrap_or_else(Utc::now),
            })
        }
        _ => serde_json::from_slice(body).map_err(invalid),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied {
        payment_id: Uuid,
        invoice_id: Uuid,
        amount_due: Decimal,
    },
    /// The transaction id was seen before; nothing was applied.
    Duplicate,
    /// Not a settled payment.
    Ignored { status: NotificationStatus },
}

/// Applies a settled bank payment to the referenced invoice exactly once.
#[instrument(
    skip(pool, notification),
    fields(provider = %provider, transaction_id = %notification.transaction_id)
)]
pub async fn process_notification(
    pool: &PgPool,
    provider: &str,
    notification: BankNotification,
) -> Result<WebhookOutcome, AppError> {
    if notification.status != NotificationStatus::Paid {
        info!(status = ?notification.status, "Ignoring bank notification");
        return Ok(WebhookOutcome::Ignored {
            status: notification.status,
        });
    }

    let kind = LedgerKind::Invoice;
    let external_id = format!("{}:{}", provider.to_ascii_lowercase(), notification.transaction_id);

    let mut tx = pool.begin().await.map_err(LedgerError::from)?;
    if external_transaction_exists(&mut tx, kind, &external_id).await? {
        info!("Duplicate bank notification");
        return Ok(WebhookOutcome::Duplicate);
    }

    let (team_id, invoice_id) =
        repository::find_by_reference(&mut tx, kind, &notification.reference_id).await?;
    entitlements::require_feature(pool, team_id, entitlements::BANK_WEBHOOKS).await?;

    let payment = NewPayment {
        amount: notification.paid_amount,
        currency: None,
        method: PaymentMethod::BankTransfer,
        reference: Some(notification.reference_id.clone()),
        external_transaction_id: Some(external_id),
        paid_at: notification.paid_at,
    };

    let applied =
        apply_in_tx(&mut tx, kind, team_id, invoice_id, payment, PaymentMode::Standard).await;
    let receipt = match applied {
        Ok(receipt) => receipt,
        // A concurrent delivery of the same notification won the insert.
        Err(LedgerError::Duplicate(_)) => return Ok(WebhookOutcome::Duplicate),
        Err(e) => {
            warn!(invoice_id = %invoice_id, "Bank payment could not be applied: {}", e);
            return Err(e.into());
        }
    };
    tx.commit().await.map_err(LedgerError::from)?;

    info!(
        invoice_id = %invoice_id,
        amount = %receipt.payment.amount,
        amount_due = %receipt.document.balance.amount_due,
        "Bank payment applied"
    );

    Ok(WebhookOutcome::Applied {
        payment_id: receipt.payment.id,
        invoice_id,
        amount_due: receipt.document.balance.amount_due,
    })
}
