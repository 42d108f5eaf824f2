use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::ledger::balance::PosSettlement;
use crate::ledger::kind::LedgerKind;
use crate::ledger::repository::{self, is_unique_violation};
use crate::models::{FinancialDocument, Payment, PaymentMethod};
use crate::validation::{currency_code, positive_amount};

/// Request body for recording a payment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,

    /// Must match the document currency when given
    #[validate(custom(function = "currency_code"))]
    pub currency: Option<String>,

    pub method: PaymentMethod,

    #[validate(length(max = 200))]
    pub reference: Option<String>,

    pub paid_at: Option<DateTime<Utc>>,
}

/// How the requested amount is reconciled with the amount due.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentMode {
    /// Reject anything above the amount due.
    Standard,
    /// Accept up to the amount due and hand back the rest as change.
    PointOfSale,
}

/// A payment to be inserted.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub amount: Decimal,
    pub currency: Option<String>,
    pub method: PaymentMethod,
    pub reference: Option<String>,
    pub external_transaction_id: Option<String>,
    pub paid_at: DateTime<Utc>,
}

impl From<RecordPaymentRequest> for NewPayment {
    fn from(request: RecordPaymentRequest) -> Self {
        NewPayment {
            amount: request.amount,
            currency: request.currency,
            method: request.method,
            reference: request.reference,
            external_transaction_id: None,
            paid_at: request.paid_at.unwrap_or_else(Utc::now),
        }
    }
}

/// Result of applying a payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub document: FinancialDocument,
    /// Only present for point-of-sale payments
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settlement: Option<PosSettlement>,
}

const PAYMENT_COLUMNS: &str = "id, team_id, {fk} AS document_id, amount, currency, method, \
     reference, external_transaction_id, paid_at, created_at";

fn payment_columns(kind: LedgerKind) -> String {
    PAYMENT_COLUMNS.replace("{fk}", kind.document_fk())
}

/// Applies a payment to a locked document row and inserts the payment record
/// in the same transaction.
pub(crate) async fn apply_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
    payment: NewPayment,
    mode: PaymentMode,
) -> Result<PaymentReceipt, LedgerError> {
    let document = repository::lock_document(tx, kind, team_id, document_id).await?;

    if let Some(currency) = &payment.currency {
        if currency != &document.currency {
            return Err(LedgerError::ValidationError(format!(
                "payment currency {} does not match {} currency {}",
                currency, kind, document.currency
            )));
        }
    }

    let mut balance = document.balance.clone();
    let (recorded, settlement) = match mode {
        PaymentMode::Standard => {
            balance.apply_payment(payment.amount)?;
            (crate::money::round_money(payment.amount), None)
        }
        PaymentMode::PointOfSale => {
            let settlement = balance.apply_pos_payment(payment.amount)?;
            (settlement.accepted, Some(settlement))
        }
    };

    let sql = format!(
        r#"
        INSERT INTO {} (
            id, team_id, {}, amount, currency, method, reference, external_transaction_id, paid_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        kind.payment_table(),
        kind.document_fk(),
        payment_columns(kind)
    );

    let inserted = sqlx::query_as::<_, Payment>(&sql)
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(document_id)
        .bind(recorded)
        .bind(&document.currency)
        .bind(payment.method)
        .bind(&payment.reference)
        .bind(&payment.external_transaction_id)
        .bind(payment.paid_at)
        .fetch_one(&mut **tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                LedgerError::Duplicate("payment")
            } else {
                LedgerError::Database(e)
            }
        })?;

    let document = repository::save_balance(tx, kind, document_id, &balance).await?;

    Ok(PaymentReceipt {
        payment: inserted,
        document,
        settlement,
    })
}

/// Records a standard payment against an invoice or supplier bill.
#[instrument(
    skip(pool, request),
    fields(kind = %kind, team_id = %team_id, document_id = %document_id)
)]
pub async fn apply_payment(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
    request: RecordPaymentRequest,
) -> Result<PaymentReceipt, LedgerError> {
    let mut tx = pool.begin().await?;
    let receipt = apply_in_tx(
        &mut tx,
        kind,
        team_id,
        document_id,
        request.into(),
        PaymentMode::Standard,
    )
    .await?;
    tx.commit().await?;

    info!(
        payment_id = %receipt.payment.id,
        amount = %receipt.payment.amount,
        amount_due = %receipt.document.balance.amount_due,
        "Payment applied"
    );

    Ok(receipt)
}

/// Deletes a payment and subtracts it from its document.
///
/// A document locked because the payment settled it stays locked.
#[instrument(skip(pool), fields(kind = %kind, team_id = %team_id, payment_id = %payment_id))]
pub async fn reverse_payment(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    payment_id: Uuid,
) -> Result<FinancialDocument, LedgerError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1 AND team_id = $2 FOR UPDATE",
        payment_columns(kind),
        kind.payment_table()
    );
    let payment = sqlx::query_as::<_, Payment>(&sql)
        .bind(payment_id)
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::NotFound("payment"))?;

    let document = repository::lock_document(&mut tx, kind, team_id, payment.document_id).await?;
    let mut balance = document.balance.clone();
    balance.reverse_payment(payment.amount)?;

    let delete = format!("DELETE FROM {} WHERE id = $1", kind.payment_table());
    sqlx::query(&delete)
        .bind(payment_id)
        .execute(&mut *tx)
        .await?;

    let document = repository::save_balance(&mut tx, kind, document.id, &balance).await?;
    tx.commit().await?;

    let still_paid = document.balance.status == crate::models::DocumentStatus::Paid;
    if document.balance.is_locked && !still_paid {
        warn!(
            document_id = %document.id,
            "Payment reversed on a locked {}; lock retained", kind
        );
    }
    info!(amount = %payment.amount, amount_due = %document.balance.amount_due, "Payment reversed");

    Ok(document)
}

pub async fn list_payments(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
) -> Result<Vec<Payment>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE team_id = $1 AND {} = $2 ORDER BY paid_at ASC, created_at ASC",
        payment_columns(kind),
        kind.payment_table(),
        kind.document_fk()
    );

    let payments = sqlx::query_as::<_, Payment>(&sql)
        .bind(team_id)
        .bind(document_id)
        .fetch_all(pool)
        .await?;

    Ok(payments)
}

/// Whether a bank transaction has already produced a payment.
pub async fn external_transaction_exists(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    external_transaction_id: &str,
) -> Result<bool, LedgerError> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE external_transaction_id = $1",
        kind.payment_table()
    );
    let row = sqlx::query(&sql)
        .bind(external_transaction_id)
        .fetch_optional(&mut **tx)
        .await?;
    Ok(row.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payment_columns_use_document_fk() {
        assert!(payment_columns(LedgerKind::Invoice).contains("invoice_id AS document_id"));
        let supplier = payment_columns(LedgerKind::SupplierBill);
        assert!(supplier.contains("supplier_bill_id AS document_id"));
    }
}
