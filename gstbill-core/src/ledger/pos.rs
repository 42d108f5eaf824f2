use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::ledger::documents::{create_in_tx, CreateDocumentRequest};
use crate::ledger::kind::LedgerKind;
use crate::ledger::lines::LineInput;
use crate::ledger::payments::{apply_in_tx, NewPayment, PaymentMode};
use crate::ledger::repository;
use crate::models::{DocumentWithItems, Payment, PaymentMethod};
use crate::validation::{currency_code, positive_amount};

fn default_method() -> PaymentMethod {
    PaymentMethod::Cash
}

/// A counter sale: cart lines plus the amount handed over.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct PosSaleRequest {
    /// Walk-in sales have no customer
    pub customer_id: Option<Uuid>,

    #[validate(custom(function = "currency_code"))]
    pub currency: Option<String>,

    #[validate(length(min = 1, message = "cart is empty"), nested)]
    pub items: Vec<LineInput>,

    #[validate(custom(function = "positive_amount"))]
    pub tendered: Decimal,

    #[serde(default = "default_method")]
    pub method: PaymentMethod,

    #[validate(length(max = 200))]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosSaleReceipt {
    pub invoice: DocumentWithItems,
    pub payment: Payment,
    pub accepted: Decimal,
    pub change: Decimal,
}

/// Creates, sends and settles an invoice in one transaction.
///
/// The tendered amount is clamped to the invoice total; the rest is returned
/// as change.
#[instrument(skip(pool, request), fields(team_id = %team_id))]
pub async fn record_sale(
    pool: &PgPool,
    team_id: Uuid,
    request: PosSaleRequest,
    default_currency: &str,
) -> Result<PosSaleReceipt, LedgerError> {
    let kind = LedgerKind::Invoice;
    let today = Utc::now().date_naive();

    let mut tx = pool.begin().await?;

    let draft = CreateDocumentRequest {
        counterparty_id: request.customer_id,
        currency: request.currency.clone(),
        issue_date: Some(today),
        due_date: Some(today),
        notes: None,
        items: request.items.clone(),
    };
    let created = create_in_tx(&mut tx, kind, team_id, &draft, default_currency).await?;

    let mut balance = created.document.balance.clone();
    balance.send()?;
    repository::save_balance(&mut tx, kind, created.document.id, &balance).await?;

    let payment = NewPayment {
        amount: request.tendered,
        currency: None,
        method: request.method,
        reference: request.reference.clone(),
        external_transaction_id: None,
        paid_at: Utc::now(),
    };
    let receipt = apply_in_tx(
        &mut tx,
        kind,
        team_id,
        created.document.id,
        payment,
        PaymentMode::PointOfSale,
    )
    .await?;

    tx.commit().await?;

    let settlement = receipt
        .settlement
        .ok_or_else(|| LedgerError::ValidationError("sale was not settled".to_string()))?;

    info!(
        invoice_id = %receipt.document.id,
        number = %receipt.document.document_number,
        accepted = %settlement.accepted,
        change = %settlement.change,
        "POS sale recorded"
    );

    Ok(PosSaleReceipt {
        invoice: DocumentWithItems {
            document: receipt.document,
            items: created.items,
        },
        payment: receipt.payment,
        accepted: settlement.accepted,
        change: settlement.change,
    })
}
