use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::ledger::balance::DocumentBalance;
use crate::ledger::kind::LedgerKind;
use crate::ledger::lines::{calculate_all, LineInput};
use crate::ledger::repository::{self, NewDocument};
use crate::models::DocumentWithItems;
use crate::validation::currency_code;

/// Request body for creating an invoice or a supplier bill.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateDocumentRequest {
    /// Customer (invoices) or supplier (bills)
    pub counterparty_id: Option<Uuid>,

    #[validate(custom(function = "currency_code"))]
    pub currency: Option<String>,

    pub issue_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,

    #[validate(length(max = 2000))]
    pub notes: Option<String>,

    #[validate(length(min = 1, message = "at least one line item is required"), nested)]
    pub items: Vec<LineInput>,
}

/// Request body for replacing the line items of a draft.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ReplaceItemsRequest {
    #[validate(length(min = 1, message = "at least one line item is required"), nested)]
    pub items: Vec<LineInput>,
}

/// Creates a draft document inside an existing transaction.
pub(crate) async fn create_in_tx(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    team_id: Uuid,
    request: &CreateDocumentRequest,
    default_currency: &str,
) -> Result<DocumentWithItems, LedgerError> {
    if let (Some(issue), Some(due)) = (request.issue_date, request.due_date) {
        if due < issue {
            return Err(LedgerError::ValidationError(
                "due date must not be before issue date".to_string(),
            ));
        }
    }

    if let Some(counterparty_id) = request.counterparty_id {
        repository::ensure_counterparty(tx, kind, team_id, counterparty_id).await?;
    }

    let (_, totals) = calculate_all(&request.items)?;
    let balance = DocumentBalance::draft(totals);

    let header = NewDocument {
        team_id,
        counterparty_id: request.counterparty_id,
        currency: request
            .currency
            .clone()
            .unwrap_or_else(|| default_currency.to_string()),
        issue_date: request.issue_date.unwrap_or_else(|| Utc::now().date_naive()),
        due_date: request.due_date,
        notes: request.notes.clone(),
    };

    let number = repository::next_number(tx, team_id, kind.number_prefix()).await?;
    let document = repository::insert_document(tx, kind, &header, &number, &balance).await?;
    let items = repository::replace_items(tx, kind, document.id, &request.items).await?;

    Ok(DocumentWithItems { document, items })
}

/// Creates a draft invoice or supplier bill with its line items.
#[instrument(skip(pool, request), fields(kind = %kind, team_id = %team_id))]
pub async fn create_document(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    request: CreateDocumentRequest,
    default_currency: &str,
) -> Result<DocumentWithItems, LedgerError> {
    let mut tx = pool.begin().await?;
    let created = create_in_tx(&mut tx, kind, team_id, &request, default_currency).await?;
    tx.commit().await?;

    info!(
        document_id = %created.document.id,
        number = %created.document.document_number,
        total = %created.document.balance.total_amount,
        "Created {}", kind
    );

    Ok(created)
}

pub async fn get_document_with_items(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
) -> Result<DocumentWithItems, LedgerError> {
    let document = repository::get_document(pool, kind, team_id, document_id).await?;
    let items = repository::get_items(pool, kind, document.id).await?;
    Ok(DocumentWithItems { document, items })
}

/// Replaces all line items of an unlocked document and recomputes its totals.
#[instrument(
    skip(pool, request),
    fields(kind = %kind, team_id = %team_id, document_id = %document_id)
)]
pub async fn replace_items(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
    request: ReplaceItemsRequest,
) -> Result<DocumentWithItems, LedgerError> {
    let mut tx = pool.begin().await?;
    let document = repository::lock_document(&mut tx, kind, team_id, document_id).await?;

    let (_, totals) = calculate_all(&request.items)?;
    let mut balance = document.balance.clone();
    balance.replace_lines(totals)?;

    let items = repository::replace_items(&mut tx, kind, document_id, &request.items).await?;
    let document = repository::save_balance(&mut tx, kind, document_id, &balance).await?;
    tx.commit().await?;

    info!(total = %document.balance.total_amount, "Replaced line items");
    Ok(DocumentWithItems { document, items })
}

/// Draft → sent; freezes the line items.
#[instrument(skip(pool), fields(kind = %kind, team_id = %team_id, document_id = %document_id))]
pub async fn send_document(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
) -> Result<DocumentWithItems, LedgerError> {
    transition(pool, kind, team_id, document_id, DocumentBalance::send).await
}

#[instrument(skip(pool), fields(kind = %kind, team_id = %team_id, document_id = %document_id))]
pub async fn cancel_document(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
) -> Result<DocumentWithItems, LedgerError> {
    transition(pool, kind, team_id, document_id, DocumentBalance::cancel).await
}

async fn transition<F>(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
    apply: F,
) -> Result<DocumentWithItems, LedgerError>
where
    F: FnOnce(&mut DocumentBalance) -> Result<(), LedgerError>,
{
    let mut tx = pool.begin().await?;
    let document = repository::lock_document(&mut tx, kind, team_id, document_id).await?;

    let from = document.balance.status;
    let mut balance = document.balance.clone();
    apply(&mut balance)?;

    let document = repository::save_balance(&mut tx, kind, document_id, &balance).await?;
    let items = repository::get_items(&mut *tx, kind, document_id).await?;
    tx.commit().await?;

    info!("Status {} -> {}", from, document.balance.status);
    Ok(DocumentWithItems { document, items })
}
