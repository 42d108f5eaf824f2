use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::ledger::kind::LedgerKind;
use crate::ledger::repository;
use crate::models::{Adjustment, AdjustmentType, FinancialDocument};
use crate::money::round_money;
use crate::validation::non_zero_amount;

/// Request body for a signed adjustment.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateAdjustmentRequest {
    /// Positive increases the amount owed, negative decreases it
    #[validate(custom(function = "non_zero_amount"))]
    pub amount: Decimal,

    pub adjustment_type: AdjustmentType,

    #[validate(length(min = 1, max = 500, message = "is required"))]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentReceipt {
    pub adjustment: Adjustment,
    pub document: FinancialDocument,
}

fn adjustment_columns(kind: LedgerKind) -> String {
    format!(
        "id, team_id, {} AS document_id, amount, adjustment_type, description, created_at",
        kind.document_fk()
    )
}

#[instrument(
    skip(pool, request),
    fields(kind = %kind, team_id = %team_id, document_id = %document_id)
)]
pub async fn apply_adjustment(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
    request: CreateAdjustmentRequest,
) -> Result<AdjustmentReceipt, LedgerError> {
    let mut tx = pool.begin().await?;
    let document = repository::lock_document(&mut tx, kind, team_id, document_id).await?;

    let mut balance = document.balance.clone();
    balance.apply_adjustment(request.amount)?;

    let sql = format!(
        r#"
        INSERT INTO {} (id, team_id, {}, amount, adjustment_type, description)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {}
        "#,
        kind.adjustment_table(),
        kind.document_fk(),
        adjustment_columns(kind)
    );

    let adjustment = sqlx::query_as::<_, Adjustment>(&sql)
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(document_id)
        .bind(round_money(request.amount))
        .bind(request.adjustment_type)
        .bind(&request.description)
        .fetch_one(&mut *tx)
        .await?;

    let document = repository::save_balance(&mut tx, kind, document_id, &balance).await?;
    tx.commit().await?;

    info!(
        adjustment_id = %adjustment.id,
        amount = %adjustment.amount,
        total = %document.balance.total_amount,
        amount_due = %document.balance.amount_due,
        "Adjustment applied"
    );

    Ok(AdjustmentReceipt {
        adjustment,
        document,
    })
}

/// Deletes an adjustment, subtracting its signed amount from the document.
#[instrument(skip(pool), fields(kind = %kind, team_id = %team_id, adjustment_id = %adjustment_id))]
pub async fn reverse_adjustment(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    adjustment_id: Uuid,
) -> Result<FinancialDocument, LedgerError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1 AND team_id = $2 FOR UPDATE",
        adjustment_columns(kind),
        kind.adjustment_table()
    );
    let adjustment = sqlx::query_as::<_, Adjustment>(&sql)
        .bind(adjustment_id)
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::NotFound("adjustment"))?;

    let document =
        repository::lock_document(&mut tx, kind, team_id, adjustment.document_id).await?;
    let mut balance = document.balance.clone();
    balance.reverse_adjustment(adjustment.amount)?;

    let delete = format!("DELETE FROM {} WHERE id = $1", kind.adjustment_table());
    sqlx::query(&delete)
        .bind(adjustment_id)
        .execute(&mut *tx)
        .await?;

    let document = repository::save_balance(&mut tx, kind, document.id, &balance).await?;
    tx.commit().await?;

    info!(amount = %adjustment.amount, "Adjustment reversed");
    Ok(document)
}

pub async fn list_adjustments(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
) -> Result<Vec<Adjustment>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE team_id = $1 AND {} = $2 ORDER BY created_at ASC",
        adjustment_columns(kind),
        kind.adjustment_table(),
        kind.document_fk()
    );

    let adjustments = sqlx::query_as::<_, Adjustment>(&sql)
        .bind(team_id)
        .bind(document_id)
        .fetch_all(pool)
        .await?;

    Ok(adjustments)
}
