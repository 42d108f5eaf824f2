use chrono::NaiveDate;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::balance::DocumentBalance;
use crate::ledger::kind::LedgerKind;
use crate::ledger::lines::{calculate_line, LineInput};
use crate::models::{DocumentItem, DocumentStatus, FinancialDocument};

/// Filter parameters for listing documents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDocumentsFilter {
    pub status: Option<DocumentStatus>,
    pub counterparty_id: Option<Uuid>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

fn document_columns(kind: LedgerKind) -> String {
    format!(
        "id, team_id, {} AS counterparty_id, {} AS document_number, currency, issue_date, \
         due_date, notes, subtotal, total_discount, total_tax, adjustment_total, total_amount, \
         amount_paid, amount_credited, amount_due, status, payment_status, is_locked, \
         created_at, updated_at",
        kind.counterparty_column(),
        kind.number_column()
    )
}

fn item_columns(kind: LedgerKind) -> String {
    format!(
        "id, {} AS document_id, description, quantity, unit_price, discount_percent, tax_rate, \
         gst_classification, line_subtotal, line_discount, line_tax, line_total, sort_order",
        kind.document_fk()
    )
}

/// Loads a document and locks its row for the rest of the transaction.
///
/// Documents of other teams are reported as not found.
pub async fn lock_document(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
) -> Result<FinancialDocument, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1 AND team_id = $2 FOR UPDATE",
        document_columns(kind),
        kind.document_table()
    );

    sqlx::query_as::<_, FinancialDocument>(&sql)
        .bind(document_id)
        .bind(team_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::NotFound(kind.document_label()))
}

pub async fn get_document(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    document_id: Uuid,
) -> Result<FinancialDocument, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1 AND team_id = $2",
        document_columns(kind),
        kind.document_table()
    );

    sqlx::query_as::<_, FinancialDocument>(&sql)
        .bind(document_id)
        .bind(team_id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::NotFound(kind.document_label()))
}

pub async fn list_documents(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    filter: &ListDocumentsFilter,
) -> Result<Vec<FinancialDocument>, LedgerError> {
    let limit = filter.limit.unwrap_or(50).clamp(1, 200);
    let offset = filter.offset.unwrap_or(0).max(0);

    let sql = format!(
        r#"
        SELECT {}
        FROM {}
        WHERE team_id = $1
            AND ($2::varchar IS NULL OR status = $2)
            AND ($3::uuid IS NULL OR {} = $3)
        ORDER BY issue_date DESC, created_at DESC
        LIMIT $4 OFFSET $5
        "#,
        document_columns(kind),
        kind.document_table(),
        kind.counterparty_column()
    );

    let documents = sqlx::query_as::<_, FinancialDocument>(&sql)
        .bind(team_id)
        .bind(filter.status)
        .bind(filter.counterparty_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(pool)
        .await?;

    Ok(documents)
}

pub async fn get_items<'a, E>(
    executor: E,
    kind: LedgerKind,
    document_id: Uuid,
) -> Result<Vec<DocumentItem>, LedgerError>
where
    E: sqlx::Executor<'a, Database = Postgres>,
{
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = $1 ORDER BY sort_order ASC",
        item_columns(kind),
        kind.item_table(),
        kind.document_fk()
    );

    let items = sqlx::query_as::<_, DocumentItem>(&sql)
        .bind(document_id)
        .fetch_all(executor)
        .await?;

    Ok(items)
}

/// Checks that a customer or supplier exists within the team.
pub async fn ensure_counterparty(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    team_id: Uuid,
    counterparty_id: Uuid,
) -> Result<(), LedgerError> {
    let sql = format!(
        "SELECT 1 FROM {} WHERE id = $1 AND team_id = $2",
        kind.counterparty_table()
    );

    let found = sqlx::query(&sql)
        .bind(counterparty_id)
        .bind(team_id)
        .fetch_optional(&mut **tx)
        .await?;

    match found {
        Some(_) => Ok(()),
        None => Err(LedgerError::NotFound(match kind {
            LedgerKind::Invoice => "customer",
            LedgerKind::SupplierBill => "supplier",
        })),
    }
}

/// Allocates the next per-team number for a sequence (`INV`, `BILL`, `CN`, ...).
pub async fn next_number(
    tx: &mut Transaction<'_, Postgres>,
    team_id: Uuid,
    prefix: &str,
) -> Result<String, LedgerError> {
    let value: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO document_sequences (team_id, prefix, last_value)
        VALUES ($1, $2, 1)
        ON CONFLICT (team_id, prefix)
        DO UPDATE SET last_value = document_sequences.last_value + 1
        RETURNING last_value
        "#,
    )
    .bind(team_id)
    .bind(prefix)
    .fetch_one(&mut **tx)
    .await?;

    Ok(format!("{}-{:05}", prefix, value))
}

/// Fields of a document header that are not derived from its lines.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub team_id: Uuid,
    pub counterparty_id: Option<Uuid>,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,
}

pub async fn insert_document(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    header: &NewDocument,
    number: &str,
    balance: &DocumentBalance,
) -> Result<FinancialDocument, LedgerError> {
    let sql = format!(
        r#"
        INSERT INTO {table} (
            id, team_id, {cp}, {num}, currency, issue_date, due_date, notes,
            subtotal, total_discount, total_tax, adjustment_total, total_amount,
            amount_paid, amount_credited, amount_due, status, payment_status, is_locked
        ) VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19
        )
        RETURNING {columns}
        "#,
        table = kind.document_table(),
        cp = kind.counterparty_column(),
        num = kind.number_column(),
        columns = document_columns(kind),
    );

    let document = sqlx::query_as::<_, FinancialDocument>(&sql)
        .bind(Uuid::new_v4())
        .bind(header.team_id)
        .bind(header.counterparty_id)
        .bind(number)
        .bind(&header.currency)
        .bind(header.issue_date)
        .bind(header.due_date)
        .bind(&header.notes)
        .bind(balance.subtotal)
        .bind(balance.total_discount)
        .bind(balance.total_tax)
        .bind(balance.adjustment_total)
        .bind(balance.total_amount)
        .bind(balance.amount_paid)
        .bind(balance.amount_credited)
        .bind(balance.amount_due)
        .bind(balance.status)
        .bind(balance.payment_status)
        .bind(balance.is_locked)
        .fetch_one(&mut **tx)
        .await?;

    Ok(document)
}

/// Deletes and re-inserts every line of a document.
pub async fn replace_items(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    document_id: Uuid,
    lines: &[LineInput],
) -> Result<Vec<DocumentItem>, LedgerError> {
    let delete = format!(
        "DELETE FROM {} WHERE {} = $1",
        kind.item_table(),
        kind.document_fk()
    );
    sqlx::query(&delete)
        .bind(document_id)
        .execute(&mut **tx)
        .await?;

    let insert = format!(
        r#"
        INSERT INTO {} (
            id, {}, description, quantity, unit_price, discount_percent, tax_rate,
            gst_classification, line_subtotal, line_discount, line_tax, line_total, sort_order
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        RETURNING {}
        "#,
        kind.item_table(),
        kind.document_fk(),
        item_columns(kind)
    );

    let mut items = Vec::with_capacity(lines.len());
    for (index, line) in lines.iter().enumerate() {
        let calculated = calculate_line(line)?;
        let item = sqlx::query_as::<_, DocumentItem>(&insert)
            .bind(Uuid::new_v4())
            .bind(document_id)
            .bind(&line.description)
            .bind(line.quantity)
            .bind(line.unit_price)
            .bind(line.discount_percent)
            .bind(line.tax_rate)
            .bind(line.gst_classification)
            .bind(calculated.subtotal)
            .bind(calculated.discount)
            .bind(calculated.tax)
            .bind(calculated.total)
            .bind(index as i32)
            .fetch_one(&mut **tx)
            .await?;
        items.push(item);
    }

    Ok(items)
}

/// Persists every amount field, status and lock flag of a document.
pub async fn save_balance(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    document_id: Uuid,
    balance: &DocumentBalance,
) -> Result<FinancialDocument, LedgerError> {
    let sql = format!(
        r#"
        UPDATE {}
        SET
            subtotal = $2,
            total_discount = $3,
            total_tax = $4,
            adjustment_total = $5,
            total_amount = $6,
            amount_paid = $7,
            amount_credited = $8,
            amount_due = $9,
            status = $10,
            payment_status = $11,
            is_locked = $12,
            updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        kind.document_table(),
        document_columns(kind)
    );

    let document = sqlx::query_as::<_, FinancialDocument>(&sql)
        .bind(document_id)
        .bind(balance.subtotal)
        .bind(balance.total_discount)
        .bind(balance.total_tax)
        .bind(balance.adjustment_total)
        .bind(balance.total_amount)
        .bind(balance.amount_paid)
        .bind(balance.amount_credited)
        .bind(balance.amount_due)
        .bind(balance.status)
        .bind(balance.payment_status)
        .bind(balance.is_locked)
        .fetch_one(&mut **tx)
        .await?;

    Ok(document)
}

/// Finds an invoice by id or number for callers without a team context
/// (bank webhooks). Returns `(team_id, document_id)`.
pub async fn find_by_reference(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    reference: &str,
) -> Result<(Uuid, Uuid), LedgerError> {
    let reference = reference.trim();
    let rows: Vec<(Uuid, Uuid)> = match Uuid::parse_str(reference) {
        Ok(id) => {
            let sql = format!("SELECT team_id, id FROM {} WHERE id = $1", kind.document_table());
            sqlx::query_as(&sql).bind(id).fetch_all(&mut **tx).await?
        }
        Err(_) => {
            let sql = format!(
                "SELECT team_id, id FROM {} WHERE {} = $1 LIMIT 2",
                kind.document_table(),
                kind.number_column()
            );
            sqlx::query_as(&sql)
                .bind(reference)
                .fetch_all(&mut **tx)
                .await?
        }
    };

    match rows.as_slice() {
        [single] => Ok(*single),
        [] => Err(LedgerError::NotFound(kind.document_label())),
        _ => Err(LedgerError::ValidationError(format!(
            "reference {} matches more than one {}",
            reference,
            kind.document_label()
        ))),
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}
