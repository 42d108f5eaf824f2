use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::ledger::kind::LedgerKind;
use crate::ledger::notes::{apply_note, reverse_note_application, NoteBalance};
use crate::ledger::repository;
use crate::models::{FinancialDocument, Note, NoteApplication, NoteResponse};
use crate::money::round_money;
use crate::validation::{currency_code, positive_amount};

/// Request body for issuing a credit note (or recording a debit note).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateNoteRequest {
    pub counterparty_id: Uuid,

    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,

    #[validate(custom(function = "currency_code"))]
    pub currency: Option<String>,

    pub issue_date: Option<NaiveDate>,

    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

/// Request body for applying part of a note to a document.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ApplyNoteRequest {
    pub document_id: Uuid,

    #[validate(custom(function = "positive_amount"))]
    pub amount: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationReceipt {
    pub application: NoteApplication,
    pub note: NoteResponse,
    pub document: FinancialDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReversalReceipt {
    pub note: NoteResponse,
    pub document: FinancialDocument,
}

fn note_columns(kind: LedgerKind) -> String {
    format!(
        "id, team_id, {} AS counterparty_id, note_number, currency, issue_date, reason, \
         total_amount, unapplied_amount, created_at",
        kind.counterparty_column()
    )
}

fn application_columns(kind: LedgerKind) -> String {
    format!(
        "id, team_id, {} AS note_id, {} AS document_id, amount, created_at",
        kind.note_fk(),
        kind.document_fk()
    )
}

async fn lock_note(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    team_id: Uuid,
    note_id: Uuid,
) -> Result<Note, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1 AND team_id = $2 FOR UPDATE",
        note_columns(kind),
        kind.note_table()
    );
    sqlx::query_as::<_, Note>(&sql)
        .bind(note_id)
        .bind(team_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::NotFound(kind.note_label()))
}

async fn save_unapplied(
    tx: &mut Transaction<'_, Postgres>,
    kind: LedgerKind,
    note_id: Uuid,
    unapplied_amount: Decimal,
) -> Result<Note, LedgerError> {
    let sql = format!(
        "UPDATE {} SET unapplied_amount = $2, updated_at = NOW() WHERE id = $1 RETURNING {}",
        kind.note_table(),
        note_columns(kind)
    );
    let note = sqlx::query_as::<_, Note>(&sql)
        .bind(note_id)
        .bind(unapplied_amount)
        .fetch_one(&mut **tx)
        .await?;
    Ok(note)
}

#[instrument(skip(pool, request), fields(kind = %kind, team_id = %team_id))]
pub async fn create_note(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    request: CreateNoteRequest,
    default_currency: &str,
) -> Result<NoteResponse, LedgerError> {
    let mut tx = pool.begin().await?;
    repository::ensure_counterparty(&mut tx, kind, team_id, request.counterparty_id).await?;

    let balance = NoteBalance::new(request.amount);
    let number = repository::next_number(&mut tx, team_id, kind.note_prefix()).await?;

    let sql = format!(
        r#"
        INSERT INTO {} (
            id, team_id, {}, note_number, currency, issue_date, reason,
            total_amount, unapplied_amount
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        RETURNING {}
        "#,
        kind.note_table(),
        kind.counterparty_column(),
        note_columns(kind)
    );

    let note = sqlx::query_as::<_, Note>(&sql)
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(request.counterparty_id)
        .bind(&number)
        .bind(
            request
                .currency
                .clone()
                .unwrap_or_else(|| default_currency.to_string()),
        )
        .bind(request.issue_date.unwrap_or_else(|| Utc::now().date_naive()))
        .bind(&request.reason)
        .bind(balance.total_amount)
        .bind(balance.unapplied_amount)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;

    info!(
        note_id = %note.id,
        number = %note.note_number,
        amount = %note.total_amount,
        "Created {}",
        kind.note_label()
    );
    Ok(note.into())
}

pub async fn get_note(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    note_id: Uuid,
) -> Result<NoteResponse, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1 AND team_id = $2",
        note_columns(kind),
        kind.note_table()
    );
    let note = sqlx::query_as::<_, Note>(&sql)
        .bind(note_id)
        .bind(team_id)
        .fetch_optional(pool)
        .await?
        .ok_or(LedgerError::NotFound(kind.note_label()))?;
    Ok(note.into())
}

pub async fn list_notes(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
) -> Result<Vec<NoteResponse>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE team_id = $1 ORDER BY issue_date DESC, created_at DESC",
        note_columns(kind),
        kind.note_table()
    );
    let notes = sqlx::query_as::<_, Note>(&sql)
        .bind(team_id)
        .fetch_all(pool)
        .await?;
    Ok(notes.into_iter().map(NoteResponse::from).collect())
}

/// Applies part of a note to an invoice (credit note) or supplier bill (debit note).
///
/// The note is locked before the document so concurrent applications of the
/// same note serialize.
#[instrument(skip(pool, request), fields(kind = %kind, team_id = %team_id, note_id = %note_id))]
pub async fn apply_to_document(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    note_id: Uuid,
    request: ApplyNoteRequest,
) -> Result<ApplicationReceipt, LedgerError> {
    let mut tx = pool.begin().await?;
    let note = lock_note(&mut tx, kind, team_id, note_id).await?;
    let document = repository::lock_document(&mut tx, kind, team_id, request.document_id).await?;

    if document.counterparty_id != Some(note.counterparty_id) {
        return Err(LedgerError::ValidationError(format!(
            "{} belongs to a different counterparty than the {}",
            kind.note_label(),
            kind
        )));
    }
    if document.currency != note.currency {
        return Err(LedgerError::ValidationError(format!(
            "{} currency {} does not match {} currency {}",
            kind.note_label(),
            note.currency,
            kind,
            document.currency
        )));
    }

    let mut note_balance = NoteBalance {
        total_amount: note.total_amount,
        unapplied_amount: note.unapplied_amount,
    };
    let mut balance = document.balance.clone();
    apply_note(&mut note_balance, &mut balance, request.amount)?;

    let sql = format!(
        r#"
        INSERT INTO {} (id, team_id, {}, {}, amount)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING {}
        "#,
        kind.application_table(),
        kind.note_fk(),
        kind.document_fk(),
        application_columns(kind)
    );
    let application = sqlx::query_as::<_, NoteApplication>(&sql)
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(note_id)
        .bind(document.id)
        .bind(round_money(request.amount))
        .fetch_one(&mut *tx)
        .await?;

    let note = save_unapplied(&mut tx, kind, note_id, note_balance.unapplied_amount).await?;
    let document = repository::save_balance(&mut tx, kind, document.id, &balance).await?;
    tx.commit().await?;

    info!(
        application_id = %application.id,
        amount = %application.amount,
        unapplied = %note.unapplied_amount,
        amount_due = %document.balance.amount_due,
        "Applied {}", kind.note_label()
    );

    Ok(ApplicationReceipt {
        application,
        note: note.into(),
        document,
    })
}

/// Removes a note application, restoring both balances.
#[instrument(
    skip(pool),
    fields(kind = %kind, team_id = %team_id, application_id = %application_id)
)]
pub async fn reverse_application(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    application_id: Uuid,
) -> Result<ReversalReceipt, LedgerError> {
    let mut tx = pool.begin().await?;

    let sql = format!(
        "SELECT {} FROM {} WHERE id = $1 AND team_id = $2 FOR UPDATE",
        application_columns(kind),
        kind.application_table()
    );
    let application = sqlx::query_as::<_, NoteApplication>(&sql)
        .bind(application_id)
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(LedgerError::NotFound("note application"))?;

    let note = lock_note(&mut tx, kind, team_id, application.note_id).await?;
    let document =
        repository::lock_document(&mut tx, kind, team_id, application.document_id).await?;

    let mut note_balance = NoteBalance {
        total_amount: note.total_amount,
        unapplied_amount: note.unapplied_amount,
    };
    let mut balance = document.balance.clone();
    reverse_note_application(&mut note_balance, &mut balance, application.amount)?;

    let delete = format!("DELETE FROM {} WHERE id = $1", kind.application_table());
    sqlx::query(&delete)
        .bind(application_id)
        .execute(&mut *tx)
        .await?;

    let note = save_unapplied(&mut tx, kind, note.id, note_balance.unapplied_amount).await?;
    let document = repository::save_balance(&mut tx, kind, document.id, &balance).await?;
    tx.commit().await?;

    info!(amount = %application.amount, "Reversed {} application", kind.note_label());
    Ok(ReversalReceipt {
        note: note.into(),
        document,
    })
}

pub async fn list_applications(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    note_id: Uuid,
) -> Result<Vec<NoteApplication>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE team_id = $1 AND {} = $2 ORDER BY created_at ASC",
        application_columns(kind),
        kind.application_table(),
        kind.note_fk()
    );
    let applications = sqlx::query_as::<_, NoteApplication>(&sql)
        .bind(team_id)
        .bind(note_id)
        .fetch_all(pool)
        .await?;
    Ok(applications)
}
