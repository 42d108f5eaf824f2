use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Credit note (issued to a customer) or debit note (received from a supplier).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Note {
    pub id: Uuid,
    pub team_id: Uuid,

    /// Customer for credit notes, supplier for debit notes
    pub counterparty_id: Uuid,

    pub note_number: String,
    pub currency: String,
    pub issue_date: NaiveDate,
    pub reason: Option<String>,

    pub total_amount: Decimal,

    /// `total_amount` minus everything applied so far
    pub unapplied_amount: Decimal,

    pub created_at: DateTime<Utc>,
}

/// Portion of a note consumed against one document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct NoteApplication {
    pub id: Uuid,
    pub team_id: Uuid,
    pub note_id: Uuid,
    pub document_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Note response including its derived status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoteResponse {
    #[serde(flatten)]
    pub note: Note,
    pub status: crate::ledger::notes::NoteStatus,
}

impl From<Note> for NoteResponse {
    fn from(note: Note) -> Self {
        let status = crate::ledger::notes::NoteStatus::of(note.total_amount, note.unapplied_amount);
        NoteResponse { note, status }
    }
}
