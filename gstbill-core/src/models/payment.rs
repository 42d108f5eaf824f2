use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// How a payment was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[sqlx(rename = "cash")]
    Cash,
    #[sqlx(rename = "bank_transfer")]
    BankTransfer,
    #[sqlx(rename = "card")]
    Card,
    #[sqlx(rename = "mobile")]
    Mobile,
    #[sqlx(rename = "other")]
    Other,
}

/// A payment applied against exactly one invoice (or supplier bill).
///
/// Payments are never edited; deleting one reverses its effect on the
/// document balance.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub team_id: Uuid,

    /// Invoice or supplier bill the payment settles
    pub document_id: Uuid,

    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
    pub reference: Option<String>,

    /// Bank transaction id for webhook-originated payments (unique)
    pub external_transaction_id: Option<String>,

    pub paid_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}
