use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "snake_case")]
pub enum AdjustmentType {
    #[sqlx(rename = "late_fee")]
    LateFee,
    #[sqlx(rename = "discount")]
    Discount,
    #[sqlx(rename = "write_off")]
    WriteOff,
    #[sqlx(rename = "rounding")]
    Rounding,
    #[sqlx(rename = "other")]
    Other,
}

/// A signed change to the amount owed on a document.
///
/// Positive amounts increase what is owed (late fees), negative amounts
/// decrease it (discounts, write-offs).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Adjustment {
    pub id: Uuid,
    pub team_id: Uuid,
    pub document_id: Uuid,
    pub amount: Decimal,
    pub adjustment_type: AdjustmentType,
    pub description: String,
    pub created_at: DateTime<Utc>,
}
