use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

use crate::ledger::balance::DocumentBalance;

/// Lifecycle status shared by invoices and supplier bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[sqlx(rename = "draft")]
    Draft,
    #[sqlx(rename = "sent")]
    Sent,
    #[sqlx(rename = "paid")]
    Paid,
    #[sqlx(rename = "overdue")]
    Overdue,
    #[sqlx(rename = "cancelled")]
    Cancelled,
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentStatus::Draft => write!(f, "draft"),
            DocumentStatus::Sent => write!(f, "sent"),
            DocumentStatus::Paid => write!(f, "paid"),
            DocumentStatus::Overdue => write!(f, "overdue"),
            DocumentStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Settlement state derived from the amount fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[sqlx(rename = "unpaid")]
    Unpaid,
    #[sqlx(rename = "partial")]
    Partial,
    #[sqlx(rename = "paid")]
    Paid,
}

/// GST treatment of a line item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "varchar")]
#[serde(rename_all = "snake_case")]
pub enum GstClassification {
    /// Taxed at the line's rate, input credit claimable.
    #[sqlx(rename = "standard")]
    Standard,
    /// Taxed at 0%, input credit claimable.
    #[sqlx(rename = "zero_rated")]
    ZeroRated,
    /// Outside GST, no tax and no credit.
    #[sqlx(rename = "exempt")]
    Exempt,
}

impl Default for GstClassification {
    fn default() -> Self {
        GstClassification::Standard
    }
}

/// An invoice or a supplier bill.
///
/// Both tables share the same amount columns; the counterparty column
/// (`customer_id` or `supplier_id`) is read as `counterparty_id`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct FinancialDocument {
    pub id: Uuid,

    /// Owning team (tenant)
    pub team_id: Uuid,

    /// Customer for invoices, supplier for bills. Empty for walk-in sales.
    pub counterparty_id: Option<Uuid>,

    pub document_number: String,

    /// Currency code (ISO 4217), `BTN` unless configured otherwise
    pub currency: String,

    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub notes: Option<String>,

    /// Amount fields, status and lock flag
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub balance: DocumentBalance,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A line item on an invoice or bill, with its computed amounts.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentItem {
    pub id: Uuid,
    pub document_id: Uuid,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub discount_percent: Decimal,
    pub tax_rate: Decimal,
    pub gst_classification: GstClassification,
    pub line_subtotal: Decimal,
    pub line_discount: Decimal,
    pub line_tax: Decimal,
    pub line_total: Decimal,
    pub sort_order: i32,
}

/// Document together with its line items, as returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentWithItems {
    #[serde(flatten)]
    pub document: FinancialDocument,
    pub items: Vec<DocumentItem>,
}
