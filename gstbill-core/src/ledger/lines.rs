use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::LedgerError;
use crate::models::GstClassification;
use crate::money::{checked_add, checked_mul, checked_percent_of, within_limit};
use crate::validation::{non_negative_amount, percentage, positive_amount};

/// A line item as submitted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LineInput {
    #[validate(length(min = 1, max = 500, message = "is required"))]
    pub description: String,

    #[validate(custom(function = "positive_amount"))]
    pub quantity: Decimal,

    #[validate(custom(function = "non_negative_amount"))]
    pub unit_price: Decimal,

    #[serde(default)]
    #[validate(custom(function = "percentage"))]
    pub discount_percent: Decimal,

    #[serde(default)]
    #[validate(custom(function = "percentage"))]
    pub tax_rate: Decimal,

    #[serde(default)]
    pub gst_classification: GstClassification,
}

/// Amounts computed for one line, each rounded to 2 places.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalculatedLine {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Sums over all lines of a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineTotals {
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total_tax: Decimal,
}

impl LineTotals {
    /// `subtotal − discount + tax`, before adjustments.
    pub fn net(&self) -> Decimal {
        self.subtotal - self.total_discount + self.total_tax
    }
}

/// Computes subtotal, discount, GST and total for a single line.
///
/// Zero-rated and exempt lines carry no tax whatever rate was submitted.
/// Fails when any amount would not fit the amount columns.
pub fn calculate_line(line: &LineInput) -> Result<CalculatedLine, LedgerError> {
    let subtotal = checked_mul(line.quantity, line.unit_price, "line subtotal")?;
    let discount = checked_percent_of(subtotal, line.discount_percent, "line discount")?;
    let taxable = subtotal - discount;

    let tax = match line.gst_classification {
        GstClassification::Standard => checked_percent_of(taxable, line.tax_rate, "line tax")?,
        GstClassification::ZeroRated | GstClassification::Exempt => Decimal::ZERO,
    };

    Ok(CalculatedLine {
        subtotal,
        discount,
        tax,
        total: within_limit(taxable + tax, "line total")?,
    })
}

/// Sums already-rounded line amounts so document totals match the lines exactly.
pub fn summarize<'a, I>(lines: I) -> Result<LineTotals, LedgerError>
where
    I: IntoIterator<Item = &'a CalculatedLine>,
{
    let mut totals = LineTotals::default();
    for line in lines {
        totals.subtotal = checked_add(totals.subtotal, line.subtotal, "document subtotal")?;
        totals.total_discount =
            checked_add(totals.total_discount, line.discount, "document discount")?;
        totals.total_tax = checked_add(totals.total_tax, line.tax, "document tax")?;
    }
    within_limit(totals.net(), "document total")?;
    Ok(totals)
}

/// Calculates every line and the document totals.
pub fn calculate_all(
    lines: &[LineInput],
) -> Result<(Vec<CalculatedLine>, LineTotals), LedgerError> {
    let calculated = lines.iter().map(calculate_line).collect::<Result<Vec<_>, _>>()?;
    let totals = summarize(&calculated)?;
    Ok((calculated, totals))
}
