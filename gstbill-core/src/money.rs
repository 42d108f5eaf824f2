use rust_decimal::{Decimal, RoundingStrategy};

use crate::error::LedgerError;

/// Number of decimal places every persisted amount is rounded to.
pub const MONEY_SCALE: u32 = 2;

/// Largest magnitude the `NUMERIC(14, 2)` amount columns hold: 999999999999.99.
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(0x107A_3FFF, 0x5AF3, 0, false, MONEY_SCALE);

/// Rounds a monetary value to the persisted scale.
///
/// Half-cent values round away from zero so that a positive and a negative
/// adjustment of the same magnitude cancel out exactly.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Returns `value` as a percentage of `base`, rounded to the persisted scale.
pub fn percent_of(base: Decimal, percent: Decimal) -> Decimal {
    round_money(base * percent / Decimal::ONE_HUNDRED)
}

/// Rejects amounts that do not fit the amount columns.
pub fn within_limit(value: Decimal, what: &str) -> Result<Decimal, LedgerError> {
    if value.abs() <= MAX_AMOUNT {
        Ok(value)
    } else {
        Err(too_large(what))
    }
}

/// `a + b` rounded, or a validation error on overflow or when the sum does not fit.
pub fn checked_add(a: Decimal, b: Decimal, what: &str) -> Result<Decimal, LedgerError> {
    let sum = a.checked_add(b).ok_or_else(|| too_large(what))?;
    within_limit(round_money(sum), what)
}

/// `a × b` rounded, with the same failure rules as [`checked_add`].
pub fn checked_mul(a: Decimal, b: Decimal, what: &str) -> Result<Decimal, LedgerError> {
    let product = a.checked_mul(b).ok_or_else(|| too_large(what))?;
    within_limit(round_money(product), what)
}

/// Checked variant of [`percent_of`].
pub fn checked_percent_of(
    base: Decimal,
    percent: Decimal,
    what: &str,
) -> Result<Decimal, LedgerError> {
    let scaled = base
        .checked_mul(percent)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .ok_or_else(|| too_large(what))?;
    within_limit(round_money(scaled), what)
}

fn too_large(what: &str) -> LedgerError {
    LedgerError::ValidationError(format!("{} exceeds the maximum amount {}", what, MAX_AMOUNT))
}

/// Amount shown to users: negative balances (overpayments) display as zero.
pub fn display_amount(value: Decimal) -> Decimal {
    value.max(Decimal::ZERO)
}
