use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;
use crate::ledger::balance::DocumentBalance;
use crate::money::{display_amount, round_money};

/// How much of a credit/debit note has been consumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteStatus {
    Open,
    PartiallyApplied,
    Applied,
}

impl NoteStatus {
    pub fn of(total_amount: Decimal, unapplied_amount: Decimal) -> Self {
        if unapplied_amount <= Decimal::ZERO {
            NoteStatus::Applied
        } else if unapplied_amount < total_amount {
            NoteStatus::PartiallyApplied
        } else {
            NoteStatus::Open
        }
    }
}

/// Remaining balance of a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteBalance {
    pub total_amount: Decimal,
    pub unapplied_amount: Decimal,
}

impl NoteBalance {
    pub fn new(total_amount: Decimal) -> Self {
        let total_amount = round_money(total_amount);
        Self {
            total_amount,
            unapplied_amount: total_amount,
        }
    }

    pub fn status(&self) -> NoteStatus {
        NoteStatus::of(self.total_amount, self.unapplied_amount)
    }
}

/// Applies `amount` of a note to a document.
///
/// The amount may not exceed the note's unapplied amount nor the document's
/// amount due. Either both balances change or neither does.
pub fn apply_note(
    note: &mut NoteBalance,
    document: &mut DocumentBalance,
    amount: Decimal,
) -> Result<(), LedgerError> {
    let amount = round_money(amount);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::ValidationError(
            "application amount must be greater than zero".to_string(),
        ));
    }

    let available = note.unapplied_amount.min(display_amount(document.amount_due));
    if amount > available {
        return Err(LedgerError::ExceedsAvailableBalance {
            requested: amount,
            available,
        });
    }

    document.apply_credit(amount)?;
    note.unapplied_amount = round_money(note.unapplied_amount - amount);
    Ok(())
}

/// Undoes a note application on both sides.
pub fn reverse_note_application(
    note: &mut NoteBalance,
    document: &mut DocumentBalance,
    amount: Decimal,
) -> Result<(), LedgerError> {
    let amount = round_money(amount);
    if note.unapplied_amount + amount > note.total_amount {
        return Err(LedgerError::ValidationError(format!(
            "cannot restore {} to a note of {} with {} unapplied",
            amount, note.total_amount, note.unapplied_amount
        )));
    }

    document.reverse_credit(amount)?;
    note.unapplied_amount = round_money(note.unapplied_amount + amount);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::lines::LineTotals;
    use rust_decimal_macros::dec;

    fn sent_invoice(total: Decimal) -> DocumentBalance {
        let mut balance = DocumentBalance::draft(LineTotals {
            subtotal: total,
            ..LineTotals::default()
        });
        balance.send().unwrap();
        balance
    }

    #[test]
    fn test_application_bounded_by_both_balances() {
        let mut note = NoteBalance::new(dec!(50));
        let mut invoice = sent_invoice(dec!(30));

        let err = apply_note(&mut note, &mut invoice, dec!(40)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::ExceedsAvailableBalance { available, .. } if available == dec!(30)
        ));
        assert_eq!(note.unapplied_amount, dec!(50));
        assert_eq!(invoice.amount_due, dec!(30));

        apply_note(&mut note, &mut invoice, dec!(30)).unwrap();
        assert_eq!(invoice.amount_due, Decimal::ZERO);
        assert_eq!(note.unapplied_amount, dec!(20));
        assert_eq!(note.status(), NoteStatus::PartiallyApplied);
        assert!(invoice.is_consistent());
    }

    #[test]
    fn test_application_bounded_by_note() {
        let mut note = NoteBalance::new(dec!(10));
        let mut invoice = sent_invoice(dec!(30));
        assert!(apply_note(&mut note, &mut invoice, dec!(10.01)).is_err());
        apply_note(&mut note, &mut invoice, dec!(10)).unwrap();
        assert_eq!(note.status(), NoteStatus::Applied);
        assert_eq!(invoice.amount_due, dec!(20));
    }

    #[test]
    fn test_note_spread_across_documents() {
        let mut note = NoteBalance::new(dec!(100));
        let mut first = sent_invoice(dec!(60));
        let mut second = sent_invoice(dec!(60));

        apply_note(&mut note, &mut first, dec!(60)).unwrap();
        apply_note(&mut note, &mut second, dec!(40)).unwrap();

        assert_eq!(note.unapplied_amount, Decimal::ZERO);
        assert_eq!(first.amount_due, Decimal::ZERO);
        assert_eq!(second.amount_due, dec!(20));
    }

    #[test]
    fn test_reverse_application_restores_both() {
        let mut note = NoteBalance::new(dec!(50));
        let mut invoice = sent_invoice(dec!(30));
        apply_note(&mut note, &mut invoice, dec!(25)).unwrap();

        reverse_note_application(&mut note, &mut invoice, dec!(25)).unwrap();
        assert_eq!(note.unapplied_amount, dec!(50));
        assert_eq!(note.status(), NoteStatus::Open);
        assert_eq!(invoice.amount_due, dec!(30));
        assert_eq!(invoice.amount_credited, Decimal::ZERO);
    }

    #[test]
    fn test_zero_application_rejected() {
        let mut note = NoteBalance::new(dec!(50));
        let mut invoice = sent_invoice(dec!(30));
        assert!(matches!(
            apply_note(&mut note, &mut invoice, Decimal::ZERO),
            Err(LedgerError::ValidationError(_))
        ));
    }
}
