use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::LedgerError;
use crate::ledger::lines::LineTotals;
use crate::models::{DocumentStatus, PaymentStatus};
use crate::money::{checked_add, display_amount, round_money, within_limit};

/// Financial state of an invoice or supplier bill.
///
/// Invariants kept by every operation:
/// - `total_amount = subtotal − total_discount + total_tax + adjustment_total`
/// - `amount_due = total_amount − amount_paid − amount_credited`
/// - `payment_status` is derived from the amounts (see [`derive_payment_status`])
///
/// `amount_due` is signed; it goes negative when a document is overpaid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct DocumentBalance {
    pub subtotal: Decimal,
    pub total_discount: Decimal,
    pub total_tax: Decimal,
    pub adjustment_total: Decimal,
    pub total_amount: Decimal,
    pub amount_paid: Decimal,
    pub amount_credited: Decimal,
    pub amount_due: Decimal,
    pub status: DocumentStatus,
    pub payment_status: PaymentStatus,
    pub is_locked: bool,
}

/// Outcome of a point-of-sale payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosSettlement {
    /// Amount recorded against the document
    pub accepted: Decimal,
    /// Part of the tendered amount handed back
    pub change: Decimal,
}

/// `paid` iff nothing is due, `partial` iff something but not everything has
/// been paid, `unpaid` otherwise.
pub fn derive_payment_status(
    total_amount: Decimal,
    amount_paid: Decimal,
    amount_due: Decimal,
) -> PaymentStatus {
    if amount_due <= Decimal::ZERO {
        PaymentStatus::Paid
    } else if amount_paid > Decimal::ZERO && amount_paid < total_amount {
        PaymentStatus::Partial
    } else {
        PaymentStatus::Unpaid
    }
}

impl DocumentBalance {
    /// New draft document with the given line totals.
    pub fn draft(totals: LineTotals) -> Self {
        let mut balance = DocumentBalance {
            subtotal: Decimal::ZERO,
            total_discount: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            adjustment_total: Decimal::ZERO,
            total_amount: Decimal::ZERO,
            amount_paid: Decimal::ZERO,
            amount_credited: Decimal::ZERO,
            amount_due: Decimal::ZERO,
            status: DocumentStatus::Draft,
            payment_status: PaymentStatus::Unpaid,
            is_locked: false,
        };
        balance.set_line_totals(totals);
        balance.amount_due = balance.total_amount;
        balance.payment_status =
            derive_payment_status(balance.total_amount, balance.amount_paid, balance.amount_due);
        balance
    }

    /// Checks both amount invariants and the derived payment status.
    pub fn is_consistent(&self) -> bool {
        let total = round_money(
            self.subtotal - self.total_discount + self.total_tax + self.adjustment_total,
        );
        let due = round_money(self.total_amount - self.amount_paid - self.amount_credited);
        total == self.total_amount
            && due == self.amount_due
            && self.payment_status
                == derive_payment_status(self.total_amount, self.amount_paid, self.amount_due)
    }

    /// Replaces the line-item totals. Only allowed before the document is locked.
    pub fn replace_lines(&mut self, totals: LineTotals) -> Result<(), LedgerError> {
        if self.is_locked {
            return Err(LedgerError::DocumentLocked);
        }
        self.ensure_open()?;
        within_limit(totals.net() + self.adjustment_total, "document total")?;
        self.set_line_totals(totals);
        self.settle();
        Ok(())
    }

    /// Draft → sent. Locks the line items.
    pub fn send(&mut self) -> Result<(), LedgerError> {
        if self.status != DocumentStatus::Draft {
            return Err(LedgerError::InvalidStatus(self.status.to_string()));
        }
        self.status = DocumentStatus::Sent;
        self.is_locked = true;
        self.settle();
        Ok(())
    }

    /// Cancels a document nothing has been paid or credited against.
    pub fn cancel(&mut self) -> Result<(), LedgerError> {
        self.ensure_open()?;
        if self.status == DocumentStatus::Paid
            || !self.amount_paid.is_zero()
            || !self.amount_credited.is_zero()
        {
            return Err(LedgerError::InvalidStatus(format!(
                "{} with recorded payments or credits",
                self.status
            )));
        }
        self.status = DocumentStatus::Cancelled;
        Ok(())
    }

    /// Records a standard payment. Rejects anything above the amount due.
    pub fn apply_payment(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        self.ensure_open()?;
        let amount = positive(amount, "payment amount")?;

        if amount > self.amount_due {
            return Err(LedgerError::OverpaymentRejected {
                requested: amount,
                amount_due: self.amount_due,
            });
        }

        self.amount_paid = round_money(self.amount_paid + amount);
        self.settle();
        Ok(())
    }

    /// Records a point-of-sale payment, accepting at most the amount due and
    /// returning the rest as change.
    pub fn apply_pos_payment(&mut self, tendered: Decimal) -> Result<PosSettlement, LedgerError> {
        self.ensure_open()?;
        let tendered = positive(tendered, "tendered amount")?;

        if self.amount_due <= Decimal::ZERO {
            return Err(LedgerError::ValidationError(
                "nothing is due on this document".to_string(),
            ));
        }

        let accepted = tendered.min(self.amount_due);
        self.amount_paid = round_money(self.amount_paid + accepted);
        self.settle();

        Ok(PosSettlement {
            accepted,
            change: tendered - accepted,
        })
    }

    /// Undoes a payment. The document keeps its lock.
    pub fn reverse_payment(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        let amount = positive(amount, "payment amount")?;
        if amount > self.amount_paid {
            return Err(LedgerError::ValidationError(format!(
                "cannot reverse {} when only {} has been paid",
                amount, self.amount_paid
            )));
        }

        self.amount_paid = round_money(self.amount_paid - amount);
        self.settle();
        Ok(())
    }

    /// Adds a signed adjustment to both the total and the amount due.
    ///
    /// No clamping: the amount due may go negative.
    pub fn apply_adjustment(&mut self, signed_amount: Decimal) -> Result<(), LedgerError> {
        self.ensure_open()?;
        let signed_amount = non_zero(signed_amount)?;
        self.shift_total(signed_amount)
    }

    /// Exact inverse of [`apply_adjustment`](Self::apply_adjustment).
    pub fn reverse_adjustment(&mut self, signed_amount: Decimal) -> Result<(), LedgerError> {
        let signed_amount = non_zero(signed_amount)?;
        self.shift_total(-signed_amount)
    }

    /// Applies part of a credit/debit note. Bounded by the amount due.
    pub fn apply_credit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        self.ensure_open()?;
        let amount = positive(amount, "credit amount")?;

        if amount > self.amount_due {
            return Err(LedgerError::ExceedsAvailableBalance {
                requested: amount,
                available: display_amount(self.amount_due),
            });
        }

        self.amount_credited = round_money(self.amount_credited + amount);
        self.settle();
        Ok(())
    }

    /// Undoes a note application.
    pub fn reverse_credit(&mut self, amount: Decimal) -> Result<(), LedgerError> {
        let amount = positive(amount, "credit amount")?;
        if amount > self.amount_credited {
            return Err(LedgerError::ValidationError(format!(
                "cannot reverse {} when only {} has been credited",
                amount, self.amount_credited
            )));
        }

        self.amount_credited = round_money(self.amount_credited - amount);
        self.settle();
        Ok(())
    }

    /// Marks a sent document as overdue. Other statuses are left alone.
    pub fn mark_overdue(&mut self) -> bool {
        if self.status == DocumentStatus::Sent && self.amount_due > Decimal::ZERO {
            self.status = DocumentStatus::Overdue;
            true
        } else {
            false
        }
    }

    fn ensure_open(&self) -> Result<(), LedgerError> {
        if self.status == DocumentStatus::Cancelled {
            return Err(LedgerError::InvalidStatus(self.status.to_string()));
        }
        Ok(())
    }

    /// Moves the adjustment total and the document total by `delta`.
    /// Nothing changes when either result would not fit the amount columns.
    fn shift_total(&mut self, delta: Decimal) -> Result<(), LedgerError> {
        let adjustment_total = checked_add(self.adjustment_total, delta, "adjustment total")?;
        let total_amount = checked_add(self.total_amount, delta, "document total")?;
        checked_add(total_amount, -(self.amount_paid + self.amount_credited), "amount due")?;

        self.adjustment_total = adjustment_total;
        self.total_amount = total_amount;
        self.settle();
        Ok(())
    }

    fn set_line_totals(&mut self, totals: LineTotals) {
        self.subtotal = round_money(totals.subtotal);
        self.total_discount = round_money(totals.total_discount);
        self.total_tax = round_money(totals.total_tax);
        self.total_amount = round_money(
            self.subtotal - self.total_discount + self.total_tax + self.adjustment_total,
        );
    }

    /// Re-derives the amount due, payment status and document status.
    fn settle(&mut self) {
        self.amount_due = round_money(self.total_amount - self.amount_paid - self.amount_credited);
        self.payment_status =
            derive_payment_status(self.total_amount, self.amount_paid, self.amount_due);

        match self.payment_status {
            PaymentStatus::Paid => {
                // Drafts only settle once something has actually been received.
                let received = self.amount_paid + self.amount_credited > Decimal::ZERO;
                if self.status != DocumentStatus::Draft || received {
                    self.status = DocumentStatus::Paid;
                    self.is_locked = true;
                }
            }
            PaymentStatus::Partial | PaymentStatus::Unpaid => {
                if self.status == DocumentStatus::Paid {
                    self.status = DocumentStatus::Sent;
                }
            }
        }
    }
}

fn positive(amount: Decimal, what: &str) -> Result<Decimal, LedgerError> {
    let amount = round_money(amount);
    if amount <= Decimal::ZERO {
        return Err(LedgerError::ValidationError(format!(
            "{} must be greater than zero",
            what
        )));
    }
    Ok(amount)
}

fn non_zero(amount: Decimal) -> Result<Decimal, LedgerError> {
    let amount = round_money(amount);
    if amount.is_zero() {
        return Err(LedgerError::ValidationError(
            "adjustment amount must not be zero".to_string(),
        ));
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sent_invoice(total: Decimal) -> DocumentBalance {
        let mut balance = DocumentBalance::draft(LineTotals {
            subtotal: total,
            total_discount: Decimal::ZERO,
            total_tax: Decimal::ZERO,
        });
        balance.send().unwrap();
        balance
    }

    #[test]
    fn test_draft_totals() {
        let balance = DocumentBalance::draft(LineTotals {
            subtotal: dec!(1000),
            total_discount: dec!(100),
            total_tax: dec!(45),
        });
        assert_eq!(balance.total_amount, dec!(945));
        assert_eq!(balance.amount_due, dec!(945));
        assert_eq!(balance.status, DocumentStatus::Draft);
        assert_eq!(balance.payment_status, PaymentStatus::Unpaid);
        assert!(!balance.is_locked);
        assert!(balance.is_consistent());
    }

    #[test]
    fn test_send_locks_line_items() {
        let mut balance = sent_invoice(dec!(100));
        assert!(balance.is_locked);
        assert!(matches!(
            balance.replace_lines(LineTotals::default()),
            Err(LedgerError::DocumentLocked)
        ));
        assert!(matches!(balance.send(), Err(LedgerError::InvalidStatus(_))));
    }

    #[test]
    fn test_partial_then_full_payment() {
        let mut balance = sent_invoice(dec!(100));

        balance.apply_payment(dec!(40)).unwrap();
        assert_eq!(balance.amount_paid, dec!(40));
        assert_eq!(balance.amount_due, dec!(60));
        assert_eq!(balance.payment_status, PaymentStatus::Partial);
        assert_eq!(balance.status, DocumentStatus::Sent);

        balance.apply_payment(dec!(60)).unwrap();
        assert_eq!(balance.amount_due, Decimal::ZERO);
        assert_eq!(balance.payment_status, PaymentStatus::Paid);
        assert_eq!(balance.status, DocumentStatus::Paid);
        assert!(balance.is_locked);
        assert!(balance.is_consistent());
    }

    #[test]
    fn test_overpayment_rejected() {
        let mut balance = sent_invoice(dec!(10.00));
        let err = balance.apply_payment(dec!(15.00)).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::OverpaymentRejected { requested, amount_due }
                if requested == dec!(15.00) && amount_due == dec!(10.00)
        ));
        assert_eq!(balance.amount_paid, Decimal::ZERO);
    }

    #[test]
    fn test_pos_payment_clamps_and_returns_change() {
        let mut balance = sent_invoice(dec!(10.00));
        let settlement = balance.apply_pos_payment(dec!(15.00)).unwrap();
        assert_eq!(settlement.accepted, dec!(10.00));
        assert_eq!(settlement.change, dec!(5.00));
        assert_eq!(balance.amount_due, Decimal::ZERO);
        assert_eq!(balance.status, DocumentStatus::Paid);
    }

    #[test]
    fn test_zero_payment_is_validation_error() {
        let mut balance = sent_invoice(dec!(10));
        assert!(matches!(
            balance.apply_payment(dec!(0)),
            Err(LedgerError::ValidationError(_))
        ));
        assert!(matches!(
            balance.apply_payment(dec!(0.001)),
            Err(LedgerError::ValidationError(_))
        ));
    }

    #[test]
    fn test_reverse_payment_keeps_lock() {
        let mut balance = sent_invoice(dec!(50));
        balance.apply_payment(dec!(50)).unwrap();
        assert_eq!(balance.status, DocumentStatus::Paid);

        balance.reverse_payment(dec!(50)).unwrap();
        assert_eq!(balance.amount_paid, Decimal::ZERO);
        assert_eq!(balance.amount_due, dec!(50));
        assert_eq!(balance.payment_status, PaymentStatus::Unpaid);
        assert_eq!(balance.status, DocumentStatus::Sent);
        assert!(balance.is_locked);
    }

    #[test]
    fn test_draft_paid_in_full_becomes_locked() {
        let mut balance = DocumentBalance::draft(LineTotals {
            subtotal: dec!(20),
            ..LineTotals::default()
        });
        balance.apply_payment(dec!(20)).unwrap();
        assert_eq!(balance.status, DocumentStatus::Paid);
        assert!(balance.is_locked);

        balance.reverse_payment(dec!(20)).unwrap();
        assert!(balance.is_locked);
    }

    #[test]
    fn test_adjustment_round_trip_is_identity() {
        let mut balance = sent_invoice(dec!(200));
        balance.apply_payment(dec!(50)).unwrap();
        let before = balance.clone();

        balance.apply_adjustment(dec!(12.345)).unwrap();
        assert_eq!(balance.total_amount, dec!(212.35));
        assert_eq!(balance.amount_due, dec!(162.35));
        assert!(balance.is_consistent());

        balance.reverse_adjustment(dec!(12.345)).unwrap();
        assert_eq!(balance, before);
    }

    #[test]
    fn test_negative_adjustment_can_overpay() {
        let mut balance = sent_invoice(dec!(100));
        balance.apply_payment(dec!(80)).unwrap();

        balance.apply_adjustment(dec!(-30)).unwrap();
        assert_eq!(balance.total_amount, dec!(70));
        assert_eq!(balance.amount_due, dec!(-10));
        assert_eq!(display_amount(balance.amount_due), Decimal::ZERO);
        assert_eq!(balance.payment_status, PaymentStatus::Paid);
        assert_eq!(balance.status, DocumentStatus::Paid);

        balance.apply_adjustment(dec!(25)).unwrap();
        assert_eq!(balance.amount_due, dec!(15));
        assert_eq!(balance.payment_status, PaymentStatus::Partial);
        assert_eq!(balance.status, DocumentStatus::Sent);
        assert!(balance.is_consistent());
    }

    #[test]
    fn test_adjustment_sequence_keeps_total_invariant() {
        let mut balance = DocumentBalance::draft(LineTotals {
            subtotal: dec!(500),
            total_discount: dec!(25),
            total_tax: dec!(23.75),
        });
        balance.send().unwrap();

        for amount in [dec!(10.10), dec!(-3.33), dec!(7.77), dec!(-0.01)] {
            balance.apply_adjustment(amount).unwrap();
            assert!(balance.is_consistent());
        }
        balance.reverse_adjustment(dec!(7.77)).unwrap();

        assert_eq!(balance.adjustment_total, dec!(6.76));
        assert_eq!(
            balance.total_amount,
            balance.subtotal - balance.total_discount + balance.total_tax + dec!(6.76)
        );
        assert!(balance.is_consistent());
    }

    #[test]
    fn test_credit_bounded_by_amount_due() {
        let mut balance = sent_invoice(dec!(30));
        assert!(matches!(
            balance.apply_credit(dec!(40)),
            Err(LedgerError::ExceedsAvailableBalance { .. })
        ));
        balance.apply_credit(dec!(30)).unwrap();
        assert_eq!(balance.amount_due, Decimal::ZERO);
        assert_eq!(balance.amount_credited, dec!(30));
        assert_eq!(balance.payment_status, PaymentStatus::Paid);

        balance.reverse_credit(dec!(30)).unwrap();
        assert_eq!(balance.amount_due, dec!(30));
        assert_eq!(balance.status, DocumentStatus::Sent);
    }

    #[test]
    fn test_cancelled_document_rejects_mutations() {
        let mut balance = sent_invoice(dec!(30));
        balance.cancel().unwrap();
        assert!(matches!(
            balance.apply_payment(dec!(1)),
            Err(LedgerError::InvalidStatus(_))
        ));
        assert!(matches!(
            balance.apply_adjustment(dec!(1)),
            Err(LedgerError::InvalidStatus(_))
        ));
    }

    #[test]
    fn test_cancel_rejected_after_payment() {
        let mut balance = sent_invoice(dec!(30));
        balance.apply_payment(dec!(10)).unwrap();
        assert!(matches!(balance.cancel(), Err(LedgerError::InvalidStatus(_))));
    }

    #[test]
    fn test_mark_overdue_only_from_sent() {
        let mut balance = sent_invoice(dec!(30));
        assert!(balance.mark_overdue());
        assert_eq!(balance.status, DocumentStatus::Overdue);
        assert!(!balance.mark_overdue());

        balance.apply_payment(dec!(30)).unwrap();
        assert_eq!(balance.status, DocumentStatus::Paid);
    }

    #[test]
    fn test_derive_payment_status() {
        assert_eq!(derive_payment_status(dec!(100), dec!(0), dec!(100)), PaymentStatus::Unpaid);
        assert_eq!(derive_payment_status(dec!(100), dec!(20), dec!(80)), PaymentStatus::Partial);
        assert_eq!(derive_payment_status(dec!(100), dec!(100), dec!(0)), PaymentStatus::Paid);
        assert_eq!(derive_payment_status(dec!(100), dec!(120), dec!(-20)), PaymentStatus::Paid);
    }

    #[test]
    fn test_oversized_adjustment_is_rejected_unchanged() {
        let mut balance = sent_invoice(dec!(100));
        let before = balance.clone();

        let err = balance.apply_adjustment(Decimal::MAX).unwrap_err();
        assert!(matches!(err, LedgerError::ValidationError(_)));
        assert_eq!(balance, before);

        assert!(balance.apply_adjustment(dec!(999999999999.99)).is_err());
        assert_eq!(balance, before);
        assert!(balance.is_consistent());
    }
}
