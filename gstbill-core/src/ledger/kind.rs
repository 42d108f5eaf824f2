use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the ledger a document lives on.
///
/// Invoices (receivables) and supplier bills (payables) follow identical
/// balance rules; only their tables and counterparty columns differ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    Invoice,
    SupplierBill,
}

impl LedgerKind {
    pub fn document_table(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "invoices",
            LedgerKind::SupplierBill => "supplier_bills",
        }
    }

    /// Foreign-key column pointing at the document from child tables.
    pub fn document_fk(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "invoice_id",
            LedgerKind::SupplierBill => "supplier_bill_id",
        }
    }

    pub fn counterparty_column(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "customer_id",
            LedgerKind::SupplierBill => "supplier_id",
        }
    }

    pub fn number_column(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "invoice_number",
            LedgerKind::SupplierBill => "bill_number",
        }
    }

    pub fn counterparty_table(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "customers",
            LedgerKind::SupplierBill => "suppliers",
        }
    }

    pub fn item_table(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "invoice_items",
            LedgerKind::SupplierBill => "supplier_bill_items",
        }
    }

    pub fn payment_table(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "payments",
            LedgerKind::SupplierBill => "supplier_payments",
        }
    }

    pub fn adjustment_table(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "invoice_adjustments",
            LedgerKind::SupplierBill => "supplier_bill_adjustments",
        }
    }

    /// Credit notes settle invoices, debit notes settle supplier bills.
    pub fn note_table(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "credit_notes",
            LedgerKind::SupplierBill => "debit_notes",
        }
    }

    pub fn note_fk(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "credit_note_id",
            LedgerKind::SupplierBill => "debit_note_id",
        }
    }

    pub fn application_table(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "credit_note_applications",
            LedgerKind::SupplierBill => "debit_note_applications",
        }
    }

    pub fn number_prefix(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "INV",
            LedgerKind::SupplierBill => "BILL",
        }
    }

    pub fn note_prefix(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "CN",
            LedgerKind::SupplierBill => "DN",
        }
    }

    pub fn document_label(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "invoice",
            LedgerKind::SupplierBill => "supplier bill",
        }
    }

    pub fn note_label(&self) -> &'static str {
        match self {
            LedgerKind::Invoice => "credit note",
            LedgerKind::SupplierBill => "debit note",
        }
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document_label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tables_are_symmetric() {
        for kind in [LedgerKind::Invoice, LedgerKind::SupplierBill] {
            assert!(kind.item_table().contains(kind.document_table().trim_end_matches('s')));
            assert!(kind.application_table().starts_with(kind.note_table().trim_end_matches('s')));
        }
        assert_eq!(LedgerKind::SupplierBill.document_fk(), "supplier_bill_id");
    }
}
