//! Database-backed tests for the ledger services.
//!
//! Run with `DATABASE_URL=... cargo test -- --ignored` against a scratch
//! database; migrations are applied on connect.

use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::LedgerError;
use crate::ledger::adjustments::{self, CreateAdjustmentRequest};
use crate::ledger::credit::{self, ApplyNoteRequest, CreateNoteRequest};
use crate::ledger::documents::{self, CreateDocumentRequest, ReplaceItemsRequest};
use crate::ledger::kind::LedgerKind;
use crate::ledger::lines::LineInput;
use crate::ledger::notes::NoteStatus;
use crate::ledger::payments::{self, RecordPaymentRequest};
use crate::ledger::pos::{self, PosSaleRequest};
use crate::models::{
    AdjustmentType, DocumentStatus, GstClassification, PaymentMethod, PaymentStatus,
};

async fn create_test_pool() -> Result<PgPool, anyhow::Error> {
    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL not set for tests"))?;

    let pool = PgPool::connect(&database_url).await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

async fn seed_team(pool: &PgPool) -> (Uuid, Uuid, Uuid) {
    let team_id = Uuid::new_v4();
    sqlx::query("INSERT INTO teams (id, name) VALUES ($1, 'Test Team')")
        .bind(team_id)
        .execute(pool)
        .await
        .expect("insert team");

    let customer_id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO customers (id, team_id, name, tpn) \
         VALUES ($1, $2, 'Druk Traders', 'TPN001')",
    )
    .bind(customer_id)
    .bind(team_id)
    .execute(pool)
    .await
    .expect("insert customer");

    let supplier_id = Uuid::new_v4();
    sqlx::query("INSERT INTO suppliers (id, team_id, name) VALUES ($1, $2, 'Paro Supplies')")
        .bind(supplier_id)
        .bind(team_id)
        .execute(pool)
        .await
        .expect("insert supplier");

    (team_id, customer_id, supplier_id)
}

fn line(quantity: Decimal, unit_price: Decimal) -> LineInput {
    LineInput {
        description: "Consulting".to_string(),
        quantity,
        unit_price,
        discount_percent: Decimal::ZERO,
        tax_rate: Decimal::ZERO,
        gst_classification: GstClassification::Exempt,
    }
}

fn document_request(counterparty_id: Uuid, amount: Decimal) -> CreateDocumentRequest {
    let today = Utc::now().date_naive();
    CreateDocumentRequest {
        counterparty_id: Some(counterparty_id),
        currency: Some("BTN".to_string()),
        issue_date: Some(today),
        due_date: Some(today + Duration::days(30)),
        notes: None,
        items: vec![line(dec!(1), amount)],
    }
}

fn payment(amount: Decimal) -> RecordPaymentRequest {
    RecordPaymentRequest {
        amount,
        currency: None,
        method: PaymentMethod::BankTransfer,
        reference: None,
        paid_at: None,
    }
}

async fn sent_invoice(pool: &PgPool, team_id: Uuid, customer_id: Uuid, amount: Decimal) -> Uuid {
    let created = documents::create_document(
        pool,
        LedgerKind::Invoice,
        team_id,
        document_request(customer_id, amount),
        "BTN",
    )
    .await
    .expect("create invoice");

    documents::send_document(pool, LedgerKind::Invoice, team_id, created.document.id)
        .await
        .expect("send invoice");

    created.document.id
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_create_document_computes_totals_and_number() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let (team_id, customer_id, _) = seed_team(&pool).await;

    let mut request = document_request(customer_id, dec!(100.00));
    request.items[0].tax_rate = dec!(5);
    request.items[0].gst_classification = GstClassification::Standard;
    request.items[0].discount_percent = dec!(10);

    let created = documents::create_document(&pool, LedgerKind::Invoice, team_id, request, "BTN")
        .await
        .expect("create");

    let balance = &created.document.balance;
    assert_eq!(balance.subtotal, dec!(100.00));
    assert_eq!(balance.total_discount, dec!(10.00));
    assert_eq!(balance.total_tax, dec!(4.50));
    assert_eq!(balance.total_amount, dec!(94.50));
    assert_eq!(balance.amount_due, dec!(94.50));
    assert_eq!(balance.status, DocumentStatus::Draft);
    assert!(!balance.is_locked);
    assert_eq!(created.document.document_number, "INV-00001");
    assert_eq!(created.items.len(), 1);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_send_locks_line_items() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let (team_id, customer_id, _) = seed_team(&pool).await;
    let invoice_id = sent_invoice(&pool, team_id, customer_id, dec!(50.00)).await;

    let result = documents::replace_items(
        &pool,
        LedgerKind::Invoice,
        team_id,
        invoice_id,
        ReplaceItemsRequest {
            items: vec![line(dec!(2), dec!(10.00))],
        },
    )
    .await;

    assert!(matches!(result, Err(LedgerError::DocumentLocked)));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_overpayment_rejected_and_pos_clamps() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let (team_id, customer_id, _) = seed_team(&pool).await;
    let invoice_id = sent_invoice(&pool, team_id, customer_id, dec!(10.00)).await;

    let result = payments::apply_payment(
        &pool,
        LedgerKind::Invoice,
        team_id,
        invoice_id,
        payment(dec!(15.00)),
    )
    .await;
    assert!(matches!(result, Err(LedgerError::OverpaymentRejected { .. })));

    let sale = pos::record_sale(
        &pool,
        team_id,
        PosSaleRequest {
            customer_id: None,
            currency: None,
            items: vec![line(dec!(1), dec!(10.00))],
            tendered: dec!(15.00),
            method: PaymentMethod::Cash,
            reference: None,
        },
        "BTN",
    )
    .await
    .expect("pos sale");

    assert_eq!(sale.accepted, dec!(10.00));
    assert_eq!(sale.change, dec!(5.00));
    assert_eq!(sale.payment.amount, dec!(10.00));
    assert_eq!(sale.invoice.document.balance.status, DocumentStatus::Paid);
    assert!(sale.invoice.document.balance.is_locked);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_payment_then_reversal_keeps_lock() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let (team_id, customer_id, _) = seed_team(&pool).await;
    let invoice_id = sent_invoice(&pool, team_id, customer_id, dec!(80.00)).await;

    let partial = payments::apply_payment(
        &pool,
        LedgerKind::Invoice,
        team_id,
        invoice_id,
        payment(dec!(30.00)),
    )
    .await
    .expect("partial payment");
    assert_eq!(partial.document.balance.payment_status, PaymentStatus::Partial);
    assert_eq!(partial.document.balance.amount_due, dec!(50.00));

    let full = payments::apply_payment(
        &pool,
        LedgerKind::Invoice,
        team_id,
        invoice_id,
        payment(dec!(50.00)),
    )
    .await
    .expect("final payment");
    assert_eq!(full.document.balance.status, DocumentStatus::Paid);

    let reversed = payments::reverse_payment(&pool, LedgerKind::Invoice, team_id, full.payment.id)
        .await
        .expect("reverse");
    assert_eq!(reversed.balance.amount_due, dec!(50.00));
    assert_eq!(reversed.balance.status, DocumentStatus::Sent);
    assert!(reversed.balance.is_locked);

    let listed = payments::list_payments(&pool, LedgerKind::Invoice, team_id, invoice_id)
        .await
        .expect("list");
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_adjustment_apply_and_reverse_is_identity() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let (team_id, customer_id, _) = seed_team(&pool).await;
    let invoice_id = sent_invoice(&pool, team_id, customer_id, dec!(120.00)).await;

    let receipt = adjustments::apply_adjustment(
        &pool,
        LedgerKind::Invoice,
        team_id,
        invoice_id,
        CreateAdjustmentRequest {
            amount: dec!(-20.005),
            adjustment_type: AdjustmentType::Discount,
            description: "Loyalty discount".to_string(),
        },
    )
    .await
    .expect("apply adjustment");
    assert_eq!(receipt.document.balance.total_amount, dec!(99.99));
    assert!(receipt.document.balance.is_consistent());

    let restored =
        adjustments::reverse_adjustment(&pool, LedgerKind::Invoice, team_id, receipt.adjustment.id)
            .await
            .expect("reverse adjustment");
    assert_eq!(restored.balance.total_amount, dec!(120.00));
    assert_eq!(restored.balance.amount_due, dec!(120.00));
    assert_eq!(restored.balance.adjustment_total, Decimal::ZERO);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_credit_note_bounded_by_amount_due() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let (team_id, customer_id, _) = seed_team(&pool).await;
    let invoice_id = sent_invoice(&pool, team_id, customer_id, dec!(30.00)).await;

    let note = credit::create_note(
        &pool,
        LedgerKind::Invoice,
        team_id,
        CreateNoteRequest {
            counterparty_id: customer_id,
            amount: dec!(50.00),
            currency: Some("BTN".to_string()),
            issue_date: None,
            reason: Some("Returned goods".to_string()),
        },
        "BTN",
    )
    .await
    .expect("create note");
    assert_eq!(note.status, NoteStatus::Open);

    let too_much = credit::apply_to_document(
        &pool,
        LedgerKind::Invoice,
        team_id,
        note.note.id,
        ApplyNoteRequest {
            document_id: invoice_id,
            amount: dec!(40.00),
        },
    )
    .await;
    assert!(matches!(too_much, Err(LedgerError::ExceedsAvailableBalance { .. })));

    let applied = credit::apply_to_document(
        &pool,
        LedgerKind::Invoice,
        team_id,
        note.note.id,
        ApplyNoteRequest {
            document_id: invoice_id,
            amount: dec!(30.00),
        },
    )
    .await
    .expect("apply note");
    assert_eq!(applied.document.balance.amount_due, Decimal::ZERO);
    assert_eq!(applied.document.balance.status, DocumentStatus::Paid);
    assert_eq!(applied.note.note.unapplied_amount, dec!(20.00));
    assert_eq!(applied.note.status, NoteStatus::PartiallyApplied);

    let reversed =
        credit::reverse_application(&pool, LedgerKind::Invoice, team_id, applied.application.id)
            .await
            .expect("reverse application");
    assert_eq!(reversed.document.balance.amount_due, dec!(30.00));
    assert_eq!(reversed.note.note.unapplied_amount, dec!(50.00));
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_supplier_bill_mirrors_invoice_rules() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let (team_id, _, supplier_id) = seed_team(&pool).await;

    let bill = documents::create_document(
        &pool,
        LedgerKind::SupplierBill,
        team_id,
        document_request(supplier_id, dec!(200.00)),
        "BTN",
    )
    .await
    .expect("create bill");
    assert!(bill.document.document_number.starts_with("BILL-"));

    documents::send_document(&pool, LedgerKind::SupplierBill, team_id, bill.document.id)
        .await
        .expect("send bill");

    let receipt = payments::apply_payment(
        &pool,
        LedgerKind::SupplierBill,
        team_id,
        bill.document.id,
        payment(dec!(200.00)),
    )
    .await
    .expect("pay bill");
    assert_eq!(receipt.document.balance.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
#[ignore] // Requires database setup
async fn test_other_team_sees_not_found() {
    let pool = create_test_pool().await.expect("Failed to create test pool");
    let (team_id, customer_id, _) = seed_team(&pool).await;
    let (other_team, _, _) = seed_team(&pool).await;
    let invoice_id = sent_invoice(&pool, team_id, customer_id, dec!(10.00)).await;

    let result = payments::apply_payment(
        &pool,
        LedgerKind::Invoice,
        other_team,
        invoice_id,
        payment(dec!(5.00)),
    )
    .await;
    assert!(matches!(result, Err(LedgerError::NotFound("invoice"))));
}
