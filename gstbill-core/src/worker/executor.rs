use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ledger::kind::LedgerKind;
use crate::ledger::repository;
use crate::models::DocumentStatus;
use crate::worker::services::{compose_reminder, Mailer, ReminderContext};
use crate::worker::state_machine::{ReminderAction, ReminderSchedule, ReminderStage, Transition};

/// An invoice selected by the sweep, joined with its customer.
#[derive(Debug, Clone, FromRow)]
pub struct OverdueInvoice {
    pub id: Uuid,
    pub team_id: Uuid,
    pub invoice_number: String,
    pub currency: String,
    pub due_date: NaiveDate,
    pub amount_due: Decimal,
    pub reminder_stage: Option<ReminderStage>,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
}

/// What happened to one invoice during a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderOutcome {
    Reminded(ReminderStage),
    /// Marked overdue (if it was not already) with no email due
    Unchanged,
    /// A reminder was due but the customer has no email address
    NoRecipient,
}

/// Applies the reminder schedule to a single invoice.
pub struct ReminderExecutor {
    pool: PgPool,
    mailer: Arc<dyn Mailer>,
}

impl ReminderExecutor {
    pub fn new(pool: PgPool, mailer: Arc<dyn Mailer>) -> Self {
        Self { pool, mailer }
    }

    /// Processes one overdue invoice inside its own transaction.
    ///
    /// 1. Locks the invoice and re-reads its status and reminder stage
    /// 2. Marks it overdue
    /// 3. Determines the reminder stage from the days past due
    /// 4. Sends the reminder and records the stage
    ///
    /// If sending fails the transaction is rolled back, so the invoice is
    /// picked up again on the next run.
    pub async fn process_invoice(
        &self,
        invoice: &OverdueInvoice,
        today: NaiveDate,
    ) -> Result<ReminderOutcome, anyhow::Error> {
        let kind = LedgerKind::Invoice;
        let mut tx = self.pool.begin().await?;

        let document = repository::lock_document(&mut tx, kind, invoice.team_id, invoice.id).await?;
        let mut balance = document.balance.clone();

        // The row may have been paid or cancelled since the sweep selected it.
        let still_owed = matches!(balance.status, DocumentStatus::Sent | DocumentStatus::Overdue)
            && balance.amount_due > Decimal::ZERO;
        if !still_owed {
            info!(invoice = %invoice.invoice_number, status = %balance.status, "No longer overdue");
            tx.commit().await?;
            return Ok(ReminderOutcome::Unchanged);
        }

        // Another worker may have advanced the stage while this one waited on the lock.
        let current_stage: Option<ReminderStage> =
            sqlx::query_scalar("SELECT reminder_stage FROM invoices WHERE id = $1")
                .bind(document.id)
                .fetch_one(&mut *tx)
                .await?;

        if balance.mark_overdue() {
            repository::save_balance(&mut tx, kind, document.id, &balance).await?;
            info!(invoice = %invoice.invoice_number, "Marked overdue");
        }

        let due_date = document.due_date.unwrap_or(invoice.due_date);
        let days_overdue = (today - due_date).num_days();
        let (next_stage, action) = ReminderSchedule::transition(current_stage, days_overdue);

        info!(
            "Invoice {}: {:?} -> {:?} (action: {})",
            invoice.invoice_number, current_stage, next_stage, action
        );

        let stage = match action {
            ReminderAction::NoAction => {
                tx.commit().await?;
                return Ok(ReminderOutcome::Unchanged);
            }
            ReminderAction::Send(stage) => stage,
        };

        let Some(email) = invoice.customer_email.as_deref() else {
            warn!(invoice = %invoice.invoice_number, "No customer email; reminder skipped");
            tx.commit().await?;
            return Ok(ReminderOutcome::NoRecipient);
        };

        let context = ReminderContext {
            customer_name: invoice.customer_name.as_deref().unwrap_or("Customer"),
            invoice_number: &invoice.invoice_number,
            currency: &invoice.currency,
            amount_due: balance.amount_due,
            due_date,
            days_overdue,
        };
        let (subject, body) = compose_reminder(stage, &context);
        self.mailer.send(email, &subject, &body).await?;

        sqlx::query(
            r#"
            UPDATE invoices
            SET reminder_stage = $2, last_reminder_at = $3, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(invoice.id)
        .bind(stage)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!(invoice = %invoice.invoice_number, stage = %stage, to = %email, "Reminder sent");
        Ok(ReminderOutcome::Reminded(stage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::services::testing::RecordingMailer;
    use chrono::Duration as ChronoDuration;

    async fn create_test_pool() -> Result<PgPool, anyhow::Error> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL not set for tests"))?;
        let pool = PgPool::connect(&database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(pool)
    }

    /// Inserts a sent invoice and returns the row as the sweep would have selected it.
    async fn seed(pool: &PgPool, due: NaiveDate) -> OverdueInvoice {
        let team_id = Uuid::new_v4();
        sqlx::query("INSERT INTO teams (id, name) VALUES ($1, 'Executor Team')")
            .bind(team_id)
            .execute(pool)
            .await
            .unwrap();

        let id = Uuid::new_v4();
        let number = format!("INV-{}", &id.to_string()[..8]);
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, team_id, invoice_number, currency, issue_date, due_date,
                subtotal, total_amount, amount_due, status, payment_status, is_locked
            ) VALUES ($1, $2, $3, 'BTN', $4, $4, 100, 100, 100, 'sent', 'unpaid', TRUE)
            "#,
        )
        .bind(id)
        .bind(team_id)
        .bind(&number)
        .bind(due)
        .execute(pool)
        .await
        .unwrap();

        OverdueInvoice {
            id,
            team_id,
            invoice_number: number,
            currency: "BTN".to_string(),
            due_date: due,
            amount_due: Decimal::from(100),
            reminder_stage: None,
            customer_name: Some("Customer".to_string()),
            customer_email: Some("late@example.com".to_string()),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_invoice_paid_after_selection_is_not_reminded() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let today = Utc::now().date_naive();
        let selected = seed(&pool, today - ChronoDuration::days(10)).await;

        sqlx::query(
            r#"
            UPDATE invoices
            SET amount_paid = 100, amount_due = 0, status = 'paid', payment_status = 'paid'
            WHERE id = $1
            "#,
        )
        .bind(selected.id)
        .execute(&pool)
        .await
        .unwrap();

        let mailer = Arc::new(RecordingMailer::default());
        let executor = ReminderExecutor::new(pool.clone(), mailer.clone());
        let outcome = executor.process_invoice(&selected, today).await.unwrap();

        assert_eq!(outcome, ReminderOutcome::Unchanged);
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_stage_is_read_from_the_locked_row() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let today = Utc::now().date_naive();
        let selected = seed(&pool, today - ChronoDuration::days(10)).await;

        let mailer = Arc::new(RecordingMailer::default());
        let executor = ReminderExecutor::new(pool.clone(), mailer.clone());

        // Both calls carry the same stale snapshot with no stage recorded.
        let first = executor.process_invoice(&selected, today).await.unwrap();
        let second = executor.process_invoice(&selected, today).await.unwrap();

        assert_eq!(first, ReminderOutcome::Reminded(ReminderStage::SecondReminder));
        assert_eq!(second, ReminderOutcome::Unchanged);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
    }
}
