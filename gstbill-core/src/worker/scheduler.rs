use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, NaiveDate, Utc};
use serde::Serialize;
use sqlx::PgPool;
use tokio::time::sleep;
use tracing::{error, info};
use uuid::Uuid;

use crate::entitlements;
use crate::worker::executor::{OverdueInvoice, ReminderExecutor, ReminderOutcome};
use crate::worker::services::Mailer;
use crate::worker::state_machine::ReminderStage;

/// Counts reported after one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub selected: usize,
    pub reminded: usize,
    pub unchanged: usize,
    pub no_recipient: usize,
    /// Teams without the reminders feature
    pub skipped: usize,
    pub failed: usize,
}

/// Batch sweep over overdue invoices.
///
/// Each run handles at most `batch_limit` invoices, never-reminded ones
/// first, then oldest due date.
/// A failure on one invoice is logged and does not stop the others.
pub struct ReminderScheduler {
    pool: PgPool,
    mailer: Arc<dyn Mailer>,
    batch_limit: i64,
}

impl ReminderScheduler {
    pub fn new(pool: PgPool, mailer: Arc<dyn Mailer>, batch_limit: i64) -> Self {
        Self {
            pool,
            mailer,
            batch_limit: batch_limit.max(1),
        }
    }

    /// Runs sweeps forever, sleeping `poll_interval` between them.
    pub async fn run_forever(&self, poll_interval: Duration) {
        info!(
            "ReminderScheduler started with poll interval: {} seconds",
            poll_interval.as_secs()
        );

        loop {
            if let Err(e) = self.run_once().await {
                error!("Error in reminder sweep: {}", e);
            }
            sleep(poll_interval).await;
        }
    }

    pub async fn run_once(&self) -> Result<SweepReport, anyhow::Error> {
        self.run_for_date(Utc::now().date_naive()).await
    }

    pub async fn run_for_date(&self, today: NaiveDate) -> Result<SweepReport, anyhow::Error> {
        let invoices = self.find_overdue_invoices(today).await?;
        let mut report = SweepReport {
            selected: invoices.len(),
            ..SweepReport::default()
        };

        if invoices.is_empty() {
            return Ok(report);
        }
        info!("Found {} overdue invoice(s) to process", invoices.len());

        let executor = ReminderExecutor::new(self.pool.clone(), self.mailer.clone());
        let mut team_enabled: HashMap<Uuid, bool> = HashMap::new();

        for invoice in invoices {
            match self.reminders_enabled(&mut team_enabled, invoice.team_id).await {
                Ok(true) => {}
                Ok(false) => {
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    error!(team_id = %invoice.team_id, "Failed to resolve features: {}", e);
                    report.failed += 1;
                    continue;
                }
            }

            match executor.process_invoice(&invoice, today).await {
                Ok(ReminderOutcome::Reminded(_)) => report.reminded += 1,
                Ok(ReminderOutcome::Unchanged) => report.unchanged += 1,
                Ok(ReminderOutcome::NoRecipient) => report.no_recipient += 1,
                Err(e) => {
                    error!("Failed to process invoice {}: {}", invoice.invoice_number, e);
                    report.failed += 1;
                }
            }
        }

        info!(
            selected = report.selected,
            reminded = report.reminded,
            failed = report.failed,
            "Reminder sweep finished"
        );
        Ok(report)
    }

    async fn reminders_enabled(
        &self,
        cache: &mut HashMap<Uuid, bool>,
        team_id: Uuid,
    ) -> Result<bool, anyhow::Error> {
        if let Some(enabled) = cache.get(&team_id) {
            return Ok(*enabled);
        }
        let resolved = entitlements::team_features(&self.pool, team_id).await?;
        let enabled = resolved.features.contains(entitlements::REMINDERS);
        cache.insert(team_id, enabled);
        Ok(enabled)
    }

    /// Sent or overdue invoices whose next reminder stage is due, for teams
    /// with the reminders feature.
    ///
    /// Invoices at the final notice, or not yet old enough for their next
    /// stage, are left out so they cannot fill the batch. The feature check
    /// mirrors [`entitlements::resolve`]: an override wins, otherwise the
    /// team's plan (or the default plan) decides.
    async fn find_overdue_invoices(
        &self,
        today: NaiveDate,
    ) -> Result<Vec<OverdueInvoice>, anyhow::Error> {
        let cutoff = |current: Option<ReminderStage>| {
            ReminderStage::next(current)
                .map(|stage| today - ChronoDuration::days(stage.threshold_days()))
        };

        let invoices = sqlx::query_as::<_, OverdueInvoice>(
            r#"
            SELECT
                i.id, i.team_id, i.invoice_number, i.currency, i.due_date, i.amount_due,
                i.reminder_stage, c.name AS customer_name, c.email AS customer_email
            FROM invoices i
            JOIN teams t ON t.id = i.team_id
            LEFT JOIN customers c ON c.id = i.customer_id
            WHERE i.status IN ('sent', 'overdue')
                AND i.amount_due > 0
                AND (
                    (i.reminder_stage IS NULL AND i.due_date <= $1)
                    OR (i.reminder_stage = 'first_reminder' AND i.due_date <= $2)
                    OR (i.reminder_stage = 'second_reminder' AND i.due_date <= $3)
                )
                AND COALESCE(
                    (SELECT o.enabled FROM team_feature_overrides o
                     WHERE o.team_id = i.team_id AND o.feature_code = $4),
                    EXISTS (
                        SELECT 1 FROM plan_features pf
                        WHERE pf.feature_code = $4
                            AND pf.plan_id = COALESCE(
                                t.plan_id,
                                (SELECT p.id FROM plans p WHERE p.is_default)
                            )
                    )
                )
            ORDER BY i.last_reminder_at ASC NULLS FIRST, i.due_date ASC, i.id ASC
            LIMIT $5
            "#,
        )
        .bind(cutoff(None))
        .bind(cutoff(Some(ReminderStage::FirstReminder)))
        .bind(cutoff(Some(ReminderStage::SecondReminder)))
        .bind(entitlements::REMINDERS)
        .bind(self.batch_limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(invoices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::worker::services::testing::RecordingMailer;

    const BUSINESS_PLAN: &str = "00000000-0000-0000-0000-000000000002";
    const STARTER_PLAN: &str = "00000000-0000-0000-0000-000000000001";

    async fn create_test_pool() -> Result<PgPool, anyhow::Error> {
        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL not set for tests"))?;
        let pool = PgPool::connect(&database_url).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(pool)
    }

    async fn seed_team(pool: &PgPool, plan_id: &str) -> Uuid {
        let team_id = Uuid::new_v4();
        sqlx::query("INSERT INTO teams (id, name, plan_id) VALUES ($1, 'Reminder Team', $2::uuid)")
            .bind(team_id)
            .bind(plan_id)
            .execute(pool)
            .await
            .unwrap();
        team_id
    }

    async fn seed_invoice(
        pool: &PgPool,
        team_id: Uuid,
        email: &str,
        due: NaiveDate,
        stage: Option<ReminderStage>,
    ) -> Uuid {
        let customer_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO customers (id, team_id, name, email) VALUES ($1, $2, 'Customer', $3)",
        )
        .bind(customer_id)
        .bind(team_id)
        .bind(email)
        .execute(pool)
        .await
        .unwrap();

        let invoice_id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO invoices (
                id, team_id, customer_id, invoice_number, currency, issue_date, due_date,
                subtotal, total_amount, amount_due, status, payment_status, is_locked,
                reminder_stage
            ) VALUES ($1, $2, $3, $4, 'BTN', $5, $5, 100, 100, 100, 'sent', 'unpaid', TRUE, $6)
            "#,
        )
        .bind(invoice_id)
        .bind(team_id)
        .bind(customer_id)
        .bind(format!("INV-{}", &invoice_id.to_string()[..8]))
        .bind(due)
        .bind(stage)
        .execute(pool)
        .await
        .unwrap();

        invoice_id
    }

    async fn seed_overdue(pool: &PgPool, team_id: Uuid, email: &str, due: NaiveDate) -> Uuid {
        seed_invoice(pool, team_id, email, due, None).await
    }

    async fn stage_of(pool: &PgPool, invoice_id: Uuid) -> Option<ReminderStage> {
        sqlx::query_scalar("SELECT reminder_stage FROM invoices WHERE id = $1")
            .bind(invoice_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_sweep_reminds_and_isolates_failures() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let team_id = seed_team(&pool, BUSINESS_PLAN).await;

        let today = Utc::now().date_naive();
        let good_due = today - ChronoDuration::days(8);
        let bad_due = today - ChronoDuration::days(2);
        let good = seed_overdue(&pool, team_id, "ok@example.com", good_due).await;
        let bad = seed_overdue(&pool, team_id, "broken@example.com", bad_due).await;

        let mailer = Arc::new(RecordingMailer {
            fail_for: vec!["broken@example.com".to_string()],
            ..RecordingMailer::default()
        });
        let scheduler = ReminderScheduler::new(pool.clone(), mailer.clone(), 1000);
        let report = scheduler.run_for_date(today).await.unwrap();

        assert!(report.reminded >= 1);
        assert!(report.failed >= 1);

        let (status, stage): (String, Option<ReminderStage>) =
            sqlx::query_as("SELECT status, reminder_stage FROM invoices WHERE id = $1")
                .bind(good)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "overdue");
        assert_eq!(stage, Some(ReminderStage::SecondReminder));

        // The failed row was rolled back and stays eligible.
        let (status, stage): (String, Option<ReminderStage>) =
            sqlx::query_as("SELECT status, reminder_stage FROM invoices WHERE id = $1")
                .bind(bad)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(status, "sent");
        assert_eq!(stage, None);

        // A second run does not resend the same stage.
        let sent_before = mailer.sent.lock().unwrap().len();
        scheduler.run_for_date(today).await.unwrap();
        let resent_to_good = mailer
            .sent
            .lock()
            .unwrap()
            .iter()
            .skip(sent_before)
            .any(|(to, _)| to == "ok@example.com");
        assert!(!resent_to_good);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_terminal_and_disabled_rows_do_not_fill_the_batch() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let today = Utc::now().date_naive();

        // Older than anything else so they would sort first.
        let finished = seed_team(&pool, BUSINESS_PLAN).await;
        for _ in 0..3 {
            seed_invoice(
                &pool,
                finished,
                "done@example.com",
                today - ChronoDuration::days(9000),
                Some(ReminderStage::FinalNotice),
            )
            .await;
        }
        let no_feature = seed_team(&pool, STARTER_PLAN).await;
        for _ in 0..3 {
            let due = today - ChronoDuration::days(9500);
            seed_overdue(&pool, no_feature, "off@example.com", due).await;
        }

        let active = seed_team(&pool, BUSINESS_PLAN).await;
        let fresh_due = today - ChronoDuration::days(8000);
        let fresh = seed_overdue(&pool, active, "fresh@example.com", fresh_due).await;

        let mailer = Arc::new(RecordingMailer::default());
        let scheduler = ReminderScheduler::new(pool.clone(), mailer.clone(), 3);
        let report = scheduler.run_for_date(today).await.unwrap();

        assert_eq!(report.skipped, 0);
        assert_eq!(stage_of(&pool, fresh).await, Some(ReminderStage::FinalNotice));
        assert!(mailer
            .sent
            .lock()
            .unwrap()
            .iter()
            .any(|(to, _)| to == "fresh@example.com"));
        assert!(!mailer
            .sent
            .lock()
            .unwrap()
            .iter()
            .any(|(to, _)| to == "done@example.com" || to == "off@example.com"));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_stage_not_yet_due_is_not_selected() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        let today = Utc::now().date_naive();
        let team_id = seed_team(&pool, BUSINESS_PLAN).await;

        let waiting = seed_invoice(
            &pool,
            team_id,
            "waiting@example.com",
            today - ChronoDuration::days(3),
            Some(ReminderStage::FirstReminder),
        )
        .await;

        let mailer = Arc::new(RecordingMailer::default());
        let scheduler = ReminderScheduler::new(pool.clone(), mailer, 1000);
        let selected = scheduler.find_overdue_invoices(today).await.unwrap();

        assert!(selected.iter().all(|invoice| invoice.id != waiting));
    }
}
