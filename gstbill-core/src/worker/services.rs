use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tracing::info;

use crate::money::display_amount;
use crate::worker::state_machine::ReminderStage;

/// Outbound email delivery.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), anyhow::Error>;
}

/// Mock email service that only logs.
///
/// In production this would be replaced by an email provider integration
/// (SES, Mailgun, ...) implementing [`Mailer`].
#[derive(Debug, Default, Clone)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), anyhow::Error> {
        let preview: String = body.chars().take(100).collect();
        info!(to = %to, subject = %subject, "Mock Email Service: sending email");
        info!("Body preview: {}...", preview);
        Ok(())
    }
}

/// Invoice details quoted in a reminder.
#[derive(Debug, Clone)]
pub struct ReminderContext<'a> {
    pub customer_name: &'a str,
    pub invoice_number: &'a str,
    pub currency: &'a str,
    pub amount_due: Decimal,
    pub due_date: NaiveDate,
    pub days_overdue: i64,
}

/// Builds the subject and body for a reminder stage.
pub fn compose_reminder(stage: ReminderStage, ctx: &ReminderContext<'_>) -> (String, String) {
    let amount = format!("{} {:.2}", ctx.currency, display_amount(ctx.amount_due));

    match stage {
        ReminderStage::FirstReminder => (
            format!("Friendly reminder: invoice {} is due", ctx.invoice_number),
            format!(
                "Dear {},\n\nThis is a friendly reminder that invoice {} for {} was due on {}. \
                If you have already paid, please ignore this message.\n\n\
                Thank you for your business.",
                ctx.customer_name, ctx.invoice_number, amount, ctx.due_date
            ),
        ),
        ReminderStage::SecondReminder => (
            format!("Second reminder: invoice {} is overdue", ctx.invoice_number),
            format!(
                "Dear {},\n\nInvoice {} for {} is now {} days overdue (due {}). \
                Please arrange payment at your earliest convenience.",
                ctx.customer_name, ctx.invoice_number, amount, ctx.days_overdue, ctx.due_date
            ),
        ),
        ReminderStage::FinalNotice => (
            format!(
                "Final notice: invoice {} is {} days overdue",
                ctx.invoice_number, ctx.days_overdue
            ),
            format!(
                "Dear {},\n\nDespite earlier reminders, invoice {} for {} remains unpaid {} days \
                after its due date of {}. Please settle the balance immediately.",
                ctx.customer_name, ctx.invoice_number, amount, ctx.days_overdue, ctx.due_date
            ),
        ),
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn context() -> ReminderContext<'static> {
        ReminderContext {
            customer_name: "Druk Traders",
            invoice_number: "INV-00007",
            currency: "BTN",
            amount_due: dec!(1250.5),
            due_date: NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(),
            days_overdue: 9,
        }
    }

    #[test]
    fn test_first_reminder_is_friendly() {
        let (subject, body) = compose_reminder(ReminderStage::FirstReminder, &context());
        assert!(subject.contains("Friendly"));
        assert!(body.contains("BTN 1250.50"));
    }

    #[test]
    fn test_second_reminder_mentions_days() {
        let (subject, body) = compose_reminder(ReminderStage::SecondReminder, &context());
        assert!(subject.contains("overdue"));
        assert!(body.contains("9 days overdue"));
    }

    #[test]
    fn test_final_notice_subject() {
        let (subject, _) = compose_reminder(ReminderStage::FinalNotice, &context());
        assert!(subject.starts_with("Final notice"));
    }

    #[tokio::test]
    async fn test_log_mailer_sends() {
        let result = LogMailer.send("test@example.com", "Test Subject", "Test body").await;
        assert!(result.is_ok());
    }
}
