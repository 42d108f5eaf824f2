use std::sync::Arc;
use std::time::Duration;

use dotenv::dotenv;
use gstbill_core::config::Config;
use gstbill_core::db::Database;
use gstbill_core::logging;
use gstbill_core::worker::{LogMailer, ReminderScheduler};
use tokio::signal;
use tracing::info;

/// Overdue reminder worker.
///
/// Runs a single sweep and exits, which suits an external cron. With
/// `REMINDER_POLL_INTERVAL_SECONDS` set it keeps sweeping until Ctrl+C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    logging::init();

    let config = Config::from_env()?;
    let db_pool = Database::new(&config).await?;
    let scheduler =
        ReminderScheduler::new(db_pool, Arc::new(LogMailer), config.reminder_batch_limit);

    let Some(interval) = config.reminder_poll_interval_seconds else {
        info!("Running a single reminder sweep");
        let report = scheduler.run_once().await?;
        info!(
            selected = report.selected,
            reminded = report.reminded,
            failed = report.failed,
            "Reminder sweep finished"
        );
        return Ok(());
    };

    info!("Starting reminder worker, polling every {}s", interval);
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = scheduler.run_forever(Duration::from_secs(interval)) => {}
    }

    info!("Reminder worker stopped");
    Ok(())
}
