pub mod executor;
pub mod scheduler;
pub mod services;
pub mod state_machine;

pub use executor::{ReminderExecutor, ReminderOutcome};
pub use scheduler::{ReminderScheduler, SweepReport};
pub use services::{compose_reminder, LogMailer, Mailer};
pub use state_machine::{ReminderAction, ReminderSchedule, ReminderStage, Transition};
