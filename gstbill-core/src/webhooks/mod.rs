pub mod bank;

pub use bank::{normalize, process_notification, verify_signature, BankNotification, WebhookOutcome};
