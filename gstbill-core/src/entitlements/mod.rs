pub mod resolver;
pub mod store;

pub use resolver::{resolve, BANK_WEBHOOKS, CREDIT_NOTES, INVOICING, POS, REMINDERS, SUPPLIER_BILLS};
pub use store::{require_feature, team_features, TeamFeatures};
