pub mod adjustment;
pub mod document;
pub mod feature;
pub mod note;
pub mod party;
pub mod payment;

pub use adjustment::{Adjustment, AdjustmentType};
pub use document::{
    DocumentItem, DocumentStatus, DocumentWithItems, FinancialDocument, GstClassification,
    PaymentStatus,
};
pub use feature::{FeatureOverride, Plan};
pub use note::{Note, NoteApplication, NoteResponse};
pub use party::Party;
pub use payment::{Payment, PaymentMethod};
