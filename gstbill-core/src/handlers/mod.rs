//! HTTP handlers.
//!
//! Every protected handler runs the same guard sequence before doing any
//! work: the JWT middleware authenticates, [`authorize`] checks the role and
//! the team's features, and [`crate::validation::validate_request`] checks
//! the body.

pub mod adjustments;
pub mod cron;
pub mod documents;
pub mod features;
pub mod health;
pub mod notes;
pub mod parties;
pub mod payments;
pub mod pos;
pub mod webhooks;

use crate::app::AppState;
use crate::auth::{require_role, CurrentUser, Role};
use crate::entitlements;
use crate::error::AppError;
use crate::ledger::LedgerKind;

/// Role check followed by feature check.
pub(crate) async fn authorize(
    state: &AppState,
    user: &CurrentUser,
    roles: &[Role],
    feature: &str,
) -> Result<(), AppError> {
    require_role(user, roles)?;
    entitlements::require_feature(&state.db, user.team_id, feature).await
}

/// Feature that unlocks a side of the ledger.
pub(crate) fn document_feature(kind: LedgerKind) -> &'static str {
    match kind {
        LedgerKind::Invoice => entitlements::INVOICING,
        LedgerKind::SupplierBill => entitlements::SUPPLIER_BILLS,
    }
}
