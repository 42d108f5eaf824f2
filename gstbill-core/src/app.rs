use std::sync::Arc;

use axum::{
    middleware,
    routing::{delete, get, post, put},
    Extension, Router,
};
use sqlx::PgPool;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::jwt_middleware;
use crate::config::Config;
use crate::handlers::{
    adjustments, cron, documents, features, health, notes, parties, payments, pos, webhooks,
};
use crate::ledger::LedgerKind;
use crate::rate_limit::{middleware::throttle_api, RateLimitStore};
use crate::worker::Mailer;

/// Shared resources handed to every handler.
#[derive(Clone)]
pub struct AppState {
    /// PostgreSQL connection pool
    pub db: PgPool,
    pub config: Arc<Config>,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub mailer: Arc<dyn Mailer>,
}

/// Document, payment, adjustment and party routes for one side of the ledger.
fn ledger_routes(kind: LedgerKind) -> Router<AppState> {
    let (documents_path, payments_path, adjustments_path, parties_path) = match kind {
        LedgerKind::Invoice => (
            "/api/invoices",
            "/api/payments",
            "/api/invoice-adjustments",
            "/api/customers",
        ),
        LedgerKind::SupplierBill => (
            "/api/supplier-bills",
            "/api/supplier-payments",
            "/api/supplier-bill-adjustments",
            "/api/suppliers",
        ),
    };

    Router::new()
        .route(
            documents_path,
            get(documents::list_documents).post(documents::create_document),
        )
        .route(&format!("{documents_path}/:id"), get(documents::get_document))
        .route(&format!("{documents_path}/:id/items"), put(documents::replace_items))
        .route(&format!("{documents_path}/:id/send"), post(documents::send_document))
        .route(&format!("{documents_path}/:id/cancel"), post(documents::cancel_document))
        .route(
            &format!("{documents_path}/:id/payments"),
            get(payments::list_payments).post(payments::record_payment),
        )
        .route(
            &format!("{documents_path}/:id/adjustments"),
            get(adjustments::list_adjustments).post(adjustments::apply_adjustment),
        )
        .route(&format!("{payments_path}/:id"), delete(payments::reverse_payment))
        .route(&format!("{adjustments_path}/:id"), delete(adjustments::reverse_adjustment))
        .route(parties_path, get(parties::list_parties).post(parties::create_party))
        .layer(Extension(kind))
}

/// Credit notes for invoices, debit notes for supplier bills.
fn note_routes(kind: LedgerKind) -> Router<AppState> {
    let (notes_path, applications_path) = match kind {
        LedgerKind::Invoice => ("/api/credit-notes", "/api/credit-note-applications"),
        LedgerKind::SupplierBill => ("/api/debit-notes", "/api/debit-note-applications"),
    };

    Router::new()
        .route(notes_path, get(notes::list_notes).post(notes::create_note))
        .route(&format!("{notes_path}/:id"), get(notes::get_note))
        .route(&format!("{notes_path}/:id/apply"), post(notes::apply_note))
        .route(&format!("{notes_path}/:id/applications"), get(notes::list_applications))
        .route(&format!("{applications_path}/:id"), delete(notes::reverse_application))
        .layer(Extension(kind))
}

/// Creates the application router.
///
/// Routes under `/api` require a bearer token, except the bank webhook and
/// the cron trigger which authenticate with their own shared secrets.
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .merge(ledger_routes(LedgerKind::Invoice))
        .merge(ledger_routes(LedgerKind::SupplierBill))
        .merge(note_routes(LedgerKind::Invoice))
        .merge(note_routes(LedgerKind::SupplierBill))
        .route("/api/pos/sale", post(pos::record_sale))
        .route("/api/features", get(features::my_features))
        .route("/api/admin/teams/:team_id/features", get(features::team_features))
        .route("/api/admin/teams/:team_id/overrides", put(features::set_override))
        .route(
            "/api/admin/teams/:team_id/overrides/:feature_code",
            delete(features::delete_override),
        )
        .route("/api/admin/teams/:team_id/plan", put(features::assign_plan))
        // Layers run bottom-up: authenticate first, then throttle per user.
        .route_layer(middleware::from_fn_with_state(state.clone(), throttle_api))
        .route_layer(middleware::from_fn_with_state(state.clone(), jwt_middleware));

    let public = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/db", get(health::db_health_check))
        .route("/api/webhooks/bank/:provider", post(webhooks::bank_webhook))
        .route("/api/cron/reminders", post(cron::run_reminders));

    Router::new()
        .merge(public)
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
