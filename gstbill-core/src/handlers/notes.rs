use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{authorize, document_feature};
use crate::app::AppState;
use crate::auth::{CurrentUser, MANAGERS, READERS, WRITERS};
use crate::entitlements::{require_feature, CREDIT_NOTES};
use crate::error::AppError;
use crate::ledger::credit::{
    self, ApplicationReceipt, ApplyNoteRequest, CreateNoteRequest, ReversalReceipt,
};
use crate::ledger::LedgerKind;
use crate::models::{NoteApplication, NoteResponse};
use crate::validation::validate_request;

// Debit notes share the credit note feature; the supplier bill feature is
// checked again when the note is applied to a bill.

pub async fn create_note(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Json(body): Json<CreateNoteRequest>,
) -> Result<(StatusCode, Json<NoteResponse>), AppError> {
    authorize(&state, &user, WRITERS, CREDIT_NOTES).await?;
    let request = validate_request(body)?;

    let note = credit::create_note(
        &state.db,
        kind,
        user.team_id,
        request,
        &state.config.default_currency,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(note)))
}

pub async fn list_notes(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
) -> Result<Json<Vec<NoteResponse>>, AppError> {
    authorize(&state, &user, READERS, CREDIT_NOTES).await?;
    let notes = credit::list_notes(&state.db, kind, user.team_id).await?;
    Ok(Json(notes))
}

pub async fn get_note(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(note_id): Path<Uuid>,
) -> Result<Json<NoteResponse>, AppError> {
    authorize(&state, &user, READERS, CREDIT_NOTES).await?;
    let note = credit::get_note(&state.db, kind, user.team_id, note_id).await?;
    Ok(Json(note))
}

pub async fn apply_note(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(note_id): Path<Uuid>,
    Json(body): Json<ApplyNoteRequest>,
) -> Result<(StatusCode, Json<ApplicationReceipt>), AppError> {
    authorize(&state, &user, WRITERS, CREDIT_NOTES).await?;
    if kind == LedgerKind::SupplierBill {
        require_feature(&state.db, user.team_id, document_feature(kind)).await?;
    }
    let request = validate_request(body)?;

    let receipt = credit::apply_to_document(&state.db, kind, user.team_id, note_id, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_applications(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(note_id): Path<Uuid>,
) -> Result<Json<Vec<NoteApplication>>, AppError> {
    authorize(&state, &user, READERS, CREDIT_NOTES).await?;
    let applications = credit::list_applications(&state.db, kind, user.team_id, note_id).await?;
    Ok(Json(applications))
}

pub async fn reverse_application(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(application_id): Path<Uuid>,
) -> Result<Json<ReversalReceipt>, AppError> {
    authorize(&state, &user, MANAGERS, CREDIT_NOTES).await?;
    let receipt =
        credit::reverse_application(&state.db, kind, user.team_id, application_id).await?;
    Ok(Json(receipt))
}
