use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::info;
use uuid::Uuid;

use super::{authorize, document_feature};
use crate::app::AppState;
use crate::auth::{CurrentUser, MANAGERS, READERS, WRITERS};
use crate::error::AppError;
use crate::ledger::documents::{self, CreateDocumentRequest, ReplaceItemsRequest};
use crate::ledger::repository::{self, ListDocumentsFilter};
use crate::ledger::LedgerKind;
use crate::models::{DocumentWithItems, FinancialDocument};
use crate::validation::validate_request;

pub async fn create_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Json(body): Json<CreateDocumentRequest>,
) -> Result<(StatusCode, Json<DocumentWithItems>), AppError> {
    authorize(&state, &user, WRITERS, document_feature(kind)).await?;
    let request = validate_request(body)?;

    info!(user_id = %user.user_id, "Create {} request", kind);
    let created = documents::create_document(
        &state.db,
        kind,
        user.team_id,
        request,
        &state.config.default_currency,
    )
    .await?;

    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn list_documents(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Query(filter): Query<ListDocumentsFilter>,
) -> Result<Json<Vec<FinancialDocument>>, AppError> {
    authorize(&state, &user, READERS, document_feature(kind)).await?;
    let documents = repository::list_documents(&state.db, kind, user.team_id, &filter).await?;
    Ok(Json(documents))
}

pub async fn get_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentWithItems>, AppError> {
    authorize(&state, &user, READERS, document_feature(kind)).await?;
    let document = documents::get_document_with_items(&state.db, kind, user.team_id, id).await?;
    Ok(Json(document))
}

pub async fn replace_items(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<ReplaceItemsRequest>,
) -> Result<Json<DocumentWithItems>, AppError> {
    authorize(&state, &user, WRITERS, document_feature(kind)).await?;
    let request = validate_request(body)?;

    let document = documents::replace_items(&state.db, kind, user.team_id, id, request).await?;
    Ok(Json(document))
}

pub async fn send_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentWithItems>, AppError> {
    authorize(&state, &user, WRITERS, document_feature(kind)).await?;
    let document = documents::send_document(&state.db, kind, user.team_id, id).await?;
    Ok(Json(document))
}

pub async fn cancel_document(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentWithItems>, AppError> {
    authorize(&state, &user, MANAGERS, document_feature(kind)).await?;
    let document = documents::cancel_document(&state.db, kind, user.team_id, id).await?;
    Ok(Json(document))
}
