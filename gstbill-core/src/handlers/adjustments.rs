use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use super::{authorize, document_feature};
use crate::app::AppState;
use crate::auth::{CurrentUser, MANAGERS, READERS, WRITERS};
use crate::error::AppError;
use crate::ledger::adjustments::{self, AdjustmentReceipt, CreateAdjustmentRequest};
use crate::ledger::LedgerKind;
use crate::models::{Adjustment, FinancialDocument};
use crate::validation::validate_request;

pub async fn apply_adjustment(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(document_id): Path<Uuid>,
    Json(body): Json<CreateAdjustmentRequest>,
) -> Result<(StatusCode, Json<AdjustmentReceipt>), AppError> {
    authorize(&state, &user, WRITERS, document_feature(kind)).await?;
    let request = validate_request(body)?;

    let receipt =
        adjustments::apply_adjustment(&state.db, kind, user.team_id, document_id, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_adjustments(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<Adjustment>>, AppError> {
    authorize(&state, &user, READERS, document_feature(kind)).await?;
    let rows = adjustments::list_adjustments(&state.db, kind, user.team_id, document_id).await?;
    Ok(Json(rows))
}

pub async fn reverse_adjustment(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(adjustment_id): Path<Uuid>,
) -> Result<Json<FinancialDocument>, AppError> {
    authorize(&state, &user, MANAGERS, document_feature(kind)).await?;
    let document =
        adjustments::reverse_adjustment(&state.db, kind, user.team_id, adjustment_id).await?;
    Ok(Json(document))
}
