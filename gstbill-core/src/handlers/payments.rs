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
use crate::ledger::payments::{self, PaymentReceipt, RecordPaymentRequest};
use crate::ledger::LedgerKind;
use crate::models::{FinancialDocument, Payment};
use crate::validation::validate_request;

pub async fn record_payment(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(document_id): Path<Uuid>,
    Json(body): Json<RecordPaymentRequest>,
) -> Result<(StatusCode, Json<PaymentReceipt>), AppError> {
    authorize(&state, &user, WRITERS, document_feature(kind)).await?;
    let request = validate_request(body)?;

    let receipt =
        payments::apply_payment(&state.db, kind, user.team_id, document_id, request).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(document_id): Path<Uuid>,
) -> Result<Json<Vec<Payment>>, AppError> {
    authorize(&state, &user, READERS, document_feature(kind)).await?;
    let payments = payments::list_payments(&state.db, kind, user.team_id, document_id).await?;
    Ok(Json(payments))
}

pub async fn reverse_payment(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<FinancialDocument>, AppError> {
    authorize(&state, &user, MANAGERS, document_feature(kind)).await?;
    let document = payments::reverse_payment(&state.db, kind, user.team_id, payment_id).await?;
    Ok(Json(document))
}
