use axum::{
    extract::{Extension, State},
    http::StatusCode,
    Json,
};

use super::{authorize, document_feature};
use crate::app::AppState;
use crate::auth::{CurrentUser, READERS, WRITERS};
use crate::error::AppError;
use crate::ledger::LedgerKind;
use crate::models::Party;
use crate::parties::{self, CreatePartyRequest};
use crate::validation::validate_request;

pub async fn create_party(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
    Json(body): Json<CreatePartyRequest>,
) -> Result<(StatusCode, Json<Party>), AppError> {
    authorize(&state, &user, WRITERS, document_feature(kind)).await?;
    let request = validate_request(body)?;

    let party = parties::create_party(&state.db, kind, user.team_id, request).await?;
    Ok((StatusCode::CREATED, Json(party)))
}

pub async fn list_parties(
    State(state): State<AppState>,
    Extension(kind): Extension<LedgerKind>,
    user: CurrentUser,
) -> Result<Json<Vec<Party>>, AppError> {
    authorize(&state, &user, READERS, document_feature(kind)).await?;
    let parties = parties::list_parties(&state.db, kind, user.team_id).await?;
    Ok(Json(parties))
}
