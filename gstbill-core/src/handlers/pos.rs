use axum::{extract::State, http::StatusCode, Json};

use super::authorize;
use crate::app::AppState;
use crate::auth::{CurrentUser, WRITERS};
use crate::entitlements::POS;
use crate::error::AppError;
use crate::ledger::pos::{self, PosSaleReceipt, PosSaleRequest};
use crate::validation::validate_request;

pub async fn record_sale(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<PosSaleRequest>,
) -> Result<(StatusCode, Json<PosSaleReceipt>), AppError> {
    authorize(&state, &user, WRITERS, POS).await?;
    let request = validate_request(body)?;

    let receipt =
        pos::record_sale(&state.db, user.team_id, request, &state.config.default_currency).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}
