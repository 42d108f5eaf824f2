use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::app::AppState;
use crate::auth::{require_role, CurrentUser, Role, READERS};
use crate::entitlements::store::{self, AssignPlanRequest, SetOverrideRequest, TeamFeatures};
use crate::error::AppError;
use crate::models::{FeatureOverride, Plan};
use crate::validation::validate_request;

const PLATFORM: &[Role] = &[Role::PlatformAdmin];

/// Features of the caller's own team.
pub async fn my_features(
    State(state): State<AppState>,
    user: CurrentUser,
) -> Result<Json<TeamFeatures>, AppError> {
    require_role(&user, READERS)?;
    let features = store::team_features(&state.db, user.team_id).await?;
    Ok(Json(features))
}

pub async fn team_features(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(team_id): Path<Uuid>,
) -> Result<Json<TeamFeatures>, AppError> {
    require_role(&user, PLATFORM)?;
    let features = store::team_features(&state.db, team_id).await?;
    Ok(Json(features))
}

pub async fn set_override(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(team_id): Path<Uuid>,
    Json(body): Json<SetOverrideRequest>,
) -> Result<Json<FeatureOverride>, AppError> {
    require_role(&user, PLATFORM)?;
    let request = validate_request(body)?;
    let row = store::set_override(&state.db, team_id, request).await?;
    Ok(Json(row))
}

pub async fn delete_override(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((team_id, feature_code)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    require_role(&user, PLATFORM)?;
    store::delete_override(&state.db, team_id, &feature_code).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_plan(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(team_id): Path<Uuid>,
    Json(body): Json<AssignPlanRequest>,
) -> Result<Json<Plan>, AppError> {
    require_role(&user, PLATFORM)?;
    let request = validate_request(body)?;
    let plan = store::assign_plan(&state.db, team_id, request).await?;
    Ok(Json(plan))
}
