use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::entitlements::resolver::resolve_with_overrides;
use crate::error::{AppError, LedgerError};
use crate::models::{FeatureOverride, Plan};

/// Resolved entitlements of a team.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamFeatures {
    pub team_id: Uuid,
    pub plan: Option<Plan>,
    pub features: BTreeSet<String>,
    pub overrides: Vec<FeatureOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SetOverrideRequest {
    #[validate(length(min = 1, max = 100))]
    pub feature_code: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AssignPlanRequest {
    #[validate(length(min = 1, max = 50))]
    pub plan_code: String,
}

/// The team's plan, or the default plan when none is assigned.
async fn effective_plan(pool: &PgPool, team_id: Uuid) -> Result<Option<Plan>, LedgerError> {
    let assigned: Option<Option<Uuid>> =
        sqlx::query_scalar("SELECT plan_id FROM teams WHERE id = $1")
            .bind(team_id)
            .fetch_optional(pool)
            .await?;

    let plan = match assigned {
        None => return Err(LedgerError::NotFound("team")),
        Some(Some(plan_id)) => {
            sqlx::query_as::<_, Plan>("SELECT id, code, name, is_default FROM plans WHERE id = $1")
                .bind(plan_id)
                .fetch_optional(pool)
                .await?
        }
        Some(None) => {
            sqlx::query_as::<_, Plan>(
                "SELECT id, code, name, is_default FROM plans WHERE is_default LIMIT 1",
            )
            .fetch_optional(pool)
            .await?
        }
    };

    Ok(plan)
}

/// Computes the feature set of a team from its plan and overrides.
pub async fn team_features(pool: &PgPool, team_id: Uuid) -> Result<TeamFeatures, LedgerError> {
    let plan = effective_plan(pool, team_id).await?;

    let plan_features: Vec<String> = match &plan {
        Some(plan) => {
            sqlx::query_scalar("SELECT feature_code FROM plan_features WHERE plan_id = $1")
                .bind(plan.id)
                .fetch_all(pool)
                .await?
        }
        None => Vec::new(),
    };

    let overrides = list_overrides(pool, team_id).await?;
    let features = resolve_with_overrides(&plan_features, &overrides);

    Ok(TeamFeatures {
        team_id,
        plan,
        features,
        overrides,
    })
}

/// Fails with `403` unless `feature_code` is enabled for the team.
pub async fn require_feature(
    pool: &PgPool,
    team_id: Uuid,
    feature_code: &str,
) -> Result<(), AppError> {
    let resolved = team_features(pool, team_id).await?;
    if resolved.features.contains(feature_code) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "feature {} is not enabled for this team",
            feature_code
        )))
    }
}

pub async fn list_overrides(
    pool: &PgPool,
    team_id: Uuid,
) -> Result<Vec<FeatureOverride>, LedgerError> {
    let overrides = sqlx::query_as::<_, FeatureOverride>(
        r#"
        SELECT team_id, feature_code, enabled, updated_at
        FROM team_feature_overrides
        WHERE team_id = $1
        ORDER BY feature_code
        "#,
    )
    .bind(team_id)
    .fetch_all(pool)
    .await?;

    Ok(overrides)
}

/// Inserts or replaces the single override row for `(team, feature)`.
#[instrument(skip(pool, request), fields(team_id = %team_id))]
pub async fn set_override(
    pool: &PgPool,
    team_id: Uuid,
    request: SetOverrideRequest,
) -> Result<FeatureOverride, LedgerError> {
    let row = sqlx::query_as::<_, FeatureOverride>(
        r#"
        INSERT INTO team_feature_overrides (team_id, feature_code, enabled)
        SELECT id, $2, $3 FROM teams WHERE id = $1
        ON CONFLICT (team_id, feature_code)
        DO UPDATE SET enabled = EXCLUDED.enabled, updated_at = NOW()
        RETURNING team_id, feature_code, enabled, updated_at
        "#,
    )
    .bind(team_id)
    .bind(&request.feature_code)
    .bind(request.enabled)
    .fetch_optional(pool)
    .await?
    .ok_or(LedgerError::NotFound("team"))?;

    info!(feature = %row.feature_code, enabled = row.enabled, "Feature override set");
    Ok(row)
}

pub async fn delete_override(
    pool: &PgPool,
    team_id: Uuid,
    feature_code: &str,
) -> Result<(), LedgerError> {
    let result = sqlx::query(
        "DELETE FROM team_feature_overrides WHERE team_id = $1 AND feature_code = $2",
    )
    .bind(team_id)
    .bind(feature_code)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::NotFound("feature override"));
    }

    info!(team_id = %team_id, feature = %feature_code, "Feature override removed");
    Ok(())
}

#[instrument(skip(pool, request), fields(team_id = %team_id))]
pub async fn assign_plan(
    pool: &PgPool,
    team_id: Uuid,
    request: AssignPlanRequest,
) -> Result<Plan, LedgerError> {
    let plan = sqlx::query_as::<_, Plan>(
        "SELECT id, code, name, is_default FROM plans WHERE code = $1",
    )
    .bind(&request.plan_code)
    .fetch_optional(pool)
    .await?
    .ok_or(LedgerError::NotFound("plan"))?;

    let result = sqlx::query("UPDATE teams SET plan_id = $2 WHERE id = $1")
        .bind(team_id)
        .bind(plan.id)
        .execute(pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(LedgerError::NotFound("team"));
    }

    info!(plan = %plan.code, "Plan assigned");
    Ok(plan)
}
