use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Subscription plan a team can be assigned to.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Plan {
    pub id: Uuid,
    pub code: String,
    pub name: String,

    /// Plan used for teams with no assigned plan
    pub is_default: bool,
}

/// Per-team switch layered on top of the plan's features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct FeatureOverride {
    pub team_id: Uuid,
    pub feature_code: String,
    pub enabled: bool,
    pub updated_at: DateTime<Utc>,
}
