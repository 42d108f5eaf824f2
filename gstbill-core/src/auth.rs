use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

use crate::app::AppState;
use crate::error::AppError;

/// Role of the caller within their team.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Admin,
    Member,
    Viewer,
    /// Operator of the whole platform, not of a single team
    PlatformAdmin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Owner => write!(f, "owner"),
            Role::Admin => write!(f, "admin"),
            Role::Member => write!(f, "member"),
            Role::Viewer => write!(f, "viewer"),
            Role::PlatformAdmin => write!(f, "platform_admin"),
        }
    }
}

/// Team roles allowed to read records.
pub const READERS: &[Role] = &[Role::Owner, Role::Admin, Role::Member, Role::Viewer];

/// Roles allowed to create or change financial records.
pub const WRITERS: &[Role] = &[Role::Owner, Role::Admin, Role::Member];

/// Roles allowed to reverse records or cancel documents.
pub const MANAGERS: &[Role] = &[Role::Owner, Role::Admin];

/// Authenticated caller stored in request extensions by [`jwt_middleware`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub team_id: Uuid,
    pub role: Role,
}

/// Claims expected inside the JWT for authenticated users.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - the user's UUID as a string.
    pub sub: String,
    pub team_id: Uuid,
    pub role: Role,
    pub exp: usize,
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Decodes and checks an HS256 token.
pub fn decode_token(token: &str, secret: &str) -> Result<CurrentUser, AppError> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let claims = decode::<Claims>(token, &decoding_key, &Validation::new(Algorithm::HS256))
        .map_err(|e| {
            debug!("Rejected token: {}", e);
            AppError::Unauthorized
        })?
        .claims;

    let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AppError::Unauthorized)?;

    Ok(CurrentUser {
        user_id,
        team_id: claims.team_id,
        role: claims.role,
    })
}

/// Middleware to validate a Bearer JWT in the `Authorization` header.
///
/// On success the caller is attached to the request; otherwise `401`.
pub async fn jwt_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request).ok_or(AppError::Unauthorized)?;
    let user = decode_token(token, &state.config.jwt_secret)?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Fails with `403` unless the caller holds one of `allowed`.
pub fn require_role(user: &CurrentUser, allowed: &[Role]) -> Result<(), AppError> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(AppError::Forbidden(format!(
            "role {} may not perform this action",
            user.role
        )))
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

/// Signs a token for the given caller. Token issuance belongs to the identity
/// service; this exists for local tooling and tests.
pub fn issue_token(user: &CurrentUser, secret: &str, ttl_seconds: i64) -> Result<String, AppError> {
    let exp = chrono::Utc::now().timestamp() + ttl_seconds;
    let claims = Claims {
        sub: user.user_id.to_string(),
        team_id: user.team_id,
        role: user.role,
        exp: exp.max(0) as usize,
    };

    jsonwebtoken::encode(
        &jsonwebtoken::Header::new(Algorithm::HS256),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to sign token: {}", e)))
}
