use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

use crate::error::LedgerError;
use crate::ledger::kind::LedgerKind;
use crate::models::Party;

/// Request body for creating a customer or supplier.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePartyRequest {
    #[validate(length(min = 1, max = 200, message = "is required"))]
    pub name: String,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 50))]
    pub phone: Option<String>,

    /// Tax Payer Number
    #[validate(length(max = 50))]
    pub tpn: Option<String>,
}

const PARTY_COLUMNS: &str = "id, team_id, name, email, phone, tpn, created_at";

/// `kind` selects customers (invoices) or suppliers (supplier bills).
pub async fn create_party(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
    request: CreatePartyRequest,
) -> Result<Party, LedgerError> {
    let sql = format!(
        "INSERT INTO {} (id, team_id, name, email, phone, tpn) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {}",
        kind.counterparty_table(),
        PARTY_COLUMNS
    );

    let party = sqlx::query_as::<_, Party>(&sql)
        .bind(Uuid::new_v4())
        .bind(team_id)
        .bind(request.name.trim())
        .bind(&request.email)
        .bind(&request.phone)
        .bind(&request.tpn)
        .fetch_one(pool)
        .await?;

    info!(party_id = %party.id, table = kind.counterparty_table(), "Created counterparty");
    Ok(party)
}

pub async fn list_parties(
    pool: &PgPool,
    kind: LedgerKind,
    team_id: Uuid,
) -> Result<Vec<Party>, LedgerError> {
    let sql = format!(
        "SELECT {} FROM {} WHERE team_id = $1 ORDER BY name ASC",
        PARTY_COLUMNS,
        kind.counterparty_table()
    );

    let parties = sqlx::query_as::<_, Party>(&sql)
        .bind(team_id)
        .fetch_all(pool)
        .await?;

    Ok(parties)
}
