use std::collections::HashMap;
use std::env;

use crate::rate_limit::RateLimitPolicy;

const WEBHOOK_SECRET_PREFIX: &str = "BANK_WEBHOOK_SECRET_";

/// Runtime configuration read from the environment (and `.env` via `dotenv`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub server_host: String,
    pub server_port: u16,
    pub jwt_secret: String,

    /// Redis backs the rate limiter when set; otherwise an in-process map is used
    pub redis_url: Option<String>,

    /// Bearer token expected by the cron endpoint. The endpoint is disabled when unset.
    pub cron_secret: Option<String>,

    /// HMAC secrets keyed by lower-case provider name
    pub webhook_secrets: HashMap<String, String>,

    pub default_currency: String,
    pub api_rate_limit: RateLimitPolicy,
    pub webhook_rate_limit: RateLimitPolicy,
    pub reminder_batch_limit: i64,

    /// When set, the reminder worker polls instead of running a single sweep
    pub reminder_poll_interval_seconds: Option<u64>,

    pub run_migrations: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| anyhow::anyhow!("DATABASE_URL must be set"))?;

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| anyhow::anyhow!("Invalid SERVER_PORT"))?;

        let jwt_secret =
            env::var("JWT_SECRET").map_err(|_| anyhow::anyhow!("JWT_SECRET must be set"))?;

        Ok(Self {
            database_url,
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port,
            jwt_secret,
            redis_url: non_empty_var("REDIS_URL"),
            cron_secret: non_empty_var("CRON_SECRET"),
            webhook_secrets: webhook_secrets(env::vars()),
            default_currency: env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| "BTN".to_string()),
            api_rate_limit: RateLimitPolicy {
                max_attempts: parse_var("RATE_LIMIT_API_MAX", 120)?,
                window_seconds: parse_var("RATE_LIMIT_API_WINDOW_SECONDS", 60)?,
            },
            webhook_rate_limit: RateLimitPolicy {
                max_attempts: parse_var("RATE_LIMIT_WEBHOOK_MAX", 300)?,
                window_seconds: parse_var("RATE_LIMIT_WEBHOOK_WINDOW_SECONDS", 60)?,
            },
            reminder_batch_limit: parse_var("REMINDER_BATCH_LIMIT", 100)?,
            reminder_poll_interval_seconds: match non_empty_var("REMINDER_POLL_INTERVAL_SECONDS") {
                Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                    anyhow::anyhow!("Invalid REMINDER_POLL_INTERVAL_SECONDS: {}", raw)
                })?),
                None => None,
            },
            run_migrations: env::var("RUN_MIGRATIONS")
                .map(|v| v == "true" || v == "1")
                .unwrap_or(false),
        })
    }

    pub fn webhook_secret(&self, provider: &str) -> Option<&str> {
        self.webhook_secrets
            .get(&provider.to_ascii_lowercase())
            .map(String::as_str)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, anyhow::Error> {
    match non_empty_var(name) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Invalid {}: {}", name, raw)),
        None => Ok(default),
    }
}

/// Collects `BANK_WEBHOOK_SECRET_<PROVIDER>` variables.
fn webhook_secrets<I>(vars: I) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    vars.into_iter()
        .filter_map(|(key, value)| {
            let provider = key.strip_prefix(WEBHOOK_SECRET_PREFIX)?;
            if provider.is_empty() || value.is_empty() {
                return None;
            }
            Some((provider.to_ascii_lowercase(), value))
        })
        .collect()
}

#[cfg(test)]
impl Config {
    /// Configuration for router and service tests; nothing is read from the environment.
    pub fn for_tests() -> Self {
        Self {
            database_url: "postgres://localhost/gstbill_test".to_string(),
            server_host: "127.0.0.1".to_string(),
            server_port: 0,
            jwt_secret: "test-secret".to_string(),
            redis_url: None,
            cron_secret: Some("cron-secret".to_string()),
            webhook_secrets: HashMap::from([("bnb".to_string(), "bnb-secret".to_string())]),
            default_currency: "BTN".to_string(),
            api_rate_limit: RateLimitPolicy {
                max_attempts: 100,
                window_seconds: 60,
            },
            webhook_rate_limit: RateLimitPolicy {
                max_attempts: 100,
                window_seconds: 60,
            },
            reminder_batch_limit: 100,
            reminder_poll_interval_seconds: None,
            run_migrations: false,
        }
    }
}
