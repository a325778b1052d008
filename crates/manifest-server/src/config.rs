use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Result, bail};
use chrono::TimeDelta;
use tracing::info;

use manifest_api::password_reset::ResetDelivery;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_ttl: TimeDelta,
    pub reset_token_ttl: TimeDelta,
    pub reset_delivery: ResetDelivery,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let jwt_secret = env::var("MANIFEST_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("MANIFEST_JWT_SECRET is unset or still a placeholder");
        }

        let in_response: bool = load("MANIFEST_RESET_TOKEN_IN_RESPONSE", "false")?;

        Ok(Self {
            host: load("MANIFEST_HOST", "0.0.0.0")?,
            port: load("MANIFEST_PORT", "8001")?,
            db_path: load("MANIFEST_DB_PATH", "manifestlife.db")?,
            jwt_secret,
            jwt_ttl: load_ttl("MANIFEST_JWT_TTL_HOURS", "168", TimeDelta::try_hours)?,
            reset_token_ttl: load_ttl("MANIFEST_RESET_TOKEN_TTL_MINUTES", "60", TimeDelta::try_minutes)?,
            reset_delivery: if in_response {
                ResetDelivery::InResponse
            } else {
                ResetDelivery::OutOfBand
            },
        })
    }
}

fn load<T: FromStr>(key: &str, default: &str) -> Result<T>
where
    T::Err: Display,
{
    let raw = env::var(key).unwrap_or_else(|_| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });
    raw.parse()
        .map_err(|e| anyhow::anyhow!("invalid {key} value '{raw}': {e}"))
}

/// A strictly positive duration; `unit` converts the raw count.
fn load_ttl(key: &str, default: &str, unit: fn(i64) -> Option<TimeDelta>) -> Result<TimeDelta> {
    let value: i64 = load(key, default)?;
    ttl_from(key, value, unit)
}

fn ttl_from(key: &str, value: i64, unit: fn(i64) -> Option<TimeDelta>) -> Result<TimeDelta> {
    if value <= 0 {
        bail!("{key} must be positive, got {value}");
    }
    unit(value).ok_or_else(|| anyhow::anyhow!("{key} value {value} is out of range"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_parses_or_reports_key() {
        let port: u16 = load("MANIFEST_TEST_UNSET_PORT", "8001").unwrap();
        assert_eq!(port, 8001);

        let err = load::<u16>("MANIFEST_TEST_UNSET_PORT", "not-a-port").unwrap_err();
        assert!(err.to_string().contains("MANIFEST_TEST_UNSET_PORT"));
    }

    #[test]
    fn ttl_must_be_positive_and_in_range() {
        let ttl = load_ttl("MANIFEST_TEST_UNSET_TTL", "60", TimeDelta::try_minutes).unwrap();
        assert_eq!(ttl, TimeDelta::minutes(60));

        let err = ttl_from("MANIFEST_RESET_TOKEN_TTL_MINUTES", 0, TimeDelta::try_minutes).unwrap_err();
        assert!(err.to_string().contains("must be positive"));
        assert!(ttl_from("MANIFEST_RESET_TOKEN_TTL_MINUTES", -5, TimeDelta::try_minutes).is_err());

        let err = ttl_from("MANIFEST_JWT_TTL_HOURS", i64::MAX, TimeDelta::try_hours).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
