//! Process configuration from environment variables.
//!
//! Every key has a default. A key that is present but malformed is an error,
//! never silently replaced by the default.

use std::net::SocketAddr;

use chrono::Duration;
use thiserror::Error;

use stockadoodle_auth::MfaSettings;
use stockadoodle_core::Money;
use stockadoodle_observability::LogFormat;

pub const DEFAULT_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub use_persistent_stores: bool,
    pub database_url: String,
    pub mfa: MfaSettings,
    pub expiring_window_days: u32,
    pub daily_sales_target: Money,
    pub seed_defaults: bool,
    pub seed_admin_password: String,
    pub log_format: LogFormat,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 5000)),
            jwt_secret: DEFAULT_JWT_SECRET.to_string(),
            token_ttl: Duration::minutes(60),
            use_persistent_stores: false,
            database_url: "sqlite://stockadoodle.db?mode=rwc".to_string(),
            mfa: MfaSettings::default(),
            expiring_window_days: 7,
            daily_sales_target: Money::from_cents(100_000),
            seed_defaults: true,
            seed_admin_password: "admin".to_string(),
            log_format: LogFormat::Json,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (tests pass a map here).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = match get("BIND_ADDR") {
            Some(v) => v.parse().map_err(|e| invalid("BIND_ADDR", &v, e))?,
            None => d.bind_addr,
        };

        let ttl_minutes = parse_in_range(&get, "TOKEN_TTL_MINUTES", 60i64, 1..=60 * 24 * 30)?;
        let code_length = parse_in_range(&get, "MFA_CODE_LENGTH", 6usize, 4..=12)?;
        let expiry_minutes = parse_in_range(&get, "MFA_CODE_EXPIRY_MINUTES", 5i64, 1..=60)?;
        let max_attempts = parse_in_range(&get, "MFA_MAX_ATTEMPTS", 5u32, 1..=100)?;
        let expiring_window_days = parse_in_range(&get, "EXPIRING_WINDOW_DAYS", 7u32, 0..=365)?;

        let daily_sales_target = match get("DAILY_SALES_TARGET") {
            Some(v) => {
                let amount: f64 = v.parse().map_err(|e| invalid("DAILY_SALES_TARGET", &v, e))?;
                Money::from_decimal(amount).map_err(|e| invalid("DAILY_SALES_TARGET", &v, e))?
            }
            None => d.daily_sales_target,
        };

        let log_format = match get("LOG_FORMAT") {
            Some(v) => v.parse().map_err(|e| invalid("LOG_FORMAT", &v, e))?,
            None => d.log_format,
        };

        Ok(Self {
            bind_addr,
            jwt_secret: get("JWT_SECRET").unwrap_or(d.jwt_secret),
            token_ttl: Duration::minutes(ttl_minutes),
            use_persistent_stores: parse_bool(&get, "USE_PERSISTENT_STORES", d.use_persistent_stores)?,
            database_url: get("DATABASE_URL").unwrap_or(d.database_url),
            mfa: MfaSettings {
                enabled: parse_bool(&get, "MFA_ENABLED", d.mfa.enabled)?,
                code_length,
                expiry: Duration::minutes(expiry_minutes),
                max_attempts,
            },
            expiring_window_days,
            daily_sales_target,
            seed_defaults: parse_bool(&get, "SEED_DEFAULTS", d.seed_defaults)?,
            seed_admin_password: get("SEED_ADMIN_PASSWORD").unwrap_or(d.seed_admin_password),
            log_format,
        })
    }

    pub fn uses_default_secret(&self) -> bool {
        self.jwt_secret == DEFAULT_JWT_SECRET
    }
}

fn invalid(key: &'static str, value: &str, reason: impl ToString) -> ConfigError {
    ConfigError::Invalid {
        key,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_bool<G>(get: &G, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(v) => match v.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(invalid(key, &v, "expected true or false")),
        },
    }
}

fn parse_in_range<G, T>(
    get: &G,
    key: &'static str,
    default: T,
    range: std::ops::RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: core::str::FromStr + PartialOrd + core::fmt::Display,
    T::Err: core::fmt::Display,
{
    let Some(raw) = get(key) else {
        return Ok(default);
    };
    let value: T = raw.parse().map_err(|e| invalid(key, &raw, e))?;
    if !range.contains(&value) {
        return Err(invalid(
            key,
            &raw,
            format!("must be between {} and {}", range.start(), range.end()),
        ));
    }
    Ok(value)
}
