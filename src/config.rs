use std::env;
use std::str::FromStr;

use anyhow::{Context, Result, anyhow};

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub access_token_ttl: usize,
    pub refresh_token_ttl: usize,
    pub db_max_connections: u32,
    pub run_migrations: bool,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_register_per_min: u32,
    pub rate_refresh_per_min: u32,
    pub rate_protected_per_min: u32,

    pub api_prefix: String,

    pub log_dir: String,
    pub log_level: tracing::Level,

    // Leave credits granted to newly created employees
    pub default_vacation_credits: f64,
    pub default_sick_credits: f64,

    /// Administrator account ensured at startup.
    pub bootstrap_admin: Option<BootstrapAdmin>,
}

#[derive(Clone)]
pub struct BootstrapAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for BootstrapAdmin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootstrapAdmin")
            .field("name", &self.name)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so parsing can be tested without
    /// touching the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| lookup(key).ok_or_else(|| anyhow!("{} must be set", key));

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            access_token_ttl: parse_or(&lookup, "ACCESS_TOKEN_TTL", 900)?, // 15 min
            refresh_token_ttl: parse_or(&lookup, "REFRESH_TOKEN_TTL", 604_800)?, // 7 days
            db_max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 10)?,
            run_migrations: parse_or(&lookup, "RUN_MIGRATIONS", true)?,

            rate_login_per_min: rate_or(&lookup, "RATE_LOGIN_PER_MIN", 60)?,
            rate_register_per_min: rate_or(&lookup, "RATE_REGISTER_PER_MIN", 30)?,
            rate_refresh_per_min: rate_or(&lookup, "RATE_REFRESH_PER_MIN", 30)?,
            rate_protected_per_min: rate_or(&lookup, "RATE_PROTECTED_PER_MIN", 1000)?,

            api_prefix: lookup("API_PREFIX").unwrap_or_else(|| "/api".to_string()),

            log_dir: lookup("LOG_DIR").unwrap_or_else(|| "logs".to_string()),
            log_level: parse_or(&lookup, "LOG_LEVEL", tracing::Level::DEBUG)?,

            default_vacation_credits: parse_or(&lookup, "DEFAULT_VACATION_CREDITS", 15.0)?,
            default_sick_credits: parse_or(&lookup, "DEFAULT_SICK_CREDITS", 15.0)?,

            bootstrap_admin: bootstrap_admin(&lookup)?,
        })
    }
}

/// Requests per minute; zero would disable the quota entirely.
fn rate_or<F>(lookup: &F, key: &str, default: u32) -> Result<u32>
where
    F: Fn(&str) -> Option<String>,
{
    let rate = parse_or(lookup, key, default)?;
    if rate == 0 {
        return Err(anyhow!("{} must be at least 1", key));
    }
    Ok(rate)
}

fn bootstrap_admin<F>(lookup: &F) -> Result<Option<BootstrapAdmin>>
where
    F: Fn(&str) -> Option<String>,
{
    let email = lookup("ADMIN_EMAIL").filter(|v| !v.trim().is_empty());
    let password = lookup("ADMIN_PASSWORD").filter(|v| !v.is_empty());

    match (email, password) {
        (None, None) => Ok(None),
        (Some(email), Some(password)) => {
            if password.chars().count() < 8 {
                return Err(anyhow!("ADMIN_PASSWORD must be at least 8 characters"));
            }
            Ok(Some(BootstrapAdmin {
                name: lookup("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
                email: email.trim().to_lowercase(),
                password,
            }))
        }
        (Some(_), None) => Err(anyhow!("ADMIN_PASSWORD must be set when ADMIN_EMAIL is")),
        (None, Some(_)) => Err(anyhow!("ADMIN_EMAIL must be set when ADMIN_PASSWORD is")),
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("{}", e))
            .with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("SERVER_ADDR", "127.0.0.1:8080"),
        ("DATABASE_URL", "mysql://root@localhost/adminsuite"),
        ("JWT_SECRET", "secret"),
    ];

    #[test]
    fn defaults_apply_when_optional_keys_missing() {
        let config = Config::from_lookup(lookup_from(&BASE)).unwrap();
        assert_eq!(config.access_token_ttl, 900);
        assert_eq!(config.refresh_token_ttl, 604_800);
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.log_level, tracing::Level::DEBUG);
        assert!(config.run_migrations);
        assert_eq!(config.default_vacation_credits, 15.0);
    }

    #[test]
    fn missing_required_key_is_reported() {
        let err = Config::from_lookup(lookup_from(&BASE[..2])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }

    #[test]
    fn invalid_number_names_the_key() {
        let mut pairs = BASE.to_vec();
        pairs.push(("RATE_LOGIN_PER_MIN", "lots"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("RATE_LOGIN_PER_MIN"));
    }

    #[test]
    fn overrides_are_parsed() {
        let mut pairs = BASE.to_vec();
        pairs.push(("LOG_LEVEL", "info"));
        pairs.push(("RUN_MIGRATIONS", "false"));
        pairs.push(("DEFAULT_SICK_CREDITS", "10.5"));
        let config = Config::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.log_level, tracing::Level::INFO);
        assert!(!config.run_migrations);
        assert_eq!(config.default_sick_credits, 10.5);
    }

    #[test]
    fn zero_rate_is_refused() {
        let mut pairs = BASE.to_vec();
        pairs.push(("RATE_PROTECTED_PER_MIN", "0"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert_eq!(err.to_string(), "RATE_PROTECTED_PER_MIN must be at least 1");
    }

    #[test]
    fn bootstrap_admin_is_optional() {
        let config = Config::from_lookup(lookup_from(&BASE)).unwrap();
        assert!(config.bootstrap_admin.is_none());
    }

    #[test]
    fn bootstrap_admin_needs_both_email_and_password() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ADMIN_EMAIL", "root@agency.gov"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("ADMIN_PASSWORD"));

        pairs.push(("ADMIN_PASSWORD", "short"));
        let err = Config::from_lookup(lookup_from(&pairs)).unwrap_err();
        assert!(err.to_string().contains("at least 8"));
    }

    #[test]
    fn bootstrap_admin_email_is_normalized() {
        let mut pairs = BASE.to_vec();
        pairs.push(("ADMIN_EMAIL", " Root@Agency.gov "));
        pairs.push(("ADMIN_PASSWORD", "change-me-now"));
        let admin = Config::from_lookup(lookup_from(&pairs)).unwrap().bootstrap_admin.unwrap();
        assert_eq!(admin.email, "root@agency.gov");
        assert_eq!(admin.name, "Administrator");
        assert!(!format!("{:?}", admin).contains("change-me-now"));
    }
}
