use std::env;
use std::str::FromStr;

use anyhow::Context;

use crate::streaks::LongestPolicy;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string. Without it the service runs on the
    /// in-memory store.
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub frontend_url: String,
    pub cors_extra_origins: Vec<String>,

    pub jwt_secret: String,
    pub jwt_ttl_secs: i64,

    pub longest_streak_policy: LongestPolicy,

    pub auth_rate_limit_max: u32,
    pub auth_rate_limit_window_secs: u64,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 20)?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: parse_var("PORT", 8080)?,
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".into()),
            cors_extra_origins: env::var("CORS_EXTRA_ORIGINS")
                .map(|v| {
                    v.split(',')
                        .map(str::trim)
                        .filter(|o| !o.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),

            jwt_secret: env::var("JWT_SECRET").context("JWT_SECRET must be set")?,
            jwt_ttl_secs: parse_var("JWT_TTL_SECS", 86_400)?,

            longest_streak_policy: parse_var("LONGEST_STREAK_POLICY", LongestPolicy::RunningMax)?,

            auth_rate_limit_max: parse_var("AUTH_RATE_LIMIT_MAX", 5)?,
            auth_rate_limit_window_secs: parse_var("AUTH_RATE_LIMIT_WINDOW_SECS", 60)?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Read `name` from the environment, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_var_uses_default_when_unset() {
        let value: u16 = parse_var("REELON_TEST_UNSET_PORT", 8080).unwrap();
        assert_eq!(value, 8080);
    }

    #[test]
    fn test_parse_var_reports_bad_values() {
        env::set_var("REELON_TEST_BAD_POLICY", "sometimes");
        let err = parse_var("REELON_TEST_BAD_POLICY", LongestPolicy::RunningMax).unwrap_err();
        assert!(err.to_string().contains("REELON_TEST_BAD_POLICY"));
        env::remove_var("REELON_TEST_BAD_POLICY");
    }
}
