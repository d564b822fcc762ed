use std::{env, str::FromStr, time::Duration};

use crate::error::ConfigError;

pub const DEFAULT_ADMIN_PASSWORD: &str = "password123";

/// Minimum length of the cookie signing secret.
pub const SESSION_SECRET_MIN_LEN: usize = 64;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub session_secret: Vec<u8>,
    pub bind_addr: String,
    pub admin_password: String,
    pub retry: RetryPolicy,
    /// How long a connection waits on a locked database or for a free pooled
    /// connection. SQLite has no per-statement execution timeout.
    pub busy_timeout: Duration,
}

/// Exponential backoff for the initial database connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |var: &'static str| {
            lookup(var)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(var))
        };

        let database_url = required("DATABASE_URL")?;

        let session_secret = required("SESSION_SECRET")?.into_bytes();
        if session_secret.len() < SESSION_SECRET_MIN_LEN {
            return Err(ConfigError::Invalid {
                var: "SESSION_SECRET",
                reason: format!("must be at least {SESSION_SECRET_MIN_LEN} bytes"),
            });
        }

        let bind_addr = lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:5000".into());
        let admin_password =
            lookup("ADMIN_PASSWORD").unwrap_or_else(|| DEFAULT_ADMIN_PASSWORD.into());

        let defaults = RetryPolicy::default();
        let max_attempts = parse_or(&lookup, "DB_CONNECT_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            return Err(ConfigError::Invalid {
                var: "DB_CONNECT_ATTEMPTS",
                reason: "must be at least 1".into(),
            });
        }
        let base_delay_ms = parse_or(
            &lookup,
            "DB_CONNECT_BASE_DELAY_MS",
            defaults.base_delay.as_millis() as u64,
        )?;
        let busy_timeout_secs = parse_or(&lookup, "DB_BUSY_TIMEOUT_SECS", 5u64)?;

        Ok(Config {
            database_url,
            session_secret,
            bind_addr,
            admin_password,
            retry: RetryPolicy {
                max_attempts,
                base_delay: Duration::from_millis(base_delay_ms),
                max_delay: defaults.max_delay,
            },
            busy_timeout: Duration::from_secs(busy_timeout_secs),
        })
    }

    pub fn uses_default_admin_password(&self) -> bool {
        self.admin_password == DEFAULT_ADMIN_PASSWORD
    }
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SECRET: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup(&[("SESSION_SECRET", SECRET)]))
            .err()
            .unwrap();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn short_session_secret_is_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://todos.db"),
            ("SESSION_SECRET", "too short"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { var: "SESSION_SECRET", .. }));
    }

    #[test]
    fn optional_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://todos.db"),
            ("SESSION_SECRET", SECRET),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:5000");
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(config.uses_default_admin_password());
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn busy_timeout_is_configurable() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://todos.db"),
            ("SESSION_SECRET", SECRET),
            ("DB_BUSY_TIMEOUT_SECS", "12"),
        ]))
        .unwrap();
        assert_eq!(config.busy_timeout, Duration::from_secs(12));
    }

    #[test]
    fn malformed_numbers_are_errors() {
        let err = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://todos.db"),
            ("SESSION_SECRET", SECRET),
            ("DB_CONNECT_ATTEMPTS", "lots"),
        ]))
        .err()
        .unwrap();
        assert!(matches!(err, ConfigError::Invalid { var: "DB_CONNECT_ATTEMPTS", .. }));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(400));
        assert_eq!(policy.delay_after(4), Duration::from_millis(500));
        assert_eq!(policy.delay_after(40), Duration::from_millis(500));
    }
}
