use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_PROVIDER_URL: &str = "https://api.freecurrencyapi.com/v1/latest";

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: String,
    pub timezone: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub url: String,
    pub api_key: String,
    pub base_currency: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshConfig {
    /// Age at which the stored snapshot is considered stale.
    pub ttl: Duration,
    /// Countdown cadence while the snapshot is fresh.
    pub poll_interval: Duration,
    /// Wait after a failed refresh before trying again.
    pub retry_interval: Duration,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            poll_interval: Duration::from_secs(5),
            // Longer than the poll: each retry is a provider request.
            retry_interval: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub database: DatabaseConfig,
    pub provider: ProviderConfig,
    pub refresh: RefreshConfig,
    /// Whether minting a token needs an existing valid token.
    pub token_create_requires_token: bool,
    /// Token stored at startup so a fresh deployment is reachable.
    pub seed_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{} must be set", key));
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let secs = |key: &str, default: u64| -> Result<Duration> {
            match var(key) {
                Some(v) => v
                    .parse::<u64>()
                    .map(Duration::from_secs)
                    .with_context(|| format!("{} must be a number of seconds, got {:?}", key, v)),
                None => Ok(Duration::from_secs(default)),
            }
        };

        let port = or("DB_PORT", "5432");
        let max_connections = or("DB_MAX_CONNECTIONS", "5");
        let requires_token = or("TOKEN_CREATE_REQUIRES_TOKEN", "true");

        let defaults = RefreshConfig::default();
        let config = Self {
            bind_addr: or("BIND_ADDR", "0.0.0.0:8080"),
            database: DatabaseConfig {
                host: or("DB_HOST", "localhost"),
                port: port
                    .parse()
                    .with_context(|| format!("DB_PORT must be a port number, got {:?}", port))?,
                name: required("DB_NAME")?,
                user: required("DB_USER")?,
                password: var("DB_PASSWORD").unwrap_or_default(),
                timezone: or("DB_TIMEZONE", "UTC"),
                max_connections: max_connections.parse().with_context(|| {
                    format!("DB_MAX_CONNECTIONS must be a number, got {:?}", max_connections)
                })?,
            },
            provider: ProviderConfig {
                url: or("CURRENCY_API_URL", DEFAULT_PROVIDER_URL),
                api_key: required("CURRENCY_API_KEY")?,
                base_currency: or("BASE_CURRENCY", "TRY"),
                timeout: secs("FETCH_TIMEOUT_SECS", 10)?,
            },
            refresh: RefreshConfig {
                ttl: secs("REFRESH_TTL_SECS", defaults.ttl.as_secs())?,
                poll_interval: secs("POLL_INTERVAL_SECS", defaults.poll_interval.as_secs())?,
                retry_interval: secs("RETRY_INTERVAL_SECS", defaults.retry_interval.as_secs())?,
            },
            token_create_requires_token: parse_bool(&requires_token).with_context(|| {
                format!(
                    "TOKEN_CREATE_REQUIRES_TOKEN must be true or false, got {:?}",
                    requires_token
                )
            })?,
            seed_token: var("SEED_TOKEN"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let refresh = &self.refresh;
        if refresh.ttl.is_zero() {
            anyhow::bail!("REFRESH_TTL_SECS cannot be 0");
        }
        if refresh.poll_interval.is_zero() {
            anyhow::bail!("POLL_INTERVAL_SECS cannot be 0");
        }
        if refresh.poll_interval >= refresh.ttl {
            anyhow::bail!(
                "POLL_INTERVAL_SECS ({}) must be shorter than REFRESH_TTL_SECS ({})",
                refresh.poll_interval.as_secs(),
                refresh.ttl.as_secs()
            );
        }
        if self.provider.timeout.is_zero() {
            anyhow::bail!("FETCH_TIMEOUT_SECS cannot be 0");
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(pairs: &[(&str, &str)]) -> Result<Config> {
        let env: HashMap<String, String> = [
            ("DB_NAME", "currency"),
            ("DB_USER", "postgres"),
            ("CURRENCY_API_KEY", "fca_test"),
        ]
        .iter()
        .chain(pairs.iter())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.database.timezone, "UTC");
        assert_eq!(config.provider.url, DEFAULT_PROVIDER_URL);
        assert_eq!(config.provider.base_currency, "TRY");
        assert_eq!(config.refresh, RefreshConfig::default());
        assert!(config.refresh.retry_interval > config.refresh.poll_interval);
        assert!(config.token_create_requires_token);
        assert!(config.seed_token.is_none());
    }

    #[test]
    fn test_missing_api_key() {
        let err = Config::from_lookup(|key| match key {
            "DB_NAME" => Some("currency".to_string()),
            "DB_USER" => Some("postgres".to_string()),
            _ => None,
        })
        .unwrap_err();
        assert!(err.to_string().contains("CURRENCY_API_KEY"));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DB_PORT", "6543"),
            ("REFRESH_TTL_SECS", "120"),
            ("POLL_INTERVAL_SECS", "2"),
            ("TOKEN_CREATE_REQUIRES_TOKEN", "false"),
            ("SEED_TOKEN", "abc"),
        ])
        .unwrap();
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.refresh.ttl, Duration::from_secs(120));
        assert_eq!(config.refresh.poll_interval, Duration::from_secs(2));
        assert!(!config.token_create_requires_token);
        assert_eq!(config.seed_token.as_deref(), Some("abc"));
    }

    #[test]
    fn test_poll_must_be_shorter_than_ttl() {
        let err = load(&[("REFRESH_TTL_SECS", "5"), ("POLL_INTERVAL_SECS", "5")]).unwrap_err();
        assert!(err.to_string().contains("shorter"));
    }

    #[test]
    fn test_bad_number() {
        assert!(load(&[("FETCH_TIMEOUT_SECS", "soon")]).is_err());
        assert!(load(&[("TOKEN_CREATE_REQUIRES_TOKEN", "maybe")]).is_err());
    }
}
