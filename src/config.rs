use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use courier_core::RetryPolicy;
use courier_dispatch::DispatcherConfig;

/// Deployment environment, selects the log format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Local,
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Environment::Local),
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(ConfigError::Invalid(
                "COURIER_ENV",
                "must be one of local, dev, prod",
            )),
        }
    }
}

/// Process configuration from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub env: Environment,
    pub listen_addr: SocketAddr,
    pub database_url: String,
    /// Webhook receiving events. Unset means events are only logged.
    pub sender_url: Option<String>,
    pub dispatcher: DispatcherConfig,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_vars<F>(var: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = match var("COURIER_ENV") {
            Some(value) => value.parse()?,
            None => Environment::Local,
        };

        let database_url = var("DATABASE_URL").unwrap_or_else(|| "sqlite://courier.db".to_string());

        let listen_addr = var("LISTEN_ADDR")
            .unwrap_or_else(|| "0.0.0.0:3000".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("LISTEN_ADDR", "must be a valid socket address"))?;

        let sender_url = var("COURIER_SENDER_URL").filter(|url| !url.trim().is_empty());

        let tick_interval = millis(&var, "COURIER_TICK_INTERVAL_MS")?.unwrap_or(5_000);
        if tick_interval == 0 {
            return Err(ConfigError::Invalid(
                "COURIER_TICK_INTERVAL_MS",
                "must be greater than zero",
            ));
        }

        let send_timeout = millis(&var, "COURIER_SEND_TIMEOUT_MS")?.unwrap_or(10_000);
        let backoff_base = millis(&var, "COURIER_BACKOFF_BASE_MS")?.unwrap_or(0);
        let backoff_max = millis(&var, "COURIER_BACKOFF_MAX_MS")?.unwrap_or(300_000);

        let max_attempts = match var("COURIER_MAX_ATTEMPTS") {
            Some(value) => match value.parse::<u32>() {
                Ok(n) if n > 0 => Some(n),
                _ => {
                    return Err(ConfigError::Invalid(
                        "COURIER_MAX_ATTEMPTS",
                        "must be a positive integer",
                    ))
                }
            },
            None => None,
        };

        let retry = RetryPolicy {
            backoff_base: Duration::from_millis(backoff_base),
            backoff_max: Duration::from_millis(backoff_max),
            max_attempts,
        };

        Ok(Config {
            env,
            listen_addr,
            database_url,
            sender_url,
            dispatcher: DispatcherConfig {
                tick_interval: Duration::from_millis(tick_interval),
                send_timeout: (send_timeout > 0).then(|| Duration::from_millis(send_timeout)),
                retry,
            },
        })
    }
}

fn millis<F>(var: &F, key: &'static str) -> Result<Option<u64>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    var(key)
        .map(|value| {
            value
                .parse::<u64>()
                .map_err(|_| ConfigError::Invalid(key, "must be a number of milliseconds"))
        })
        .transpose()
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_vars(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.env, Environment::Local);
        assert_eq!(config.database_url, "sqlite://courier.db");
        assert_eq!(config.listen_addr.port(), 3000);
        assert_eq!(config.sender_url, None);
        assert_eq!(config.dispatcher.tick_interval, Duration::from_secs(5));
        assert_eq!(config.dispatcher.send_timeout, Some(Duration::from_secs(10)));
        assert_eq!(config.dispatcher.retry, RetryPolicy::default());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("COURIER_ENV", "prod"),
            ("COURIER_TICK_INTERVAL_MS", "250"),
            ("COURIER_SENDER_URL", "http://consumer:8080/events"),
            ("COURIER_SEND_TIMEOUT_MS", "0"),
            ("COURIER_MAX_ATTEMPTS", "8"),
            ("COURIER_BACKOFF_BASE_MS", "1000"),
        ])
        .unwrap();

        assert_eq!(config.env, Environment::Prod);
        assert_eq!(config.dispatcher.tick_interval, Duration::from_millis(250));
        assert_eq!(
            config.sender_url.as_deref(),
            Some("http://consumer:8080/events")
        );
        assert_eq!(config.dispatcher.send_timeout, None);
        assert_eq!(config.dispatcher.retry.max_attempts, Some(8));
        assert_eq!(config.dispatcher.retry.backoff_base, Duration::from_secs(1));
    }

    #[test]
    fn test_rejects_zero_tick_interval() {
        let err = load(&[("COURIER_TICK_INTERVAL_MS", "0")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid("COURIER_TICK_INTERVAL_MS", "must be greater than zero")
        );
    }

    #[test]
    fn test_empty_value_is_invalid_not_missing() {
        let err = load(&[("COURIER_TICK_INTERVAL_MS", "")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid("COURIER_TICK_INTERVAL_MS", "must be a number of milliseconds")
        );
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(load(&[("COURIER_ENV", "staging")]).is_err());
        assert!(load(&[("LISTEN_ADDR", "not-an-addr")]).is_err());
        assert!(load(&[("COURIER_TICK_INTERVAL_MS", "5s")]).is_err());
        assert!(load(&[("COURIER_MAX_ATTEMPTS", "0")]).is_err());
    }
}
