use crate::agent::RetryPolicy;
use crate::entity::DEFAULT_IDENTITY_HEADER;
use crate::gateway::DEFAULT_REQUEST_BUDGET;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub assistant_endpoint: Option<String>,
    pub port: u16,
    pub database_path: PathBuf,
    pub retry: RetryPolicy,
    pub request_budget: Duration,
    pub playbook_path: Option<PathBuf>,
    pub identity_header: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; blank values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            attempt_timeout: parse(&get, "ASSISTANT_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.attempt_timeout),
            backoff: parse(&get, "ASSISTANT_RETRY_BACKOFF_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.backoff),
            max_retries: defaults.max_retries,
        };

        let database_path = get("DATABASE_PATH").map(PathBuf::from).unwrap_or_else(|| {
            let home_dir = get("HOME").unwrap_or_else(|| ".".into());
            PathBuf::from(home_dir).join(".salone").join("gateway.db")
        });

        Ok(Self {
            assistant_endpoint: get("ASSISTANT_ENDPOINT_URL"),
            port: parse(&get, "GATEWAY_PORT")?.unwrap_or(DEFAULT_PORT),
            database_path,
            retry,
            request_budget: parse(&get, "REQUEST_DEADLINE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_BUDGET),
            playbook_path: get("PLAYBOOK_PATH").map(PathBuf::from),
            identity_header: get("IDENTITY_HEADER")
                .unwrap_or_else(|| DEFAULT_IDENTITY_HEADER.to_string()),
        })
    }
}

fn parse<T>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    get(key)
        .map(|raw| {
            raw.parse::<T>()
                .with_context(|| format!("Invalid value for {}: {:?}", key, raw))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[("HOME", "/home/portal")]).unwrap();
        assert_eq!(config.assistant_endpoint, None);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.database_path, PathBuf::from("/home/portal/.salone/gateway.db"));
        assert_eq!(config.retry, RetryPolicy::default());
        assert_eq!(config.request_budget, DEFAULT_REQUEST_BUDGET);
        assert_eq!(config.identity_header, DEFAULT_IDENTITY_HEADER);
        assert!(config.playbook_path.is_none());
    }

    #[test]
    fn values_are_read() {
        let config = config(&[
            ("ASSISTANT_ENDPOINT_URL", "https://assistant.example/chat"),
            ("GATEWAY_PORT", "8080"),
            ("DATABASE_PATH", "/tmp/chat.db"),
            ("ASSISTANT_TIMEOUT_SECS", "5"),
            ("ASSISTANT_RETRY_BACKOFF_MS", "250"),
            ("REQUEST_DEADLINE_SECS", "12"),
            ("PLAYBOOK_PATH", "/etc/salone/playbook.json"),
            ("IDENTITY_HEADER", "x-portal-user"),
        ])
        .unwrap();
        assert_eq!(config.assistant_endpoint.as_deref(), Some("https://assistant.example/chat"));
        assert_eq!(config.port, 8080);
        assert_eq!(config.database_path, PathBuf::from("/tmp/chat.db"));
        assert_eq!(config.retry.attempt_timeout, Duration::from_secs(5));
        assert_eq!(config.retry.backoff, Duration::from_millis(250));
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.request_budget, Duration::from_secs(12));
        assert_eq!(config.playbook_path, Some(PathBuf::from("/etc/salone/playbook.json")));
        assert_eq!(config.identity_header, "x-portal-user");
    }

    #[test]
    fn blank_endpoint_is_unset() {
        let config = config(&[("ASSISTANT_ENDPOINT_URL", "   ")]).unwrap();
        assert!(config.assistant_endpoint.is_none());
    }

    #[test]
    fn malformed_number_names_the_variable() {
        let err = config(&[("GATEWAY_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("GATEWAY_PORT"));
    }
}
