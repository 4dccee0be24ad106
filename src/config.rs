//! Environment configuration — Azure credentials and daemon settings.
//!
//! Everything is read once at startup. Missing credentials are fatal
//! before the first poll cycle runs; there is no partial-credential
//! state. Lookups go through an injected closure so tests never touch
//! the process environment.

use std::fmt;
use std::net::SocketAddr;

use anyhow::{Context, Result};

pub const ENV_CLIENT_ID: &str = "AZURE_CLIENT_ID";
pub const ENV_CLIENT_SECRET: &str = "AZURE_CLIENT_SECRET";
pub const ENV_TENANT_ID: &str = "AZURE_TENANT_ID";
pub const ENV_SUBSCRIPTION_ID: &str = "AZURE_SUBSCRIPTION_ID";
pub const ENV_LISTEN_ADDR: &str = "RATEWATCH_LISTEN_ADDR";
pub const ENV_POLL_INTERVAL: &str = "RATEWATCH_POLL_INTERVAL_SECS";

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:9184";
const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Service-principal credentials for the client-credentials exchange.
/// All three are required; the secret never reaches logs.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub tenant_id: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl Credentials {
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        Ok(Self {
            client_id: require(&get, ENV_CLIENT_ID)?,
            client_secret: require(&get, ENV_CLIENT_SECRET)?,
            tenant_id: require(&get, ENV_TENANT_ID)?,
        })
    }
}

/// Configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub credentials: Credentials,
    pub subscription_id: String,
    pub listen_addr: SocketAddr,
    pub poll_interval_secs: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let credentials = Credentials::from_lookup(&get)?;
        let subscription_id = require(&get, ENV_SUBSCRIPTION_ID)?;

        let listen_addr = get(ENV_LISTEN_ADDR)
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.into())
            .parse::<SocketAddr>()
            .with_context(|| format!("{ENV_LISTEN_ADDR} is not a valid socket address"))?;

        let poll_interval_secs = match get(ENV_POLL_INTERVAL) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("{ENV_POLL_INTERVAL} is not a valid number of seconds"))?,
            None => DEFAULT_POLL_INTERVAL_SECS,
        };

        Ok(Self {
            credentials,
            subscription_id,
            listen_addr,
            poll_interval_secs,
        })
    }
}

fn require(get: impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match get(key) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => anyhow::bail!("{key} must be set"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn full_env() -> HashMap<String, String> {
        vars(&[
            (ENV_CLIENT_ID, "client-1"),
            (ENV_CLIENT_SECRET, "s3cret"),
            (ENV_TENANT_ID, "tenant-1"),
            (ENV_SUBSCRIPTION_ID, "sub-1"),
        ])
    }

    #[test]
    fn test_loads_with_defaults() {
        let env = full_env();
        let config = Config::from_lookup(|k| env.get(k).cloned()).unwrap();

        assert_eq!(config.credentials.client_id, "client-1");
        assert_eq!(config.subscription_id, "sub-1");
        assert_eq!(config.listen_addr, "0.0.0.0:9184".parse().unwrap());
        assert_eq!(config.poll_interval_secs, 60);
    }

    #[test]
    fn test_each_missing_credential_is_fatal() {
        for missing in [ENV_CLIENT_ID, ENV_CLIENT_SECRET, ENV_TENANT_ID] {
            let mut env = full_env();
            env.remove(missing);

            let err = Config::from_lookup(|k| env.get(k).cloned()).unwrap_err();
            assert!(err.to_string().contains(missing), "error should name {missing}");
        }
    }

    #[test]
    fn test_empty_credential_counts_as_missing() {
        let mut env = full_env();
        env.insert(ENV_CLIENT_SECRET.into(), String::new());

        assert!(Config::from_lookup(|k| env.get(k).cloned()).is_err());
    }

    #[test]
    fn test_overrides_respected() {
        let mut env = full_env();
        env.insert(ENV_LISTEN_ADDR.into(), "127.0.0.1:9999".into());
        env.insert(ENV_POLL_INTERVAL.into(), "15".into());

        let config = Config::from_lookup(|k| env.get(k).cloned()).unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9999".parse().unwrap());
        assert_eq!(config.poll_interval_secs, 15);
    }

    #[test]
    fn test_invalid_listen_addr_rejected() {
        let mut env = full_env();
        env.insert(ENV_LISTEN_ADDR.into(), "not-an-addr".into());

        assert!(Config::from_lookup(|k| env.get(k).cloned()).is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let env = full_env();
        let config = Config::from_lookup(|k| env.get(k).cloned()).unwrap();

        let printed = format!("{:?}", config.credentials);
        assert!(!printed.contains("s3cret"));
        assert!(printed.contains("<redacted>"));
    }
}
