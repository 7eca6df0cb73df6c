use crate::types::{
    AccountId,
    CommitmentLevel,
    ProgramId,
};
use std::{
    fmt,
    time::Duration,
};
use thiserror::Error;
use url::Url;

pub const REGISTRY_URL_VAR: &str = "CLAIM_REGISTRY_URL";
pub const REGISTRY_SECRET_VAR: &str = "CLAIM_REGISTRY_SECRET";

pub const DEFAULT_TX_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
pub const DEFAULT_MAX_POLL_ERRORS: u32 = 3;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("{var} is not a valid URL: {source}")]
    InvalidUrl {
        var: &'static str,
        #[source]
        source: url::ParseError,
    },
}

/// Tuning of the submit/confirm cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    pub tx_timeout: Duration,
    pub poll_interval: Duration,
    pub commitment: CommitmentLevel,
    /// Consecutive failed status polls tolerated before giving up.
    pub max_poll_errors: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tx_timeout: DEFAULT_TX_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            commitment: CommitmentLevel::Processed,
            max_poll_errors: DEFAULT_MAX_POLL_ERRORS,
        }
    }
}

/// The program being claimed from and where the claim's payment goes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintTarget {
    pub program: ProgramId,
    pub config: AccountId,
    pub treasury: AccountId,
}

/// Whether claims are gated on the allowlist registry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GateMode {
    #[default]
    Open,
    Allowlist,
}

impl GateMode {
    pub fn from_allowlist_flag(allowlist: bool) -> Self {
        if allowlist {
            GateMode::Allowlist
        } else {
            GateMode::Open
        }
    }
}

/// Location of the allowlist registry and the shared secret used for reserve
/// updates.
#[derive(Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    pub base_url: Url,
    pub secret: String,
}

impl fmt::Debug for RegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryConfig")
            .field("base_url", &self.base_url.as_str())
            .field("secret", &"<redacted>")
            .finish()
    }
}

impl RegistryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Registry settings needed by `mode`: none for an open mint.
    pub fn for_mode(
        mode: GateMode,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Option<Self>, ConfigError> {
        match mode {
            GateMode::Open => Ok(None),
            GateMode::Allowlist => Self::from_lookup(lookup).map(Some),
        }
    }

    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let raw_url =
            lookup(REGISTRY_URL_VAR).ok_or(ConfigError::MissingVar(REGISTRY_URL_VAR))?;
        let base_url = Url::parse(&raw_url).map_err(|source| ConfigError::InvalidUrl {
            var: REGISTRY_URL_VAR,
            source,
        })?;
        let secret = lookup(REGISTRY_SECRET_VAR)
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingVar(REGISTRY_SECRET_VAR))?;
        Ok(Self { base_url, secret })
    }
}

#[allow(non_snake_case)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn from_lookup__reads_url_and_secret() {
        // given
        let vars = HashMap::from([
            (REGISTRY_URL_VAR, "http://localhost:8000/whitelisted"),
            (REGISTRY_SECRET_VAR, "hunter2"),
        ]);

        // when
        let config =
            RegistryConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string())).unwrap();

        // then
        assert_eq!(config.base_url.path(), "/whitelisted");
        assert_eq!(config.secret, "hunter2");
        assert!(!format!("{config:?}").contains("hunter2"));
    }

    #[test]
    fn from_lookup__rejects_missing_secret_and_bad_url() {
        let missing = RegistryConfig::from_lookup(|k| {
            (k == REGISTRY_URL_VAR).then(|| "http://localhost".to_string())
        });
        assert!(matches!(
            missing,
            Err(ConfigError::MissingVar(REGISTRY_SECRET_VAR))
        ));

        let bad = RegistryConfig::from_lookup(|k| {
            Some((if k == REGISTRY_URL_VAR { "not a url" } else { "s" }).to_string())
        });
        assert!(matches!(bad, Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn for_mode__only_allowlist_needs_registry_settings() {
        // given
        let nothing_set = |_: &str| None;

        // when
        let open = RegistryConfig::for_mode(GateMode::Open, nothing_set);
        let allowlist = RegistryConfig::for_mode(GateMode::Allowlist, nothing_set);

        // then
        assert!(matches!(open, Ok(None)));
        assert!(matches!(
            allowlist,
            Err(ConfigError::MissingVar(REGISTRY_URL_VAR))
        ));
        assert_eq!(GateMode::from_allowlist_flag(true), GateMode::Allowlist);
        assert_eq!(GateMode::from_allowlist_flag(false), GateMode::Open);
    }

    #[test]
    fn engine_config__defaults_to_weakest_commitment() {
        let config = EngineConfig::default();
        assert_eq!(config.commitment, CommitmentLevel::Processed);
        assert_eq!(config.tx_timeout, DEFAULT_TX_TIMEOUT);
    }
}
