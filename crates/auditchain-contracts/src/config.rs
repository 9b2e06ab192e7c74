//! Ledger configuration.
//!
//! `ChainConfig` is built once at startup and handed to the recorder and the
//! verifier.  It can be parsed from TOML or read from the environment; any
//! malformed value fails immediately with `ChainError::Config`.
//!
//! ```toml
//! [audit]
//! secret = "a-long-random-value"
//! store_timeout_ms = 5000
//! max_conflict_retries = 3
//! ```

use std::{fmt, path::Path, time::Duration};

use serde::Deserialize;

use crate::error::{ChainError, ChainResult};

/// The key used when no secret is configured.  Never acceptable in production.
pub const PLACEHOLDER_SECRET: &str = "change-this-secret-key-in-production";

pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

pub const ENV_SECRET: &str = "AUDIT_SECRET";
pub const ENV_STORE_TIMEOUT_MS: &str = "AUDIT_STORE_TIMEOUT_MS";
pub const ENV_MAX_CONFLICT_RETRIES: &str = "AUDIT_MAX_CONFLICT_RETRIES";

/// The HMAC key that signs every chain hash.
///
/// `Debug` never prints the key material.
#[derive(Clone, PartialEq, Eq)]
pub struct AuditSecret(String);

impl AuditSecret {
    /// Wrap `key`.  An empty key is rejected.
    pub fn new(key: impl Into<String>) -> ChainResult<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(ChainError::config("audit secret must not be empty"));
        }
        Ok(Self(key))
    }

    /// The placeholder key used when nothing is configured.
    pub fn placeholder() -> Self {
        Self(PLACEHOLDER_SECRET.to_string())
    }

    pub fn is_placeholder(&self) -> bool {
        self.0 == PLACEHOLDER_SECRET
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Debug for AuditSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_placeholder() {
            f.write_str("AuditSecret(<placeholder>)")
        } else {
            f.write_str("AuditSecret(<redacted>)")
        }
    }
}

/// Runtime configuration for the recorder and verifier.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    pub secret: AuditSecret,
    /// Upper bound on every individual record-store call.
    pub store_timeout: Duration,
    /// How many times an append is re-attempted after a conflict.
    pub max_conflict_retries: u32,
}

impl ChainConfig {
    pub fn new(secret: AuditSecret) -> Self {
        Self {
            secret,
            store_timeout: Duration::from_millis(DEFAULT_STORE_TIMEOUT_MS),
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_store_timeout(mut self, timeout: Duration) -> Self {
        self.store_timeout = timeout;
        self
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    /// Parse `s` as TOML.  The `[audit]` table and each of its keys are
    /// optional; absent keys take their defaults.
    pub fn from_toml_str(s: &str) -> ChainResult<Self> {
        let raw: RawConfig = toml::from_str(s)
            .map_err(|e| ChainError::config(format!("failed to parse config TOML: {}", e)))?;
        raw.audit.unwrap_or_default().into_config()
    }

    /// Read and parse the TOML file at `path`.
    pub fn from_file(path: &Path) -> ChainResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            ChainError::config(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Build from the process environment.
    pub fn from_env() -> ChainResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup, using the `AUDIT_*` variable names.
    pub fn from_lookup<F>(lookup: F) -> ChainResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store_timeout_ms = lookup(ENV_STORE_TIMEOUT_MS)
            .map(|v| parse_number::<u64>(ENV_STORE_TIMEOUT_MS, &v))
            .transpose()?;
        let max_conflict_retries = lookup(ENV_MAX_CONFLICT_RETRIES)
            .map(|v| parse_number::<u32>(ENV_MAX_CONFLICT_RETRIES, &v))
            .transpose()?;

        RawAuditSection {
            secret: lookup(ENV_SECRET),
            store_timeout_ms,
            max_conflict_retries,
        }
        .into_config()
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    audit: Option<RawAuditSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAuditSection {
    secret: Option<String>,
    store_timeout_ms: Option<u64>,
    max_conflict_retries: Option<u32>,
}

impl RawAuditSection {
    fn into_config(self) -> ChainResult<ChainConfig> {
        let secret = match self.secret {
            Some(key) => AuditSecret::new(key)?,
            None => AuditSecret::placeholder(),
        };

        let timeout_ms = self.store_timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS);
        if timeout_ms == 0 {
            return Err(ChainError::config("store_timeout_ms must be greater than zero"));
        }

        Ok(ChainConfig {
            secret,
            store_timeout: Duration::from_millis(timeout_ms),
            max_conflict_retries: self
                .max_conflict_retries
                .unwrap_or(DEFAULT_MAX_CONFLICT_RETRIES),
        })
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> ChainResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ChainError::config(format!("{} must be a non-negative integer, got '{}'", key, value)))
}
