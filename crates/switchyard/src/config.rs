//! Router configuration.
//!
//! Every field has a default, so an empty TOML document is a valid
//! configuration. Unknown fields are rejected.
//!
//! ```toml
//! conflict_policy = "strict"      # or "first_wins"
//! decode_params = true
//! max_idle_contexts = 1024
//! max_idle_param_stores = 256
//! header_capacity_limit = 64
//! strip_head_body = true
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use switchyard_core::{PoolLimits, DEFAULT_HEADER_CAPACITY_LIMIT};
use switchyard_router::ConflictPolicy;
use thiserror::Error;

/// Errors that can occur while loading a configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error, including unknown fields.
    #[error("failed to parse TOML configuration: {0}")]
    TomlError(#[from] toml::de::Error),

    /// A value parsed but is out of range.
    #[error("invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field with the invalid value.
        field: String,
        /// Explanation of why the value is invalid.
        reason: String,
    },
}

#[derive(Serialize, Deserialize)]
#[serde(remote = "ConflictPolicy", rename_all = "snake_case")]
enum ConflictPolicyDef {
    Strict,
    FirstWins,
}

/// Settings for a [`Router`](crate::Router).
///
/// # Example
///
/// ```
/// use switchyard::{ConflictPolicy, RouterConfig};
///
/// let config = RouterConfig::from_toml_str(r#"
///     conflict_policy = "first_wins"
///     max_idle_contexts = 64
/// "#).unwrap();
///
/// assert_eq!(config.conflict_policy, ConflictPolicy::FirstWins);
/// assert_eq!(config.max_idle_contexts, 64);
/// assert!(config.decode_params);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouterConfig {
    /// How conflicting registrations are handled.
    #[serde(with = "ConflictPolicyDef")]
    pub conflict_policy: ConflictPolicy,

    /// Percent-decode captured parameter values.
    pub decode_params: bool,

    /// Idle dispatch contexts kept for reuse.
    pub max_idle_contexts: usize,

    /// Idle parameter stores kept for reuse.
    pub max_idle_param_stores: usize,

    /// Header maps whose capacity grows past this are replaced on release.
    pub header_capacity_limit: usize,

    /// Drop the body of responses to HEAD requests.
    pub strip_head_body: bool,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            conflict_policy: ConflictPolicy::Strict,
            decode_params: true,
            max_idle_contexts: 1024,
            max_idle_param_stores: 256,
            header_capacity_limit: DEFAULT_HEADER_CAPACITY_LIMIT,
            strip_head_body: true,
        }
    }
}

impl RouterConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> RouterConfigBuilder {
        RouterConfigBuilder::default()
    }

    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.header_capacity_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "header_capacity_limit".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the pool limits derived from this configuration.
    #[must_use]
    pub const fn pool_limits(&self) -> PoolLimits {
        PoolLimits {
            max_idle_contexts: self.max_idle_contexts,
            max_idle_param_stores: self.max_idle_param_stores,
            header_capacity_limit: self.header_capacity_limit,
        }
    }
}

/// Builder for [`RouterConfig`].
#[derive(Debug, Clone, Default)]
pub struct RouterConfigBuilder {
    config: RouterConfig,
}

impl RouterConfigBuilder {
    /// Sets the conflict policy.
    pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.config.conflict_policy = policy;
        self
    }

    /// Enables or disables percent-decoding of parameters.
    pub fn decode_params(mut self, decode: bool) -> Self {
        self.config.decode_params = decode;
        self
    }

    /// Sets the idle context limit.
    pub fn max_idle_contexts(mut self, max: usize) -> Self {
        self.config.max_idle_contexts = max;
        self
    }

    /// Sets the idle parameter store limit.
    pub fn max_idle_param_stores(mut self, max: usize) -> Self {
        self.config.max_idle_param_stores = max;
        self
    }

    /// Sets the header capacity limit.
    pub fn header_capacity_limit(mut self, limit: usize) -> Self {
        self.config.header_capacity_limit = limit;
        self
    }

    /// Enables or disables body stripping for HEAD.
    pub fn strip_head_body(mut self, strip: bool) -> Self {
        self.config.strip_head_body = strip;
        self
    }

    /// Build the configuration.
    #[must_use]
    pub fn build(self) -> RouterConfig {
        self.config
    }
}
