use serde::Deserialize;
use std::fmt;
use std::path::Path;

// Re-export section types
pub use crate::executor::ExecutorConfig;
pub use crate::rate_limit::RateLimitConfig;
pub use crate::resolver::ResolverConfig;
pub use crate::transport::{BridgeConfig, EventStreamConfig};

/// Environment variables that override the `[bridge]` section.
pub const ENV_BRIDGE_HOST: &str = "HUE_BRIDGE_HOST";
pub const ENV_APPLICATION_KEY: &str = "HUE_APPLICATION_KEY";
pub const ENV_BRIDGE_URL: &str = "HUE_BRIDGE_URL";

/// Complete huectl configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HueConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub events: EventStreamConfig,
}

/// Configuration could not be loaded or is unusable.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io { path: String, reason: String },
    Parse { reason: String },
    Invalid { field: &'static str, reason: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, reason } => write!(f, "cannot read {}: {}", path, reason),
            ConfigError::Parse { reason } => write!(f, "invalid config file: {}", reason),
            ConfigError::Invalid { field, reason } => write!(f, "{}: {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

impl HueConfig {
    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Overlay `HUE_BRIDGE_HOST`, `HUE_APPLICATION_KEY` and `HUE_BRIDGE_URL`.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    pub(crate) fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |name| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(host) = non_empty(ENV_BRIDGE_HOST) {
            self.bridge.host = host.trim().to_string();
        }
        if let Some(key) = non_empty(ENV_APPLICATION_KEY) {
            self.bridge.application_key = key.trim().to_string();
        }
        if let Some(url) = non_empty(ENV_BRIDGE_URL) {
            self.bridge.base_url = Some(url.trim().to_string());
        }
    }

    /// Reject settings that cannot produce a working client.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let has_url = self
            .bridge
            .base_url
            .as_deref()
            .is_some_and(|u| !u.trim().is_empty());
        if self.bridge.host.trim().is_empty() && !has_url {
            return Err(ConfigError::Invalid {
                field: "bridge.host",
                reason: format!("set a bridge host or {}", ENV_BRIDGE_HOST),
            });
        }
        if self.bridge.application_key.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "bridge.application_key",
                reason: format!("pair with the bridge and set {}", ENV_APPLICATION_KEY),
            });
        }
        if self.rate_limit.device_per_second <= 0.0 || self.rate_limit.group_per_second <= 0.0 {
            return Err(ConfigError::Invalid {
                field: "rate_limit",
                reason: "refill rates must be positive".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.resolver.confidence_threshold) {
            return Err(ConfigError::Invalid {
                field: "resolver.confidence_threshold",
                reason: "must be between 0 and 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Load configuration from TOML file, then apply environment overrides.
pub fn load_config(path: impl AsRef<Path>) -> Result<HueConfig, ConfigError> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut config: HueConfig = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        reason: e.to_string(),
    })?;
    config.apply_env();
    Ok(config)
}
