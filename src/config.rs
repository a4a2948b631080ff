//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{AuthzError, Result};

/// Configuration for the authorization engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum age of a snapshot before the next check reloads it.
    /// Zero means every check reloads.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Reload before every check regardless of `max_age_secs`
    #[serde(default)]
    pub always_reload: bool,
}

fn default_max_age_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_age_secs: default_max_age_secs(),
            always_reload: false,
        }
    }
}

impl EngineConfig {
    /// Config for a given max age; sub-second ages round up to whole seconds
    /// and only a zero age reloads every check
    pub fn with_max_age(max_age: Duration) -> Self {
        let partial = u64::from(max_age.subsec_nanos() > 0);
        Self {
            max_age_secs: max_age.as_secs() + partial,
            always_reload: max_age.is_zero(),
        }
    }

    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    /// Whether every check must reload before answering
    pub fn reloads_every_check(&self) -> bool {
        self.always_reload || self.max_age_secs == 0
    }

    /// Reads `RBAC_MAX_AGE_SECS` and `RBAC_ALWAYS_RELOAD`, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(raw) = std::env::var("RBAC_MAX_AGE_SECS") {
            config.max_age_secs = raw.trim().parse().map_err(|_| {
                AuthzError::InvalidOperation(format!("RBAC_MAX_AGE_SECS is not a number: '{}'", raw))
            })?;
        }

        if let Ok(raw) = std::env::var("RBAC_ALWAYS_RELOAD") {
            config.always_reload = matches!(raw.trim(), "1" | "true" | "yes");
        }

        Ok(config)
    }
}
