//! Bridge configuration.
//!
//! All fields have defaults, so an empty or partial TOML file is valid.
//!
//! ```toml
//! object_name = "webview"
//! max_pending = 1024
//! log_frames = false
//! ```

use std::path::Path;

use deskgui_common::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Upper bound on `max_pending`; anything larger is almost certainly a typo.
pub const MAX_PENDING_LIMIT: usize = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Global page object the shim installs (`window.<object_name>`).
    pub object_name: String,
    /// Maximum outstanding async calls per page bridge.
    pub max_pending: usize,
    /// Log every frame at trace level.
    pub log_frames: bool,
    /// Capacity of the lifecycle event bus.
    pub event_capacity: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            object_name: "webview".into(),
            max_pending: 1024,
            log_frames: false,
            event_capacity: 64,
        }
    }
}

impl BridgeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)
            .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| {
            ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
        })?;
        let config = Self::from_toml_str(&content)?;
        info!("loaded bridge config from {}", path.display());
        Ok(config)
    }

    /// Check every field, reporting all problems at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if !is_js_identifier(&self.object_name) {
            errors.push(format!(
                "object_name '{}' is not a valid JavaScript identifier",
                self.object_name
            ));
        }
        if self.max_pending == 0 || self.max_pending > MAX_PENDING_LIMIT {
            errors.push(format!(
                "max_pending must be between 1 and {MAX_PENDING_LIMIT}, got {}",
                self.max_pending
            ));
        }
        if self.event_capacity == 0 {
            errors.push("event_capacity must be > 0".into());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationError(errors.join("; ")))
        }
    }
}

fn is_js_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
