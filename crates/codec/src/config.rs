//! Session configuration
//!
//! ```rust,ignore
//! let config = MarshalConfig::new().with_max_depth(64).with_freeze(true);
//! let config = MarshalConfig::from_toml("max_depth = 64")?;
//! ```

use serde::Deserialize;

/// Nesting ceiling used when none is configured
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Options shared by dump and load
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarshalConfig {
    /// Deepest nesting level a dump or load may reach
    pub max_depth: usize,
    /// Freeze every loaded object (and deduplicate equal strings)
    pub freeze: bool,
}

impl Default for MarshalConfig {
    fn default() -> Self {
        MarshalConfig {
            max_depth: DEFAULT_MAX_DEPTH,
            freeze: false,
        }
    }
}

impl MarshalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_freeze(mut self, freeze: bool) -> Self {
        self.freeze = freeze;
        self
    }

    /// Parse configuration from a TOML string; missing keys keep defaults
    pub fn from_toml(toml_str: &str) -> Result<Self, String> {
        toml::from_str(toml_str).map_err(|e| format!("Failed to parse marshal config: {}", e))
    }
}
