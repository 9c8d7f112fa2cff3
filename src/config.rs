//! Editor configuration using Figment
//!
//! Settings are layered, later sources winning:
//! 1. built-in defaults
//! 2. `ngc.toml` (optional)
//! 3. environment variables prefixed with `NGC_`, nested keys split on `__`
//!
//! Example: `NGC_RUNTIME__TICK_INTERVAL_MS=33`

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "ngc.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EditorConfig {
    /// Snap node positions to the canvas grid on every mounted graph
    #[serde(default = "default_align_to_grid")]
    pub align_to_grid: bool,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// Execution controller settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Delay between `tick` dispatches in milliseconds
    #[serde(default = "default_tick_interval")]
    pub tick_interval_ms: u64,
    /// Script operations allowed per dispatch (0 = unlimited)
    #[serde(default = "default_max_operations")]
    pub max_operations: u64,
    /// End the run after this many ticks
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

fn default_align_to_grid() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    16
}

fn default_max_operations() -> u64 {
    1_000_000
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            align_to_grid: default_align_to_grid(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval(),
            max_operations: default_max_operations(),
            max_ticks: None,
        }
    }
}

impl EditorConfig {
    /// Load configuration from `ngc.toml` and environment variables
    pub fn load() -> Result<Self, figment::Error> {
        Self::load_from(CONFIG_FILE)
    }

    /// Load configuration from a specific file path. A missing file is not an
    /// error; defaults apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, figment::Error> {
        Figment::from(Serialized::defaults(EditorConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("NGC_").split("__"))
            .extract()
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), String> {
        if self.runtime.tick_interval_ms == 0 {
            return Err("Invalid tick_interval_ms 0. Must be at least 1".to_string());
        }
        Ok(())
    }
}
