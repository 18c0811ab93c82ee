//! Shelf configuration
//!
//! Loaded from a TOML file; every section and field has a default so a
//! partial (or missing) file still yields a usable configuration:
//!
//! ```toml
//! [shelf]
//! shelf_id = "PC2"
//! wiring = "top_down"
//!
//! [gateway]
//! base_url = "http://gateway.local:8000"
//! timeout_ms = 5000
//!
//! [buttons]
//! enabled = true
//!
//! [[buttons.mapping]]
//! pin = 0
//! position = "L1B1"
//!
//! [server]
//! bind = "0.0.0.0:8765"
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shelf_core::DEFAULT_CELL_CAPACITY;
use shelf_led::{WIRING_ORDER, WiringOrder};
use thiserror::Error;

use crate::buttons::{ButtonBinding, PollTiming, default_bindings};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfConfig {
    pub shelf: ShelfSection,
    pub gateway: GatewaySettings,
    pub buttons: ButtonSettings,
    pub server: ServerSettings,
}

impl Default for ShelfConfig {
    fn default() -> Self {
        Self {
            shelf: ShelfSection::default(),
            gateway: GatewaySettings::default(),
            buttons: ButtonSettings::default(),
            server: ServerSettings::default(),
        }
    }
}

/// Shelf identity and hardware wiring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShelfSection {
    /// Fixed shelf identity; when unset it is requested from the Gateway
    pub shelf_id: Option<String>,
    /// LED strip wiring direction
    pub wiring: WiringOrder,
    /// Capacity of every slot in the fallback layout
    pub fallback_capacity: u32,
}

impl Default for ShelfSection {
    fn default() -> Self {
        Self {
            shelf_id: None,
            wiring: WIRING_ORDER,
            fallback_capacity: DEFAULT_CELL_CAPACITY,
        }
    }
}

/// Gateway (system of record) connection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySettings {
    pub enabled: bool,
    pub base_url: String,
    /// Bound on every round trip
    pub timeout_ms: u64,
    pub layout_path: String,
    pub state_path: String,
    pub complete_path: String,
    pub pending_jobs_path: String,
    pub shelf_id_path: String,
    /// Address reported when requesting the shelf identity
    pub shelf_ip: Option<String>,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "http://127.0.0.1:8000".to_string(),
            timeout_ms: 10_000,
            layout_path: "/shelf/layout".to_string(),
            state_path: "/shelf/shelfItem".to_string(),
            complete_path: "/shelf/complete".to_string(),
            pending_jobs_path: "/shelf/pending".to_string(),
            shelf_id_path: "/IoTManagement/shelf/requestID".to_string(),
            shelf_ip: None,
        }
    }
}

impl GatewaySettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Push-button polling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ButtonSettings {
    pub enabled: bool,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub mapping: Vec<ButtonBinding>,
}

impl Default for ButtonSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            poll_interval_ms: 20,
            debounce_ms: 50,
            mapping: default_bindings(),
        }
    }
}

impl ButtonSettings {
    pub fn timing(&self) -> PollTiming {
        PollTiming {
            interval: Duration::from_millis(self.poll_interval_ms),
            debounce: Duration::from_millis(self.debounce_ms),
        }
    }
}

/// Observer server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub bind: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8765".to_string(),
        }
    }
}

impl ShelfConfig {
    /// Load from a TOML file
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shelf.fallback_capacity == 0 {
            return Err(ConfigError::Invalid(
                "shelf.fallback_capacity must be positive".into(),
            ));
        }
        if self.gateway.enabled && self.gateway.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "gateway.timeout_ms must be positive".into(),
            ));
        }
        if self.buttons.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "buttons.poll_interval_ms must be positive".into(),
            ));
        }
        for (i, binding) in self.buttons.mapping.iter().enumerate() {
            if binding.pin >= crate::buttons::BUTTON_INPUTS {
                return Err(ConfigError::Invalid(format!(
                    "buttons.mapping: pin {} out of range",
                    binding.pin
                )));
            }
            if self.buttons.mapping[..i].iter().any(|b| b.pin == binding.pin) {
                return Err(ConfigError::Invalid(format!(
                    "buttons.mapping: pin {} mapped twice",
                    binding.pin
                )));
            }
        }
        Ok(())
    }
}
