//! # Fleet Configuration
//!
//! Configuration for the fleet services.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     DOORPLATE_DB_PATH=/var/lib/doorplate/doorplate.db                  │
//! │     DOORPLATE_RENDER_TIMEOUT_SECS=20                                   │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/doorplate/fleet.toml (Linux)                             │
//! │     ~/Library/Application Support/org.doorplate.fleet/fleet.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [activation]
//! code_ttl_secs = 300
//! preview_template_owner = "superUser"
//! preview_template_name = "EP"
//! preview_placeholder = "activationCode"
//!
//! [devices]
//! default_refresh_interval_secs = 300
//! default_template_id = ""
//!
//! [renderer]
//! program = "python3"
//! script = "render_doorplate.py"
//! width = 800
//! height = 480
//! timeout_secs = 30
//!
//! [transfer]
//! timeout_secs = 300
//! device_dwell_secs = 3
//! listing_dwell_secs = 5
//!
//! [guest]
//! max_per_ip_per_hour = 3
//! max_per_device_per_hour = 5
//! max_per_ip_device_per_hour = 5
//! window_secs = 3600
//! max_message_len = 500
//!
//! [database]
//! path = "doorplate.db"
//! max_connections = 5
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use doorplate_core::{GuestLimits, MIN_REFRESH_INTERVAL_SECS};

use crate::error::{FleetError, FleetResult};

/// Longest accepted activation code lifetime (one day).
pub const MAX_CODE_TTL_SECS: u32 = 86_400;

/// Longest accepted guest throttle window (one week).
pub const MAX_GUEST_WINDOW_SECS: u32 = 604_800;

/// Longest accepted wall-clock budget for one render.
pub const MAX_RENDER_TIMEOUT_SECS: u32 = 120;

/// Converts configured seconds to a chrono duration, clamped to `max`.
fn bounded_seconds(secs: u64, max: u32) -> chrono::Duration {
    let secs = u32::try_from(secs).map_or(max, |s| s.min(max));
    chrono::Duration::seconds(i64::from(secs))
}

// =============================================================================
// Activation Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivationSettings {
    /// Lifetime of a freshly minted activation code.
    #[serde(default = "default_code_ttl")]
    pub code_ttl_secs: u64,

    /// Owner of the template used to show the code on screen.
    #[serde(default = "default_preview_owner")]
    pub preview_template_owner: String,

    #[serde(default = "default_preview_name")]
    pub preview_template_name: String,

    /// Name of the text element that receives the code.
    #[serde(default = "default_preview_placeholder")]
    pub preview_placeholder: String,
}

fn default_code_ttl() -> u64 {
    300
}

fn default_preview_owner() -> String {
    "superUser".to_string()
}

fn default_preview_name() -> String {
    "EP".to_string()
}

fn default_preview_placeholder() -> String {
    "activationCode".to_string()
}

impl Default for ActivationSettings {
    fn default() -> Self {
        ActivationSettings {
            code_ttl_secs: default_code_ttl(),
            preview_template_owner: default_preview_owner(),
            preview_template_name: default_preview_name(),
            preview_placeholder: default_preview_placeholder(),
        }
    }
}

// =============================================================================
// Device Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    #[serde(default = "default_refresh_interval")]
    pub default_refresh_interval_secs: u32,

    /// Template given to newly bound devices. Empty means none.
    #[serde(default)]
    pub default_template_id: String,
}

fn default_refresh_interval() -> u32 {
    doorplate_core::DEFAULT_REFRESH_INTERVAL_SECS
}

impl Default for DeviceSettings {
    fn default() -> Self {
        DeviceSettings {
            default_refresh_interval_secs: default_refresh_interval(),
            default_template_id: String::new(),
        }
    }
}

impl DeviceSettings {
    pub fn default_template(&self) -> Option<&str> {
        let id = self.default_template_id.trim();
        (!id.is_empty()).then_some(id)
    }
}

// =============================================================================
// Renderer Settings
// =============================================================================

/// How the out-of-process renderer is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererSettings {
    #[serde(default = "default_program")]
    pub program: String,

    /// Passed as the first argument to `program`. Empty to run `program` directly.
    #[serde(default = "default_script")]
    pub script: String,

    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Wall-clock budget for one render.
    #[serde(default = "default_render_timeout")]
    pub timeout_secs: u64,
}

fn default_program() -> String {
    "python3".to_string()
}

fn default_script() -> String {
    "render_doorplate.py".to_string()
}

fn default_width() -> u32 {
    800
}

fn default_height() -> u32 {
    480
}

fn default_render_timeout() -> u64 {
    30
}

impl Default for RendererSettings {
    fn default() -> Self {
        RendererSettings {
            program: default_program(),
            script: default_script(),
            width: default_width(),
            height: default_height(),
            timeout_secs: default_render_timeout(),
        }
    }
}

// =============================================================================
// Transfer Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSettings {
    /// A transfer older than this is considered abandoned.
    #[serde(default = "default_transfer_timeout")]
    pub timeout_secs: u64,

    /// Minimum age before a device poll may clear a transfer.
    #[serde(default = "default_device_dwell")]
    pub device_dwell_secs: u64,

    /// Minimum age before a listing may clear a transfer.
    #[serde(default = "default_listing_dwell")]
    pub listing_dwell_secs: u64,
}

fn default_transfer_timeout() -> u64 {
    300
}

fn default_device_dwell() -> u64 {
    3
}

fn default_listing_dwell() -> u64 {
    5
}

impl Default for TransferSettings {
    fn default() -> Self {
        TransferSettings {
            timeout_secs: default_transfer_timeout(),
            device_dwell_secs: default_device_dwell(),
            listing_dwell_secs: default_listing_dwell(),
        }
    }
}

// =============================================================================
// Guest Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestSettings {
    #[serde(default = "default_max_per_ip")]
    pub max_per_ip_per_hour: u32,

    #[serde(default = "default_max_per_device")]
    pub max_per_device_per_hour: u32,

    #[serde(default = "default_max_per_ip_device")]
    pub max_per_ip_device_per_hour: u32,

    /// Length of the trailing window the limits apply to.
    #[serde(default = "default_window")]
    pub window_secs: u64,

    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

fn default_max_per_ip() -> u32 {
    3
}

fn default_max_per_device() -> u32 {
    5
}

fn default_max_per_ip_device() -> u32 {
    5
}

fn default_window() -> u64 {
    3600
}

fn default_max_message_len() -> usize {
    500
}

impl Default for GuestSettings {
    fn default() -> Self {
        GuestSettings {
            max_per_ip_per_hour: default_max_per_ip(),
            max_per_device_per_hour: default_max_per_device(),
            max_per_ip_device_per_hour: default_max_per_ip_device(),
            window_secs: default_window(),
            max_message_len: default_max_message_len(),
        }
    }
}

impl GuestSettings {
    pub fn limits(&self) -> GuestLimits {
        GuestLimits {
            max_per_ip: self.max_per_ip_per_hour,
            max_per_device: self.max_per_device_per_hour,
            max_per_ip_device: self.max_per_ip_device_per_hour,
        }
    }

    pub fn window(&self) -> chrono::Duration {
        bounded_seconds(self.window_secs, MAX_GUEST_WINDOW_SECS)
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("doorplate.db")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            path: default_db_path(),
            max_connections: default_max_connections(),
        }
    }
}

// =============================================================================
// Main Fleet Configuration
// =============================================================================

/// Complete fleet configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetConfig {
    #[serde(default)]
    pub activation: ActivationSettings,

    #[serde(default)]
    pub devices: DeviceSettings,

    #[serde(default)]
    pub renderer: RendererSettings,

    #[serde(default)]
    pub transfer: TransferSettings,

    #[serde(default)]
    pub guest: GuestSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl FleetConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (fleet.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> FleetResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading fleet config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());

        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load fleet config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Validates the configuration.
    pub fn validate(&self) -> FleetResult<()> {
        if !(1..=u64::from(MAX_CODE_TTL_SECS)).contains(&self.activation.code_ttl_secs) {
            return Err(FleetError::Config(format!(
                "activation.code_ttl_secs must be between 1 and {}, got {}",
                MAX_CODE_TTL_SECS, self.activation.code_ttl_secs
            )));
        }

        if self.devices.default_refresh_interval_secs < MIN_REFRESH_INTERVAL_SECS {
            return Err(FleetError::Config(format!(
                "devices.default_refresh_interval_secs must be at least {}, got {}",
                MIN_REFRESH_INTERVAL_SECS, self.devices.default_refresh_interval_secs
            )));
        }

        if !(1..=u64::from(MAX_RENDER_TIMEOUT_SECS)).contains(&self.renderer.timeout_secs) {
            return Err(FleetError::Config(format!(
                "renderer.timeout_secs must be between 1 and {}, got {}",
                MAX_RENDER_TIMEOUT_SECS, self.renderer.timeout_secs
            )));
        }

        if self.renderer.program.trim().is_empty() {
            return Err(FleetError::Config("renderer.program must not be empty".into()));
        }

        if self.transfer.timeout_secs == 0 {
            return Err(FleetError::Config("transfer.timeout_secs must be greater than 0".into()));
        }

        let guest = &self.guest;
        if guest.max_per_ip_per_hour == 0
            || guest.max_per_device_per_hour == 0
            || guest.max_per_ip_device_per_hour == 0
        {
            return Err(FleetError::Config("guest limits must be greater than 0".into()));
        }

        if !(1..=u64::from(MAX_GUEST_WINDOW_SECS)).contains(&guest.window_secs) {
            return Err(FleetError::Config(format!(
                "guest.window_secs must be between 1 and {}, got {}",
                MAX_GUEST_WINDOW_SECS, guest.window_secs
            )));
        }

        if guest.max_message_len == 0 {
            return Err(FleetError::Config("guest.max_message_len must be greater than 0".into()));
        }

        if self.database.max_connections == 0 {
            return Err(FleetError::Config("database.max_connections must be greater than 0".into()));
        }

        Ok(())
    }

    /// Applies `DOORPLATE_*` overrides read through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(path) = lookup("DOORPLATE_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.database.path = PathBuf::from(path);
        }

        if let Some(program) = lookup("DOORPLATE_RENDERER_PROGRAM") {
            self.renderer.program = program;
        }

        if let Some(script) = lookup("DOORPLATE_RENDERER_SCRIPT") {
            self.renderer.script = script;
        }

        if let Some(secs) = lookup("DOORPLATE_RENDER_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.renderer.timeout_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid DOORPLATE_RENDER_TIMEOUT_SECS"),
            }
        }

        if let Some(secs) = lookup("DOORPLATE_CODE_TTL_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.activation.code_ttl_secs = s,
                Err(_) => warn!(value = %secs, "Ignoring invalid DOORPLATE_CODE_TTL_SECS"),
            }
        }

        if let Some(template_id) = lookup("DOORPLATE_DEFAULT_TEMPLATE_ID") {
            self.devices.default_template_id = template_id;
        }

        if let Some(max) = lookup("DOORPLATE_GUEST_MAX_PER_IP") {
            if let Ok(m) = max.parse::<u32>() {
                self.guest.max_per_ip_per_hour = m;
            }
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("org", "doorplate", "fleet")
            .map(|dirs| dirs.config_dir().join("fleet.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn code_ttl(&self) -> chrono::Duration {
        bounded_seconds(self.activation.code_ttl_secs, MAX_CODE_TTL_SECS)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.renderer.timeout_secs.min(u64::from(MAX_RENDER_TIMEOUT_SECS)))
    }
}
