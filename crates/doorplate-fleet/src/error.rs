//! # Fleet Error Types
//!
//! What callers of the fleet services see.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Fleet Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Activation    │  │     Lookup      │  │      Guest page         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  NotWhitelisted │  │  DeviceNotFound │  │  InvalidGuestToken      │ │
//! │  │  InvalidCode    │  │  UserNotFound   │  │  DeviceInactive         │ │
//! │  │  CodeExpired    │  │  TemplateNot…   │  │  GuestMessagesDisabled  │ │
//! │  │                 │  │  NotFound       │  │  RateLimited            │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │   Caller input  │  │ Infrastructure  │  Render failures never show  │
//! │  │                 │  │                 │  up here: the poller turns   │
//! │  │  InvalidArgument│  │  Database       │  them into the `message` of  │
//! │  │  AlreadyExists  │  │  Config         │  the status report.          │
//! │  │  Unauthorized   │  │  DeliveryFailed │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use doorplate_core::{CoreError, ThrottleScope, ValidationError};
use doorplate_db::DbError;

/// Result type alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

#[derive(Debug, Error)]
pub enum FleetError {
    // =========================================================================
    // Activation
    // =========================================================================
    /// The hardware id is not on the whitelist.
    #[error("Hardware id not whitelisted: {0}")]
    NotWhitelisted(String),

    /// No such activation code (never issued, or already redeemed).
    #[error("Invalid activation code")]
    InvalidCode,

    #[error("Activation code expired")]
    CodeExpired,

    // =========================================================================
    // Lookups
    // =========================================================================
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Whitelist entry not found.
    #[error("Not found: {0}")]
    NotFound(String),

    // =========================================================================
    // Caller Input
    // =========================================================================
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// The caller does not own the device.
    #[error("User {user_id} does not own device {device_id}")]
    Unauthorized { device_id: String, user_id: String },

    // =========================================================================
    // Guest Messages
    // =========================================================================
    #[error("Invalid guest token")]
    InvalidGuestToken,

    #[error("Device {0} is not activated")]
    DeviceInactive(String),

    /// The owner does not accept guest messages or has no linked recipient.
    #[error("Guest messages are disabled for this device")]
    GuestMessagesDisabled,

    #[error("Too many guest messages from this {scope}; try again later")]
    RateLimited { scope: ThrottleScope },

    // =========================================================================
    // Infrastructure
    // =========================================================================
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Message delivery failed: {0}")]
    DeliveryFailed(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for FleetError {
    fn from(err: ValidationError) -> Self {
        FleetError::InvalidArgument(err.to_string())
    }
}

impl From<CoreError> for FleetError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => v.into(),
            other => FleetError::InvalidArgument(other.to_string()),
        }
    }
}

impl From<std::io::Error> for FleetError {
    fn from(err: std::io::Error) -> Self {
        FleetError::Config(err.to_string())
    }
}

impl From<toml::de::Error> for FleetError {
    fn from(err: toml::de::Error) -> Self {
        FleetError::Config(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl FleetError {
    /// Returns true if the caller can fix this by changing the request.
    ///
    /// Transports map these to 4xx and everything else to 5xx.
    pub fn is_client_error(&self) -> bool {
        !matches!(
            self,
            FleetError::Database(_) | FleetError::Config(_) | FleetError::DeliveryFailed(_)
        )
    }
}
