//! # Validation Module
//!
//! Input validation for everything that arrives from a device, an operator
//! or an anonymous guest.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Transport (outside this workspace)                           │
//! │  └── Shape of the request, authentication                              │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: doorplate-fleet services                                     │
//! │  └── THIS MODULE: field rules before any record is touched             │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  └── UNIQUE constraints (hardware id, code, guest token)               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use crate::error::ValidationError;
use crate::MIN_REFRESH_INTERVAL_SECS;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

const MAX_HARDWARE_ID_LEN: usize = 128;
const MAX_DEVICE_NAME_LEN: usize = 100;

// =============================================================================
// String Validators
// =============================================================================

/// Validates and normalizes a hardware identity.
///
/// ## Rules
/// - Surrounding whitespace is trimmed
/// - Must not be empty
/// - At most 128 characters, no control characters
///
/// ## Example
/// ```rust
/// use doorplate_core::validation::validate_hardware_id;
///
/// assert_eq!(validate_hardware_id("  ABC123 ").unwrap(), "ABC123");
/// assert!(validate_hardware_id("   ").is_err());
/// ```
pub fn validate_hardware_id(hardware_id: &str) -> ValidationResult<String> {
    let hardware_id = hardware_id.trim();

    if hardware_id.is_empty() {
        return Err(ValidationError::Required {
            field: "hardware_id".to_string(),
        });
    }

    if hardware_id.chars().count() > MAX_HARDWARE_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "hardware_id".to_string(),
            max: MAX_HARDWARE_ID_LEN,
        });
    }

    if hardware_id.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "hardware_id".to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    Ok(hardware_id.to_string())
}

/// Normalizes an optional device name.
///
/// Blank names mean "leave unchanged" and come back as `None`.
pub fn validate_device_name(name: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(name) = name.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if name.chars().count() > MAX_DEVICE_NAME_LEN {
        return Err(ValidationError::TooLong {
            field: "device_name".to_string(),
            max: MAX_DEVICE_NAME_LEN,
        });
    }

    Ok(Some(name.to_string()))
}

/// Validates a guest message body against the configured length.
///
/// Returns the trimmed message.
pub fn validate_guest_message(message: &str, max_len: usize) -> ValidationResult<String> {
    let message = message.trim();

    if message.is_empty() {
        return Err(ValidationError::Required {
            field: "message".to_string(),
        });
    }

    if message.chars().count() > max_len {
        return Err(ValidationError::TooLong {
            field: "message".to_string(),
            max: max_len,
        });
    }

    Ok(message.to_string())
}

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a device refresh interval in seconds.
///
/// ## Rules
/// - Must be at least 300 seconds
///
/// ## Example
/// ```rust
/// use doorplate_core::validation::validate_refresh_interval;
///
/// assert!(validate_refresh_interval(300).is_ok());
/// assert!(validate_refresh_interval(299).is_err());
/// ```
pub fn validate_refresh_interval(secs: i64) -> ValidationResult<u32> {
    if secs < i64::from(MIN_REFRESH_INTERVAL_SECS) {
        return Err(ValidationError::BelowMinimum {
            field: "refresh_interval".to_string(),
            min: i64::from(MIN_REFRESH_INTERVAL_SECS),
            value: secs,
        });
    }

    u32::try_from(secs).map_err(|_| ValidationError::InvalidFormat {
        field: "refresh_interval".to_string(),
        reason: format!("{} does not fit in 32 bits", secs),
    })
}
