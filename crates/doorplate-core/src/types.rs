//! # Domain Types
//!
//! Records shared by every layer of the doorplate fleet.
//!
//! ## Type Map
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ WhitelistEntry  │   │ ActivationCode  │   │     Device      │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  hardware_id    │──►│  code (unique)  │──►│  device_id      │       │
//! │  │  created_at     │   │  hardware_id    │   │  hardware_id    │       │
//! │  └─────────────────┘   │  expires_at     │   │  flags, token   │       │
//! │                        └─────────────────┘   └────────┬────────┘       │
//! │                                                       │                 │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌────────▼────────┐       │
//! │  │      User       │   │    Template     │   │ GuestMessageLog │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id, username   │   │  id, owner      │   │  source_ip      │       │
//! │  │  guest settings │   │  elements       │   │  composite_key  │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  DeviceView: Device as the management front-end sees it                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Update Suppression
//! `force_no_update` wins over `needs_update`. The stored bit may stay set
//! while suppression is on, but [`Device::effective_needs_update`] never
//! reports it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::layout::LayoutElement;
use crate::{DEFAULT_REFRESH_INTERVAL_SECS, OFFLINE_GRACE_SECS};

// =============================================================================
// Whitelist Entry
// =============================================================================

/// A hardware identity that is permitted to activate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct WhitelistEntry {
    pub hardware_id: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Activation Code
// =============================================================================

/// A one-time credential exchanged for a device binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct ActivationCode {
    pub code: String,
    pub hardware_id: String,
    pub created_at: DateTime<Utc>,
    /// Rows without an expiry are treated as lapsed.
    pub expires_at: Option<DateTime<Utc>>,
}

impl ActivationCode {
    /// Creates a code that lapses `ttl` after `now`.
    ///
    /// A `ttl` that overflows the calendar leaves the code without an expiry,
    /// so it is born lapsed.
    pub fn issue(code: String, hardware_id: String, now: DateTime<Utc>, ttl: Duration) -> Self {
        ActivationCode {
            code,
            hardware_id,
            created_at: now,
            expires_at: now.checked_add_signed(ttl),
        }
    }

    /// Returns true while the code can still be redeemed.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at > now)
    }
}

// =============================================================================
// Device
// =============================================================================

/// Server-side record of one physical doorplate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Device {
    /// Server-assigned, stable across unbind and re-bind.
    pub device_id: String,
    pub hardware_id: String,
    pub user_id: Option<String>,
    pub device_name: String,
    pub is_activated: bool,
    pub is_unbound: bool,
    pub refresh_interval_secs: u32,
    /// Interval the device itself reported on its last heartbeat.
    pub last_refresh_interval_secs: Option<u32>,
    pub current_template_id: Option<String>,
    pub needs_update: bool,
    pub force_no_update: bool,
    pub guest_token: Option<String>,
    /// Code issued while a previously bound unit is re-activating.
    pub activation_marker: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Creates a fresh, not-yet-activated record for `hardware_id`.
    pub fn new(device_id: String, hardware_id: String, now: DateTime<Utc>) -> Self {
        Device {
            device_id,
            hardware_id,
            user_id: None,
            device_name: String::new(),
            is_activated: false,
            is_unbound: false,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            last_refresh_interval_secs: None,
            current_template_id: None,
            needs_update: false,
            force_no_update: false,
            guest_token: None,
            activation_marker: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The update signal devices and operators get to see.
    #[inline]
    pub fn effective_needs_update(&self) -> bool {
        self.needs_update && !self.force_no_update
    }

    /// Bound to an account and not released.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.is_activated && !self.is_unbound
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    /// Requests a resync unless updates are suppressed.
    pub fn request_update(&mut self) {
        self.needs_update = !self.force_no_update;
    }

    /// Point in time after which the device counts as offline.
    pub fn offline_after(&self) -> DateTime<Utc> {
        let interval = self
            .last_refresh_interval_secs
            .filter(|secs| *secs > 0)
            .or(Some(self.refresh_interval_secs).filter(|secs| *secs > 0))
            .unwrap_or(DEFAULT_REFRESH_INTERVAL_SECS);

        self.updated_at + Duration::seconds(i64::from(interval) + OFFLINE_GRACE_SECS)
    }

    pub fn is_offline(&self, now: DateTime<Utc>) -> bool {
        now > self.offline_after()
    }
}

// =============================================================================
// User
// =============================================================================

/// Account that owns devices. Managed outside this workspace; read-only here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    pub id: String,
    pub username: String,
    pub accept_guest_messages: bool,
    /// Recipient id on the external messaging service, once linked.
    pub messaging_user_id: Option<String>,
    pub welcome_text: Option<String>,
    pub hint_text: Option<String>,
    pub submit_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Where guest messages for this user are delivered, if they accept them.
    pub fn guest_message_recipient(&self) -> Option<&str> {
        if !self.accept_guest_messages {
            return None;
        }
        self.messaging_user_id
            .as_deref()
            .filter(|recipient| !recipient.trim().is_empty())
    }
}

// =============================================================================
// Template
// =============================================================================

/// A named layout owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: String,
    /// Username of the owner.
    pub owner: String,
    pub name: String,
    pub elements: Vec<LayoutElement>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Guest Message Log
// =============================================================================

/// One delivered guest message. Append-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct GuestMessageLogEntry {
    pub id: String,
    pub device_id: String,
    pub user_id: String,
    pub token: String,
    pub source_ip: String,
    pub message: String,
    pub composite_key: String,
    pub created_at: DateTime<Utc>,
}

impl GuestMessageLogEntry {
    /// Key used by the per-(ip, device) limit.
    pub fn composite_key(source_ip: &str, device_id: &str) -> String {
        format!("{}_{}", source_ip, device_id)
    }
}

/// Texts shown on the public guest message page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GuestPageSettings {
    pub welcome_text: String,
    pub hint_text: String,
    pub submit_text: String,
}

impl GuestPageSettings {
    pub const DEFAULT_WELCOME: &'static str = "Leave us a message";
    pub const DEFAULT_HINT: &'static str = "Please enter your message";
    pub const DEFAULT_SUBMIT: &'static str = "Send message";

    /// Owner's texts, falling back to the defaults for unset ones.
    pub fn for_user(user: &User) -> Self {
        GuestPageSettings {
            welcome_text: user
                .welcome_text
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_WELCOME.to_string()),
            hint_text: user
                .hint_text
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_HINT.to_string()),
            submit_text: user
                .submit_text
                .clone()
                .unwrap_or_else(|| Self::DEFAULT_SUBMIT.to_string()),
        }
    }
}

// =============================================================================
// Device View
// =============================================================================

/// A device as listed for its owner, annotated with live transfer status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DeviceView {
    pub device_id: String,
    pub hardware_id: String,
    /// Owner id; the auth layer compares it against the caller.
    pub user_id: Option<String>,
    pub device_name: String,
    pub is_activated: bool,
    pub refresh_interval: u32,
    pub current_template_id: Option<String>,
    /// Already clamped by `force_no_update`.
    pub needs_update: bool,
    pub force_no_update: bool,
    pub guest_token: Option<String>,
    pub is_transferring: bool,
    pub is_offline: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl DeviceView {
    pub fn from_device(device: &Device, is_transferring: bool, now: DateTime<Utc>) -> Self {
        DeviceView {
            device_id: device.device_id.clone(),
            hardware_id: device.hardware_id.clone(),
            user_id: device.user_id.clone(),
            device_name: device.device_name.clone(),
            is_activated: device.is_active(),
            refresh_interval: device.refresh_interval_secs,
            current_template_id: device.current_template_id.clone(),
            needs_update: device.effective_needs_update(),
            force_no_update: device.force_no_update,
            guest_token: device.guest_token.clone(),
            is_transferring,
            is_offline: device.is_offline(now),
            created_at: device.created_at,
            updated_at: device.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn device() -> Device {
        Device::new("dev-1".to_string(), "ABC123".to_string(), at(0))
    }

    #[test]
    fn test_force_no_update_masks_stored_bit() {
        let mut d = device();
        d.needs_update = true;
        assert!(d.effective_needs_update());

        d.force_no_update = true;
        assert!(d.needs_update);
        assert!(!d.effective_needs_update());
    }

    #[test]
    fn test_request_update_respects_suppression() {
        let mut d = device();
        d.request_update();
        assert!(d.needs_update);

        d.force_no_update = true;
        d.request_update();
        assert!(!d.needs_update);
    }

    #[test]
    fn test_unbound_device_is_not_active() {
        let mut d = device();
        d.is_activated = true;
        assert!(d.is_active());

        d.is_unbound = true;
        assert!(!d.is_active());
        assert!(!DeviceView::from_device(&d, false, at(0)).is_activated);
    }

    #[test]
    fn test_offline_uses_last_reported_interval_first() {
        let mut d = device();
        d.refresh_interval_secs = 600;

        // 600 + 60 seconds of grace
        assert!(!d.is_offline(at(660)));
        assert!(d.is_offline(at(661)));

        d.last_refresh_interval_secs = Some(300);
        assert!(!d.is_offline(at(360)));
        assert!(d.is_offline(at(361)));
    }

    #[test]
    fn test_activation_code_expiry() {
        let code = ActivationCode::issue(
            "Ab3dEf7hJk9m".to_string(),
            "ABC123".to_string(),
            at(0),
            Duration::seconds(300),
        );
        assert!(code.is_valid_at(at(299)));
        assert!(!code.is_valid_at(at(300)));

        let no_expiry = ActivationCode {
            expires_at: None,
            ..code
        };
        assert!(!no_expiry.is_valid_at(at(0)));
    }

    #[test]
    fn test_overflowing_ttl_yields_lapsed_code() {
        // A million years runs past the end of the chrono calendar
        let code = ActivationCode::issue(
            "Ab3dEf7hJk9m".to_string(),
            "ABC123".to_string(),
            at(0),
            Duration::days(365_000_000),
        );
        assert_eq!(code.expires_at, None);
        assert!(!code.is_valid_at(at(0)));
    }

    #[test]
    fn test_guest_recipient_requires_consent_and_link() {
        let mut user = User {
            id: "u1".to_string(),
            username: "alice".to_string(),
            accept_guest_messages: true,
            messaging_user_id: Some("U-line-1".to_string()),
            welcome_text: None,
            hint_text: Some("Knock first".to_string()),
            submit_text: None,
            created_at: at(0),
        };
        assert_eq!(user.guest_message_recipient(), Some("U-line-1"));

        let settings = GuestPageSettings::for_user(&user);
        assert_eq!(settings.welcome_text, GuestPageSettings::DEFAULT_WELCOME);
        assert_eq!(settings.hint_text, "Knock first");

        user.accept_guest_messages = false;
        assert_eq!(user.guest_message_recipient(), None);

        user.accept_guest_messages = true;
        user.messaging_user_id = Some("  ".to_string());
        assert_eq!(user.guest_message_recipient(), None);
    }

    #[test]
    fn test_composite_key() {
        assert_eq!(
            GuestMessageLogEntry::composite_key("10.0.0.7", "dev-1"),
            "10.0.0.7_dev-1"
        );
    }

    #[test]
    fn test_device_view_serializes_camel_case() {
        let mut d = device();
        d.needs_update = true;
        d.force_no_update = true;
        let json = serde_json::to_value(DeviceView::from_device(&d, true, at(0))).unwrap();
        assert_eq!(json["deviceId"], "dev-1");
        assert_eq!(json["needsUpdate"], false);
        assert_eq!(json["isTransferring"], true);
    }
}
