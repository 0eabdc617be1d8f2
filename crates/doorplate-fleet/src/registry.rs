//! # Device Registry
//!
//! Binding, administrative edits and listing of devices.
//!
//! ## Device Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   (no record) ──bind──► Activated ──unbind──► Unbound                   │
//! │                           ▲  │                   │                      │
//! │                           │  │ update /          │ activate + bind      │
//! │                           │  │ assign_template   │ (same device_id)     │
//! │                           │  ▼                   │                      │
//! │                        needs_update ◄────────────┘                      │
//! │                                                                         │
//! │   Every administrative edit requests a resync unless force_no_update.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use doorplate_core::code::is_well_formed_code;
use doorplate_core::validation::{validate_device_name, validate_refresh_interval};
use doorplate_core::{Device, DeviceView};
use doorplate_db::Database;

use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::transfer::TransferTracker;

/// Stable public token for the guest message page.
pub(crate) fn new_guest_token() -> String {
    Uuid::new_v4().simple().to_string()
}

// =============================================================================
// Requests and Receipts
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BindReceipt {
    pub device_id: String,
    pub refresh_interval: u32,
    pub current_template_id: Option<String>,
}

/// Administrative edit. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceUpdate {
    pub device_name: Option<String>,
    /// Seconds; must be at least 300.
    pub refresh_interval: Option<i64>,
    pub force_no_update: Option<bool>,
}

// =============================================================================
// Registry
// =============================================================================

pub struct DeviceRegistry {
    db: Database,
    transfers: Arc<TransferTracker>,
    config: Arc<FleetConfig>,
}

impl DeviceRegistry {
    pub fn new(db: Database, transfers: Arc<TransferTracker>, config: Arc<FleetConfig>) -> Self {
        DeviceRegistry { db, transfers, config }
    }

    // =========================================================================
    // Bind
    // =========================================================================

    /// Redeems an activation code and binds its unit to `username`.
    pub async fn bind(&self, code: &str, device_name: Option<&str>, username: &str) -> FleetResult<BindReceipt> {
        self.bind_at(code, device_name, username, Utc::now()).await
    }

    pub async fn bind_at(
        &self,
        code: &str,
        device_name: Option<&str>,
        username: &str,
        now: DateTime<Utc>,
    ) -> FleetResult<BindReceipt> {
        let code = code.trim();
        let device_name = validate_device_name(device_name)?;
        if !is_well_formed_code(code) {
            return Err(FleetError::InvalidCode);
        }

        let issued = self
            .db
            .activation_codes()
            .find_by_code(code)
            .await?
            .ok_or(FleetError::InvalidCode)?;
        if !issued.is_valid_at(now) {
            return Err(FleetError::CodeExpired);
        }

        // A concurrent bind may have redeemed this code or a sibling since the lookup
        if self.db.activation_codes().redeem(code, &issued.hardware_id).await? == 0 {
            return Err(FleetError::InvalidCode);
        }

        let user_id = match username.trim() {
            "" => None,
            name => self.db.users().get_by_username(name).await?.map(|u| u.id),
        };
        if user_id.is_none() {
            debug!(username = %username, "Binding without a resolved owner");
        }

        let device = match self.db.devices().get_by_hardware_id(&issued.hardware_id).await? {
            Some(mut device) => {
                device.is_activated = true;
                device.is_unbound = false;
                device.activation_marker = None;
                device.force_no_update = false;
                device.user_id = user_id;
                device.updated_at = now;
                if let Some(name) = device_name {
                    device.device_name = name;
                }
                if device.guest_token.is_none() {
                    device.guest_token = Some(new_guest_token());
                }

                self.db.devices().save(&device).await?;
                info!(device_id = %device.device_id, hardware_id = %device.hardware_id, "Device re-bound");
                device
            }
            None => {
                let mut device = Device::new(Uuid::new_v4().to_string(), issued.hardware_id.clone(), now);
                device.device_name = device_name.unwrap_or_else(|| issued.hardware_id.clone());
                device.user_id = user_id;
                device.is_activated = true;
                device.refresh_interval_secs = self.config.devices.default_refresh_interval_secs;
                device.guest_token = Some(new_guest_token());
                if let Some(template_id) = self.config.devices.default_template() {
                    device.current_template_id = Some(template_id.to_string());
                    device.needs_update = true;
                }

                match self.db.devices().insert(&device).await {
                    Ok(()) => {}
                    // Another bind created the record after our lookup
                    Err(e) if e.is_unique_violation() => return Err(FleetError::InvalidCode),
                    Err(e) => return Err(e.into()),
                }
                info!(device_id = %device.device_id, hardware_id = %device.hardware_id, "Device bound");
                device
            }
        };

        Ok(BindReceipt {
            device_id: device.device_id,
            refresh_interval: device.refresh_interval_secs,
            current_template_id: device.current_template_id,
        })
    }

    // =========================================================================
    // Administrative Edits
    // =========================================================================

    pub async fn update(&self, device_id: &str, update: DeviceUpdate) -> FleetResult<()> {
        let mut device = self.load(device_id).await?;

        let refresh_interval = update.refresh_interval.map(validate_refresh_interval).transpose()?;
        let device_name = validate_device_name(update.device_name.as_deref())?;

        if let Some(name) = device_name {
            device.device_name = name;
        }
        if let Some(secs) = refresh_interval {
            device.refresh_interval_secs = secs;
        }
        if let Some(force) = update.force_no_update {
            device.force_no_update = force;
            if force {
                device.needs_update = false;
            }
        }
        device.request_update();

        self.db.devices().save(&device).await?;
        info!(
            device_id = %device_id,
            refresh_interval = device.refresh_interval_secs,
            force_no_update = device.force_no_update,
            needs_update = device.needs_update,
            "Device updated"
        );
        Ok(())
    }

    /// Releases the device. Its template assignment is kept.
    pub async fn unbind(&self, device_id: &str) -> FleetResult<()> {
        let mut device = self.load(device_id).await?;

        device.is_activated = false;
        device.is_unbound = true;
        device.needs_update = false;
        device.updated_at = Utc::now();

        self.db.devices().save(&device).await?;
        self.transfers.remove(device_id).await;

        info!(device_id = %device_id, "Device unbound");
        Ok(())
    }

    pub async fn assign_template(&self, device_id: &str, template_id: &str) -> FleetResult<()> {
        let mut device = self.load(device_id).await?;

        if self.db.templates().get_by_id(template_id).await?.is_none() {
            return Err(FleetError::TemplateNotFound(template_id.to_string()));
        }

        device.current_template_id = Some(template_id.to_string());
        device.request_update();

        self.db.devices().save(&device).await?;
        info!(
            device_id = %device_id,
            template_id = %template_id,
            needs_update = device.needs_update,
            "Template assigned"
        );
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Devices of `username` that have not been released.
    pub async fn list_for_user(&self, username: &str) -> FleetResult<Vec<DeviceView>> {
        let user = self
            .db
            .users()
            .get_by_username(username)
            .await?
            .ok_or_else(|| FleetError::UserNotFound(username.to_string()))?;

        let devices = self.db.devices().list_active_for_user(&user.id).await?;
        let dwell = Duration::from_secs(self.config.transfer.listing_dwell_secs);
        let now = Utc::now();

        let mut views = Vec::with_capacity(devices.len());
        for device in &devices {
            if !device.effective_needs_update() {
                self.transfers.clear_if_settled(&device.device_id, dwell).await;
            }
            let transferring = self.transfers.is_transferring(&device.device_id).await;
            views.push(DeviceView::from_device(device, transferring, now));
        }

        debug!(username = %username, count = views.len(), "Listed devices");
        Ok(views)
    }

    /// Owner of the device, for the caller's access check.
    pub async fn device_owner(&self, device_id: &str) -> FleetResult<Option<String>> {
        Ok(self.load(device_id).await?.user_id)
    }

    pub async fn ensure_owner(&self, device_id: &str, user_id: &str) -> FleetResult<()> {
        let device = self.load(device_id).await?;
        if device.is_owned_by(user_id) {
            Ok(())
        } else {
            Err(FleetError::Unauthorized {
                device_id: device_id.to_string(),
                user_id: user_id.to_string(),
            })
        }
    }

    async fn load(&self, device_id: &str) -> FleetResult<Device> {
        self.db
            .devices()
            .get_by_device_id(device_id)
            .await?
            .ok_or_else(|| FleetError::DeviceNotFound(device_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use chrono::Duration as ChronoDuration;
    use doorplate_core::ActivationCode;

    struct Fixture {
        db: Database,
        transfers: Arc<TransferTracker>,
        registry: DeviceRegistry,
    }

    async fn fixture_with(config: FleetConfig) -> Fixture {
        let db = testing::db().await;
        testing::seed_user(&db, "u-alice", "alice", None).await;
        let transfers = Arc::new(TransferTracker::default());
        let registry = DeviceRegistry::new(db.clone(), transfers.clone(), Arc::new(config));
        Fixture { db, transfers, registry }
    }

    async fn fixture() -> Fixture {
        fixture_with(testing::config()).await
    }

    async fn issue(db: &Database, code: &str, hardware_id: &str) {
        let code = ActivationCode::issue(
            code.to_string(),
            hardware_id.to_string(),
            Utc::now(),
            ChronoDuration::seconds(300),
        );
        db.activation_codes().insert(&code).await.unwrap();
    }

    async fn bound(f: &Fixture, hardware_id: &str) -> String {
        issue(&f.db, "Ab3dEf7hJk9m", hardware_id).await;
        f.registry
            .bind("Ab3dEf7hJk9m", Some("Desk 1"), "alice")
            .await
            .unwrap()
            .device_id
    }

    async fn stored(f: &Fixture, device_id: &str) -> Device {
        f.db.devices().get_by_device_id(device_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_bind_creates_device() {
        let f = fixture().await;
        issue(&f.db, "Ab3dEf7hJk9m", "ABC123").await;
        issue(&f.db, "Zz9yXw8vUt7s", "ABC123").await;

        let receipt = f
            .registry
            .bind(" Ab3dEf7hJk9m ", Some("Desk 1"), "alice")
            .await
            .unwrap();
        assert_eq!(receipt.refresh_interval, 300);
        assert_eq!(receipt.current_template_id, None);

        let device = stored(&f, &receipt.device_id).await;
        assert!(device.is_active());
        assert_eq!(device.device_name, "Desk 1");
        assert_eq!(device.user_id.as_deref(), Some("u-alice"));
        assert!(device.guest_token.is_some());
        assert!(!device.needs_update);
        assert!(f
            .db
            .activation_codes()
            .list_by_hardware_id("ABC123")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_code_is_single_use() {
        let f = fixture().await;
        bound(&f, "ABC123").await;

        let again = f.registry.bind("Ab3dEf7hJk9m", Some("Desk 1"), "alice").await;
        assert!(matches!(again, Err(FleetError::InvalidCode)));
    }

    #[tokio::test]
    async fn test_malformed_code_is_invalid() {
        let f = fixture().await;
        // Stored, but could never have been minted
        issue(&f.db, "ABCDEFGHJKLM", "ABC123").await;

        for code in ["", "Ab3", "ABCDEFGHJKLM", "Ab3dEf7hJk0m"] {
            let result = f.registry.bind(code, None, "alice").await;
            assert!(matches!(result, Err(FleetError::InvalidCode)), "code {:?}", code);
        }
        assert!(f.db.devices().get_by_hardware_id("ABC123").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_bind_of_one_code_has_one_winner() {
        let f = fixture().await;
        issue(&f.db, "Ab3dEf7hJk9m", "ABC123").await;

        let (a, b) = tokio::join!(
            f.registry.bind("Ab3dEf7hJk9m", Some("Desk 1"), "alice"),
            f.registry.bind("Ab3dEf7hJk9m", Some("Desk 2"), "alice"),
        );

        let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
        let device_id = winner.unwrap().device_id;
        assert!(matches!(loser, Err(FleetError::InvalidCode)), "got {:?}", loser);
        assert_eq!(stored(&f, &device_id).await.hardware_id, "ABC123");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_bind_of_sibling_codes_has_one_winner() {
        let f = fixture().await;
        issue(&f.db, "Ab3dEf7hJk9m", "ABC123").await;
        issue(&f.db, "Zz9yXw8vUt7s", "ABC123").await;

        let (a, b) = tokio::join!(
            f.registry.bind("Ab3dEf7hJk9m", Some("Desk 1"), "alice"),
            f.registry.bind("Zz9yXw8vUt7s", Some("Desk 2"), "alice"),
        );

        let (winner, loser) = if a.is_ok() { (a, b) } else { (b, a) };
        let device_id = winner.unwrap().device_id;
        assert!(matches!(loser, Err(FleetError::InvalidCode)), "got {:?}", loser);

        let device = f.db.devices().get_by_hardware_id("ABC123").await.unwrap().unwrap();
        assert_eq!(device.device_id, device_id);
        assert!(f
            .db
            .activation_codes()
            .list_by_hardware_id("ABC123")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_expired_code() {
        let f = fixture().await;
        issue(&f.db, "Ab3dEf7hJk9m", "ABC123").await;

        let later = Utc::now() + ChronoDuration::seconds(301);
        let result = f.registry.bind_at("Ab3dEf7hJk9m", None, "alice", later).await;
        assert!(matches!(result, Err(FleetError::CodeExpired)));
    }

    #[tokio::test]
    async fn test_unknown_user_binds_without_owner() {
        let f = fixture().await;
        issue(&f.db, "Ab3dEf7hJk9m", "ABC123").await;

        let receipt = f.registry.bind("Ab3dEf7hJk9m", None, "nobody").await.unwrap();
        let device = stored(&f, &receipt.device_id).await;
        assert_eq!(device.user_id, None);
        assert_eq!(device.device_name, "ABC123");
    }

    #[tokio::test]
    async fn test_default_template_requests_first_render() {
        let mut config = testing::config();
        config.devices.default_template_id = "T-default".to_string();
        let f = fixture_with(config).await;

        let device_id = bound(&f, "ABC123").await;
        let device = stored(&f, &device_id).await;
        assert_eq!(device.current_template_id.as_deref(), Some("T-default"));
        assert!(device.needs_update);
    }

    #[tokio::test]
    async fn test_rebind_reuses_device_id() {
        let f = fixture().await;
        testing::seed_template(&f.db, "T1", "alice", "Office", testing::office_layout()).await;
        let device_id = bound(&f, "ABC123").await;
        let token = stored(&f, &device_id).await.guest_token;

        f.registry.assign_template(&device_id, "T1").await.unwrap();
        f.registry
            .update(
                &device_id,
                DeviceUpdate {
                    force_no_update: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        f.registry.unbind(&device_id).await.unwrap();

        let mut device = stored(&f, &device_id).await;
        device.activation_marker = Some("Qq2wEr4tYu6i".to_string());
        f.db.devices().save(&device).await.unwrap();

        issue(&f.db, "Qq2wEr4tYu6i", "ABC123").await;
        let receipt = f.registry.bind("Qq2wEr4tYu6i", None, "alice").await.unwrap();
        assert_eq!(receipt.device_id, device_id);
        assert_eq!(receipt.current_template_id.as_deref(), Some("T1"));

        let device = stored(&f, &device_id).await;
        assert!(device.is_active());
        assert!(!device.force_no_update);
        assert_eq!(device.activation_marker, None);
        assert_eq!(device.device_name, "Desk 1");
        assert_eq!(device.guest_token, token);
    }

    #[tokio::test]
    async fn test_update_rejects_short_interval() {
        let f = fixture().await;
        let device_id = bound(&f, "ABC123").await;

        let result = f
            .registry
            .update(
                &device_id,
                DeviceUpdate {
                    device_name: Some("Renamed".to_string()),
                    refresh_interval: Some(299),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(FleetError::InvalidArgument(_))));

        let device = stored(&f, &device_id).await;
        assert_eq!(device.refresh_interval_secs, 300);
        assert_eq!(device.device_name, "Desk 1");
    }

    #[tokio::test]
    async fn test_update_requests_resync_unless_suppressed() {
        let f = fixture().await;
        let device_id = bound(&f, "ABC123").await;
        let before = stored(&f, &device_id).await;

        f.registry
            .update(
                &device_id,
                DeviceUpdate {
                    refresh_interval: Some(900),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let device = stored(&f, &device_id).await;
        assert_eq!(device.refresh_interval_secs, 900);
        assert!(device.needs_update);
        assert_eq!(device.updated_at, before.updated_at);

        f.registry
            .update(
                &device_id,
                DeviceUpdate {
                    force_no_update: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let device = stored(&f, &device_id).await;
        assert!(device.force_no_update);
        assert!(!device.needs_update);
    }

    #[tokio::test]
    async fn test_unknown_device() {
        let f = fixture().await;

        assert!(matches!(
            f.registry.update("nope", DeviceUpdate::default()).await,
            Err(FleetError::DeviceNotFound(_))
        ));
        assert!(matches!(f.registry.unbind("nope").await, Err(FleetError::DeviceNotFound(_))));
        assert!(matches!(
            f.registry.assign_template("nope", "T1").await,
            Err(FleetError::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_assign_template() {
        let f = fixture().await;
        testing::seed_template(&f.db, "T1", "alice", "Office", testing::office_layout()).await;
        let device_id = bound(&f, "ABC123").await;

        assert!(matches!(
            f.registry.assign_template(&device_id, "T9").await,
            Err(FleetError::TemplateNotFound(_))
        ));

        f.registry.assign_template(&device_id, "T1").await.unwrap();
        let device = stored(&f, &device_id).await;
        assert_eq!(device.current_template_id.as_deref(), Some("T1"));
        assert!(device.needs_update);
    }

    #[tokio::test]
    async fn test_unbind() {
        let f = fixture().await;
        testing::seed_template(&f.db, "T1", "alice", "Office", testing::office_layout()).await;
        let device_id = bound(&f, "ABC123").await;
        f.registry.assign_template(&device_id, "T1").await.unwrap();
        f.transfers.mark_transferring(&device_id).await;

        f.registry.unbind(&device_id).await.unwrap();

        let device = stored(&f, &device_id).await;
        assert!(!device.is_activated);
        assert!(device.is_unbound);
        assert!(!device.needs_update);
        assert_eq!(device.current_template_id.as_deref(), Some("T1"));
        assert!(!f.transfers.is_transferring(&device_id).await);
    }

    #[tokio::test]
    async fn test_list_for_user() {
        let f = fixture().await;
        assert!(matches!(
            f.registry.list_for_user("nobody").await,
            Err(FleetError::UserNotFound(_))
        ));

        let kept = bound(&f, "ABC123").await;
        issue(&f.db, "Zz9yXw8vUt7s", "DEF456").await;
        let released = f
            .registry
            .bind("Zz9yXw8vUt7s", None, "alice")
            .await
            .unwrap()
            .device_id;
        f.registry.unbind(&released).await.unwrap();
        f.transfers.mark_transferring(&kept).await;

        let views = f.registry.list_for_user("alice").await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].device_id, kept);
        // Too fresh for the listing to settle it
        assert!(views[0].is_transferring);
        assert!(!views[0].is_offline);
    }

    #[tokio::test]
    async fn test_ownership() {
        let f = fixture().await;
        let device_id = bound(&f, "ABC123").await;

        assert_eq!(
            f.registry.device_owner(&device_id).await.unwrap().as_deref(),
            Some("u-alice")
        );
        f.registry.ensure_owner(&device_id, "u-alice").await.unwrap();
        assert!(matches!(
            f.registry.ensure_owner(&device_id, "u-mallory").await,
            Err(FleetError::Unauthorized { .. })
        ));
    }
}
