//! # Guest Message Throttle
//!
//! Visitors scan the QR code on a doorplate and leave a message for its
//! owner. Submissions are throttled over a trailing window.
//!
//! ## Submission Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  token ──► device (active) ──► owner (accepts, linked) ──► message ok   │
//! │                                                               │         │
//! │                                                               ▼         │
//! │  counts in (now - window, now]:  by ip │ by device │ by ip_device       │
//! │                                                               │         │
//! │                                           any at its limit ──► reject   │
//! │                                                               │         │
//! │                                        Notifier::deliver ◄────┘         │
//! │                                                │                        │
//! │                                     success ───┴──► append log entry    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Only delivered messages are logged, so failed deliveries do not count
//! against the visitor.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use doorplate_core::throttle::window_start;
use doorplate_core::validation::validate_guest_message;
use doorplate_core::{Device, GuestCounts, GuestMessageLogEntry, GuestPageSettings, ThrottleVerdict, User};
use doorplate_db::Database;

use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::notifier::Notifier;

pub struct GuestMessageService {
    db: Database,
    notifier: Arc<dyn Notifier>,
    config: Arc<FleetConfig>,
}

impl GuestMessageService {
    pub fn new(db: Database, notifier: Arc<dyn Notifier>, config: Arc<FleetConfig>) -> Self {
        GuestMessageService { db, notifier, config }
    }

    /// Texts for the guest page of the device behind `token`.
    pub async fn page_settings(&self, token: &str) -> FleetResult<GuestPageSettings> {
        let (_, owner) = self.resolve(token).await?;
        Ok(GuestPageSettings::for_user(&owner))
    }

    pub async fn submit(&self, token: &str, message: &str, source_ip: &str) -> FleetResult<()> {
        self.submit_at(token, message, source_ip, Utc::now()).await
    }

    pub async fn submit_at(
        &self,
        token: &str,
        message: &str,
        source_ip: &str,
        now: DateTime<Utc>,
    ) -> FleetResult<()> {
        let source_ip = source_ip.trim();
        if source_ip.is_empty() {
            return Err(FleetError::InvalidArgument("source ip is required".into()));
        }

        let (device, owner) = self.resolve(token).await?;
        let recipient = owner
            .guest_message_recipient()
            .ok_or(FleetError::GuestMessagesDisabled)?;
        let message = validate_guest_message(message, self.config.guest.max_message_len)?;

        if let ThrottleVerdict::Rejected { scope, count, limit } =
            self.check_at(source_ip, &device.device_id, now).await?
        {
            warn!(
                device_id = %device.device_id,
                source_ip = %source_ip,
                %scope,
                count,
                limit,
                "Guest message throttled"
            );
            return Err(FleetError::RateLimited { scope });
        }

        let label = if device.device_name.is_empty() {
            &device.device_id
        } else {
            &device.device_name
        };
        let text = format!("New guest message (device: {})\n\n{}", label, message);
        self.notifier
            .deliver(recipient, &text)
            .await
            .map_err(|e| FleetError::DeliveryFailed(e.to_string()))?;

        let entry = GuestMessageLogEntry {
            id: Uuid::new_v4().to_string(),
            composite_key: GuestMessageLogEntry::composite_key(source_ip, &device.device_id),
            device_id: device.device_id.clone(),
            user_id: owner.id.clone(),
            token: token.to_string(),
            source_ip: source_ip.to_string(),
            message,
            created_at: now,
        };
        if let Err(e) = self.db.guest_messages().append(&entry).await {
            // Delivered already; the visitor just gets one extra message this window
            warn!(device_id = %device.device_id, error = %e, "Failed to log guest message");
        }

        info!(device_id = %device.device_id, source_ip = %source_ip, "Guest message delivered");
        Ok(())
    }

    /// Evaluates the three limits for a submission at `now`.
    pub async fn check_at(
        &self,
        source_ip: &str,
        device_id: &str,
        now: DateTime<Utc>,
    ) -> FleetResult<ThrottleVerdict> {
        let since = window_start(now, self.config.guest.window());
        let logs = self.db.guest_messages();
        let composite = GuestMessageLogEntry::composite_key(source_ip, device_id);

        let counts = GuestCounts {
            by_ip: logs.count_by_ip_since(source_ip, since).await?,
            by_device: logs.count_by_device_since(device_id, since).await?,
            by_ip_device: logs.count_by_composite_since(&composite, since).await?,
        };
        debug!(device_id = %device_id, source_ip = %source_ip, ?counts, "Guest message counts");

        Ok(self.config.guest.limits().evaluate(&counts))
    }

    async fn resolve(&self, token: &str) -> FleetResult<(Device, User)> {
        let token = token.trim();
        if token.is_empty() {
            return Err(FleetError::InvalidGuestToken);
        }

        let device = self
            .db
            .devices()
            .get_by_guest_token(token)
            .await?
            .ok_or(FleetError::InvalidGuestToken)?;
        if !device.is_active() {
            return Err(FleetError::DeviceInactive(device.device_id));
        }

        let user_id = device
            .user_id
            .clone()
            .ok_or_else(|| FleetError::UserNotFound(format!("owner of {}", device.device_id)))?;
        let owner = self
            .db
            .users()
            .get_by_id(&user_id)
            .await?
            .ok_or_else(|| FleetError::UserNotFound(user_id.clone()))?;

        Ok((device, owner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, RecordingNotifier};
    use chrono::Duration;
    use doorplate_core::ThrottleScope;

    struct Fixture {
        db: Database,
        notifier: Arc<RecordingNotifier>,
        service: GuestMessageService,
    }

    async fn fixture_with(notifier: RecordingNotifier, recipient: Option<&str>) -> Fixture {
        let db = testing::db().await;
        testing::seed_user(&db, "u-alice", "alice", recipient).await;

        let mut device = Device::new("dev-1".to_string(), "ABC123".to_string(), Utc::now());
        device.is_activated = true;
        device.device_name = "Desk 1".to_string();
        device.user_id = Some("u-alice".to_string());
        device.guest_token = Some("tok-1".to_string());
        db.devices().insert(&device).await.unwrap();

        let notifier = Arc::new(notifier);
        let service = GuestMessageService::new(db.clone(), notifier.clone(), Arc::new(testing::config()));
        Fixture { db, notifier, service }
    }

    async fn fixture() -> Fixture {
        fixture_with(RecordingNotifier::default(), Some("U-line-1")).await
    }

    #[tokio::test]
    async fn test_delivers_and_logs() {
        let f = fixture().await;
        let now = Utc::now();

        f.service.submit_at("tok-1", "  Back at 3  ", "10.0.0.7", now).await.unwrap();

        let sent = f.notifier.sent().await;
        assert_eq!(
            sent,
            vec![(
                "U-line-1".to_string(),
                "New guest message (device: Desk 1)\n\nBack at 3".to_string()
            )]
        );
        let logged = f
            .db
            .guest_messages()
            .count_by_composite_since("10.0.0.7_dev-1", now - Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(logged, 1);
    }

    #[tokio::test]
    async fn test_ip_limit_and_window_rollover() {
        let f = fixture().await;
        let t0 = Utc::now() - Duration::hours(2);

        for minutes in [0, 10, 20] {
            f.service
                .submit_at("tok-1", "hello", "10.0.0.7", t0 + Duration::minutes(minutes))
                .await
                .unwrap();
        }

        let fourth = f
            .service
            .submit_at("tok-1", "hello", "10.0.0.7", t0 + Duration::minutes(30))
            .await;
        assert!(matches!(
            fourth,
            Err(FleetError::RateLimited {
                scope: ThrottleScope::Ip
            })
        ));

        // Another visitor is unaffected
        f.service
            .submit_at("tok-1", "hello", "10.0.0.8", t0 + Duration::minutes(30))
            .await
            .unwrap();

        // The first message has left the window
        f.service
            .submit_at("tok-1", "hello", "10.0.0.7", t0 + Duration::minutes(61))
            .await
            .unwrap();
        assert_eq!(f.notifier.sent().await.len(), 5);
    }

    #[tokio::test]
    async fn test_device_limit() {
        let f = fixture().await;
        let now = Utc::now();

        for i in 0..5 {
            let ip = format!("10.0.1.{}", i);
            f.service.submit_at("tok-1", "hi", &ip, now).await.unwrap();
        }

        let verdict = f.service.check_at("10.0.1.99", "dev-1", now).await.unwrap();
        assert_eq!(
            verdict,
            ThrottleVerdict::Rejected {
                scope: ThrottleScope::Device,
                count: 5,
                limit: 5
            }
        );
    }

    #[tokio::test]
    async fn test_failed_delivery_is_not_counted() {
        let f = fixture_with(RecordingNotifier::failing(), Some("U-line-1")).await;
        let now = Utc::now();

        let result = f.service.submit_at("tok-1", "hello", "10.0.0.7", now).await;
        assert!(matches!(result, Err(FleetError::DeliveryFailed(_))));

        let counts = f
            .db
            .guest_messages()
            .count_by_ip_since("10.0.0.7", now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(counts, 0);
    }

    #[tokio::test]
    async fn test_rejections() {
        let f = fixture().await;

        assert!(matches!(
            f.service.submit("nope", "hi", "10.0.0.7").await,
            Err(FleetError::InvalidGuestToken)
        ));
        assert!(matches!(
            f.service.submit("tok-1", "   ", "10.0.0.7").await,
            Err(FleetError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.service.submit("tok-1", &"x".repeat(501), "10.0.0.7").await,
            Err(FleetError::InvalidArgument(_))
        ));

        let mut device = f.db.devices().get_by_device_id("dev-1").await.unwrap().unwrap();
        device.is_unbound = true;
        f.db.devices().save(&device).await.unwrap();
        assert!(matches!(
            f.service.submit("tok-1", "hi", "10.0.0.7").await,
            Err(FleetError::DeviceInactive(_))
        ));
        assert!(f.notifier.sent().await.is_empty());
    }

    #[tokio::test]
    async fn test_owner_without_recipient() {
        let f = fixture_with(RecordingNotifier::default(), None).await;

        assert!(matches!(
            f.service.submit("tok-1", "hi", "10.0.0.7").await,
            Err(FleetError::GuestMessagesDisabled)
        ));
    }

    #[tokio::test]
    async fn test_page_settings() {
        let f = fixture().await;

        let settings = f.service.page_settings("tok-1").await.unwrap();
        assert_eq!(settings.submit_text, GuestPageSettings::DEFAULT_SUBMIT);
        assert!(matches!(
            f.service.page_settings("nope").await,
            Err(FleetError::InvalidGuestToken)
        ));
    }
}
