//! # doorplate-fleet: Device Protocol Services
//!
//! The services a doorplate and the management surface talk to, behind one
//! [`Fleet`] facade. Transport and authentication live elsewhere; every
//! operation here returns a structured result a transport can map directly.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                               Fleet                                     │
//! │                                                                         │
//! │  activate ──► ActivationIssuer ──► WhitelistGate                       │
//! │                      │                                                  │
//! │                      └── preview ──► Renderer (bounded)                │
//! │                                                                         │
//! │  bind / update / unbind / assign_template / list_for_user              │
//! │             ──► DeviceRegistry ──► TransferTracker (read, settle)      │
//! │                                                                         │
//! │  status     ──► SyncPoller ──► Renderer (bounded)                      │
//! │                      └──────► TransferTracker (mark, settle)           │
//! │                                                                         │
//! │  submit_guest_message ──► GuestMessageService ──► Notifier             │
//! │                                                                         │
//! │  Everything persistent goes through doorplate-db. The transfer         │
//! │  tracker is the only in-memory state and starts empty.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`whitelist`] - Hardware ids allowed to activate
//! - [`activation`] - Activation codes and heartbeats
//! - [`registry`] - Bind, edit, release and list devices
//! - [`poller`] - Device and front-end status polls
//! - [`transfer`] - In-flight download tracking
//! - [`guest`] - Guest messages and their throttle
//! - [`renderer`] / [`notifier`] - Outbound collaborators
//! - [`config`] - Configuration loading

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use doorplate_core::{DeviceView, GuestPageSettings};
use doorplate_db::{Database, DbConfig};

// =============================================================================
// Module Declarations
// =============================================================================

pub mod activation;
pub mod config;
pub mod error;
pub mod guest;
pub mod notifier;
pub mod poller;
pub mod registry;
pub mod renderer;
pub mod transfer;
pub mod whitelist;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use activation::{ActivationIssuer, ActivationOutcome};
pub use config::FleetConfig;
pub use error::{FleetError, FleetResult};
pub use guest::GuestMessageService;
pub use notifier::{Notifier, NotifyError};
pub use poller::{RequestOrigin, StatusReport, SyncPoller};
pub use registry::{BindReceipt, DeviceRegistry, DeviceUpdate};
pub use renderer::{ProcessRenderer, RenderError, RenderOutput, RenderRequest, RenderedContent, Renderer};
pub use transfer::TransferTracker;
pub use whitelist::WhitelistGate;

// =============================================================================
// Fleet Facade
// =============================================================================

/// All fleet services wired to one database and one transfer tracker.
pub struct Fleet {
    whitelist: WhitelistGate,
    activation: ActivationIssuer,
    registry: DeviceRegistry,
    poller: SyncPoller,
    guest: GuestMessageService,
    transfers: Arc<TransferTracker>,
}

impl Fleet {
    /// Opens the configured database and renders through [`ProcessRenderer`].
    pub async fn open(config: FleetConfig, notifier: Arc<dyn Notifier>) -> FleetResult<Self> {
        config.validate()?;

        let db = Database::new(
            DbConfig::new(config.database.path.clone()).max_connections(config.database.max_connections),
        )
        .await?;
        let renderer = Arc::new(ProcessRenderer::from_settings(&config.renderer));

        info!(
            db = %config.database.path.display(),
            renderer = %config.renderer.program,
            "Fleet services ready"
        );
        Ok(Self::new(db, config, renderer, notifier))
    }

    pub fn new(
        db: Database,
        config: FleetConfig,
        renderer: Arc<dyn Renderer>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let config = Arc::new(config);
        let transfers = Arc::new(TransferTracker::new(Duration::from_secs(
            config.transfer.timeout_secs,
        )));

        Fleet {
            whitelist: WhitelistGate::new(db.clone()),
            activation: ActivationIssuer::new(db.clone(), renderer.clone(), config.clone()),
            registry: DeviceRegistry::new(db.clone(), transfers.clone(), config.clone()),
            poller: SyncPoller::new(db.clone(), renderer, transfers.clone(), config.clone()),
            guest: GuestMessageService::new(db, notifier, config),
            transfers,
        }
    }

    pub fn whitelist(&self) -> &WhitelistGate {
        &self.whitelist
    }

    pub fn transfers(&self) -> &TransferTracker {
        &self.transfers
    }

    // =========================================================================
    // Device Protocol
    // =========================================================================

    pub async fn activate(&self, hardware_id: &str) -> FleetResult<ActivationOutcome> {
        self.activation.activate(hardware_id).await
    }

    pub async fn status(&self, device_id: &str, origin: RequestOrigin) -> FleetResult<StatusReport> {
        self.poller.status(device_id, origin).await
    }

    // =========================================================================
    // Management
    // =========================================================================

    pub async fn bind(&self, code: &str, device_name: Option<&str>, username: &str) -> FleetResult<BindReceipt> {
        self.registry.bind(code, device_name, username).await
    }

    pub async fn update(&self, device_id: &str, update: DeviceUpdate) -> FleetResult<()> {
        self.registry.update(device_id, update).await
    }

    pub async fn unbind(&self, device_id: &str) -> FleetResult<()> {
        self.registry.unbind(device_id).await
    }

    pub async fn assign_template(&self, device_id: &str, template_id: &str) -> FleetResult<()> {
        self.registry.assign_template(device_id, template_id).await
    }

    pub async fn list_for_user(&self, username: &str) -> FleetResult<Vec<DeviceView>> {
        self.registry.list_for_user(username).await
    }

    pub async fn device_owner(&self, device_id: &str) -> FleetResult<Option<String>> {
        self.registry.device_owner(device_id).await
    }

    /// Fails with `Unauthorized` unless `user_id` owns the device.
    pub async fn ensure_owner(&self, device_id: &str, user_id: &str) -> FleetResult<()> {
        self.registry.ensure_owner(device_id, user_id).await
    }

    // =========================================================================
    // Guest Page
    // =========================================================================

    pub async fn submit_guest_message(&self, token: &str, message: &str, source_ip: &str) -> FleetResult<()> {
        self.guest.submit(token, message, source_ip).await
    }

    pub async fn guest_page_settings(&self, token: &str) -> FleetResult<GuestPageSettings> {
        self.guest.page_settings(token).await
    }
}
