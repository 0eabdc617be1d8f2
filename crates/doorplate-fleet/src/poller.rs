//! # Synchronization Poller
//!
//! Answers "what should I show?" for devices and for the management UI.
//!
//! ## Status Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  status(device_id, origin)                                              │
//! │     │                                                                   │
//! │     ├── unknown ──────────────────────► success=false                   │
//! │     ├── not active ───────────────────► return_to_activation            │
//! │     │                                                                   │
//! │     ├── origin == Device:  touch, settle transfer (3s dwell)            │
//! │     ├── origin == FrontEnd: settle transfer (5s dwell), nothing else    │
//! │     │                                                                   │
//! │     ├── no template ──────────────────► flags only                      │
//! │     │                                                                   │
//! │     └── render (bounded) ─┬── bytes ──► binData/binSize                 │
//! │                           │             Device + update due:            │
//! │                           │               clear needs_update,           │
//! │                           │               mark transferring             │
//! │                           └── failure ► message, success stays true     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Bookkeeping writes that fail are logged and do not fail the poll.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use doorplate_core::layout::inject_guest_token;
use doorplate_core::Device;
use doorplate_db::{Database, DbError};

use crate::config::FleetConfig;
use crate::error::FleetResult;
use crate::registry::new_guest_token;
use crate::renderer::{render_within, RenderError, RenderRequest, RenderedContent, Renderer};
use crate::transfer::TransferTracker;

/// Who is asking. Only device polls may change persisted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOrigin {
    Device,
    FrontEnd,
}

// =============================================================================
// Status Report
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub success: bool,
    pub is_activated: bool,
    pub needs_update: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_interval: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(flatten)]
    pub content: Option<RenderedContent>,
}

impl StatusReport {
    pub const RETURN_TO_ACTIVATION: &'static str = "return_to_activation";

    fn not_found(device_id: &str) -> Self {
        StatusReport {
            success: false,
            is_activated: false,
            needs_update: false,
            refresh_interval: None,
            action: None,
            message: Some(format!("device not found: {}", device_id)),
            content: None,
        }
    }

    fn return_to_activation() -> Self {
        StatusReport {
            success: true,
            is_activated: false,
            needs_update: false,
            refresh_interval: None,
            action: Some(Self::RETURN_TO_ACTIVATION.to_string()),
            message: None,
            content: None,
        }
    }

    fn flags(device: &Device, needs_update: bool) -> Self {
        StatusReport {
            success: true,
            is_activated: true,
            needs_update,
            refresh_interval: Some(device.refresh_interval_secs),
            action: None,
            message: None,
            content: None,
        }
    }
}

// =============================================================================
// Poller
// =============================================================================

pub struct SyncPoller {
    db: Database,
    renderer: Arc<dyn Renderer>,
    transfers: Arc<TransferTracker>,
    config: Arc<FleetConfig>,
}

impl SyncPoller {
    pub fn new(
        db: Database,
        renderer: Arc<dyn Renderer>,
        transfers: Arc<TransferTracker>,
        config: Arc<FleetConfig>,
    ) -> Self {
        SyncPoller {
            db,
            renderer,
            transfers,
            config,
        }
    }

    pub async fn status(&self, device_id: &str, origin: RequestOrigin) -> FleetResult<StatusReport> {
        let Some(device) = self.db.devices().get_by_device_id(device_id).await? else {
            debug!(device_id = %device_id, "Status for unknown device");
            return Ok(StatusReport::not_found(device_id));
        };

        if !device.is_active() {
            debug!(device_id = %device_id, "Status for released device");
            return Ok(StatusReport::return_to_activation());
        }

        let needs_update = device.effective_needs_update();
        let from_device = origin == RequestOrigin::Device;

        if from_device {
            let now = Utc::now();
            if let Err(e) = self
                .db
                .devices()
                .touch(device_id, now, Some(device.refresh_interval_secs))
                .await
            {
                warn!(device_id = %device_id, error = %e, "Failed to record poll");
            }
        }
        if !needs_update {
            let dwell = if from_device {
                self.config.transfer.device_dwell_secs
            } else {
                self.config.transfer.listing_dwell_secs
            };
            self.transfers
                .clear_if_settled(device_id, Duration::from_secs(dwell))
                .await;
        }

        let mut report = StatusReport::flags(&device, needs_update);
        let Some(template_id) = device.current_template_id.as_deref() else {
            return Ok(report);
        };

        let guest_token = match device.guest_token.clone() {
            Some(token) => Some(token),
            None if from_device => self.assign_guest_token(device_id).await,
            None => None,
        };

        let template = match self.db.templates().get_by_id(template_id).await {
            Ok(Some(template)) => template,
            Ok(None) => {
                warn!(device_id = %device_id, template_id = %template_id, "Assigned template is missing");
                report.message = Some(format!("template not found: {}", template_id));
                return Ok(report);
            }
            Err(e @ DbError::InvalidData { .. }) => {
                warn!(device_id = %device_id, template_id = %template_id, error = %e, "Assigned template is unreadable");
                report.message = Some(e.to_string());
                return Ok(report);
            }
            Err(e) => return Err(e.into()),
        };

        let mut elements = template.elements;
        if let Some(token) = &guest_token {
            inject_guest_token(&mut elements, token);
        }
        let request = RenderRequest {
            template_id: template.id,
            elements,
            width: self.config.renderer.width,
            height: self.config.renderer.height,
        };

        match render_within(self.renderer.as_ref(), &request, self.config.render_timeout()).await {
            Ok(output) => match output.deliverable() {
                Some(bytes) => {
                    report.content = Some(RenderedContent::new(bytes.to_vec()));
                    if from_device && needs_update {
                        self.hand_out(device_id).await;
                    }
                    debug!(device_id = %device_id, bin_size = bytes.len(), ?origin, "Content rendered");
                }
                None => {
                    warn!(device_id = %device_id, template_id = %request.template_id, "Renderer produced no device buffer");
                    report.message = Some("bin data not generated".to_string());
                }
            },
            Err(e @ RenderError::TimedOut(_)) => {
                warn!(device_id = %device_id, template_id = %request.template_id, "Render timed out");
                report.message = Some(e.to_string());
            }
            Err(e) => {
                warn!(device_id = %device_id, template_id = %request.template_id, error = %e, "Render failed");
                report.message = Some(format!("failed to process bin file: {}", e));
            }
        }

        Ok(report)
    }

    /// The device is about to download fresh content.
    async fn hand_out(&self, device_id: &str) {
        if let Err(e) = self.db.devices().clear_needs_update(device_id, Utc::now()).await {
            warn!(device_id = %device_id, error = %e, "Failed to clear update flag");
        }
        self.transfers.mark_transferring(device_id).await;
        info!(device_id = %device_id, "Update handed out");
    }

    async fn assign_guest_token(&self, device_id: &str) -> Option<String> {
        match self.db.devices().set_guest_token(device_id, &new_guest_token()).await {
            Ok(token) => {
                info!(device_id = %device_id, "Guest token assigned");
                Some(token)
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Failed to assign guest token");
                None
            }
        }
    }
}
