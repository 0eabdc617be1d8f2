//! # Activation Code Issuer
//!
//! Answers a doorplate that asks to join the fleet.
//!
//! ## Activate Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  activate(hardware_id)                                                  │
//! │     │                                                                   │
//! │     ├── not whitelisted ──────────────────────► NotWhitelisted          │
//! │     │                                                                   │
//! │     ├── active device exists ──► touch ───────► Bound (heartbeat)       │
//! │     │                                                                   │
//! │     ├── newest unexpired code ────────────────► Pending (no preview)    │
//! │     │                                                                   │
//! │     └── none valid ──► delete stale codes                               │
//! │                        mint + insert                                    │
//! │                        render preview (best effort)                     │
//! │                        ──────────────────────► Pending (+ preview)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Codes always expire `activation.code_ttl_secs` after minting. A code row
//! without an expiry is treated as lapsed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use doorplate_core::code::generate_activation_code;
use doorplate_core::layout::fill_placeholder;
use doorplate_core::validation::validate_hardware_id;
use doorplate_core::{ActivationCode, Device};
use doorplate_db::{Database, DbError};

use crate::config::FleetConfig;
use crate::error::{FleetError, FleetResult};
use crate::renderer::{render_within, RenderError, RenderRequest, RenderedContent, Renderer};
use crate::whitelist::WhitelistGate;

/// How often a colliding code is re-minted before giving up.
const MAX_MINT_ATTEMPTS: usize = 5;

// =============================================================================
// Outcome
// =============================================================================

/// What a device is told when it asks to activate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ActivationOutcome {
    /// The unit is already bound; the call counted as a heartbeat.
    #[serde(rename_all = "camelCase")]
    Bound {
        device_id: String,
        needs_update: bool,
        refresh_interval: u32,
    },

    /// The unit should display `code` until an operator binds it.
    #[serde(rename_all = "camelCase")]
    Pending {
        code: String,
        expires_at: Option<DateTime<Utc>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        preview: Option<RenderedContent>,
    },
}

impl ActivationOutcome {
    pub fn is_already_bound(&self) -> bool {
        matches!(self, ActivationOutcome::Bound { .. })
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ActivationOutcome::Pending { code, .. } => Some(code),
            ActivationOutcome::Bound { .. } => None,
        }
    }
}

/// Why the code preview could not be produced. Logged, never returned.
#[derive(Debug, Error)]
enum PreviewError {
    #[error("preview template {owner}/{name} not found")]
    TemplateMissing { owner: String, name: String },

    #[error("preview template has no element named {0}")]
    PlaceholderMissing(String),

    #[error("renderer returned no device buffer")]
    NoDeviceBuffer,

    #[error(transparent)]
    Lookup(#[from] DbError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

// =============================================================================
// Issuer
// =============================================================================

pub struct ActivationIssuer {
    db: Database,
    whitelist: WhitelistGate,
    renderer: Arc<dyn Renderer>,
    config: Arc<FleetConfig>,
}

impl ActivationIssuer {
    pub fn new(db: Database, renderer: Arc<dyn Renderer>, config: Arc<FleetConfig>) -> Self {
        ActivationIssuer {
            whitelist: WhitelistGate::new(db.clone()),
            db,
            renderer,
            config,
        }
    }

    pub async fn activate(&self, hardware_id: &str) -> FleetResult<ActivationOutcome> {
        self.activate_at(hardware_id, Utc::now()).await
    }

    /// [`activate`](Self::activate) against an explicit clock.
    pub async fn activate_at(&self, hardware_id: &str, now: DateTime<Utc>) -> FleetResult<ActivationOutcome> {
        let hardware_id = validate_hardware_id(hardware_id)?;

        if !self.whitelist.is_allowed(&hardware_id).await? {
            warn!(hardware_id = %hardware_id, "Activation refused: not whitelisted");
            return Err(FleetError::NotWhitelisted(hardware_id));
        }

        let existing = self.db.devices().get_by_hardware_id(&hardware_id).await?;
        if let Some(device) = existing.as_ref().filter(|d| d.is_active()) {
            return Ok(self.heartbeat(device, now).await);
        }

        let codes = self.db.activation_codes().list_by_hardware_id(&hardware_id).await?;
        if let Some(valid) = codes.into_iter().find(|c| c.is_valid_at(now)) {
            debug!(hardware_id = %hardware_id, expires_at = ?valid.expires_at, "Reusing activation code");
            self.mark_reactivation(existing, &valid.code).await;
            return Ok(ActivationOutcome::Pending {
                code: valid.code,
                expires_at: valid.expires_at,
                preview: None,
            });
        }

        let removed = self
            .db
            .activation_codes()
            .delete_all_for_hardware_id(&hardware_id)
            .await?;
        if removed > 0 {
            debug!(hardware_id = %hardware_id, removed, "Deleted lapsed activation codes");
        }

        let issued = self.mint(&hardware_id, now).await?;
        info!(hardware_id = %hardware_id, expires_at = ?issued.expires_at, "Activation code issued");

        self.mark_reactivation(existing, &issued.code).await;
        let preview = self.render_preview(&issued.code).await;

        Ok(ActivationOutcome::Pending {
            code: issued.code,
            expires_at: issued.expires_at,
            preview,
        })
    }

    async fn heartbeat(&self, device: &Device, now: DateTime<Utc>) -> ActivationOutcome {
        if let Err(e) = self
            .db
            .devices()
            .touch(&device.device_id, now, Some(device.refresh_interval_secs))
            .await
        {
            warn!(device_id = %device.device_id, error = %e, "Failed to record activation heartbeat");
        }

        debug!(device_id = %device.device_id, "Activation call from bound device");
        ActivationOutcome::Bound {
            device_id: device.device_id.clone(),
            needs_update: device.effective_needs_update(),
            refresh_interval: device.refresh_interval_secs,
        }
    }

    async fn mint(&self, hardware_id: &str, now: DateTime<Utc>) -> FleetResult<ActivationCode> {
        let ttl = self.config.code_ttl();
        let mut attempt = 1;

        loop {
            let code = generate_activation_code(&mut rand::thread_rng());
            let issued = ActivationCode::issue(code, hardware_id.to_string(), now, ttl);

            match self.db.activation_codes().insert(&issued).await {
                Ok(()) => return Ok(issued),
                Err(e) if e.is_unique_violation() && attempt < MAX_MINT_ATTEMPTS => {
                    debug!(attempt, "Activation code collision, minting again");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Remembers the code on the record of a unit that was bound before.
    async fn mark_reactivation(&self, existing: Option<Device>, code: &str) {
        let Some(mut device) = existing else {
            return;
        };
        if device.activation_marker.as_deref() == Some(code) {
            return;
        }

        device.activation_marker = Some(code.to_string());
        if let Err(e) = self.db.devices().save(&device).await {
            warn!(device_id = %device.device_id, error = %e, "Failed to record re-activation marker");
        }
    }

    async fn render_preview(&self, code: &str) -> Option<RenderedContent> {
        match self.try_render_preview(code).await {
            Ok(content) => {
                debug!(bin_size = content.bin_size, "Activation preview rendered");
                Some(content)
            }
            Err(e) => {
                warn!(error = %e, "Activation preview unavailable");
                None
            }
        }
    }

    async fn try_render_preview(&self, code: &str) -> Result<RenderedContent, PreviewError> {
        let settings = &self.config.activation;
        let template = self
            .db
            .templates()
            .find_by_owner_and_name(&settings.preview_template_owner, &settings.preview_template_name)
            .await?
            .ok_or_else(|| PreviewError::TemplateMissing {
                owner: settings.preview_template_owner.clone(),
                name: settings.preview_template_name.clone(),
            })?;

        let mut elements = template.elements;
        if !fill_placeholder(&mut elements, &settings.preview_placeholder, code) {
            return Err(PreviewError::PlaceholderMissing(settings.preview_placeholder.clone()));
        }

        let request = RenderRequest {
            template_id: template.id,
            elements,
            width: self.config.renderer.width,
            height: self.config.renderer.height,
        };
        let output = render_within(self.renderer.as_ref(), &request, self.config.render_timeout()).await?;

        output
            .device_buffer
            .filter(|b| !b.is_empty())
            .map(RenderedContent::new)
            .ok_or(PreviewError::NoDeviceBuffer)
    }
}
