//! # Renderer Collaborator
//!
//! Turns a template's element list into screen content. The fleet only cares
//! whether bytes came back and how many.
//!
//! ## Process Renderer Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RenderRequest ──serde_json──► <tmp>/input.json                         │
//! │                                     │                                   │
//! │  <program> [script] --input <tmp>/input.json --output <tmp>/output.bmp  │
//! │                     --width <w> --height <h>                            │
//! │                                     │                                   │
//! │                                     ▼                                   │
//! │  <tmp>/output.bmp  ──► RenderOutput.bitmap                              │
//! │  <tmp>/output.bin  ──► RenderOutput.device_buffer (when written)        │
//! │                                                                         │
//! │  The child is killed if the render future is dropped, so wrapping the  │
//! │  call in tokio::time::timeout enforces the wall-clock budget.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Serialize, Serializer};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

use doorplate_core::LayoutElement;

use crate::config::RendererSettings;

// =============================================================================
// Contract
// =============================================================================

/// Everything the renderer needs for one image.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub template_id: String,
    pub elements: Vec<LayoutElement>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderOutput {
    /// Raw bitmap as written by the renderer.
    pub bitmap: Vec<u8>,
    /// Device-native buffer, when the renderer produces one.
    pub device_buffer: Option<Vec<u8>>,
}

impl RenderOutput {
    /// The buffer a device can consume directly, if it is non-empty.
    pub fn deliverable(&self) -> Option<&[u8]> {
        self.device_buffer.as_deref().filter(|b| !b.is_empty())
    }
}

/// Device-ready bytes as they travel in a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedContent {
    #[serde(serialize_with = "serialize_base64")]
    pub bin_data: Vec<u8>,
    pub bin_size: usize,
}

impl RenderedContent {
    pub fn new(bytes: Vec<u8>) -> Self {
        RenderedContent {
            bin_size: bytes.len(),
            bin_data: bytes,
        }
    }
}

fn serialize_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("renderer i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not encode render input: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("renderer produced no bitmap")]
    EmptyOutput,

    #[error("renderer timed out after {}s", .0.as_secs())]
    TimedOut(Duration),
}

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError>;
}

/// Runs one render under a wall-clock budget.
///
/// On expiry the render future is dropped, which kills a process renderer's child.
pub async fn render_within(
    renderer: &dyn Renderer,
    request: &RenderRequest,
    budget: Duration,
) -> Result<RenderOutput, RenderError> {
    match tokio::time::timeout(budget, renderer.render(request)).await {
        Ok(result) => result,
        Err(_) => Err(RenderError::TimedOut(budget)),
    }
}

// =============================================================================
// Process Renderer
// =============================================================================

/// Runs an external program per render.
#[derive(Debug, Clone)]
pub struct ProcessRenderer {
    program: String,
    script: Option<String>,
}

impl ProcessRenderer {
    pub fn new(program: impl Into<String>, script: Option<String>) -> Self {
        ProcessRenderer {
            program: program.into(),
            script: script.filter(|s| !s.trim().is_empty()),
        }
    }

    pub fn from_settings(settings: &RendererSettings) -> Self {
        Self::new(settings.program.clone(), Some(settings.script.clone()))
    }

    async fn run(&self, dir: &Path, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        let input = dir.join("input.json");
        let output = dir.join("output.bmp");
        let device_output = output.with_extension("bin");

        tokio::fs::write(&input, serde_json::to_vec(request)?).await?;

        let mut command = Command::new(&self.program);
        if let Some(script) = &self.script {
            command.arg(script);
        }
        command
            .arg("--input")
            .arg(&input)
            .arg("--output")
            .arg(&output)
            .arg("--width")
            .arg(request.width.to_string())
            .arg("--height")
            .arg(request.height.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let result = command.output().await?;
        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr).trim().to_string();
            warn!(
                template_id = %request.template_id,
                status = %result.status,
                "Renderer process failed"
            );
            return Err(RenderError::Failed {
                status: result.status.to_string(),
                stderr,
            });
        }

        let bitmap = tokio::fs::read(&output).await?;
        if bitmap.is_empty() {
            return Err(RenderError::EmptyOutput);
        }

        let device_buffer = match tokio::fs::read(&device_output).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        debug!(
            template_id = %request.template_id,
            bitmap_bytes = bitmap.len(),
            device_bytes = device_buffer.as_ref().map_or(0, Vec::len),
            "Render complete"
        );

        Ok(RenderOutput {
            bitmap,
            device_buffer,
        })
    }
}

#[async_trait]
impl Renderer for ProcessRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        // Dropped (and deleted) when this future completes or is cancelled
        let dir = tempfile::tempdir()?;
        self.run(dir.path(), request).await
    }
}
