//! # Layout Elements
//!
//! Typed model of the elements a template places on the e-paper canvas.
//!
//! ## Element Types
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       LayoutElement variants                            │
//! │                                                                         │
//! │  "label" / "text" / "dynamicText"  → TextElement                       │
//! │       text, fontSize, color, letterSpacing, textDirection              │
//! │                                                                         │
//! │  "image" / "dynamicImage"          → ImageElement                      │
//! │       imageUrl, imageId, content, thresholds, contrast                 │
//! │                                                                         │
//! │  "qrCode" / "barcode"              → CodeElement                       │
//! │       content                                                          │
//! │                                                                         │
//! │  "guestQRCode"                     → GuestQrElement                    │
//! │       guestQRCodeToken (injected per device at render time)            │
//! │                                                                         │
//! │  Every variant carries ElementBase: id, name, x, y, width, height,     │
//! │  zIndex.                                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The JSON shape is the one the external renderer consumes, so the same
//! structs are used for storage and for the render request.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Shared Fields
// =============================================================================

/// Identity and geometry shared by every element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementBase {
    pub id: String,
    /// Logical name; the activation preview looks elements up by it.
    #[serde(default, alias = "Name")]
    pub name: String,
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    #[serde(default = "default_z_index")]
    pub z_index: i32,
}

fn default_z_index() -> i32 {
    1
}

// =============================================================================
// Per-Type Payloads
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default)]
    pub text: String,
    #[serde(default = "default_font_size")]
    pub font_size: u32,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default)]
    pub letter_spacing: i32,
    #[serde(default = "default_text_direction")]
    pub text_direction: String,
}

fn default_font_size() -> u32 {
    16
}

fn default_color() -> String {
    "#000000".to_string()
}

fn default_text_direction() -> String {
    "horizontal".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default = "default_threshold")]
    pub black_threshold: u8,
    #[serde(default = "default_threshold")]
    pub white_threshold: u8,
    #[serde(default = "default_contrast")]
    pub contrast: f64,
}

fn default_threshold() -> u8 {
    128
}

fn default_contrast() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default)]
    pub content: String,
}

/// QR code pointing at the guest message page of the rendering device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestQrElement {
    #[serde(flatten)]
    pub base: ElementBase,
    #[serde(default, rename = "guestQRCodeToken", skip_serializing_if = "Option::is_none")]
    pub guest_token: Option<String>,
}

// =============================================================================
// Layout Element
// =============================================================================

/// One element of a template layout, tagged by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum LayoutElement {
    #[serde(rename = "label")]
    Label(TextElement),
    #[serde(rename = "text")]
    Text(TextElement),
    #[serde(rename = "dynamicText")]
    DynamicText(TextElement),
    #[serde(rename = "image")]
    Image(ImageElement),
    #[serde(rename = "dynamicImage")]
    DynamicImage(ImageElement),
    #[serde(rename = "qrCode")]
    QrCode(CodeElement),
    #[serde(rename = "barcode")]
    Barcode(CodeElement),
    #[serde(rename = "guestQRCode")]
    GuestQrCode(GuestQrElement),
}

impl LayoutElement {
    /// Returns the shared identity and geometry.
    pub fn base(&self) -> &ElementBase {
        match self {
            LayoutElement::Label(e) | LayoutElement::Text(e) | LayoutElement::DynamicText(e) => {
                &e.base
            }
            LayoutElement::Image(e) | LayoutElement::DynamicImage(e) => &e.base,
            LayoutElement::QrCode(e) | LayoutElement::Barcode(e) => &e.base,
            LayoutElement::GuestQrCode(e) => &e.base,
        }
    }

    /// Returns the element's logical name.
    pub fn name(&self) -> &str {
        &self.base().name
    }

    /// Returns the text payload for text-family elements.
    pub fn text(&self) -> Option<&str> {
        match self {
            LayoutElement::Label(e) | LayoutElement::Text(e) | LayoutElement::DynamicText(e) => {
                Some(&e.text)
            }
            _ => None,
        }
    }

    /// Returns true for elements that need the device's guest token.
    pub fn is_guest_interactive(&self) -> bool {
        matches!(self, LayoutElement::GuestQrCode(_))
    }
}

// =============================================================================
// Layout Operations
// =============================================================================

/// Decodes a stored JSON layout into typed elements.
pub fn parse_layout(template_id: &str, json: &str) -> CoreResult<Vec<LayoutElement>> {
    serde_json::from_str(json).map_err(|e| CoreError::InvalidLayout {
        template_id: template_id.to_string(),
        reason: e.to_string(),
    })
}

/// Writes `token` into every guest-interactive element.
///
/// Returns the number of elements that received the token.
pub fn inject_guest_token(elements: &mut [LayoutElement], token: &str) -> usize {
    let mut injected = 0;
    for element in elements.iter_mut() {
        if let LayoutElement::GuestQrCode(guest) = element {
            guest.guest_token = Some(token.to_string());
            injected += 1;
        }
    }
    injected
}

/// Replaces the text of the first text-family element named `placeholder`.
///
/// Returns false when no such element exists.
pub fn fill_placeholder(elements: &mut [LayoutElement], placeholder: &str, value: &str) -> bool {
    for element in elements.iter_mut() {
        match element {
            LayoutElement::Label(e) | LayoutElement::Text(e) | LayoutElement::DynamicText(e)
                if e.base.name == placeholder =>
            {
                e.text = value.to_string();
                return true;
            }
            _ => {}
        }
    }
    false
}
