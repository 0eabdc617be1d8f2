//! # doorplate-core: Pure Domain Logic for the Doorplate Fleet
//!
//! This crate holds the rules that decide how an e-paper doorplate joins the
//! fleet and what it is told when it polls. Everything here is pure: no
//! database, no subprocess, no clock reads except where a `now` is passed in.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Doorplate Fleet Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │           Transport (HTTP, auth) - outside this workspace       │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                doorplate-fleet (Services)                       │   │
//! │  │   whitelist, activation, registry, poller, transfer, guest     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ doorplate-core (THIS CRATE) ★                     │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐ ┌──────────┐ ┌──────────┐ ┌──────────┐          │   │
//! │  │   │  types   │ │  layout  │ │   code   │ │ throttle │          │   │
//! │  │   │  Device  │ │ Elements │ │  minting │ │  limits  │          │   │
//! │  │   └──────────┘ └──────────┘ └──────────┘ └──────────┘          │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                doorplate-db (Database Layer)                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain records (Device, ActivationCode, User, Template, ...)
//! - [`layout`] - Tagged layout element model consumed by the renderer
//! - [`code`] - Activation code alphabet and minting
//! - [`throttle`] - Guest message thresholds and verdicts
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use doorplate_core::code::{generate_activation_code, is_well_formed_code};
//!
//! let code = generate_activation_code(&mut rand::thread_rng());
//! assert!(is_well_formed_code(&code));
//! assert!(!code.contains('0') && !code.contains('O'));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod code;
pub mod error;
pub mod layout;
pub mod throttle;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use layout::LayoutElement;
pub use throttle::{GuestCounts, GuestLimits, ThrottleScope, ThrottleVerdict};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Smallest refresh interval a device may be configured with.
pub const MIN_REFRESH_INTERVAL_SECS: u32 = 300;

/// Refresh interval given to devices bound without one.
pub const DEFAULT_REFRESH_INTERVAL_SECS: u32 = 300;

/// Slack added on top of the refresh interval before a device counts as offline.
pub const OFFLINE_GRACE_SECS: i64 = 60;
