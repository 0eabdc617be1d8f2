//! # Repository Module
//!
//! One repository per persisted entity.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  doorplate-fleet service                                                │
//! │       │                                                                 │
//! │       │  db.devices().get_by_device_id("…")                            │
//! │       ▼                                                                 │
//! │  DeviceRepository                                                      │
//! │  ├── get_by_device_id / get_by_hardware_id / get_by_guest_token        │
//! │  ├── list_active_for_user                                              │
//! │  ├── insert / save (full row, last writer wins)                        │
//! │  └── touch / clear_needs_update / set_guest_token (narrow writes)      │
//! │       │                                                                 │
//! │       │  SQL Query                                                      │
//! │       ▼                                                                 │
//! │  SQLite Database                                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`whitelist::WhitelistRepository`] - Hardware ids allowed to activate
//! - [`activation_code::ActivationCodeRepository`] - Issued one-time codes
//! - [`device::DeviceRepository`] - Device records and bookkeeping
//! - [`user::UserRepository`] - Account lookups
//! - [`template::TemplateRepository`] - Layouts with JSON element columns
//! - [`guest_message::GuestMessageRepository`] - Guest log and window counts

pub mod activation_code;
pub mod device;
pub mod guest_message;
pub mod template;
pub mod user;
pub mod whitelist;
