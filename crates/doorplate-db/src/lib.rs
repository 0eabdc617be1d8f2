//! # doorplate-db: Database Layer for the Doorplate Fleet
//!
//! SQLite persistence for whitelist entries, activation codes, devices,
//! users, templates and the guest message log.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Doorplate Fleet Data Flow                          │
//! │                                                                         │
//! │  doorplate-fleet service (e.g. SyncPoller::status)                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  doorplate-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌────────────────┐   ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories  │   │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │                │   │  (embedded)  │  │   │
//! │  │   │               │    │ Whitelist      │   │              │  │   │
//! │  │   │ SqlitePool    │◄───│ ActivationCode │   │ 001_initial  │  │   │
//! │  │   │ WAL, FKs      │    │ Device, User   │   │  _schema.sql │  │   │
//! │  │   │               │    │ Template       │   │              │  │   │
//! │  │   │               │    │ GuestMessage   │   │              │  │   │
//! │  │   └───────────────┘    └────────────────┘   └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (DatabaseSettings::path)                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - One repository per entity
//!
//! ## Usage
//!
//! ```rust,ignore
//! use doorplate_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("doorplate.db")).await?;
//! db.whitelist().insert("ABC123").await?;
//! let allowed = db.whitelist().exists("ABC123").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::activation_code::ActivationCodeRepository;
pub use repository::device::DeviceRepository;
pub use repository::guest_message::GuestMessageRepository;
pub use repository::template::TemplateRepository;
pub use repository::user::UserRepository;
pub use repository::whitelist::WhitelistRepository;
