//! # Seed Data Generator
//!
//! Populates a development database with whitelisted hardware ids, a user,
//! the reserved activation-preview template and one content template.
//!
//! ## Usage
//! ```bash
//! # Whitelist 10 hardware ids (default)
//! cargo run -p doorplate-db --bin seed
//!
//! # Custom amount
//! cargo run -p doorplate-db --bin seed -- --count 50
//!
//! # Specify database path
//! cargo run -p doorplate-db --bin seed -- --db ./data/doorplate.db
//! ```
//!
//! Logging follows `RUST_LOG` (default `info`).

use chrono::Utc;
use std::env;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use doorplate_core::layout::parse_layout;
use doorplate_core::{Template, User};
use doorplate_db::migrations::migration_status;
use doorplate_db::{Database, DbConfig, DbError};

const PREVIEW_TEMPLATE_OWNER: &str = "superUser";
const PREVIEW_TEMPLATE_NAME: &str = "EP";

/// Screen shown while a unit waits to be bound.
const PREVIEW_LAYOUT: &str = r##"[
    {"type": "label", "id": "title", "name": "title", "x": 40, "y": 60,
     "width": 720, "height": 60, "text": "Activate this doorplate", "fontSize": 40},
    {"type": "label", "id": "code", "name": "activationCode", "x": 40, "y": 200,
     "width": 720, "height": 80, "text": "", "fontSize": 64, "letterSpacing": 4},
    {"type": "label", "id": "hint", "name": "hint", "x": 40, "y": 380,
     "width": 720, "height": 40, "text": "Enter the code in the management console", "fontSize": 24}
]"##;

/// Everyday office doorplate.
const OFFICE_LAYOUT: &str = r##"[
    {"type": "text", "id": "name", "name": "occupant", "x": 40, "y": 40,
     "width": 500, "height": 80, "text": "Dr. Alice Chen", "fontSize": 48},
    {"type": "dynamicText", "id": "status", "name": "status", "x": 40, "y": 160,
     "width": 500, "height": 50, "text": "In a meeting until 15:00", "fontSize": 28},
    {"type": "image", "id": "logo", "name": "logo", "x": 600, "y": 40,
     "width": 160, "height": 160, "imageUrl": "/images/logo.png"},
    {"type": "guestQRCode", "id": "qr", "name": "guest", "x": 600, "y": 290,
     "width": 160, "height": 160}
]"##;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = env::args().collect();

    let mut count: usize = 10;
    let mut db_path = String::from("./doorplate_dev.db");

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--count" | "-c" => {
                if i + 1 < args.len() {
                    count = args[i + 1].parse().unwrap_or(10);
                    i += 1;
                }
            }
            "--db" | "-d" => {
                if i + 1 < args.len() {
                    db_path = args[i + 1].clone();
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Doorplate Seed Data Generator");
                println!();
                println!("Usage: seed [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --count <N>    Hardware ids to whitelist (default: 10)");
                println!("  -d, --db <PATH>    Database file path (default: ./doorplate_dev.db)");
                println!("  -h, --help         Show this help message");
                return Ok(());
            }
            _ => {}
        }
        i += 1;
    }

    info!(db = %db_path, count, "Seeding database");

    let db = Database::new(DbConfig::new(&db_path)).await?;
    let (total, applied) = migration_status(db.pool()).await?;
    info!(total, applied, "Schema ready");

    // Hardware ids look like the factory labels: DP-000001, DP-000002, ...
    let mut whitelisted = 0;
    for n in 1..=count {
        let hardware_id = format!("DP-{:06}", n);
        match db.whitelist().insert(&hardware_id).await {
            Ok(_) => whitelisted += 1,
            Err(DbError::UniqueViolation { .. }) => {}
            Err(e) => warn!(hardware_id = %hardware_id, error = %e, "Failed to whitelist"),
        }
    }
    info!(whitelisted, "Whitelist seeded");

    let now = Utc::now();

    if db.users().get_by_username("alice").await?.is_none() {
        db.users()
            .insert(&User {
                id: Uuid::new_v4().to_string(),
                username: "alice".to_string(),
                accept_guest_messages: true,
                messaging_user_id: None,
                welcome_text: None,
                hint_text: None,
                submit_text: None,
                created_at: now,
            })
            .await?;
        info!(username = "alice", "User created");
    }

    if db
        .templates()
        .find_by_owner_and_name(PREVIEW_TEMPLATE_OWNER, PREVIEW_TEMPLATE_NAME)
        .await?
        .is_none()
    {
        let id = Uuid::new_v4().to_string();
        let elements = parse_layout(&id, PREVIEW_LAYOUT)?;
        db.templates()
            .insert(&Template {
                id: id.clone(),
                owner: PREVIEW_TEMPLATE_OWNER.to_string(),
                name: PREVIEW_TEMPLATE_NAME.to_string(),
                elements,
                updated_at: now,
            })
            .await?;
        info!(template_id = %id, "Activation preview template created");
    }

    if db.templates().find_by_owner_and_name("alice", "Office").await?.is_none() {
        let id = Uuid::new_v4().to_string();
        let elements = parse_layout(&id, OFFICE_LAYOUT)?;
        db.templates()
            .insert(&Template {
                id: id.clone(),
                owner: "alice".to_string(),
                name: "Office".to_string(),
                elements,
                updated_at: now,
            })
            .await?;
        info!(template_id = %id, "Office template created");
    }

    info!("Seed complete");
    Ok(())
}
