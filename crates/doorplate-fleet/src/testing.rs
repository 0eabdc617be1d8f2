//! Fakes and fixtures shared by the service tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use doorplate_core::layout::parse_layout;
use doorplate_core::{LayoutElement, Template, User};
use doorplate_db::{Database, DbConfig};

use crate::config::FleetConfig;
use crate::notifier::{Notifier, NotifyError};
use crate::renderer::{RenderError, RenderOutput, RenderRequest, Renderer};

// =============================================================================
// Renderer Fake
// =============================================================================

#[derive(Debug, Clone)]
pub enum FakeBehavior {
    Output(RenderOutput),
    Fail,
    Hang,
}

/// Renderer that records requests and answers from a script.
#[derive(Debug)]
pub struct FakeRenderer {
    behavior: Mutex<FakeBehavior>,
    requests: Mutex<Vec<RenderRequest>>,
    calls: AtomicUsize,
}

impl FakeRenderer {
    pub fn new(behavior: FakeBehavior) -> Self {
        FakeRenderer {
            behavior: Mutex::new(behavior),
            requests: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Answers every render with a bitmap and a device buffer.
    pub fn succeeding() -> Self {
        Self::new(FakeBehavior::Output(RenderOutput {
            bitmap: b"BM-fake".to_vec(),
            device_buffer: Some(b"EPD-fake".to_vec()),
        }))
    }

    pub async fn set_behavior(&self, behavior: FakeBehavior) {
        *self.behavior.lock().await = behavior;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn last_request(&self) -> Option<RenderRequest> {
        self.requests.lock().await.last().cloned()
    }
}

#[async_trait]
impl Renderer for FakeRenderer {
    async fn render(&self, request: &RenderRequest) -> Result<RenderOutput, RenderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().await.push(request.clone());

        let behavior = self.behavior.lock().await.clone();
        match behavior {
            FakeBehavior::Output(output) => Ok(output),
            FakeBehavior::Fail => Err(RenderError::Failed {
                status: "exit status: 1".to_string(),
                stderr: "font missing".to_string(),
            }),
            FakeBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(RenderError::EmptyOutput)
            }
        }
    }
}

// =============================================================================
// Notifier Fake
// =============================================================================

/// Notifier that keeps every delivered message.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        RecordingNotifier {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn deliver(&self, recipient: &str, text: &str) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Unavailable("push endpoint down".to_string()));
        }
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), text.to_string()));
        Ok(())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

pub async fn db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

pub fn config() -> FleetConfig {
    FleetConfig::default()
}

pub async fn seed_user(db: &Database, id: &str, username: &str, recipient: Option<&str>) -> User {
    let user = User {
        id: id.to_string(),
        username: username.to_string(),
        accept_guest_messages: recipient.is_some(),
        messaging_user_id: recipient.map(str::to_string),
        welcome_text: None,
        hint_text: None,
        submit_text: None,
        created_at: Utc::now(),
    };
    db.users().insert(&user).await.unwrap();
    user
}

pub async fn seed_template(db: &Database, id: &str, owner: &str, name: &str, elements: Vec<LayoutElement>) {
    let template = Template {
        id: id.to_string(),
        owner: owner.to_string(),
        name: name.to_string(),
        elements,
        updated_at: Utc::now(),
    };
    db.templates().insert(&template).await.unwrap();
}

/// A nameplate layout: one title and one guest QR code.
pub fn office_layout() -> Vec<LayoutElement> {
    parse_layout(
        "fixture",
        r#"[
            {"type": "text", "id": "e1", "name": "title", "x": 10, "y": 10, "width": 300, "height": 40, "text": "Room 101"},
            {"type": "guestQRCode", "id": "e2", "name": "guest", "x": 600, "y": 280, "width": 180, "height": 180}
        ]"#,
    )
    .unwrap()
}

/// The reserved activation preview layout.
pub fn preview_layout() -> Vec<LayoutElement> {
    parse_layout(
        "fixture",
        r#"[
            {"type": "label", "id": "p1", "name": "heading", "x": 0, "y": 0, "width": 800, "height": 60, "text": "Activate this doorplate"},
            {"type": "text", "id": "p2", "name": "activationCode", "x": 0, "y": 200, "width": 800, "height": 80, "text": ""}
        ]"#,
    )
    .unwrap()
}
