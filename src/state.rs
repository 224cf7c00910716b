use serde::Serialize;
use sqlx::SqlitePool;
use std::env;
use tokio::sync::broadcast;

use crate::models::{ExpressBookingRow, ProjectRow};

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub events: broadcast::Sender<ServerEvent>,
    pub mailer: MailerConfig,
}

#[derive(Clone, Debug)]
pub struct MailerConfig {
    pub api_base: String,
    pub api_key: String,
    pub sender: String,
}

impl MailerConfig {
    pub fn from_env() -> Self {
        Self {
            api_base: env::var("MAILER_API_BASE")
                .unwrap_or_else(|_| "https://api.resend.com".to_string()),
            api_key: env::var("MAILER_API_KEY").unwrap_or_default(),
            sender: env::var("MAILER_SENDER")
                .unwrap_or_else(|_| "Reenove <notifications@reenove.fr>".to_string()),
        }
    }

    pub fn enabled(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerEvent {
    pub kind: String,
    pub booking_id: Option<String>,
    pub project_id: Option<String>,
    pub conversation_id: Option<String>,
    pub status: Option<String>,
    pub client_name: Option<String>,
    pub service: Option<String>,
    pub scheduled_for: Option<String>,
    pub city: Option<String>,
}

impl ServerEvent {
    pub fn from_booking(kind: &str, row: &ExpressBookingRow) -> Self {
        Self {
            kind: kind.to_string(),
            booking_id: Some(row.id.clone()),
            project_id: None,
            conversation_id: None,
            status: Some(row.status.as_str().to_string()),
            client_name: Some(row.client_name.clone()),
            service: Some(row.service_id.clone()),
            scheduled_for: Some(row.scheduled_date.clone()),
            city: Some(row.city.clone()),
        }
    }

    pub fn from_project(kind: &str, row: &ProjectRow) -> Self {
        Self {
            kind: kind.to_string(),
            booking_id: None,
            project_id: Some(row.id.clone()),
            conversation_id: None,
            status: Some(row.status.as_str().to_string()),
            client_name: None,
            service: row.service_id.clone(),
            scheduled_for: None,
            city: None,
        }
    }

    pub fn from_conversation(kind: &str, conversation_id: &str) -> Self {
        Self {
            kind: kind.to_string(),
            booking_id: None,
            project_id: None,
            conversation_id: Some(conversation_id.to_string()),
            status: None,
            client_name: None,
            service: None,
            scheduled_for: None,
            city: None,
        }
    }
}
