use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use courier::WebhookConfig;

fn default_active() -> bool {
    true
}

fn default_timeout_secs() -> i64 {
    30
}

/// Request to create a webhook config.
#[derive(Debug, Deserialize, ToSchema)]
pub struct ConfigCreate {
    pub name: String,
    /// Event class this config subscribes to: CREDIT or DEBIT
    pub event_type: String,
    /// Target URL, used verbatim for delivery
    pub url: String,
    #[serde(default = "default_active")]
    pub active: bool,
    /// Per-call delivery timeout
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: i64,
}

/// A webhook config as returned by the API.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ConfigResponse {
    pub id: i64,
    pub name: String,
    pub event_type: String,
    pub url: String,
    pub active: bool,
    pub timeout_secs: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WebhookConfig> for ConfigResponse {
    fn from(config: WebhookConfig) -> Self {
        Self {
            id: config.id,
            name: config.name,
            event_type: config.event_type.to_string(),
            url: config.url,
            active: config.active,
            timeout_secs: config.timeout_secs,
            created_at: config.created_at,
            updated_at: config.updated_at,
        }
    }
}
