use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Discrete phase of the login/apply workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    AwaitingPhone,
    AwaitingCode,
    Authenticated,
}

/// The single mutable piece of workflow state. Only the orchestrator writes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Pre-filled from the session store in `AwaitingPhone`; fixed from `AwaitingCode` on.
    pub phone: Option<String>,
    pub stage: Stage,
    pub authenticated_at: Option<DateTime<Utc>>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            phone: None,
            stage: Stage::AwaitingPhone,
            authenticated_at: None,
        }
    }

    pub fn with_phone(phone: String) -> Self {
        Self {
            phone: Some(phone),
            ..Self::new()
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
