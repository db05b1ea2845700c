use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error_handling::types::TransportError;
use crate::service_management::types::TrackedService;

pub const NEW_SERVICES_STATE: &str = "msg-new-services-state";

/// Full service list published after a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateMessage {
    pub id: &'static str,
    pub sequence: u64,
    pub published_at: DateTime<Utc>,
    pub body: Vec<TrackedService>,
}

impl StateMessage {
    pub fn new(sequence: u64, body: Vec<TrackedService>) -> Self {
        Self {
            id: NEW_SERVICES_STATE,
            sequence,
            published_at: Utc::now(),
            body,
        }
    }

    /// Placeholder held by a transport before the first pass completes.
    pub fn empty() -> Self {
        Self::new(0, Vec::new())
    }
}

pub trait UiTransport: Send + Sync {
    fn post_state(&self, message: &StateMessage) -> Result<(), TransportError>;
}
