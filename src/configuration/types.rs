use serde::Deserialize;
use std::path::PathBuf;

/// `[engine]`: how the podman binary is driven.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub binary: String,
    /// Upper bound for short engine calls (list, inspect, create, start).
    pub call_timeout_secs: u64,
    /// Delay before the event stream is restarted after it dies.
    pub restart_backoff_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: "podman".to_string(),
            call_timeout_secs: 30,
            restart_backoff_secs: 5,
        }
    }
}

/// `[storage]`: private directory for staged volumes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: std::env::temp_dir().join("pgservices"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub port: u16,
    /// How long `GET /api/state` waits for a newer state before answering.
    pub long_poll_timeout_secs: u64,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 7070,
            long_poll_timeout_secs: 25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProvisioningConfig {
    /// Run the admin console in a pod shared with its database.
    pub use_pod: bool,
    pub pgadmin_email: String,
    pub pgadmin_password: String,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            use_pod: true,
            pgadmin_email: "user@domain.com".to_string(),
            pgadmin_password: "admin".to_string(),
        }
    }
}
