//! Value types exchanged with a container engine adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// A published port of a container or pod.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    /// Host interface the port is bound to; empty means all interfaces.
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: u16,
    #[serde(default)]
    pub container_port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl PortMapping {
    /// A TCP mapping bound on all host interfaces.
    pub fn tcp(host_port: u16, container_port: u16) -> Self {
        PortMapping {
            host_ip: "0.0.0.0".to_string(),
            host_port,
            container_port,
            protocol: default_protocol(),
        }
    }
}

/// Summary of a live container as returned by a container listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerInfo {
    pub id: String,
    pub engine_id: String,
    pub image: String,
    pub names: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub ports: Vec<PortMapping>,
    /// Id of the pod the container belongs to, if any.
    pub pod: Option<String>,
    pub state: String,
}

impl ContainerInfo {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Detailed view of a single container.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContainerInspect {
    pub id: String,
    /// Environment in `NAME=value` form.
    pub env: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub running: bool,
}

impl ContainerInspect {
    pub fn env_value(&self, name: &str) -> Option<&str> {
        self.env.iter().find_map(|entry| {
            entry
                .strip_prefix(name)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Podman,
    Docker,
    Kubernetes,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    Started,
    Starting,
    Stopped,
    Unknown,
}

/// A connection to an engine provider (a local socket, a VM, a remote host).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConnection {
    pub name: String,
    pub kind: ProviderKind,
    pub status: ProviderStatus,
    pub endpoint: String,
}

/// An engine instance reachable through a provider connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineInfo {
    pub id: String,
    pub name: String,
}

/// Lifecycle event of a single container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerEvent {
    /// Event kind as reported by the engine (`container`, `image`, `pod`, ...).
    pub kind: String,
    /// Event status (`start`, `died`, `remove`, `health_status`, ...).
    pub status: String,
    pub id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTransition {
    Registered,
    Unregistered,
    Started,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Container(ContainerEvent),
    Provider(ProviderTransition),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: String,
    pub target: String,
    pub read_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheck {
    /// Probe in engine form, e.g. `["CMD-SHELL", "wget -O - http://..."]`.
    pub test: Vec<String>,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
}

/// Everything needed to create (not start) a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerCreateOptions {
    pub name: String,
    pub image: String,
    pub env: BTreeMap<String, String>,
    pub labels: BTreeMap<String, String>,
    pub mounts: Vec<Mount>,
    pub port_bindings: Vec<PortMapping>,
    pub pod: Option<String>,
    pub entrypoint: Option<Vec<String>>,
    pub user: Option<String>,
    pub health_check: Option<HealthCheck>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodCreateOptions {
    pub name: String,
    pub port_mappings: Vec<PortMapping>,
}

/// Transient identifier of a pod created during provisioning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodHandle {
    pub engine_id: String,
    pub pod_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    pub context_dir: PathBuf,
    pub containerfile: Option<PathBuf>,
    pub tag: String,
    pub labels: BTreeMap<String, String>,
}
