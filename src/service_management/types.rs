use serde::{Deserialize, Serialize};

/// One discovered database container, rebuilt on every reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedService {
    pub container_id: String,
    pub engine_id: String,
    pub name: String,
    pub running: bool,
    pub image_name: String,
    pub image_version: String,
    pub port: u16,
    pub db_name: String,
    pub user: String,
    pub password: String,
    pub pgadmin: bool,
    pub pgadmin_port: Option<u16>,
}

impl TrackedService {
    /// Sets the admin-console fields together so the flag and port never disagree.
    pub fn with_admin_console(mut self, port: Option<u16>) -> Self {
        self.pgadmin = port.is_some();
        self.pgadmin_port = port;
        self
    }
}

/// A file executed by the database image on first boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitScript {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningRequest {
    /// Image reference including its tag, e.g. `docker.io/library/postgres:16`.
    pub image: String,
    pub local_port: u16,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    pub password: String,
    #[serde(default)]
    pub pgadmin: bool,
    #[serde(default)]
    pub pgadmin_port: Option<u16>,
    #[serde(default)]
    pub scripts: Vec<InitScript>,
}

impl ProvisioningRequest {
    pub fn db_name(&self) -> Option<&str> {
        self.db_name.as_deref().filter(|s| !s.is_empty())
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref().filter(|s| !s.is_empty())
    }
}

/// A connection string in its redacted and clear forms.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenderedConnection {
    pub obfuscated: String,
    pub clear: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionStrings {
    pub uri: RenderedConnection,
    pub kv: RenderedConnection,
}
