use log::{debug, info, warn};
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::engine::types::{
    ContainerCreateOptions, HealthCheck, Mount, PodCreateOptions, PodHandle, PortMapping,
    ProviderConnection, ProviderKind, ProviderStatus,
};
use crate::engine::ContainerEngine;
use crate::error_handling::types::ServiceError;
use crate::service_management::catalog::{
    pgadmin_image, BASE_IMAGE_LABEL, DEFAULT_USER, INIT_SCRIPTS_DIR, PGADMIN_PORT,
    PGADMIN_PORT_LABEL, POSTGRES_DB_ENV, POSTGRES_PASSWORD_ENV, POSTGRES_PORT, POSTGRES_USER_ENV,
    SERVICE_CONTAINER_LABEL,
};
use crate::service_management::path_translator::PathTranslator;
use crate::service_management::ports::next_free_port;
use crate::service_management::types::{InitScript, ProvisioningRequest};

const SERVERS_JSON_TARGET: &str = "/pgadmin4/servers.json";
const PGPASS_TARGET: &str = "/pgpass";
const PGPASS_IN_CONSOLE: &str = "/var/lib/pgadmin/pgpass";
const STANDALONE_DB_HOST: &str = "host.containers.internal";
const PGADMIN_ENTRYPOINT: &str = "mkdir -p /var/lib/pgadmin \
    && cp /pgpass /var/lib/pgadmin/pgpass \
    && chown 5050:0 /var/lib/pgadmin/pgpass \
    && chmod 600 /var/lib/pgadmin/pgpass \
    && exec /entrypoint.sh";
const PGADMIN_HEALTH_PROBE: &str = "wget -O - http://localhost:80/misc/ping || exit 1";

/// Knobs for how services are provisioned.
#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    /// Private root under which each run stages its own temporary directories.
    pub storage_root: PathBuf,
    /// Co-locate the admin console with its database inside a pod.
    pub use_pod: bool,
    pub pgadmin_email: String,
    pub pgadmin_password: String,
}

/// Engine objects created so far by one provisioning run.
#[derive(Debug, Default)]
struct Residue(Vec<String>);

impl Residue {
    fn push(&mut self, kind: &str, id: &str) {
        self.0.push(format!("{} {}", kind, id));
    }
}

/// Where the generated admin console files live on the host.
struct ConsoleFiles {
    servers_json: PathBuf,
    pgpass: PathBuf,
}

/// Creates database services and their optional admin console.
pub struct Provisioner {
    engine: Arc<dyn ContainerEngine>,
    settings: ProvisionerSettings,
    paths: PathTranslator,
}

impl Provisioner {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        settings: ProvisionerSettings,
        paths: PathTranslator,
    ) -> Self {
        Self {
            engine,
            settings,
            paths,
        }
    }

    /// Provisions `name` and returns the database container id.
    ///
    /// Nothing is rolled back on failure: objects created before the failing step
    /// stay behind unstarted and are reported in a warning.
    pub async fn create_service(
        &self,
        name: &str,
        request: &ProvisioningRequest,
    ) -> Result<String, ServiceError> {
        let pgadmin_port = validate(name, request)?;

        let provider = self.select_provider().await?;
        info!("Provisioning {} from {} on {}", name, request.image, provider.name);
        self.engine.pull_image(&provider, &request.image).await?;
        let engine_id = self.resolve_engine(&provider).await?;

        let mut residue = Residue::default();
        let result = self
            .provision(name, request, &provider, &engine_id, pgadmin_port, &mut residue)
            .await;
        match &result {
            Ok(container_id) => info!("Service {} provisioned as {}", name, container_id),
            Err(e) if !residue.0.is_empty() => warn!(
                "Provisioning {} failed ({}), leaving behind unstarted {}",
                name,
                e,
                residue.0.join(", ")
            ),
            Err(_) => {}
        }
        result
    }

    async fn provision(
        &self,
        name: &str,
        request: &ProvisioningRequest,
        provider: &ProviderConnection,
        engine_id: &str,
        pgadmin_port: Option<u16>,
        residue: &mut Residue,
    ) -> Result<String, ServiceError> {
        let pod = match pgadmin_port {
            Some(console_port) if self.settings.use_pod => {
                let pod = self
                    .create_pod(provider, name, request.local_port, console_port)
                    .await?;
                residue.push("pod", &pod.pod_id);
                Some(pod)
            }
            _ => None,
        };

        let options = self.database_options(name, request, pod.as_ref(), pgadmin_port)?;
        let container_id = self.engine.create_container(engine_id, &options).await?;
        residue.push("container", &container_id);
        debug!("Created database container {}", container_id);

        let Some(console_port) = pgadmin_port else {
            self.engine.start_container(engine_id, &container_id).await?;
            return Ok(container_id);
        };

        let console_image = pgadmin_image();
        self.engine.pull_image(provider, &console_image).await?;

        let options = self
            .console_options(name, request, &container_id, pod.as_ref(), console_port)
            .await?;
        let console_id = self.engine.create_container(engine_id, &options).await?;
        residue.push("container", &console_id);
        debug!("Created admin console container {}", console_id);

        match &pod {
            Some(pod) => self.engine.start_pod(&pod.engine_id, &pod.pod_id).await?,
            None => {
                self.engine.start_container(engine_id, &container_id).await?;
                self.engine.start_container(engine_id, &console_id).await?;
            }
        }
        Ok(container_id)
    }

    async fn select_provider(&self) -> Result<ProviderConnection, ServiceError> {
        self.engine
            .list_providers()
            .await?
            .into_iter()
            .find(|p| p.kind == ProviderKind::Podman && p.status == ProviderStatus::Started)
            .ok_or_else(|| ServiceError::Precondition("no started podman provider".to_string()))
    }

    async fn resolve_engine(&self, provider: &ProviderConnection) -> Result<String, ServiceError> {
        self.engine
            .list_engines(provider)
            .await?
            .into_iter()
            .next()
            .map(|engine| engine.id)
            .ok_or_else(|| {
                ServiceError::Precondition(format!("no engine found for {}", provider.name))
            })
    }

    async fn create_pod(
        &self,
        provider: &ProviderConnection,
        name: &str,
        db_port: u16,
        console_port: u16,
    ) -> Result<PodHandle, ServiceError> {
        let options = PodCreateOptions {
            name: format!("{}-pod", name),
            port_mappings: vec![
                PortMapping::tcp(db_port, POSTGRES_PORT),
                PortMapping::tcp(console_port, PGADMIN_PORT),
            ],
        };
        let pod = self.engine.create_pod(provider, &options).await?;
        debug!("Created pod {} for {}", pod.pod_id, name);
        Ok(pod)
    }

    fn database_options(
        &self,
        name: &str,
        request: &ProvisioningRequest,
        pod: Option<&PodHandle>,
        pgadmin_port: Option<u16>,
    ) -> Result<ContainerCreateOptions, ServiceError> {
        let mut options = ContainerCreateOptions {
            name: name.to_string(),
            image: request.image.clone(),
            pod: pod.map(|p| p.pod_id.clone()),
            ..Default::default()
        };

        options
            .env
            .insert(POSTGRES_PASSWORD_ENV.to_string(), request.password.clone());
        if let Some(db_name) = request.db_name() {
            options
                .env
                .insert(POSTGRES_DB_ENV.to_string(), db_name.to_string());
        }
        if let Some(user) = request.user() {
            options
                .env
                .insert(POSTGRES_USER_ENV.to_string(), user.to_string());
        }

        if !request.scripts.is_empty() {
            let dir = stage_init_scripts(&self.settings.storage_root, &request.scripts)?;
            options.mounts.push(Mount {
                source: self.paths.translate_path(&dir),
                target: INIT_SCRIPTS_DIR.to_string(),
                read_only: true,
            });
        }

        if pod.is_none() {
            options
                .port_bindings
                .push(PortMapping::tcp(request.local_port, POSTGRES_PORT));
        }

        options
            .labels
            .insert(BASE_IMAGE_LABEL.to_string(), request.image.clone());
        if let Some(port) = pgadmin_port {
            options
                .labels
                .insert(PGADMIN_PORT_LABEL.to_string(), port.to_string());
        }
        Ok(options)
    }

    async fn console_options(
        &self,
        name: &str,
        request: &ProvisioningRequest,
        container_id: &str,
        pod: Option<&PodHandle>,
        console_port: u16,
    ) -> Result<ContainerCreateOptions, ServiceError> {
        let (db_host, db_port) = match pod {
            Some(_) => ("localhost", POSTGRES_PORT),
            None => (STANDALONE_DB_HOST, request.local_port),
        };
        let files =
            stage_console_files(&self.settings.storage_root, name, request, db_host, db_port)?;

        let mut options = ContainerCreateOptions {
            name: format!("{}-pgadmin", name),
            image: pgadmin_image(),
            pod: pod.map(|p| p.pod_id.clone()),
            user: Some("root".to_string()),
            entrypoint: Some(vec![
                "/bin/sh".to_string(),
                "-c".to_string(),
                PGADMIN_ENTRYPOINT.to_string(),
            ]),
            health_check: Some(HealthCheck {
                test: vec!["CMD-SHELL".to_string(), PGADMIN_HEALTH_PROBE.to_string()],
                interval: Duration::from_secs(10),
                timeout: Duration::from_secs(5),
                retries: 5,
            }),
            ..Default::default()
        };

        for (key, value) in [
            ("PGADMIN_DEFAULT_EMAIL", self.settings.pgadmin_email.as_str()),
            ("PGADMIN_DEFAULT_PASSWORD", self.settings.pgadmin_password.as_str()),
            ("PGADMIN_CONFIG_SERVER_MODE", "False"),
            ("PGADMIN_CONFIG_MASTER_PASSWORD_REQUIRED", "False"),
        ] {
            options.env.insert(key.to_string(), value.to_string());
        }

        options.mounts.push(Mount {
            source: self.paths.translate_path(&files.servers_json),
            target: SERVERS_JSON_TARGET.to_string(),
            read_only: true,
        });
        options.mounts.push(Mount {
            source: self.paths.translate_path(&files.pgpass),
            target: PGPASS_TARGET.to_string(),
            read_only: true,
        });

        if pod.is_none() {
            let host_port = next_free_port(console_port).await?;
            if host_port != console_port {
                info!(
                    "Port {} is taken, admin console for {} will listen on {}",
                    console_port, name, host_port
                );
            }
            options
                .port_bindings
                .push(PortMapping::tcp(host_port, PGADMIN_PORT));
            options
                .labels
                .insert(SERVICE_CONTAINER_LABEL.to_string(), container_id.to_string());
            options
                .labels
                .insert(PGADMIN_PORT_LABEL.to_string(), host_port.to_string());
        }
        Ok(options)
    }
}

/// Rejects malformed requests before any engine call. Returns the admin console
/// port when one is requested.
fn validate(name: &str, request: &ProvisioningRequest) -> Result<Option<u16>, ServiceError> {
    if name.trim().is_empty() {
        return Err(ServiceError::Precondition(
            "service name must not be empty".to_string(),
        ));
    }
    if request.password.is_empty() {
        return Err(ServiceError::Precondition(
            "a password is required".to_string(),
        ));
    }
    for script in &request.scripts {
        if !is_plain_file_name(&script.name) {
            return Err(ServiceError::Precondition(format!(
                "invalid init script name '{}'",
                script.name
            )));
        }
    }
    match (request.pgadmin, request.pgadmin_port) {
        (true, None) => Err(ServiceError::Precondition(
            "pgadmin port is required when pgadmin is enabled".to_string(),
        )),
        (true, Some(port)) => Ok(Some(port)),
        (false, _) => Ok(None),
    }
}

fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains('/')
        && !name.contains('\\')
}

/// Creates a fresh owner-only directory under `root` that outlives this process.
fn fresh_dir(root: &Path, prefix: &str) -> Result<PathBuf, ServiceError> {
    fs::create_dir_all(root)?;
    let dir = tempfile::Builder::new()
        .prefix(prefix)
        .tempdir_in(root)?
        .keep();
    Ok(dir)
}

fn stage_init_scripts(root: &Path, scripts: &[InitScript]) -> Result<PathBuf, ServiceError> {
    let dir = fresh_dir(root, "init-")?;
    for script in scripts {
        fs::write(dir.join(&script.name), &script.content)?;
    }
    debug!("Staged {} init scripts in {}", scripts.len(), dir.display());
    Ok(dir)
}

fn stage_console_files(
    root: &Path,
    name: &str,
    request: &ProvisioningRequest,
    db_host: &str,
    db_port: u16,
) -> Result<ConsoleFiles, ServiceError> {
    let dir = fresh_dir(root, "pgadmin-")?;
    let user = request.user().unwrap_or(DEFAULT_USER);
    let db_name = request.db_name().unwrap_or(user);

    let servers = servers_json(name, db_host, db_port, db_name, user);
    let servers_json = dir.join("servers.json");
    fs::write(&servers_json, serde_json::to_vec_pretty(&servers)?)?;

    let pgpass = dir.join("pgpass");
    fs::write(
        &pgpass,
        pgpass_line(db_host, db_port, db_name, user, &request.password),
    )?;
    restrict_permissions(&pgpass)?;

    debug!("Staged admin console files in {}", dir.display());
    Ok(ConsoleFiles {
        servers_json,
        pgpass,
    })
}

fn servers_json(
    name: &str,
    host: &str,
    port: u16,
    db_name: &str,
    user: &str,
) -> serde_json::Value {
    json!({
        "Servers": {
            "1": {
                "Name": name,
                "Group": "Servers",
                "Host": host,
                "Port": port,
                "MaintenanceDB": db_name,
                "Username": user,
                "PassFile": PGPASS_IN_CONSOLE,
                "SSLMode": "prefer"
            }
        }
    })
}

/// One `host:port:db:user:password` line with `:` and `\` escaped.
fn pgpass_line(host: &str, port: u16, db_name: &str, user: &str, password: &str) -> String {
    fn escape(field: &str) -> String {
        field.replace('\\', "\\\\").replace(':', "\\:")
    }
    format!(
        "{}:{}:{}:{}:{}\n",
        escape(host),
        port,
        escape(db_name),
        escape(user),
        escape(password)
    )
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), ServiceError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), ServiceError> {
    Ok(())
}
