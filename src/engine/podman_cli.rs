//! `ContainerEngine` implementation driving the `podman` command line.
//!
//! Every engine interaction goes through [`PodmanCli::run`], which gives a single point where
//! the subprocess is built, a consistent timeout policy, and error mapping to [`EngineError`].
//! Engine ids are podman connection names; the implicit local connection is
//! [`LOCAL_CONNECTION`] and is addressed without a `--connection` flag.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::engine::engine_trait::ContainerEngine;
use crate::engine::types::{
    BuildOptions, ContainerCreateOptions, ContainerEvent, ContainerInfo, ContainerInspect,
    EngineEvent, EngineInfo, PodCreateOptions, PodHandle, PortMapping, ProviderConnection,
    ProviderKind, ProviderStatus, ProviderTransition,
};
use crate::error_handling::types::EngineError;

/// Name used for the local podman socket when no named connection is configured.
pub const LOCAL_CONNECTION: &str = "podman";

const CONNECTION_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct PodmanCli {
    binary: String,
    call_timeout: Duration,
    restart_backoff: Duration,
}

impl PodmanCli {
    pub fn new(binary: impl Into<String>, call_timeout: Duration, restart_backoff: Duration) -> Self {
        PodmanCli {
            binary: binary.into(),
            call_timeout,
            restart_backoff,
        }
    }

    fn command_line(&self, args: &[String]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    /// Runs a podman command, returning raw output. `None` disables the timeout.
    async fn run(&self, args: &[String], timeout: Option<Duration>) -> Result<Output, EngineError> {
        let cmd_str = self.command_line(args);
        debug!("Running {}", cmd_str);

        let mut command = Command::new(&self.binary);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        let output = command.output();

        let result = match timeout {
            Some(limit) => match tokio::time::timeout(limit, output).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(EngineError::Timeout {
                        command: cmd_str,
                        timeout: limit,
                    })
                }
            },
            None => output.await,
        };

        result.map_err(|e| EngineError::ExecFailed {
            command: cmd_str,
            source: e,
        })
    }

    /// Runs a podman command, returning output only on exit 0.
    async fn run_success(
        &self,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<Output, EngineError> {
        let output = self.run(args, timeout).await?;
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr).to_lowercase();
        if stderr.contains("no such container") || stderr.contains("no such pod") {
            return Err(EngineError::NotFound(self.command_line(args)));
        }
        Err(EngineError::failed(self.command_line(args), &output))
    }

    async fn run_stdout(&self, args: &[String], timeout: Option<Duration>) -> Result<String, EngineError> {
        let output = self.run_success(args, timeout).await?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    async fn probe(&self, connection: &str) -> bool {
        let args = engine_args(connection, &["info", "--format", "json"]);
        self.run_success(&args, Some(self.call_timeout)).await.is_ok()
    }

    /// Follows `podman events` on the default connection, announcing provider transitions
    /// whenever the stream comes up or goes away, until `events` is closed.
    async fn pump_events(self, events: mpsc::Sender<EngineEvent>) {
        let mut connected = false;
        let mut first_attempt = true;

        while !events.is_closed() {
            let reachable = self.probe(LOCAL_CONNECTION).await;
            if reachable && !connected {
                connected = true;
                if !first_attempt {
                    info!("Container engine is reachable again");
                    if send_provider(&events, ProviderTransition::Started).await.is_err() {
                        return;
                    }
                }
            }
            first_attempt = false;

            if reachable {
                if let Err(e) = self.stream_events(&events).await {
                    warn!("Container event stream failed: {}", e);
                }
            }

            if connected {
                connected = false;
                warn!("Lost the container event stream, retrying in {:?}", self.restart_backoff);
                if send_provider(&events, ProviderTransition::Stopped).await.is_err() {
                    return;
                }
            }
            tokio::time::sleep(self.restart_backoff).await;
        }
        debug!("Event receiver dropped, stopping event pump");
    }

    async fn list_connections(&self) -> Result<Vec<ProviderConnection>, EngineError> {
        let args = engine_args(
            LOCAL_CONNECTION,
            &["system", "connection", "list", "--format", "json"],
        );
        let stdout = self.run_stdout(&args, Some(self.call_timeout)).await?;
        parse_connections(&stdout).map_err(|e| EngineError::malformed(self.command_line(&args), e))
    }

    /// Polls the connection list and announces added or removed connections.
    async fn watch_connections(self, events: mpsc::Sender<EngineEvent>) {
        let mut known: Option<BTreeSet<String>> = None;

        while !events.is_closed() {
            match self.list_connections().await {
                Ok(connections) => {
                    let current: BTreeSet<String> =
                        connections.into_iter().map(|c| c.name).collect();
                    if let Some(previous) = &known {
                        for transition in connection_changes(previous, &current) {
                            info!("Engine connections changed ({:?})", transition);
                            if send_provider(&events, transition).await.is_err() {
                                return;
                            }
                        }
                    }
                    known = Some(current);
                }
                Err(e) => debug!("Unable to list engine connections: {}", e),
            }
            tokio::time::sleep(CONNECTION_POLL_INTERVAL).await;
        }
        debug!("Event receiver dropped, stopping connection watch");
    }

    async fn stream_events(&self, events: &mpsc::Sender<EngineEvent>) -> Result<(), EngineError> {
        let args: Vec<String> = ["events", "--format", "json", "--filter", "type=container"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let cmd_str = self.command_line(&args);

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::ExecFailed {
                command: cmd_str.clone(),
                source: e,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| EngineError::malformed(&cmd_str, "no stdout handle"))?;
        let mut lines = BufReader::new(stdout).lines();
        info!("Following container events");

        while let Some(line) = lines.next_line().await.map_err(|e| EngineError::ExecFailed {
            command: cmd_str.clone(),
            source: e,
        })? {
            match parse_event_line(&line) {
                Some(event) => {
                    if events.send(EngineEvent::Container(event)).await.is_err() {
                        return Ok(());
                    }
                }
                None => debug!("Ignoring unparsable event line: {}", line),
            }
        }

        let status = child.wait().await.map_err(|e| EngineError::ExecFailed {
            command: cmd_str.clone(),
            source: e,
        })?;
        debug!("{} exited with {}", cmd_str, status);
        Ok(())
    }
}

/// One `Registered` per new connection name, one `Unregistered` per vanished one.
pub(crate) fn connection_changes(
    previous: &BTreeSet<String>,
    current: &BTreeSet<String>,
) -> Vec<ProviderTransition> {
    let added = current.difference(previous).map(|_| ProviderTransition::Registered);
    let removed = previous
        .difference(current)
        .map(|_| ProviderTransition::Unregistered);
    added.chain(removed).collect()
}

async fn send_provider(
    events: &mpsc::Sender<EngineEvent>,
    transition: ProviderTransition,
) -> Result<(), mpsc::error::SendError<EngineEvent>> {
    events.send(EngineEvent::Provider(transition)).await
}

#[async_trait]
impl ContainerEngine for PodmanCli {
    async fn list_providers(&self) -> Result<Vec<ProviderConnection>, EngineError> {
        let mut providers = self.list_connections().await?;

        if providers.is_empty() {
            providers.push(ProviderConnection {
                name: LOCAL_CONNECTION.to_string(),
                kind: ProviderKind::Podman,
                status: ProviderStatus::Unknown,
                endpoint: "local".to_string(),
            });
        }

        for provider in providers.iter_mut() {
            provider.status = if self.probe(&provider.name).await {
                ProviderStatus::Started
            } else {
                ProviderStatus::Stopped
            };
            debug!("Provider {} is {:?}", provider.name, provider.status);
        }
        Ok(providers)
    }

    async fn list_engines(
        &self,
        provider: &ProviderConnection,
    ) -> Result<Vec<EngineInfo>, EngineError> {
        if provider.status != ProviderStatus::Started {
            return Ok(Vec::new());
        }
        Ok(vec![EngineInfo {
            id: provider.name.clone(),
            name: format!("podman ({})", provider.name),
        }])
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, EngineError> {
        let mut containers = Vec::new();
        let mut seen = HashSet::new();
        for provider in self.list_providers().await? {
            if provider.status != ProviderStatus::Started {
                continue;
            }
            // Stopped services stay tracked, so list exited containers too.
            let args = engine_args(&provider.name, &["ps", "--all", "--format", "json"]);
            let stdout = self.run_stdout(&args, Some(self.call_timeout)).await?;
            let listed = parse_ps(&provider.name, &stdout)
                .map_err(|e| EngineError::malformed(self.command_line(&args), e))?;
            // Several connections may point at the same machine.
            containers.extend(listed.into_iter().filter(|c| seen.insert(c.id.clone())));
        }
        Ok(containers)
    }

    async fn inspect_container(
        &self,
        engine_id: &str,
        container_id: &str,
    ) -> Result<ContainerInspect, EngineError> {
        let args = engine_args(engine_id, &["container", "inspect", container_id]);
        let stdout = self.run_stdout(&args, Some(self.call_timeout)).await?;
        parse_inspect(&stdout)
            .map_err(|e| EngineError::malformed(self.command_line(&args), e))?
            .ok_or_else(|| EngineError::NotFound(container_id.to_string()))
    }

    async fn subscribe(&self, events: mpsc::Sender<EngineEvent>) -> Result<(), EngineError> {
        tokio::spawn(self.clone().watch_connections(events.clone()));
        tokio::spawn(self.clone().pump_events(events));
        Ok(())
    }

    async fn pull_image(
        &self,
        provider: &ProviderConnection,
        image: &str,
    ) -> Result<(), EngineError> {
        info!("Pulling image {} on {}", image, provider.name);
        let args = engine_args(&provider.name, &["pull", "--quiet", image]);
        self.run_success(&args, None).await?;
        Ok(())
    }

    async fn build_image(
        &self,
        engine_id: &str,
        options: &BuildOptions,
    ) -> Result<String, EngineError> {
        info!("Building image {} from {}", options.tag, options.context_dir.display());
        let args = prefix_connection(engine_id, build_args(options));
        let stdout = self.run_stdout(&args, None).await?;
        stdout
            .lines()
            .last()
            .map(str::to_string)
            .ok_or_else(|| EngineError::malformed(self.command_line(&args), "no image id printed"))
    }

    async fn create_container(
        &self,
        engine_id: &str,
        options: &ContainerCreateOptions,
    ) -> Result<String, EngineError> {
        let args = prefix_connection(engine_id, create_container_args(options)?);
        let id = self.run_stdout(&args, Some(self.call_timeout)).await?;
        info!("Created container {} ({})", options.name, id);
        Ok(id)
    }

    async fn start_container(
        &self,
        engine_id: &str,
        container_id: &str,
    ) -> Result<(), EngineError> {
        let args = engine_args(engine_id, &["start", container_id]);
        self.run_success(&args, Some(self.call_timeout)).await?;
        Ok(())
    }

    async fn create_pod(
        &self,
        provider: &ProviderConnection,
        options: &PodCreateOptions,
    ) -> Result<PodHandle, EngineError> {
        let args = prefix_connection(&provider.name, pod_create_args(options));
        let pod_id = self.run_stdout(&args, Some(self.call_timeout)).await?;
        info!("Created pod {} ({})", options.name, pod_id);
        Ok(PodHandle {
            engine_id: provider.name.clone(),
            pod_id,
        })
    }

    async fn start_pod(&self, engine_id: &str, pod_id: &str) -> Result<(), EngineError> {
        let args = engine_args(engine_id, &["pod", "start", pod_id]);
        self.run_success(&args, Some(self.call_timeout)).await?;
        Ok(())
    }
}

fn engine_args(engine_id: &str, args: &[&str]) -> Vec<String> {
    prefix_connection(engine_id, args.iter().map(|s| s.to_string()).collect())
}

fn prefix_connection(engine_id: &str, args: Vec<String>) -> Vec<String> {
    if engine_id.is_empty() || engine_id == LOCAL_CONNECTION {
        return args;
    }
    let mut full = vec!["--connection".to_string(), engine_id.to_string()];
    full.extend(args);
    full
}

fn publish_arg(mapping: &PortMapping) -> String {
    if mapping.host_ip.is_empty() {
        format!("{}:{}/{}", mapping.host_port, mapping.container_port, mapping.protocol)
    } else {
        format!(
            "{}:{}:{}/{}",
            mapping.host_ip, mapping.host_port, mapping.container_port, mapping.protocol
        )
    }
}

pub(crate) fn create_container_args(
    options: &ContainerCreateOptions,
) -> Result<Vec<String>, EngineError> {
    let mut args = vec!["create".to_string(), "--name".to_string(), options.name.clone()];

    if let Some(pod) = &options.pod {
        args.push("--pod".to_string());
        args.push(pod.clone());
    }
    for (key, value) in &options.env {
        args.push("--env".to_string());
        args.push(format!("{}={}", key, value));
    }
    for (key, value) in &options.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    for mount in &options.mounts {
        args.push("--volume".to_string());
        if mount.read_only {
            args.push(format!("{}:{}:ro", mount.source, mount.target));
        } else {
            args.push(format!("{}:{}", mount.source, mount.target));
        }
    }
    for mapping in &options.port_bindings {
        args.push("--publish".to_string());
        args.push(publish_arg(mapping));
    }
    if let Some(user) = &options.user {
        args.push("--user".to_string());
        args.push(user.clone());
    }
    if let Some(entrypoint) = &options.entrypoint {
        args.push("--entrypoint".to_string());
        args.push(
            serde_json::to_string(entrypoint)
                .map_err(|e| EngineError::malformed("podman create --entrypoint", e))?,
        );
    }
    if let Some(health) = &options.health_check {
        args.push("--health-cmd".to_string());
        args.push(
            serde_json::to_string(&health.test)
                .map_err(|e| EngineError::malformed("podman create --health-cmd", e))?,
        );
        args.push("--health-interval".to_string());
        args.push(format!("{}s", health.interval.as_secs()));
        args.push("--health-timeout".to_string());
        args.push(format!("{}s", health.timeout.as_secs()));
        args.push("--health-retries".to_string());
        args.push(health.retries.to_string());
    }

    args.push(options.image.clone());
    Ok(args)
}

pub(crate) fn pod_create_args(options: &PodCreateOptions) -> Vec<String> {
    let mut args = vec![
        "pod".to_string(),
        "create".to_string(),
        "--name".to_string(),
        options.name.clone(),
    ];
    for mapping in &options.port_mappings {
        args.push("--publish".to_string());
        args.push(publish_arg(mapping));
    }
    args
}

pub(crate) fn build_args(options: &BuildOptions) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "--quiet".to_string(),
        "--tag".to_string(),
        options.tag.clone(),
    ];
    for (key, value) in &options.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }
    if let Some(file) = &options.containerfile {
        args.push("--file".to_string());
        args.push(file.display().to_string());
    }
    args.push(options.context_dir.display().to_string());
    args
}

#[derive(Debug, Deserialize)]
struct PsEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Image", default)]
    image: String,
    #[serde(rename = "Names", default)]
    names: Option<Vec<String>>,
    #[serde(rename = "Labels", default)]
    labels: Option<BTreeMap<String, String>>,
    #[serde(rename = "Ports", default)]
    ports: Option<Vec<PsPort>>,
    #[serde(rename = "Pod", default)]
    pod: Option<String>,
    #[serde(rename = "State", default)]
    state: String,
}

#[derive(Debug, Deserialize)]
struct PsPort {
    #[serde(default)]
    host_ip: String,
    #[serde(default)]
    container_port: u16,
    #[serde(default)]
    host_port: u16,
    #[serde(default)]
    protocol: String,
}

pub(crate) fn parse_ps(engine_id: &str, json: &str) -> Result<Vec<ContainerInfo>, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<PsEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|entry| ContainerInfo {
            id: entry.id,
            engine_id: engine_id.to_string(),
            image: entry.image,
            names: entry.names.unwrap_or_default(),
            labels: entry.labels.unwrap_or_default(),
            ports: entry
                .ports
                .unwrap_or_default()
                .into_iter()
                .map(|p| PortMapping {
                    host_ip: p.host_ip,
                    host_port: p.host_port,
                    container_port: p.container_port,
                    protocol: if p.protocol.is_empty() { "tcp".to_string() } else { p.protocol },
                })
                .collect(),
            pod: entry.pod.filter(|p| !p.is_empty()),
            state: entry.state,
        })
        .collect())
}

#[derive(Debug, Deserialize)]
struct InspectEntry {
    #[serde(rename = "Id")]
    id: String,
    #[serde(rename = "Config", default)]
    config: Option<InspectConfig>,
    #[serde(rename = "State", default)]
    state: Option<InspectState>,
}

#[derive(Debug, Deserialize)]
struct InspectConfig {
    #[serde(rename = "Env", default)]
    env: Option<Vec<String>>,
    #[serde(rename = "Labels", default)]
    labels: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct InspectState {
    #[serde(rename = "Running", default)]
    running: bool,
}

pub(crate) fn parse_inspect(json: &str) -> Result<Option<ContainerInspect>, serde_json::Error> {
    let entries: Vec<InspectEntry> = serde_json::from_str(json)?;
    Ok(entries.into_iter().next().map(|entry| {
        let (env, labels) = match entry.config {
            Some(config) => (
                config.env.unwrap_or_default(),
                config.labels.unwrap_or_default(),
            ),
            None => (Vec::new(), BTreeMap::new()),
        };
        ContainerInspect {
            id: entry.id,
            env,
            labels,
            running: entry.state.map(|s| s.running).unwrap_or(false),
        }
    }))
}

#[derive(Debug, Deserialize)]
struct EventLine {
    #[serde(rename = "ID", alias = "id", default)]
    id: String,
    #[serde(rename = "Status", alias = "status", default)]
    status: String,
    #[serde(rename = "Type", alias = "type", default)]
    kind: String,
}

pub(crate) fn parse_event_line(line: &str) -> Option<ContainerEvent> {
    let event: EventLine = serde_json::from_str(line).ok()?;
    if event.id.is_empty() {
        return None;
    }
    Some(ContainerEvent {
        kind: event.kind.to_lowercase(),
        status: event.status,
        id: event.id,
    })
}

#[derive(Debug, Deserialize)]
struct ConnectionEntry {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "URI", default)]
    uri: String,
    #[serde(rename = "Default", default)]
    default: bool,
}

/// Parses `podman system connection list` output; the default connection comes first.
pub(crate) fn parse_connections(json: &str) -> Result<Vec<ProviderConnection>, serde_json::Error> {
    if json.trim().is_empty() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<ConnectionEntry> = serde_json::from_str(json)?;
    entries.sort_by_key(|entry| !entry.default);
    Ok(entries
        .into_iter()
        .map(|entry| ProviderConnection {
            name: entry.name,
            kind: ProviderKind::Podman,
            status: ProviderStatus::Unknown,
            endpoint: entry.uri,
        })
        .collect())
}
