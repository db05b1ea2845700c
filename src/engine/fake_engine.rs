//! In-memory `ContainerEngine` used by unit tests. Records every call and lets tests
//! inject failures by call name.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::engine::engine_trait::ContainerEngine;
use crate::engine::types::{
    BuildOptions, ContainerCreateOptions, ContainerInfo, ContainerInspect, EngineEvent,
    EngineInfo, PodCreateOptions, PodHandle, ProviderConnection, ProviderKind, ProviderStatus,
};
use crate::error_handling::types::EngineError;

#[derive(Default)]
pub struct FakeState {
    pub providers: Vec<ProviderConnection>,
    pub engines: Vec<EngineInfo>,
    pub containers: Vec<ContainerInfo>,
    pub inspects: HashMap<String, ContainerInspect>,
    pub calls: Vec<String>,
    pub created: Vec<(String, ContainerCreateOptions)>,
    pub pods: Vec<(String, PodCreateOptions)>,
    pub pulled: Vec<String>,
    pub fail_on: Option<String>,
    next_id: usize,
}

#[derive(Default)]
pub struct FakeEngine {
    pub state: Mutex<FakeState>,
    subscribers: Mutex<Vec<mpsc::Sender<EngineEvent>>>,
}

pub fn provider(name: &str, status: ProviderStatus) -> ProviderConnection {
    ProviderConnection {
        name: name.to_string(),
        kind: ProviderKind::Podman,
        status,
        endpoint: "local".to_string(),
    }
}

pub fn container(id: &str, image: &str) -> ContainerInfo {
    ContainerInfo {
        id: id.to_string(),
        engine_id: "podman".to_string(),
        image: image.to_string(),
        names: vec![format!("/{}", id)],
        state: "running".to_string(),
        ..Default::default()
    }
}

pub fn inspect(id: &str, env: &[&str]) -> ContainerInspect {
    ContainerInspect {
        id: id.to_string(),
        env: env.iter().map(|e| e.to_string()).collect(),
        labels: BTreeMap::new(),
        running: true,
    }
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// An engine with one started podman provider exposing one engine.
    pub fn with_started_provider() -> Self {
        let engine = Self::new();
        {
            let mut state = engine.state.lock().unwrap();
            state.providers.push(provider("podman", ProviderStatus::Started));
            state.engines.push(EngineInfo {
                id: "podman".to_string(),
                name: "podman".to_string(),
            });
        }
        engine
    }

    pub fn add_container(&self, info: ContainerInfo, inspect: ContainerInspect) {
        let mut state = self.state.lock().unwrap();
        state.inspects.insert(info.id.clone(), inspect);
        state.containers.push(info);
    }

    pub fn remove_container(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        state.containers.retain(|c| c.id != id);
        state.inspects.remove(id);
    }

    /// Leaves the container listed but exited, as `podman ps --all` reports it.
    pub fn stop_container(&self, id: &str) {
        let mut state = self.state.lock().unwrap();
        for info in state.containers.iter_mut().filter(|c| c.id == id) {
            info.state = "exited".to_string();
        }
        if let Some(inspect) = state.inspects.get_mut(id) {
            inspect.running = false;
        }
    }

    pub fn fail_on(&self, call: &str) {
        self.state.lock().unwrap().fail_on = Some(call.to_string());
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    pub async fn emit(&self, event: EngineEvent) {
        let subscribers = self.subscribers.lock().unwrap().clone();
        for subscriber in subscribers {
            let _ = subscriber.send(event.clone()).await;
        }
    }

    fn record(&self, call: &str) -> Result<(), EngineError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(call.to_string());
        if state.fail_on.as_deref() == Some(call) {
            return Err(EngineError::CommandFailed {
                command: call.to_string(),
                stderr: "injected failure".to_string(),
                exit_code: Some(125),
            });
        }
        Ok(())
    }

    fn next_id(&self, prefix: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        format!("{}-{}", prefix, state.next_id)
    }

    /// Makes a created container visible in listings, as a started one would be.
    fn surface(&self, engine_id: &str, id: &str) {
        let mut state = self.state.lock().unwrap();
        let Some((_, options)) = state.created.iter().find(|(cid, _)| cid == id).cloned() else {
            return;
        };
        // Pod members report the pod's published ports, as podman does.
        let ports = match &options.pod {
            Some(pod_id) => state
                .pods
                .iter()
                .find(|(id, _)| id == pod_id)
                .map(|(_, pod)| pod.port_mappings.clone())
                .unwrap_or_default(),
            None => options.port_bindings.clone(),
        };
        let info = ContainerInfo {
            id: id.to_string(),
            engine_id: engine_id.to_string(),
            image: options.image.clone(),
            names: vec![options.name.clone()],
            labels: options.labels.clone(),
            ports,
            pod: options.pod.clone(),
            state: "running".to_string(),
        };
        let inspect = ContainerInspect {
            id: id.to_string(),
            env: options.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect(),
            labels: options.labels.clone(),
            running: true,
        };
        state.inspects.insert(id.to_string(), inspect);
        state.containers.push(info);
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn list_providers(&self) -> Result<Vec<ProviderConnection>, EngineError> {
        self.record("list_providers")?;
        Ok(self.state.lock().unwrap().providers.clone())
    }

    async fn list_engines(
        &self,
        _provider: &ProviderConnection,
    ) -> Result<Vec<EngineInfo>, EngineError> {
        self.record("list_engines")?;
        Ok(self.state.lock().unwrap().engines.clone())
    }

    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, EngineError> {
        self.record("list_containers")?;
        Ok(self.state.lock().unwrap().containers.clone())
    }

    async fn inspect_container(
        &self,
        _engine_id: &str,
        container_id: &str,
    ) -> Result<ContainerInspect, EngineError> {
        self.record("inspect_container")?;
        self.state
            .lock()
            .unwrap()
            .inspects
            .get(container_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(container_id.to_string()))
    }

    async fn subscribe(&self, events: mpsc::Sender<EngineEvent>) -> Result<(), EngineError> {
        self.record("subscribe")?;
        self.subscribers.lock().unwrap().push(events);
        Ok(())
    }

    async fn pull_image(
        &self,
        _provider: &ProviderConnection,
        image: &str,
    ) -> Result<(), EngineError> {
        self.record("pull_image")?;
        self.state.lock().unwrap().pulled.push(image.to_string());
        Ok(())
    }

    async fn build_image(
        &self,
        _engine_id: &str,
        _options: &BuildOptions,
    ) -> Result<String, EngineError> {
        self.record("build_image")?;
        Ok(self.next_id("img"))
    }

    async fn create_container(
        &self,
        _engine_id: &str,
        options: &ContainerCreateOptions,
    ) -> Result<String, EngineError> {
        self.record("create_container")?;
        let id = self.next_id("ctr");
        self.state
            .lock()
            .unwrap()
            .created
            .push((id.clone(), options.clone()));
        Ok(id)
    }

    async fn start_container(
        &self,
        engine_id: &str,
        container_id: &str,
    ) -> Result<(), EngineError> {
        self.record("start_container")?;
        self.surface(engine_id, container_id);
        Ok(())
    }

    async fn create_pod(
        &self,
        provider: &ProviderConnection,
        options: &PodCreateOptions,
    ) -> Result<PodHandle, EngineError> {
        self.record("create_pod")?;
        let pod_id = self.next_id("pod");
        self.state
            .lock()
            .unwrap()
            .pods
            .push((pod_id.clone(), options.clone()));
        Ok(PodHandle {
            engine_id: provider.name.clone(),
            pod_id,
        })
    }

    async fn start_pod(&self, engine_id: &str, pod_id: &str) -> Result<(), EngineError> {
        self.record("start_pod")?;
        let members: Vec<String> = self
            .state
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|(_, options)| options.pod.as_deref() == Some(pod_id))
            .map(|(id, _)| id.clone())
            .collect();
        for id in members {
            self.surface(engine_id, &id);
        }
        Ok(())
    }
}
