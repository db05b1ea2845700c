//! Container Engine Trait
//!
//! This module defines the `ContainerEngine` trait, the capability interface the services
//! manager consumes. Implementors own every interaction with the host container engine:
//! - Enumerating provider connections and the engines behind them
//! - Listing and inspecting containers
//! - Delivering container lifecycle and provider transition events
//! - Pulling and building images
//! - Creating and starting containers and pods
//!
//! All methods return a `Result` so adapter failures reach the caller untouched.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::engine::types::{
    BuildOptions, ContainerCreateOptions, ContainerInfo, ContainerInspect, EngineEvent,
    EngineInfo, PodCreateOptions, PodHandle, ProviderConnection,
};
use crate::error_handling::types::EngineError;

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Lists every provider connection known to the host, started or not.
    async fn list_providers(&self) -> Result<Vec<ProviderConnection>, EngineError>;

    /// Lists the engine instances reachable through `provider`.
    async fn list_engines(
        &self,
        provider: &ProviderConnection,
    ) -> Result<Vec<EngineInfo>, EngineError>;

    /// Lists live containers across all started engines.
    async fn list_containers(&self) -> Result<Vec<ContainerInfo>, EngineError>;

    async fn inspect_container(
        &self,
        engine_id: &str,
        container_id: &str,
    ) -> Result<ContainerInspect, EngineError>;

    /// Starts delivering events into `events` until the receiving side is dropped.
    async fn subscribe(&self, events: mpsc::Sender<EngineEvent>) -> Result<(), EngineError>;

    async fn pull_image(
        &self,
        provider: &ProviderConnection,
        image: &str,
    ) -> Result<(), EngineError>;

    /// Builds an image and returns its id.
    async fn build_image(
        &self,
        engine_id: &str,
        options: &BuildOptions,
    ) -> Result<String, EngineError>;

    /// Creates a container without starting it and returns its id.
    async fn create_container(
        &self,
        engine_id: &str,
        options: &ContainerCreateOptions,
    ) -> Result<String, EngineError>;

    async fn start_container(&self, engine_id: &str, container_id: &str)
        -> Result<(), EngineError>;

    async fn create_pod(
        &self,
        provider: &ProviderConnection,
        options: &PodCreateOptions,
    ) -> Result<PodHandle, EngineError>;

    /// Starts a pod together with all of its member containers.
    async fn start_pod(&self, engine_id: &str, pod_id: &str) -> Result<(), EngineError>;
}
