use log::{error, info};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;

use crate::engine::ContainerEngine;
use crate::error_handling::types::ServiceError;
use crate::service_management::catalog::{self, ServiceImage};
use crate::service_management::connection_info;
use crate::service_management::path_translator::PathTranslator;
use crate::service_management::ports;
use crate::service_management::provisioner::{Provisioner, ProvisionerSettings};
use crate::service_management::reconciler::Reconciler;
use crate::service_management::registry::ServiceRegistry;
use crate::service_management::types::{ConnectionStrings, ProvisioningRequest, TrackedService};
use crate::transport::UiTransport;

const EVENT_BUFFER: usize = 256;

/// Entry point used by the HTTP façade and the controller.
///
/// Owns the registry (through its reconciler) and serializes provisioning so two
/// `create_service` calls never race for the same ports.
pub struct ServicesManager {
    engine: Arc<dyn ContainerEngine>,
    registry: Arc<ServiceRegistry>,
    reconciler: Arc<Reconciler>,
    provisioner: Provisioner,
    provisioning: Mutex<()>,
}

impl ServicesManager {
    pub fn new(
        engine: Arc<dyn ContainerEngine>,
        transport: Arc<dyn UiTransport>,
        settings: ProvisionerSettings,
        paths: PathTranslator,
    ) -> Self {
        let registry = Arc::new(ServiceRegistry::new());
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&engine),
            Arc::clone(&registry),
            transport,
        ));
        let provisioner = Provisioner::new(Arc::clone(&engine), settings, paths);
        Self {
            engine,
            registry,
            reconciler,
            provisioner,
            provisioning: Mutex::new(()),
        }
    }

    /// Subscribes to engine events, runs the first pass and spawns the event loop.
    ///
    /// Neither a failed subscription nor a failed first pass stops startup.
    pub async fn init(&self) -> JoinHandle<()> {
        let (sender, receiver) = mpsc::channel(EVENT_BUFFER);
        if let Err(e) = self.engine.subscribe(sender).await {
            error!("Unable to subscribe to engine events: {}", e);
        }

        match self.reconciler.reconcile(None).await {
            Ok(outcome) => info!("Initial reconciliation: {:?}", outcome),
            Err(e) => error!("Initial reconciliation failed: {}", e),
        }

        tokio::spawn(Arc::clone(&self.reconciler).run(receiver))
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn services(&self) -> Vec<TrackedService> {
        self.registry.list()
    }

    pub fn service_details(&self, container_id: &str) -> Result<TrackedService, ServiceError> {
        self.registry
            .get(container_id)
            .ok_or_else(|| ServiceError::NotFound(container_id.to_string()))
    }

    pub fn connection_strings(&self, container_id: &str) -> Result<ConnectionStrings, ServiceError> {
        let service = self.service_details(container_id)?;
        Ok(connection_info::connection_strings(&service))
    }

    pub fn service_images(&self) -> &'static [ServiceImage] {
        catalog::service_images()
    }

    pub async fn free_port(&self, start: u16) -> Result<u16, ServiceError> {
        ports::next_free_port(start).await
    }

    /// Provisions a service; the new container shows up on a later pass.
    pub async fn create_service(
        &self,
        name: &str,
        request: &ProvisioningRequest,
    ) -> Result<String, ServiceError> {
        let _guard = self.provisioning.lock().await;
        self.provisioner.create_service(name, request).await
    }
}
