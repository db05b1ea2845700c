use log::{error, info};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::configuration::config::Config;
use crate::engine::{ContainerEngine, PodmanCli};
use crate::error_handling::types::*;
use crate::service_management::{PathTranslator, ProvisionerSettings, ServicesManager};
use crate::transport::WatchTransport;
use crate::web_interface::WebServer;

/// Wires the engine, the services manager and the HTTP API together.
pub struct Controller {
    pub config: Config,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate().map_err(|e| {
            error!("Rejecting configuration: {}", e);
            ControllerError::ConfigurationError(e)
        })?;
        Ok(Self { config })
    }

    pub fn provisioner_settings(&self) -> ProvisionerSettings {
        ProvisionerSettings {
            storage_root: self.config.storage.root.clone(),
            use_pod: self.config.provisioning.use_pod,
            pgadmin_email: self.config.provisioning.pgadmin_email.clone(),
            pgadmin_password: self.config.provisioning.pgadmin_password.clone(),
        }
    }

    /// Runs until Ctrl-C or until the HTTP server stops.
    pub async fn run(&self) -> Result<(), ControllerError> {
        let addr = self.config.socket_address()?;

        let engine: Arc<dyn ContainerEngine> = Arc::new(PodmanCli::new(
            self.config.engine.binary.clone(),
            self.config.call_timeout(),
            self.config.restart_backoff(),
        ));
        let paths = PathTranslator::for_host().map_err(|e| {
            ControllerError::InitializationFailed(format!("invalid drive pattern: {}", e))
        })?;
        let transport = Arc::new(WatchTransport::new());
        let manager = Arc::new(ServicesManager::new(
            engine,
            transport.clone(),
            self.provisioner_settings(),
            paths,
        ));

        info!("Starting services manager");
        let events = manager.init().await;

        let server = WebServer::new(manager, transport, self.config.long_poll_timeout());
        let result = tokio::select! {
            served = server.start(addr) => served.map_err(ControllerError::from),
            signal = tokio::signal::ctrl_c() => match signal {
                Ok(()) => {
                    info!("Shutdown requested");
                    Ok(())
                }
                Err(e) => Err(ControllerError::InitializationFailed(format!(
                    "unable to listen for Ctrl-C: {}",
                    e
                ))),
            },
        };

        self.shutdown(events);
        result
    }

    fn shutdown(&self, events: JoinHandle<()>) {
        events.abort();
        info!("Reconciliation loop stopped");
    }
}
