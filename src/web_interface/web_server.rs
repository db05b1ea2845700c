use log::info;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use warp::Filter;

use super::routes::*;
use crate::error_handling::types::WebError;
use crate::service_management::ServicesManager;
use crate::transport::WatchTransport;

/// HTTP API in front of the services manager
pub struct WebServer {
    manager: Arc<ServicesManager>,
    transport: Arc<WatchTransport>,
    poll_timeout: Duration,
}

impl WebServer {
    pub fn new(
        manager: Arc<ServicesManager>,
        transport: Arc<WatchTransport>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            transport,
            poll_timeout,
        }
    }

    /// Serve the API on `addr` until the surrounding task is dropped
    pub async fn start(&self, addr: SocketAddr) -> Result<(), WebError> {
        // warp::serve panics when the address is taken
        std::net::TcpListener::bind(addr)
            .map_err(|e| WebError::BindFailed(format!("{}: {}", addr, e)))?;

        let routes = dashboard_route()
            .or(list_services_route(self.manager.clone()))
            .or(create_service_route(self.manager.clone()))
            .or(connection_strings_route(self.manager.clone()))
            .or(service_details_route(self.manager.clone()))
            .or(images_route(self.manager.clone()))
            .or(free_port_route(self.manager.clone()))
            .or(state_route(self.transport.clone(), self.poll_timeout));

        info!("HTTP API listening on http://{}", addr);
        warp::serve(routes).run(addr).await;
        Ok(())
    }
}
