use log::debug;
use std::net::{Ipv4Addr, TcpListener};

use crate::error_handling::types::ServiceError;

/// Returns the first port at or above `start` that can be bound on all interfaces.
pub fn find_free_port(start: u16) -> Result<u16, ServiceError> {
    for port in start.max(1)..=u16::MAX {
        if is_port_free(port) {
            debug!("Port {} is free", port);
            return Ok(port);
        }
    }
    Err(ServiceError::Precondition(format!(
        "no free port at or above {}",
        start
    )))
}

/// [`find_free_port`] on the blocking pool; the scan may bind thousands of sockets.
pub async fn next_free_port(start: u16) -> Result<u16, ServiceError> {
    tokio::task::spawn_blocking(move || find_free_port(start))
        .await
        .map_err(|e| ServiceError::Io(std::io::Error::other(e)))?
}

fn is_port_free(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)).is_ok()
}
