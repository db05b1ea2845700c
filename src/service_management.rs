//! Database service lifecycle.
//!
//! Discovers postgres containers running under the engine, keeps a registry of
//! them in sync with engine events, and provisions new ones, optionally paired
//! with a pgadmin console.
//!
//! Re-exports:
//! - [`ServicesManager`]: façade used by the HTTP layer and the controller.
//! - [`TrackedService`], [`ProvisioningRequest`], [`ConnectionStrings`]: core types.
//!
//! Example (non-running):
//! ```ignore
//! use std::sync::Arc;
//! use pgservices::engine::PodmanCli;
//! use pgservices::service_management::{PathTranslator, ProvisionerSettings, ServicesManager};
//! use pgservices::transport::WatchTransport;
//!
//! let manager = ServicesManager::new(
//!     Arc::new(PodmanCli::new("podman", timeout, backoff)),
//!     Arc::new(WatchTransport::new()),
//!     settings,
//!     PathTranslator::for_host()?,
//! );
//! let events = manager.init().await;
//! for service in manager.services() {
//!     println!("{} on port {}", service.name, service.port);
//! }
//! ```

pub mod catalog;
pub mod classifier;
pub mod connection_info;
pub mod path_translator;
pub mod ports;
pub mod provisioner;
pub mod reconciler;
pub mod registry;
pub mod services_manager;
pub mod types;

pub use path_translator::PathTranslator;
pub use provisioner::ProvisionerSettings;
pub use services_manager::ServicesManager;
pub use types::{ConnectionStrings, InitScript, ProvisioningRequest, TrackedService};
