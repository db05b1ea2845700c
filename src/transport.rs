//! Push channel from the services manager to the UI.
//!
//! Re-exports:
//! - [`UiTransport`]: what the reconciler publishes through.
//! - [`WatchTransport`]: latest-value transport served over long polling.

pub mod transport_trait;
pub mod watch_transport;

pub use transport_trait::{StateMessage, UiTransport};
pub use watch_transport::WatchTransport;
