pub mod configuration;
pub mod controller;
pub mod engine;
pub mod error_handling;
pub mod service_management;
pub mod transport;
pub mod web_interface;

pub use controller::Controller;
pub use service_management::ServicesManager;
