//! Container engine boundary.
//!
//! The services manager never talks to the host engine directly: it consumes the
//! [`ContainerEngine`] capability trait. [`PodmanCli`] implements it on top of the
//! `podman` binary.
//!
//! Re-exports:
//! - [`ContainerEngine`]: the capability interface.
//! - [`PodmanCli`]: command-line backed implementation.

pub mod engine_trait;
#[cfg(test)]
pub mod fake_engine;
pub mod podman_cli;
pub mod types;

pub use engine_trait::ContainerEngine;
pub use podman_cli::PodmanCli;
