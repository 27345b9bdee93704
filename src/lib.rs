#![deny(clippy::expect_used)]
#![deny(clippy::unwrap_used)]

pub mod client;
pub mod config;
pub mod device;
pub mod enumerator;
pub mod error;
pub mod naming;
pub mod orchestrator;
pub mod pipeline;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod streams;
mod web_server;

pub use error::{HubError, HubResult};
