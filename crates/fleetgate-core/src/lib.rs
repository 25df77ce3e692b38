//! fleetgate-core — shared types for the fleetgate controller.
//!
//! Holds the configuration model (`fleetgate.toml`), the domain types
//! shared by the fleet and autoscale crates, and the JSON messages that
//! travel over the request and response queues.

pub mod config;
pub mod duration;
pub mod error;
pub mod message;
pub mod types;

pub use config::FleetgateConfig;
pub use error::{ConfigError, ConfigResult};
pub use message::{RequestMessage, ResponseMessage, derive_identifier};
pub use types::*;
