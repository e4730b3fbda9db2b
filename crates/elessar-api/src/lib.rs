// elessar-api: Async client for the lighting bridge HTTP API

pub mod client;
pub mod endpoints;
pub mod error;
pub mod models;
pub mod transport;

pub use client::BridgeClient;
pub use error::Error;
pub use models::{BridgeConfig, Group, GroupAction};
pub use transport::TransportConfig;
