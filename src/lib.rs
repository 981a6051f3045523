// Library crate shared by the binary and the integration tests.

pub mod aggregator;
pub mod config;
pub mod connection;
pub mod dto;
pub mod error;
pub mod metrics;
pub mod pagination;
pub mod routes;
pub mod server;
pub mod snapshot;
pub mod state;
pub mod transport;
