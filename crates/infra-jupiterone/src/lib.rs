// Deferred Maintenance Infrastructure - JupiterOne Adapter
// Implements: GraphClient over the JupiterOne GraphQL API

mod client;
mod config;
mod graphql;

pub use client::JupiterOneClient;
pub use config::{JupiterOneConfig, DEV_ENDPOINT, PRODUCTION_ENDPOINT};
