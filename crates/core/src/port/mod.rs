// Port Layer - Interfaces for external dependencies

pub mod graph_client;
pub mod id_provider; // For deterministic testing
pub mod time_provider;

// Re-exports
pub use graph_client::{EntityUpsert, GraphClient, GraphError, RelationshipUpsert, UpsertedId};
pub use id_provider::IdProvider;
pub use time_provider::TimeProvider;
