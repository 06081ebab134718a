// Deferred Maintenance Core - Domain Logic & Ports
// NO infrastructure dependencies: the graph store is reached only through port::GraphClient

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use error::{AppError, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
