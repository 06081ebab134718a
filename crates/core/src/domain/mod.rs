// Domain Layer - Pure business logic and entities

pub mod due;
pub mod error;
pub mod finding;
pub mod identity;
pub mod target;

// Re-exports
pub use due::{parse_due_date, DueWindow};
pub use error::DomainError;
pub use finding::{
    CloseInfo, CloseReason, FindingStatus, MaintenanceContent, FINDING_CLASS, FINDING_TYPE,
    HAS_CLASS, OWNER,
};
pub use identity::{
    derive_maintenance_id, finding_entity_key, relationship_key, relationship_type,
    MaintenanceId,
};
pub use target::{EntityId, TargetEntity};
