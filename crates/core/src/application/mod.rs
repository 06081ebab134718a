// Application Layer - Use Cases and Business Logic

pub mod lifecycle;
pub mod report;
pub mod retry;

// Re-exports
pub use lifecycle::{
    AppliedFinding, ApplyReport, CloseReport, MaintenanceLifecycleManager, SkipReason,
    SkippedEntity,
};
pub use report::MaintenanceSummary;
pub use retry::{MaxAttempts, RetryClass, RetryError, RetryExecutor, RetryPolicy};
