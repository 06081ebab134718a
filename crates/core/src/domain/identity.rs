//! Identity derivation for Findings and HAS edges
//!
//! Every id here is a pure function of its inputs so that re-applying the
//! same maintenance to the same target lands on the same graph node.

use crate::domain::finding::{MaintenanceContent, FINDING_TYPE, HAS_CLASS};
use crate::domain::target::TargetEntity;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Content hash identifying one piece of maintenance (64 hex chars)
pub type MaintenanceId = String;

/// Derive the content hash of a maintenance record
///
/// Fields are collected into a sorted map before hashing, so the result does
/// not depend on the order in which they were supplied or serialized.
pub fn derive_maintenance_id(content: &MaintenanceContent) -> MaintenanceId {
    let mut canonical: BTreeMap<&str, Value> = BTreeMap::new();
    canonical.insert("shortDescription", Value::from(content.short_description.as_str()));
    canonical.insert("description", Value::from(content.description.as_str()));
    canonical.insert("webLink", Value::from(content.web_link.as_str()));
    canonical.insert("dueDate", Value::from(content.due_date));
    if let Some(created_by) = &content.created_by {
        canonical.insert("createdBy", Value::from(created_by.as_str()));
    }

    let mut hasher = Sha256::new();
    for (field, value) in &canonical {
        hasher.update(field.as_bytes());
        hasher.update(b"=");
        hasher.update(value.to_string().as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Compose the unique `_key` of a Finding
///
/// Format: `type:class:displayName:targetId:maintenanceId`
pub fn compose_entity_key(
    type_string: &str,
    class: &str,
    display_name: &str,
    target_id: &str,
    maintenance_id: &str,
) -> String {
    format!(
        "{}:{}:{}:{}:{}",
        type_string, class, display_name, target_id, maintenance_id
    )
}

/// `_key` of the Finding recording `maintenance_id` against `target`
pub fn finding_entity_key(target: &TargetEntity, maintenance_id: &str) -> String {
    compose_entity_key(
        FINDING_TYPE,
        &target.class,
        target.label(),
        &target.id,
        maintenance_id,
    )
}

/// `_key` of the HAS edge between a target and its Finding
pub fn relationship_key(target_id: &str, finding_id: &str) -> String {
    format!("{}:{}:{}", target_id, HAS_CLASS, finding_id)
}

/// `_type` of the HAS edge for a given target type
pub fn relationship_type(target_type: &str) -> String {
    format!("{}_has_{}", target_type, FINDING_TYPE)
}
