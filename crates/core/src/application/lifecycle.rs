//! Maintenance lifecycle: open Findings against targets, close them later
//!
//! Batches run strictly one entity at a time. Entity i+1 is not touched
//! until entity i is committed or has exhausted its retries. A failure
//! aborts the rest of the batch; work already committed stays committed.

use crate::application::retry::{RetryClass, RetryError, RetryExecutor};
use crate::domain::{
    derive_maintenance_id, finding_entity_key, relationship_key, relationship_type, CloseInfo,
    FindingStatus, MaintenanceContent, MaintenanceId, TargetEntity, FINDING_CLASS, FINDING_TYPE,
    HAS_CLASS, OWNER,
};
use crate::error::{AppError, Result};
use crate::port::{EntityUpsert, GraphClient, GraphError, IdProvider, RelationshipUpsert};
use serde_json::{json, Map};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, info_span, warn, Instrument};

/// One target that received a Finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedFinding {
    pub target_id: String,
    pub finding_key: String,
    pub finding_id: String,
    pub relationship_id: String,
}

/// Outcome of [`MaintenanceLifecycleManager::apply_maintenance`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    pub maintenance_id: MaintenanceId,
    pub applied: Vec<AppliedFinding>,
    /// Targets whose Finding for this content is already closed
    pub skipped: Vec<SkippedEntity>,
}

/// Why an entity was left untouched by an apply or close
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotAFinding,
    MissingKey,
    AlreadyClosed,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotAFinding => write!(f, "not a maintenance finding"),
            SkipReason::MissingKey => write!(f, "finding has no _key"),
            SkipReason::AlreadyClosed => write!(f, "finding is already closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedEntity {
    pub entity_id: String,
    pub entity_type: String,
    pub reason: SkipReason,
}

/// Outcome of [`MaintenanceLifecycleManager::close_maintenance`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CloseReport {
    /// Ids of Findings now closed
    pub closed: Vec<String>,
    pub skipped: Vec<SkippedEntity>,
}

/// Orchestrates Finding creation and closure against a graph store
pub struct MaintenanceLifecycleManager {
    graph: Arc<dyn GraphClient>,
    retry: RetryExecutor,
    id_provider: Arc<dyn IdProvider>,
}

impl MaintenanceLifecycleManager {
    /// # Arguments
    /// * `graph` - Graph client (one session reused for every call)
    /// * `retry` - Retry executor wrapping each remote call
    /// * `id_provider` - Source of batch ids for log correlation
    pub fn new(
        graph: Arc<dyn GraphClient>,
        retry: RetryExecutor,
        id_provider: Arc<dyn IdProvider>,
    ) -> Self {
        Self {
            graph,
            retry,
            id_provider,
        }
    }

    /// Run a query and return its entities as-is (possibly empty)
    pub async fn gather_entities(&self, query: &str) -> Result<Vec<TargetEntity>> {
        let graph = &self.graph;
        let entities = self
            .retry
            .execute_classified("query", || graph.query_by_language(query), classify)
            .await
            .map_err(|e| retry_failure("query", e))?;

        info!(count = entities.len(), "Query returned entities");
        Ok(entities)
    }

    /// Open (or refresh) a Finding for `content` on every target
    ///
    /// Re-applying identical content to the same target merges onto the
    /// same Finding and edge. Targets whose Finding is already closed are
    /// skipped, so a re-apply never reopens it.
    ///
    /// # Errors
    /// - `Domain` if `content` fails validation (nothing is written)
    /// - `BatchAborted` when a remote call gives up; earlier targets stay committed
    pub async fn apply_maintenance(
        &self,
        entities: &[TargetEntity],
        content: &MaintenanceContent,
    ) -> Result<ApplyReport> {
        content.validate()?;

        let maintenance_id = derive_maintenance_id(content);
        let batch_id = self.id_provider.generate_id();
        let span = info_span!("apply_maintenance", %batch_id, %maintenance_id, total = entities.len());

        async {
            let closed = self.closed_finding_keys(&maintenance_id).await?;
            let mut applied = Vec::with_capacity(entities.len());
            let mut skipped = Vec::new();
            for (index, target) in entities.iter().enumerate() {
                let finding_key = finding_entity_key(target, &maintenance_id);
                if closed.contains(&finding_key) {
                    warn!(
                        target_id = %target.id,
                        %finding_key,
                        "Maintenance already closed for {}, skipping",
                        target.label()
                    );
                    skipped.push(SkippedEntity {
                        entity_id: target.id.clone(),
                        entity_type: target.entity_type.clone(),
                        reason: SkipReason::AlreadyClosed,
                    });
                    continue;
                }
                match self
                    .apply_one(target, content, &maintenance_id, finding_key)
                    .await
                {
                    Ok(finding) => applied.push(finding),
                    Err(e) => return Err(abort(index, target, applied.len(), e)),
                }
            }

            info!(
                applied = applied.len(),
                skipped = skipped.len(),
                "Maintenance applied"
            );
            Ok(ApplyReport {
                maintenance_id: maintenance_id.clone(),
                applied,
                skipped,
            })
        }
        .instrument(span)
        .await
    }

    async fn apply_one(
        &self,
        target: &TargetEntity,
        content: &MaintenanceContent,
        maintenance_id: &str,
        finding_key: String,
    ) -> Result<AppliedFinding> {
        info!(
            target_id = %target.id,
            target_type = %target.entity_type,
            "Creating {} -HAS-> {} graph elements",
            target.entity_type,
            FINDING_TYPE
        );

        let finding = EntityUpsert {
            key: finding_key,
            entity_type: FINDING_TYPE.to_string(),
            class: FINDING_CLASS.to_string(),
            properties: content.open_properties(maintenance_id),
        };
        let finding_id = self.upsert_entity("create finding", &finding).await?;

        let mut edge_props = Map::new();
        edge_props.insert(
            "displayName".into(),
            json!(format!("{}:{}:{}", target.label(), HAS_CLASS, FINDING_TYPE)),
        );
        edge_props.insert("owner".into(), json!(OWNER));

        let edge = RelationshipUpsert {
            key: relationship_key(&target.id, &finding_id),
            relationship_type: relationship_type(&target.entity_type),
            class: HAS_CLASS.to_string(),
            from_id: target.id.clone(),
            to_id: finding_id.clone(),
            properties: edge_props,
        };
        let graph = &self.graph;
        let relationship_id = self
            .retry
            .execute_classified(
                "create relationship",
                || graph.upsert_relationship(&edge),
                classify,
            )
            .await
            .map_err(|e| retry_failure("create relationship", e))?;

        Ok(AppliedFinding {
            target_id: target.id.clone(),
            finding_key: finding.key,
            finding_id,
            relationship_id: relationship_id.0,
        })
    }

    /// Close every open Finding among `entities`
    ///
    /// Non-Finding entities, Findings without a key and Findings that are
    /// already closed are skipped with a warning. Only the close fields are
    /// sent; all other Finding properties survive through the merge contract.
    pub async fn close_maintenance(
        &self,
        entities: &[TargetEntity],
        close: &CloseInfo,
    ) -> Result<CloseReport> {
        close.validate()?;

        let batch_id = self.id_provider.generate_id();
        let span = info_span!("close_maintenance", %batch_id, total = entities.len());

        async {
            let mut report = CloseReport::default();
            for (index, entity) in entities.iter().enumerate() {
                let key = match closable_key(entity) {
                    Ok(key) => key,
                    Err(reason) => {
                        warn!(
                            entity_id = %entity.id,
                            entity_type = %entity.entity_type,
                            %reason,
                            "Skipping {} entity",
                            entity.entity_type
                        );
                        report.skipped.push(SkippedEntity {
                            entity_id: entity.id.clone(),
                            entity_type: entity.entity_type.clone(),
                            reason,
                        });
                        continue;
                    }
                };

                info!(finding_id = %entity.id, "Closing maintenance finding for {}", entity.label());
                let request = EntityUpsert {
                    key: key.to_string(),
                    entity_type: FINDING_TYPE.to_string(),
                    class: FINDING_CLASS.to_string(),
                    properties: close.close_properties(),
                };
                match self.upsert_entity("close finding", &request).await {
                    Ok(_) => report.closed.push(entity.id.clone()),
                    Err(e) => return Err(abort(index, entity, report.closed.len(), e)),
                }
            }

            info!(
                closed = report.closed.len(),
                skipped = report.skipped.len(),
                "Maintenance closed"
            );
            Ok(report)
        }
        .instrument(span)
        .await
    }

    /// Keys of this maintenance's Findings that are already closed
    async fn closed_finding_keys(&self, maintenance_id: &str) -> Result<HashSet<String>> {
        let query = format!(
            "FIND {} WITH maintenanceId = \"{}\" AND closed = true",
            FINDING_TYPE, maintenance_id
        );
        let findings = self.gather_entities(&query).await?;
        Ok(findings
            .iter()
            .filter(|f| f.property_str("maintenanceId") == Some(maintenance_id))
            .filter(|f| FindingStatus::of(f) == Some(FindingStatus::Closed))
            .filter_map(|f| f.key.clone())
            .collect())
    }

    async fn upsert_entity(&self, operation: &str, request: &EntityUpsert) -> Result<String> {
        let graph = &self.graph;
        self.retry
            .execute_classified(operation, || graph.upsert_entity(request), classify)
            .await
            .map(|id| id.0)
            .map_err(|e| retry_failure(operation, e))
    }
}

/// Key to close at, or why the entity must be skipped
fn closable_key(entity: &TargetEntity) -> std::result::Result<&str, SkipReason> {
    if entity.entity_type != FINDING_TYPE {
        return Err(SkipReason::NotAFinding);
    }
    let key = entity.key.as_deref().ok_or(SkipReason::MissingKey)?;
    let status = FindingStatus::of(entity).unwrap_or(FindingStatus::Open);
    status.close().map_err(|_| SkipReason::AlreadyClosed)?;
    Ok(key)
}

/// Rejected requests will fail the same way on every attempt
fn classify(err: &GraphError) -> RetryClass {
    if err.is_retryable() {
        RetryClass::Retryable
    } else {
        RetryClass::Terminal
    }
}

fn retry_failure(operation: &str, err: RetryError<GraphError>) -> AppError {
    match err {
        RetryError::Exhausted { attempts, last } => AppError::RetryExhausted {
            operation: operation.to_string(),
            attempts,
            source: last,
        },
        RetryError::Terminal { error, .. } => AppError::Graph(error),
    }
}

fn abort(index: usize, entity: &TargetEntity, committed: usize, source: AppError) -> AppError {
    error!(
        index,
        entity_id = %entity.id,
        committed,
        error = %source,
        "Aborting batch"
    );
    AppError::BatchAborted {
        index,
        entity_id: entity.id.clone(),
        committed,
        source: Box::new(source),
    }
}
