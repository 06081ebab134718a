//! Maintenance lifecycle integration tests
//!
//! Drive the lifecycle manager end to end against the in-memory graph
//! store: idempotent apply, content hashing, close semantics, retry bounds
//! and partial batch failure.

use std::sync::Arc;

use deferred_maintenance_core::application::report;
use deferred_maintenance_core::application::{
    MaintenanceLifecycleManager, MaxAttempts, RetryExecutor, RetryPolicy, SkipReason,
};
use deferred_maintenance_core::domain::{
    derive_maintenance_id, CloseInfo, CloseReason, MaintenanceContent, TargetEntity, FINDING_TYPE,
};
use deferred_maintenance_core::error::AppError;
use deferred_maintenance_core::port::graph_client::mocks::{
    Fault, GraphOperation, InMemoryGraphClient,
};
use deferred_maintenance_core::port::id_provider::SequentialIdProvider;
use deferred_maintenance_core::port::GraphError;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

const DUE: i64 = 1_767_225_600_000;

fn manager(graph: &Arc<InMemoryGraphClient>, max_attempts: u32) -> MaintenanceLifecycleManager {
    MaintenanceLifecycleManager::new(
        graph.clone(),
        RetryExecutor::new(RetryPolicy::immediate(MaxAttempts::bounded(max_attempts))),
        Arc::new(SequentialIdProvider::new("batch")),
    )
}

fn seed_repo(graph: &InMemoryGraphClient, id: &str, name: &str) -> TargetEntity {
    graph.seed_entity(
        TargetEntity::new(id, "github_repo", "CodeRepo")
            .with_key(format!("github_repo:{}", id))
            .with_name(name),
    )
}

fn content() -> MaintenanceContent {
    MaintenanceContent::new(
        "Upgrade tokio",
        "tokio 0.2 is out of support",
        "https://issues.example.com/DM-42",
        DUE,
    )
    .unwrap()
    .with_created_by(Some("dev@example.com".to_string()))
}

async fn open_findings(manager: &MaintenanceLifecycleManager) -> Vec<TargetEntity> {
    manager
        .gather_entities(&format!("FIND {}", FINDING_TYPE))
        .await
        .unwrap()
}

/// Applying identical content twice lands on one Finding and one edge
#[tokio::test]
async fn test_apply_is_idempotent() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 3);
    let repo = seed_repo(&graph, "repo-1", "billing");

    let first = assert_ok!(manager.apply_maintenance(&[repo.clone()], &content()).await);
    let second = assert_ok!(manager.apply_maintenance(&[repo], &content()).await);

    assert_eq!(first.maintenance_id, second.maintenance_id);
    assert_eq!(first.applied[0].finding_key, second.applied[0].finding_key);
    assert_eq!(first.applied[0].finding_id, second.applied[0].finding_id);
    assert_eq!(
        first.applied[0].relationship_id,
        second.applied[0].relationship_id
    );
    assert_eq!(graph.entities_of_type(FINDING_TYPE).len(), 1);
    assert_eq!(graph.relationships().len(), 1);
}

/// Re-applying content whose Finding is closed leaves it closed
#[tokio::test]
async fn test_reapply_does_not_reopen_closed_finding() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 3);
    let closed_repo = seed_repo(&graph, "repo-1", "billing");
    let fresh_repo = seed_repo(&graph, "repo-2", "search");

    let applied = manager
        .apply_maintenance(&[closed_repo.clone()], &content())
        .await
        .unwrap();
    let close = CloseInfo::new(CloseReason::Error, None).unwrap();
    manager
        .close_maintenance(&open_findings(&manager).await, &close)
        .await
        .unwrap();

    let report = assert_ok!(
        manager
            .apply_maintenance(&[closed_repo.clone(), fresh_repo.clone()], &content())
            .await
    );

    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].entity_id, closed_repo.id);
    assert_eq!(report.skipped[0].reason, SkipReason::AlreadyClosed);
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].target_id, fresh_repo.id);

    let finding = graph.entity(&applied.applied[0].finding_key).unwrap();
    assert_eq!(finding.properties["status"], json!("closed"));
    assert_eq!(finding.properties["closed"], json!(true));
    assert_eq!(graph.entities_of_type(FINDING_TYPE).len(), 2);
}

/// Field order of the content does not change its maintenance id
#[test]
fn test_maintenance_id_ignores_field_order() {
    let a: MaintenanceContent = serde_json::from_str(
        r#"{"shortDescription":"Upgrade tokio","description":"old","webLink":"https://x.io/1","dueDate":5}"#,
    )
    .unwrap();
    let b: MaintenanceContent = serde_json::from_str(
        r#"{"dueDate":5,"webLink":"https://x.io/1","description":"old","shortDescription":"Upgrade tokio"}"#,
    )
    .unwrap();

    assert_eq!(derive_maintenance_id(&a), derive_maintenance_id(&b));

    let mut c = a.clone();
    c.due_date = 6;
    assert_ne!(derive_maintenance_id(&a), derive_maintenance_id(&c));
}

/// Non-Finding entities in a close batch are skipped, the rest close
#[tokio::test]
async fn test_close_skips_non_findings() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 3);
    let repo_a = seed_repo(&graph, "repo-1", "billing");
    let repo_b = seed_repo(&graph, "repo-2", "search");
    let other = seed_repo(&graph, "repo-3", "web");

    manager
        .apply_maintenance(&[repo_a, repo_b], &content())
        .await
        .unwrap();
    let findings = open_findings(&manager).await;
    assert_eq!(findings.len(), 2);

    let batch = vec![findings[0].clone(), other.clone(), findings[1].clone()];
    let writes_before = graph.calls(GraphOperation::UpsertEntity);
    let close = CloseInfo::new(
        CloseReason::Complete,
        Some("https://git.example.com/pr/7".to_string()),
    )
    .unwrap();

    let report = assert_ok!(manager.close_maintenance(&batch, &close).await);

    assert_eq!(report.closed, vec![findings[0].id.clone(), findings[1].id.clone()]);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(report.skipped[0].entity_id, other.id);
    assert_eq!(report.skipped[0].reason, SkipReason::NotAFinding);
    assert_eq!(graph.calls(GraphOperation::UpsertEntity) - writes_before, 2);

    let untouched = graph.entity_by_id(&other.id).unwrap();
    assert!(!untouched.properties.contains_key("closeReason"));
}

/// Closing sends only close fields; everything else on the Finding survives
#[tokio::test]
async fn test_close_merges_onto_existing_finding() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 3);
    let repo = seed_repo(&graph, "repo-1", "billing");

    let applied = manager.apply_maintenance(&[repo], &content()).await.unwrap();
    let close = CloseInfo::new(
        CloseReason::RiskAccepted,
        Some("https://wiki.example.com/risk/3".to_string()),
    )
    .unwrap()
    .with_closed_by(Some("lead@example.com".to_string()));

    manager
        .close_maintenance(&open_findings(&manager).await, &close)
        .await
        .unwrap();

    let finding = graph.entity(&applied.applied[0].finding_key).unwrap();
    assert_eq!(finding.properties["status"], json!("closed"));
    assert_eq!(finding.properties["closed"], json!(true));
    assert_eq!(finding.properties["closeReason"], json!("RISK_ACCEPTED"));
    assert_eq!(
        finding.properties["maintenanceLink"],
        json!("https://wiki.example.com/risk/3")
    );
    assert_eq!(finding.properties["closedBy"], json!("lead@example.com"));
    assert_eq!(
        finding.properties["webLink"],
        json!("https://issues.example.com/DM-42")
    );
    assert_eq!(finding.properties["shortDescription"], json!("Upgrade tokio"));
    assert_eq!(finding.properties["maintenanceId"], json!(applied.maintenance_id));
    assert_eq!(finding.properties["createdBy"], json!("dev@example.com"));
}

/// k transient failures followed by success take k + 1 calls
#[tokio::test]
async fn test_retry_recovers_within_bound() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 4);
    let repo = seed_repo(&graph, "repo-1", "billing");
    graph.inject(Fault::times(GraphOperation::UpsertEntity, 3));

    let report = assert_ok!(manager.apply_maintenance(&[repo], &content()).await);

    assert_eq!(report.applied.len(), 1);
    assert_eq!(graph.calls(GraphOperation::UpsertEntity), 4);
    assert_eq!(graph.calls(GraphOperation::UpsertRelationship), 1);
}

/// With max attempts at or below k the call gives up after exactly max attempts
#[tokio::test]
async fn test_retry_gives_up_at_bound() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 3);
    let repo = seed_repo(&graph, "repo-1", "billing");
    graph.inject(Fault::times(GraphOperation::UpsertEntity, 5));

    let err = assert_err!(manager.apply_maintenance(&[repo], &content()).await);

    assert_eq!(graph.calls(GraphOperation::UpsertEntity), 3);
    assert_eq!(graph.calls(GraphOperation::UpsertRelationship), 0);
    match err {
        AppError::BatchAborted { source, .. } => match *source {
            AppError::RetryExhausted { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("expected RetryExhausted, got {:?}", other),
        },
        other => panic!("expected BatchAborted, got {:?}", other),
    }
}

/// Rejections are not retried
#[tokio::test]
async fn test_rejected_write_fails_without_retry() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 5);
    let repo = seed_repo(&graph, "repo-1", "billing");
    graph.inject(
        Fault::always(GraphOperation::UpsertEntity)
            .with_error(GraphError::Rejected("entityKey too long".into())),
    );

    let err = assert_err!(manager.apply_maintenance(&[repo], &content()).await);

    assert_eq!(graph.calls(GraphOperation::UpsertEntity), 1);
    assert!(matches!(
        err,
        AppError::BatchAborted { ref source, .. } if matches!(**source, AppError::Graph(_))
    ));
}

/// A failing target aborts the batch; earlier targets stay committed
#[tokio::test]
async fn test_batch_partial_failure() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 2);
    let repos = vec![
        seed_repo(&graph, "repo-1", "billing"),
        seed_repo(&graph, "repo-2", "search"),
        seed_repo(&graph, "repo-3", "web"),
    ];
    graph.inject(Fault::always(GraphOperation::UpsertEntity).for_key("repo-2"));

    let err = assert_err!(manager.apply_maintenance(&repos, &content()).await);

    match &err {
        AppError::BatchAborted {
            index,
            entity_id,
            committed,
            ..
        } => {
            assert_eq!(*index, 1);
            assert_eq!(entity_id, "repo-2");
            assert_eq!(*committed, 1);
        }
        other => panic!("expected BatchAborted, got {:?}", other),
    }

    // First target committed: its Finding is queryable and linked
    let findings = open_findings(&manager).await;
    assert_eq!(findings.len(), 1);
    let edges = graph.relationships();
    assert_eq!(edges.len(), 1);
    assert_eq!(edges[0].from_id, "repo-1");
    assert_eq!(edges[0].to_id, findings[0].id);

    // Third target never attempted
    assert!(graph
        .entities_of_type(FINDING_TYPE)
        .iter()
        .all(|f| !f.key.contains("repo-3")));
    assert_eq!(graph.calls(GraphOperation::UpsertEntity), 1 + 2);
    assert_eq!(graph.calls(GraphOperation::UpsertRelationship), 1);
}

/// The repo report lists open maintenance once and drops closed items
#[tokio::test]
async fn test_report_lists_open_maintenance() {
    let graph = Arc::new(InMemoryGraphClient::new());
    let manager = manager(&graph, 3);
    let repo_a = seed_repo(&graph, "repo-1", "billing");
    let repo_b = seed_repo(&graph, "repo-2", "search");

    let kept = manager
        .apply_maintenance(&[repo_a.clone(), repo_b], &content())
        .await
        .unwrap();
    let soon = MaintenanceContent::new("Rotate keys", "yearly", "https://x.io/keys", DUE - 1)
        .unwrap();
    let dropped = manager.apply_maintenance(&[repo_a], &soon).await.unwrap();

    let close = CloseInfo::new(CloseReason::Error, None).unwrap();
    let to_close: Vec<TargetEntity> = open_findings(&manager)
        .await
        .into_iter()
        .filter(|f| f.property_str("maintenanceId") == Some(dropped.maintenance_id.as_str()))
        .collect();
    manager.close_maintenance(&to_close, &close).await.unwrap();

    let rows = report::open_for_repo(&manager, "billing").await.unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].maintenance_id, kept.maintenance_id);
    assert_eq!(rows[0].due_date, Some(DUE));
}
